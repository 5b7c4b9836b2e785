//! PCF8591 8-bit A/D and D/A converter
//!
//! Four analog inputs, one analog output. A write sets the control
//! register (input configuration, channel, auto-increment, output
//! enable); following reads return conversions of the selected channel.
//! A byte written after the control byte goes to the D/A converter.
//!
//! Sampling runs inside a [`Pcf8591::begin`]/[`Pcf8591::end`] session
//! that keeps the engine bound to the converter.

use bifilar_core::{Driver, EventSink, Twi};
use bifilar_hal::{Sleep, StatusQueue, TwiRegisters};

use crate::error::DriverError;
use crate::with_bus;

/// Bus address with the A2..A0 pins tied low
pub const BASE_ADDRESS: u8 = 0x48;

/// Control register bits
pub mod control {
    pub const AIN0: u8 = 0x00;
    pub const AIN1: u8 = 0x01;
    pub const AIN2: u8 = 0x02;
    pub const AIN3: u8 = 0x03;
    pub const CHANNEL_MASK: u8 = 0x03;
    /// Select the next channel after every conversion
    pub const AUTO_INCREMENT: u8 = 0x04;
    pub const FOUR_INPUTS: u8 = 0x00;
    pub const THREE_DIFF_INPUTS: u8 = 0x10;
    pub const TWO_MIXED_INPUTS: u8 = 0x20;
    pub const TWO_DIFF_INPUTS: u8 = 0x30;
    /// Analog output active
    pub const OUTPUT_ENABLE: u8 = 0x40;
}

const fn driver(subaddress: u8) -> Driver {
    match Driver::new(BASE_ADDRESS | (subaddress & 0x07)) {
        Ok(driver) => driver,
        Err(_) => panic!("PCF8591 address out of range"),
    }
}

/// PCF8591 driver
#[derive(Debug, Clone, Copy)]
pub struct Pcf8591 {
    driver: Driver,
    /// Shadow copy of the control register
    control: u8,
}

impl Pcf8591 {
    /// Converter with address pins A2..A0 set to `subaddress`
    pub const fn new(subaddress: u8) -> Self {
        Self {
            driver: driver(subaddress),
            control: 0,
        }
    }

    pub fn address(&self) -> u8 {
        self.driver.address()
    }

    /// Last control byte written
    pub fn control(&self) -> u8 {
        self.control
    }

    /// Bind the engine and write the control register
    ///
    /// On failure the engine is released again.
    pub fn begin<R, Q, E, S>(
        &mut self,
        twi: &mut Twi<R, Q, E>,
        sleep: &mut S,
        control: u8,
    ) -> Result<(), DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        twi.begin(&self.driver, None)?;
        if let Err(error) = twi.write(&[control], sleep) {
            twi.end(sleep);
            return Err(error.into());
        }
        self.control = control;
        Ok(())
    }

    pub fn end<R, Q, E, S>(&mut self, twi: &mut Twi<R, Q, E>, sleep: &mut S)
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        twi.end(sleep);
    }

    /// One conversion of the selected channel; needs an open session
    pub fn sample<R, Q, E, S>(&mut self, twi: &mut Twi<R, Q, E>, sleep: &mut S) -> Result<u8, DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        let mut value = [0u8; 1];
        match twi.read(&mut value, sleep)? {
            1 => Ok(value[0]),
            count => Err(DriverError::ShortTransfer(count)),
        }
    }

    /// Fill `buf` with conversions; needs an open session
    ///
    /// With [`control::AUTO_INCREMENT`] consecutive bytes walk the channels.
    pub fn sample_into<R, Q, E, S>(
        &mut self,
        twi: &mut Twi<R, Q, E>,
        sleep: &mut S,
        buf: &mut [u8],
    ) -> Result<usize, DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        Ok(twi.read(buf, sleep)?)
    }

    /// Select a channel with `control`, take one sample and release the bus
    pub fn sample_channel<R, Q, E, S>(
        &mut self,
        twi: &mut Twi<R, Q, E>,
        sleep: &mut S,
        control: u8,
    ) -> Result<u8, DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        self.begin(twi, sleep, control)?;
        let value = self.sample(twi, sleep);
        self.end(twi, sleep);
        value
    }

    /// Drive the analog output to `value`
    ///
    /// Runs its own transaction; call it outside a session.
    pub fn convert<R, Q, E, S>(
        &mut self,
        twi: &mut Twi<R, Q, E>,
        sleep: &mut S,
        value: u8,
    ) -> Result<(), DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        let control = self.control | control::OUTPUT_ENABLE;
        let count = with_bus(twi, &self.driver, sleep, |twi, sleep| {
            twi.write_header(control, &[value], sleep)
        })?;
        if count != 2 {
            return Err(DriverError::ShortTransfer(count));
        }
        self.control = control;
        Ok(())
    }
}
