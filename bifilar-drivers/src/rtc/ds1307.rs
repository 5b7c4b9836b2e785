//! DS1307 real-time clock
//!
//! 64 byte register file behind an auto-incrementing register pointer:
//!
//! ```text
//! 0x00..=0x06  seconds minutes hours day date month year (BCD)
//! 0x07         control (square-wave output)
//! 0x08..=0x3F  battery-backed RAM
//! ```
//!
//! Every call binds the engine for one transaction and releases it
//! again, so the clock can share the bus with other drivers.

use bifilar_core::{Driver, EventSink, Twi};
use bifilar_hal::{Sleep, StatusQueue, TwiRegisters};

use super::DateTime;
use crate::error::DriverError;
use crate::with_bus;

/// Fixed bus address
pub const ADDRESS: u8 = 0x68;

/// Control register
const CONTROL: u8 = 0x07;

/// First register of application RAM
pub const RAM_START: u8 = 0x08;

/// Last register of application RAM
const RAM_END: u8 = 0x3F;

/// Size of application RAM
pub const RAM_MAX: usize = (RAM_END - RAM_START) as usize + 1;

const DRIVER: Driver = match Driver::new(ADDRESS) {
    Ok(driver) => driver,
    Err(_) => panic!("DS1307 address out of range"),
};

/// Square-wave output frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rate {
    #[default]
    Hz1 = 0,
    Hz4096 = 1,
    Hz8192 = 2,
    Hz32768 = 3,
}

/// Control register fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Control {
    pub rate: Rate,
    /// Square-wave output enabled
    pub square_wave: bool,
    /// Output level while the square wave is disabled
    pub out: bool,
}

impl Control {
    const RS_MASK: u8 = 0x03;
    const SQWE: u8 = 0x10;
    const OUT: u8 = 0x80;
}

impl From<u8> for Control {
    fn from(bits: u8) -> Self {
        let rate = match bits & Self::RS_MASK {
            0 => Rate::Hz1,
            1 => Rate::Hz4096,
            2 => Rate::Hz8192,
            _ => Rate::Hz32768,
        };
        Self {
            rate,
            square_wave: bits & Self::SQWE != 0,
            out: bits & Self::OUT != 0,
        }
    }
}

impl From<Control> for u8 {
    fn from(control: Control) -> u8 {
        let mut bits = control.rate as u8;
        if control.square_wave {
            bits |= Control::SQWE;
        }
        if control.out {
            bits |= Control::OUT;
        }
        bits
    }
}

/// DS1307 driver
#[derive(Debug, Clone, Copy, Default)]
pub struct Ds1307;

impl Ds1307 {
    pub fn new() -> Self {
        Self
    }

    /// Read registers from `pos` into `buf`; returns the bytes read
    pub fn read<R, Q, E, S>(
        &self,
        twi: &mut Twi<R, Q, E>,
        sleep: &mut S,
        buf: &mut [u8],
        pos: u8,
    ) -> Result<usize, DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        with_bus(twi, &DRIVER, sleep, |twi, sleep| {
            twi.write(&[pos], sleep)?;
            twi.read(buf, sleep)
        })
    }

    /// Write `buf` to the registers from `pos`; returns the bytes written
    pub fn write<R, Q, E, S>(
        &self,
        twi: &mut Twi<R, Q, E>,
        sleep: &mut S,
        buf: &[u8],
        pos: u8,
    ) -> Result<usize, DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        let count = with_bus(twi, &DRIVER, sleep, |twi, sleep| {
            twi.write_header(pos, buf, sleep)
        })?;
        // The register pointer is not payload
        Ok(count.saturating_sub(1))
    }

    /// Read the current time
    pub fn time<R, Q, E, S>(&self, twi: &mut Twi<R, Q, E>, sleep: &mut S) -> Result<DateTime, DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        let mut regs = [0u8; 7];
        let count = self.read(twi, sleep, &mut regs, 0)?;
        if count != regs.len() {
            return Err(DriverError::ShortTransfer(count));
        }
        Ok(DateTime::from_registers(&regs))
    }

    /// Set the time; also starts a halted clock
    pub fn set_time<R, Q, E, S>(
        &self,
        twi: &mut Twi<R, Q, E>,
        sleep: &mut S,
        time: &DateTime,
    ) -> Result<(), DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        if !time.is_valid() {
            return Err(DriverError::OutOfRange);
        }
        let regs = time.to_registers();
        let count = self.write(twi, sleep, &regs, 0)?;
        if count != regs.len() {
            return Err(DriverError::ShortTransfer(count));
        }
        Ok(())
    }

    /// Read the square-wave control register
    pub fn control<R, Q, E, S>(&self, twi: &mut Twi<R, Q, E>, sleep: &mut S) -> Result<Control, DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        let mut bits = [0u8; 1];
        match self.read(twi, sleep, &mut bits, CONTROL)? {
            1 => Ok(Control::from(bits[0])),
            count => Err(DriverError::ShortTransfer(count)),
        }
    }

    pub fn set_control<R, Q, E, S>(
        &self,
        twi: &mut Twi<R, Q, E>,
        sleep: &mut S,
        control: Control,
    ) -> Result<(), DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        match self.write(twi, sleep, &[control.into()], CONTROL)? {
            1 => Ok(()),
            count => Err(DriverError::ShortTransfer(count)),
        }
    }

    /// Read application RAM from `offset` (0 is the first RAM byte)
    pub fn read_ram<R, Q, E, S>(
        &self,
        twi: &mut Twi<R, Q, E>,
        sleep: &mut S,
        buf: &mut [u8],
        offset: usize,
    ) -> Result<usize, DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        let pos = ram_position(offset, buf.len())?;
        self.read(twi, sleep, buf, pos)
    }

    /// Write application RAM from `offset`
    pub fn write_ram<R, Q, E, S>(
        &self,
        twi: &mut Twi<R, Q, E>,
        sleep: &mut S,
        buf: &[u8],
        offset: usize,
    ) -> Result<usize, DriverError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        let pos = ram_position(offset, buf.len())?;
        self.write(twi, sleep, buf, pos)
    }
}

/// Register address of RAM `offset`, if `len` bytes fit from there
fn ram_position(offset: usize, len: usize) -> Result<u8, DriverError> {
    match offset.checked_add(len) {
        Some(end) if end <= RAM_MAX => Ok(RAM_START + offset as u8),
        _ => Err(DriverError::OutOfRange),
    }
}
