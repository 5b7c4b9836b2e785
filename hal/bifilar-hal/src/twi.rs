//! TWI bus controller register abstractions
//!
//! The bus engine talks to the controller exclusively through these
//! registers. Bit positions follow the ATmega TWI module (datasheet
//! section 21.9) and must be preserved exactly by every implementation,
//! simulated or real.

/// TWI Control Register (TWCR) bits
pub mod twcr {
    /// TWI Interrupt Flag; written as 1 to clear it and start the next bus operation
    pub const TWINT: u8 = 1 << 7;
    /// TWI Enable Acknowledge
    pub const TWEA: u8 = 1 << 6;
    /// TWI START Condition
    pub const TWSTA: u8 = 1 << 5;
    /// TWI STOP Condition; cleared by hardware once the STOP is on the bus
    pub const TWSTO: u8 = 1 << 4;
    /// TWI Write Collision Flag
    pub const TWWC: u8 = 1 << 3;
    /// TWI Enable
    pub const TWEN: u8 = 1 << 2;
    /// TWI Interrupt Enable
    pub const TWIE: u8 = 1 << 0;
}

/// TWI Status Register (TWSR) fields
pub mod twsr {
    /// Status code bits (TWS7..TWS3)
    pub const STATUS_MASK: u8 = 0xF8;
    /// Prescaler bit 0
    pub const TWPS0: u8 = 1 << 0;
    /// Prescaler bit 1
    pub const TWPS1: u8 = 1 << 1;
    /// Both prescaler bits
    pub const PRESCALER_MASK: u8 = TWPS0 | TWPS1;
}

/// TWI (Slave) Address Register (TWAR) fields
pub mod twar {
    /// General call recognition enable
    pub const TWGCE: u8 = 1 << 0;
    /// Address bits (TWA6..TWA0)
    pub const ADDRESS_MASK: u8 = 0xFE;
}

/// Register file of a TWI bus controller
///
/// Implementations perform the raw (volatile) register accesses. No
/// method may have side effects beyond what the hardware register does;
/// in particular writing the control register with [`twcr::TWINT`] set
/// is what starts the next bus operation.
pub trait TwiRegisters {
    /// Read the control register (TWCR)
    fn control(&self) -> u8;

    /// Write the control register (TWCR)
    fn set_control(&mut self, value: u8);

    /// Read the raw status register (TWSR), prescaler bits included
    fn status(&self) -> u8;

    /// Write the prescaler bits of the status register
    fn set_prescaler(&mut self, bits: u8);

    /// Read the data register (TWDR)
    fn data(&self) -> u8;

    /// Write the data register (TWDR)
    fn set_data(&mut self, value: u8);

    /// Write the slave address register (TWAR)
    fn set_address(&mut self, value: u8);

    /// Write the bit rate register (TWBR)
    fn set_bit_rate(&mut self, value: u8);

    /// Enable the internal pull-ups on the SDA and SCL pins
    fn enable_pullups(&mut self);

    /// Status code with the prescaler bits masked off
    fn status_code(&self) -> u8 {
        self.status() & twsr::STATUS_MASK
    }

    /// Check if a STOP condition is still pending on the bus
    fn stop_pending(&self) -> bool {
        self.control() & twcr::TWSTO != 0
    }
}

impl<T: TwiRegisters + ?Sized> TwiRegisters for &mut T {
    fn control(&self) -> u8 {
        (**self).control()
    }

    fn set_control(&mut self, value: u8) {
        (**self).set_control(value)
    }

    fn status(&self) -> u8 {
        (**self).status()
    }

    fn set_prescaler(&mut self, bits: u8) {
        (**self).set_prescaler(bits)
    }

    fn data(&self) -> u8 {
        (**self).data()
    }

    fn set_data(&mut self, value: u8) {
        (**self).set_data(value)
    }

    fn set_address(&mut self, value: u8) {
        (**self).set_address(value)
    }

    fn set_bit_rate(&mut self, value: u8) {
        (**self).set_bit_rate(value)
    }

    fn enable_pullups(&mut self) {
        (**self).enable_pullups()
    }
}
