//! Bus status decoder
//!
//! Maps the TWI status register to the protocol phase the controller
//! has just completed. Codes are the ATmega datasheet values; the
//! prescaler bits are masked off before decoding.

use bifilar_hal::twi::twsr;

/// Bus condition reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Condition {
    /// START transmitted (0x08)
    Start,
    /// Repeated START transmitted (0x10)
    RepeatedStart,
    /// Arbitration lost in SLA+R/W or data (0x38)
    ArbitrationLost,

    /// SLA+W transmitted, ACK received (0x18)
    MtSlaAck,
    /// SLA+W transmitted, NACK received (0x20)
    MtSlaNack,
    /// Data transmitted, ACK received (0x28)
    MtDataAck,
    /// Data transmitted, NACK received (0x30)
    MtDataNack,

    /// SLA+R transmitted, ACK received (0x40)
    MrSlaAck,
    /// SLA+R transmitted, NACK received (0x48)
    MrSlaNack,
    /// Data received, ACK returned (0x50)
    MrDataAck,
    /// Data received, NACK returned (0x58)
    MrDataNack,

    /// Own SLA+R received, ACK returned (0xA8)
    StSlaAck,
    /// Arbitration lost as master, own SLA+R received (0xB0)
    StArbLostSlaAck,
    /// Data transmitted, ACK received (0xB8)
    StDataAck,
    /// Data transmitted, NACK received (0xC0)
    StDataNack,
    /// Last data byte transmitted, ACK received (0xC8)
    StLastData,

    /// Own SLA+W received, ACK returned (0x60)
    SrSlaAck,
    /// Arbitration lost as master, own SLA+W received (0x68)
    SrArbLostSlaAck,
    /// General call received, ACK returned (0x70)
    SrGCallAck,
    /// Arbitration lost as master, general call received (0x78)
    SrArbLostGCallAck,
    /// Data received, ACK returned (0x80)
    SrDataAck,
    /// Data received, NACK returned (0x88)
    SrDataNack,
    /// General call data received, ACK returned (0x90)
    SrGCallDataAck,
    /// General call data received, NACK returned (0x98)
    SrGCallDataNack,
    /// STOP or repeated START received while addressed (0xA0)
    SrStop,

    /// No relevant state information, TWINT clear (0xF8)
    NoInfo,
    /// Illegal START or STOP condition (0x00)
    BusError,
    /// Value outside the datasheet table
    Unknown(u8),
}

impl Condition {
    /// Decode a raw status register value
    pub const fn decode(raw: u8) -> Self {
        use Condition::*;

        match raw & twsr::STATUS_MASK {
            0x08 => Start,
            0x10 => RepeatedStart,
            0x38 => ArbitrationLost,
            0x18 => MtSlaAck,
            0x20 => MtSlaNack,
            0x28 => MtDataAck,
            0x30 => MtDataNack,
            0x40 => MrSlaAck,
            0x48 => MrSlaNack,
            0x50 => MrDataAck,
            0x58 => MrDataNack,
            0xA8 => StSlaAck,
            0xB0 => StArbLostSlaAck,
            0xB8 => StDataAck,
            0xC0 => StDataNack,
            0xC8 => StLastData,
            0x60 => SrSlaAck,
            0x68 => SrArbLostSlaAck,
            0x70 => SrGCallAck,
            0x78 => SrArbLostGCallAck,
            0x80 => SrDataAck,
            0x88 => SrDataNack,
            0x90 => SrGCallDataAck,
            0x98 => SrGCallDataNack,
            0xA0 => SrStop,
            0xF8 => NoInfo,
            0x00 => BusError,
            code => Unknown(code),
        }
    }

    /// Datasheet status code
    pub const fn code(self) -> u8 {
        use Condition::*;

        match self {
            Start => 0x08,
            RepeatedStart => 0x10,
            ArbitrationLost => 0x38,
            MtSlaAck => 0x18,
            MtSlaNack => 0x20,
            MtDataAck => 0x28,
            MtDataNack => 0x30,
            MrSlaAck => 0x40,
            MrSlaNack => 0x48,
            MrDataAck => 0x50,
            MrDataNack => 0x58,
            StSlaAck => 0xA8,
            StArbLostSlaAck => 0xB0,
            StDataAck => 0xB8,
            StDataNack => 0xC0,
            StLastData => 0xC8,
            SrSlaAck => 0x60,
            SrArbLostSlaAck => 0x68,
            SrGCallAck => 0x70,
            SrArbLostGCallAck => 0x78,
            SrDataAck => 0x80,
            SrDataNack => 0x88,
            SrGCallDataAck => 0x90,
            SrGCallDataNack => 0x98,
            SrStop => 0xA0,
            NoInfo => 0xF8,
            BusError => 0x00,
            Unknown(code) => code,
        }
    }

    /// Check if the controller is addressed as a slave
    pub fn is_slave(&self) -> bool {
        matches!(self.code(), 0x60..=0xC8)
    }
}

impl From<u8> for Condition {
    fn from(raw: u8) -> Self {
        Condition::decode(raw)
    }
}
