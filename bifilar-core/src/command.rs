//! Control register commands
//!
//! Every action the engine takes on the bus is one write of a fixed
//! TWCR bit pattern. The values are bit-exact for the ATmega TWI module.

use bifilar_hal::twi::twcr::{TWEA, TWEN, TWIE, TWINT, TWSTA, TWSTO};

/// TWCR command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Enabled, acknowledging own address, interrupt armed; TWINT untouched
    Idle = TWEA | TWEN | TWIE,
    /// Request a START (or repeated START)
    Start = TWINT | TWSTA | TWEN | TWIE,
    /// Continue the transfer; a received byte is NACKed
    Data = TWINT | TWEN | TWIE,
    /// Continue the transfer, acknowledging the next byte. Also releases
    /// the bus into not-addressed slave mode after a lost arbitration.
    Ack = TWINT | TWEA | TWEN | TWIE,
    /// Release the bus with a STOP; the interrupt stays disarmed
    Stop = TWINT | TWSTO | TWEN,
}

impl Command {
    /// Receive the next byte and NACK it (same bits as [`Command::Data`])
    pub const NACK: Command = Command::Data;

    /// Raw TWCR value
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Acknowledge or not, for receive phases
    pub const fn ack_if(ack: bool) -> Self {
        if ack {
            Command::Ack
        } else {
            Command::NACK
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_patterns() {
        assert_eq!(Command::Idle.bits(), 0x45);
        assert_eq!(Command::Start.bits(), 0xA5);
        assert_eq!(Command::Data.bits(), 0x85);
        assert_eq!(Command::Ack.bits(), 0xC5);
        assert_eq!(Command::NACK.bits(), 0x85);
        assert_eq!(Command::Stop.bits(), 0x94);
    }

    #[test]
    fn test_ack_if() {
        assert_eq!(Command::ack_if(true), Command::Ack);
        assert_eq!(Command::ack_if(false), Command::Data);
    }
}
