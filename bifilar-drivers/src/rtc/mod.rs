//! Real-time clocks

mod ds1307;

pub use ds1307::{Control, Ds1307, Rate, ADDRESS, RAM_MAX, RAM_START};

/// Calendar time as kept by a BCD clock chip
///
/// Fields are binary. `year` counts from 2000, `day` is the weekday
/// (1-7, meaning chosen by the application).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DateTime {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub day: u8,
    pub date: u8,
    pub month: u8,
    pub year: u8,
}

impl DateTime {
    /// Check every field against its calendar range
    pub fn is_valid(&self) -> bool {
        self.seconds < 60
            && self.minutes < 60
            && self.hours < 24
            && (1..=7).contains(&self.day)
            && (1..=31).contains(&self.date)
            && (1..=12).contains(&self.month)
            && self.year < 100
    }

    /// Decode the seven timekeeping registers
    ///
    /// Ignores the clock-halt bit and converts 12-hour mode to 24 hours.
    pub fn from_registers(regs: &[u8; 7]) -> Self {
        let hours = if regs[2] & HOUR_12 != 0 {
            let hour = bcd::decode(regs[2] & 0x1F) % 12;
            if regs[2] & HOUR_PM != 0 {
                hour + 12
            } else {
                hour
            }
        } else {
            bcd::decode(regs[2] & 0x3F)
        };

        Self {
            seconds: bcd::decode(regs[0] & 0x7F),
            minutes: bcd::decode(regs[1] & 0x7F),
            hours,
            day: bcd::decode(regs[3] & 0x07),
            date: bcd::decode(regs[4] & 0x3F),
            month: bcd::decode(regs[5] & 0x1F),
            year: bcd::decode(regs[6]),
        }
    }

    /// Encode as timekeeping registers, 24-hour mode, clock running
    pub fn to_registers(&self) -> [u8; 7] {
        [
            bcd::encode(self.seconds),
            bcd::encode(self.minutes),
            bcd::encode(self.hours),
            bcd::encode(self.day),
            bcd::encode(self.date),
            bcd::encode(self.month),
            bcd::encode(self.year),
        ]
    }
}

/// 12-hour mode flag in the hours register
const HOUR_12: u8 = 0x40;
/// PM flag in 12-hour mode
const HOUR_PM: u8 = 0x20;

/// Packed binary-coded decimal
pub mod bcd {
    /// Two BCD digits to binary
    pub const fn decode(value: u8) -> u8 {
        (value >> 4) * 10 + (value & 0x0F)
    }

    /// Binary (0-99) to two BCD digits
    pub const fn encode(value: u8) -> u8 {
        ((value / 10) << 4) | (value % 10)
    }
}
