//! Bus configuration
//!
//! The bus clock is derived from the CPU clock with the prescaler fixed
//! at 1: `SCL = F_CPU / (16 + 2 * TWBR)`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The requested bus clock cannot be produced from the CPU clock
    FrequencyOutOfRange,
}

/// Bus controller configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TwiConfig {
    /// CPU clock in Hz
    pub cpu_frequency: u32,
    /// Bus clock in Hz
    pub frequency: u32,
    /// Enable the internal pull-ups on SDA/SCL
    pub pullups: bool,
}

impl TwiConfig {
    /// 100 kHz standard mode on a 16 MHz part
    pub const STANDARD: Self = Self {
        cpu_frequency: 16_000_000,
        frequency: 100_000,
        pullups: true,
    };

    /// 400 kHz fast mode on a 16 MHz part
    pub const FAST: Self = Self {
        cpu_frequency: 16_000_000,
        frequency: 400_000,
        pullups: true,
    };

    pub const fn new(cpu_frequency: u32, frequency: u32) -> Self {
        Self {
            cpu_frequency,
            frequency,
            pullups: true,
        }
    }

    /// Bit rate register value, `((F_CPU / FREQ) - 16) / 2`
    pub fn bit_rate(&self) -> Result<u8, ConfigError> {
        if self.frequency == 0 {
            return Err(ConfigError::FrequencyOutOfRange);
        }
        let divider = self.cpu_frequency / self.frequency;
        let twbr = divider
            .checked_sub(16)
            .ok_or(ConfigError::FrequencyOutOfRange)?
            / 2;
        u8::try_from(twbr).map_err(|_| ConfigError::FrequencyOutOfRange)
    }

    /// Bus clock actually produced by [`TwiConfig::bit_rate`]
    pub fn effective_frequency(&self) -> Result<u32, ConfigError> {
        let twbr = self.bit_rate()? as u32;
        Ok(self.cpu_frequency / (16 + 2 * twbr))
    }
}

impl Default for TwiConfig {
    fn default() -> Self {
        Self::STANDARD
    }
}
