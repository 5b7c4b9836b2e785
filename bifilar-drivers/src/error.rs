//! Driver errors

use bifilar_core::TwiError;

/// Device driver errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// The bus transfer failed
    Bus(TwiError),
    /// The device ended the transfer early; carries the bytes moved
    ShortTransfer(usize),
    /// Register offset or value outside what the device accepts
    OutOfRange,
}

impl From<TwiError> for DriverError {
    fn from(error: TwiError) -> Self {
        DriverError::Bus(error)
    }
}
