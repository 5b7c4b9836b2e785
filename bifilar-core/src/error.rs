//! Error types
//!
//! A data NACK in the middle of a master write is how a slave ends the
//! write; it is a normal completion, not an error, and has no variant.

/// Bus engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TwiError {
    /// A driver is already bound, or a transfer is still in flight
    Busy,
    /// No driver is bound to the engine
    Unbound,
    /// The transfer needs more segments than a descriptor holds
    DescriptorFull,
    /// Another master won the bus; nothing was released with STOP
    ArbitrationLost,
    /// No device answered the address
    AddressNack,
    /// Illegal START or STOP on the bus
    BusError,
    /// Caller-imposed wake-up budget ran out; the transfer is still in flight
    Timeout,
}

impl TwiError {
    /// Check if reissuing the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TwiError::Busy | TwiError::ArbitrationLost | TwiError::AddressNack | TwiError::Timeout
        )
    }
}

/// Bus address outside the 7-bit range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidAddress(pub u8);
