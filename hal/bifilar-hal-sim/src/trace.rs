//! Bus trace
//!
//! Every wire-level event the simulator produces is appended to the
//! trace so tests can assert on what actually happened on SDA/SCL, not
//! just on what the engine believes happened.

use core::fmt;

/// One wire-level event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    /// START condition
    Start,
    /// Repeated START condition
    RepeatedStart,
    /// Address byte (7-bit address and R/W bit) with the addressee's answer
    Address { byte: u8, ack: bool },
    /// Byte sent by the master with the receiver's answer
    Write { byte: u8, ack: bool },
    /// Byte sent by a slave with the master's answer
    Read { byte: u8, ack: bool },
    /// STOP condition
    Stop,
    /// Another master won the bus
    ArbitrationLost,
    /// Misplaced START/STOP detected
    BusError,
}

impl BusEvent {
    /// Check if this is a STOP condition
    pub fn is_stop(&self) -> bool {
        matches!(self, BusEvent::Stop)
    }
}

impl fmt::Display for BusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn ack(ack: bool) -> &'static str {
            if ack {
                "A"
            } else {
                "N"
            }
        }

        match self {
            BusEvent::Start => write!(f, "S"),
            BusEvent::RepeatedStart => write!(f, "Sr"),
            BusEvent::Address { byte, ack: a } => write!(f, "@{:02x}{}", byte, ack(*a)),
            BusEvent::Write { byte, ack: a } => write!(f, "w{:02x}{}", byte, ack(*a)),
            BusEvent::Read { byte, ack: a } => write!(f, "r{:02x}{}", byte, ack(*a)),
            BusEvent::Stop => write!(f, "P"),
            BusEvent::ArbitrationLost => write!(f, "ARB"),
            BusEvent::BusError => write!(f, "BERR"),
        }
    }
}

/// Render a trace in compact form, e.g. `S @a0A w3aA P`
pub fn render(trace: &[BusEvent]) -> String {
    trace
        .iter()
        .map(|event| event.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
