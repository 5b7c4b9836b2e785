//! Completion events
//!
//! The engine reports finished transfers as `(kind, target, value)`
//! records. It only produces them; the application (or a [`Slave`])
//! consumes them from whatever sink it handed to the engine, typically a
//! static embassy-sync channel:
//!
//! ```ignore
//! static TWI_EVENTS: Channel<CriticalSectionRawMutex, Event, 4> = Channel::new();
//!
//! let mut twi = Twi::new(regs, queue, &TWI_EVENTS, TwiConfig::STANDARD)?;
//! ```
//!
//! [`Slave`]: crate::role::Slave

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Sender};
use heapless::Deque;

/// Kind of completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// Master write finished, or a remote master finished writing to us
    WriteCompleted,
    /// Master read finished
    ReadCompleted,
    /// Transfer failed; the value is negative
    Error,
}

/// Opaque receiver identity chosen by whoever called `begin`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Target(pub u8);

/// Completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event {
    pub kind: EventKind,
    pub target: Target,
    /// Bytes transferred, or -1 on error
    pub value: i16,
}

impl Event {
    /// Byte count of a successful transfer
    pub fn count(&self) -> Option<usize> {
        match self.kind {
            EventKind::Error => None,
            _ => usize::try_from(self.value).ok(),
        }
    }
}

/// Destination for completion events
pub trait EventSink {
    /// Deliver an event; hands it back if the sink is full
    fn push(&mut self, event: Event) -> Result<(), Event>;
}

/// Discards every event
impl EventSink for () {
    fn push(&mut self, _event: Event) -> Result<(), Event> {
        Ok(())
    }
}

impl<M: RawMutex, const N: usize> EventSink for &Channel<M, Event, N> {
    fn push(&mut self, event: Event) -> Result<(), Event> {
        self.try_send(event).map_err(|_| event)
    }
}

impl<M: RawMutex, const N: usize> EventSink for Sender<'_, M, Event, N> {
    fn push(&mut self, event: Event) -> Result<(), Event> {
        self.try_send(event).map_err(|_| event)
    }
}

impl<const N: usize> EventSink for Deque<Event, N> {
    fn push(&mut self, event: Event) -> Result<(), Event> {
        self.push_back(event)
    }
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn push(&mut self, event: Event) -> Result<(), Event> {
        (**self).push(event)
    }
}
