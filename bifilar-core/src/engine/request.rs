//! In-flight master transfer

use bifilar_hal::{Sleep, SleepMode, StatusQueue, TwiRegisters};

use super::Twi;
use crate::descriptor::Descriptor;
use crate::error::TwiError;
use crate::event::EventSink;

/// Handle to a master transfer in flight
///
/// Borrows the engine and the caller's buffers until the transfer is
/// done, so neither can be touched while the bus is still moving bytes.
/// Dropping the handle early leaves the transfer running without
/// buffers; finish it with [`Twi::poll`] or [`Twi::await_completed`].
pub struct Request<'t, 'b, R, Q, E> {
    twi: &'t mut Twi<R, Q, E>,
    descriptor: Descriptor<'b>,
}

impl<'t, 'b, R, Q, E> Request<'t, 'b, R, Q, E>
where
    R: TwiRegisters,
    Q: StatusQueue,
    E: EventSink,
{
    pub(crate) fn new(twi: &'t mut Twi<R, Q, E>, descriptor: Descriptor<'b>) -> Self {
        Self { twi, descriptor }
    }

    /// Handle captured bus events; `None` while the transfer is in flight
    pub fn poll(&mut self) -> Option<Result<usize, TwiError>> {
        self.twi.drain(self.descriptor.segments_mut(), false);
        self.twi.outcome()
    }

    pub fn is_busy(&self) -> bool {
        self.twi.is_busy()
    }

    /// Total length of the transfer
    pub fn len(&self) -> usize {
        self.descriptor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptor.is_empty()
    }

    /// Sleep until the transfer completes
    ///
    /// Returns the number of bytes moved, header included. There is no
    /// timeout: a bus held low hangs here. See [`Request::await_within`].
    pub fn await_completed<S: Sleep + ?Sized>(
        mut self,
        sleep: &mut S,
        mode: SleepMode,
    ) -> Result<usize, TwiError> {
        loop {
            if let Some(outcome) = self.poll() {
                return outcome;
            }
            let twi = &*self.twi;
            sleep.sleep(mode, &|| twi.irq_pending());
        }
    }

    /// Like [`Request::await_completed`] but gives up after `wakeups`
    /// wake-ups with [`TwiError::Timeout`]
    ///
    /// The transfer stays in flight after a timeout; keep polling the
    /// handle or drop it and drain the engine.
    pub fn await_within<S: Sleep + ?Sized>(
        &mut self,
        sleep: &mut S,
        mode: SleepMode,
        wakeups: usize,
    ) -> Result<usize, TwiError> {
        for _ in 0..wakeups {
            if let Some(outcome) = self.poll() {
                return outcome;
            }
            let twi = &*self.twi;
            sleep.sleep(mode, &|| twi.irq_pending());
        }
        self.poll().unwrap_or(Err(TwiError::Timeout))
    }
}
