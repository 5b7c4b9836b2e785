//! Bus roles
//!
//! A [`Driver`] is what a device driver holds to talk to its chip as bus
//! master. A [`Slave`] turns the engine into a responder at its own
//! address: a remote master writes a request into the slave's write
//! buffer, the slave's [`RequestHandler`] prepares the answer in the read
//! buffer, and the remote master reads it back.
//!
//! ```text
//!  remote master          engine (capture path)        foreground
//!  ──────────────         ─────────────────────        ──────────
//!  S SLA+W data.. P  ───▶ write buffer, TWAR = 0  ───▶ Event::WriteCompleted
//!                                                        │
//!                                                        ▼
//!                                                  Slave::on_event
//!                                                  handler.on_request()
//!                                                  TWAR = address
//!  S SLA+R ..data P  ◀─── read buffer
//! ```

use bifilar_hal::{Sleep, SleepMode, StatusQueue, TwiRegisters};

use crate::descriptor::{Descriptor, Segment};
use crate::engine::Twi;
use crate::error::{InvalidAddress, TwiError};
use crate::event::{Event, EventKind, EventSink, Target};

/// Bus address handle of a device
///
/// Stores the 7-bit address pre-shifted; the R/W bit is added per
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Driver {
    sla: u8,
}

impl Driver {
    /// Create a handle for a 7-bit address
    pub const fn new(address: u8) -> Result<Self, InvalidAddress> {
        if address > 0x7F {
            return Err(InvalidAddress(address));
        }
        Ok(Self { sla: address << 1 })
    }

    /// 7-bit address
    pub const fn address(&self) -> u8 {
        self.sla >> 1
    }

    /// Address byte with the R/W bit clear
    pub(crate) const fn sla(&self) -> u8 {
        self.sla
    }
}

/// Answers requests written to a [`Slave`]
pub trait RequestHandler {
    /// A remote master wrote `request`; prepare `response` for its next read
    fn on_request(&mut self, request: &[u8], response: &mut [u8]);
}

impl<F> RequestHandler for F
where
    F: FnMut(&[u8], &mut [u8]),
{
    fn on_request(&mut self, request: &[u8], response: &mut [u8]) {
        self(request, response)
    }
}

/// Bus slave at a fixed address
pub struct Slave<'b, H> {
    driver: Driver,
    target: Target,
    general_call: bool,
    handler: H,
    /// Filled by remote master writes
    write_buf: &'b mut [u8],
    /// Served to remote master reads
    read_buf: &'b mut [u8],
}

impl<'b, H: RequestHandler> Slave<'b, H> {
    /// Create a slave; its completion events are tagged with `target`
    pub fn new(address: u8, target: Target, handler: H) -> Result<Self, InvalidAddress> {
        Ok(Self {
            driver: Driver::new(address)?,
            target,
            general_call: false,
            handler,
            write_buf: &mut [],
            read_buf: &mut [],
        })
    }

    /// Buffer served to a remote master reading from us; set before `begin`
    pub fn set_read_buf(&mut self, buf: &'b mut [u8]) {
        self.read_buf = buf;
    }

    /// Buffer receiving what a remote master writes; set before `begin`
    pub fn set_write_buf(&mut self, buf: &'b mut [u8]) {
        self.write_buf = buf;
    }

    /// Also accept writes to the general call address
    pub fn set_general_call(&mut self, enable: bool) {
        self.general_call = enable;
    }

    pub fn address(&self) -> u8 {
        self.driver.address()
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Bind the engine and start answering at our address
    pub fn begin<R, Q, E>(&mut self, twi: &mut Twi<R, Q, E>) -> Result<(), TwiError>
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
    {
        twi.begin(&self.driver, Some(self.target))?;
        twi.listen(self.driver.address(), self.general_call);
        Ok(())
    }

    /// Handle captured bus events with the slave buffers
    pub fn serve<R, Q, E>(&mut self, twi: &mut Twi<R, Q, E>)
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
    {
        let mut descriptor = Descriptor::new();
        // Two segments always fit an empty descriptor
        let _ = descriptor.push(Segment::Rx(&mut *self.write_buf));
        let _ = descriptor.push(Segment::Tx(&*self.read_buf));
        twi.drain(descriptor.segments_mut(), true);
    }

    /// Sleep until a bus event is captured, then serve it
    pub fn listen<R, Q, E, S>(&mut self, twi: &mut Twi<R, Q, E>, sleep: &mut S, mode: SleepMode)
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        {
            let twi = &*twi;
            sleep.sleep(mode, &|| twi.irq_pending());
        }
        self.serve(twi);
    }

    /// Handle a completion event outside the capture path
    ///
    /// On a finished write addressed to this slave, runs the request
    /// handler and re-arms the address match. Returns false for events
    /// that belong to someone else.
    pub fn on_event<R, Q, E>(&mut self, twi: &mut Twi<R, Q, E>, event: Event) -> bool
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
    {
        if event.target != self.target || event.kind != EventKind::WriteCompleted {
            return false;
        }

        let len = event.count().unwrap_or(0).min(self.write_buf.len());
        self.handler
            .on_request(&self.write_buf[..len], &mut *self.read_buf);
        twi.listen(self.driver.address(), self.general_call);
        true
    }

    /// Stop answering and release the engine
    pub fn end<R, Q, E, S>(&mut self, twi: &mut Twi<R, Q, E>, sleep: &mut S)
    where
        R: TwiRegisters,
        Q: StatusQueue,
        E: EventSink,
        S: Sleep + ?Sized,
    {
        twi.end(sleep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TwiConfig;
    use crate::engine::State;
    use bifilar_hal_sim::{render, SimBus, SimQueue, SimRegisters, SimSleep};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_sync::channel::Channel;

    const ADDRESS: u8 = 0x21;
    const TARGET: Target = Target(9);

    type Events = Channel<NoopRawMutex, Event, 4>;
    type TestTwi<'c> = Twi<SimRegisters, SimQueue, &'c Events>;

    fn engine(events: &Events) -> (SimBus, TestTwi<'_>, SimSleep) {
        let (bus, hw) = SimBus::new();
        let twi = Twi::new(hw.registers, hw.queue, events, TwiConfig::STANDARD).unwrap();
        (bus, twi, hw.sleeper)
    }

    /// Answers every request with the request bytes doubled
    fn doubler(request: &[u8], response: &mut [u8]) {
        for (out, byte) in response.iter_mut().zip(request) {
            *out = byte.wrapping_mul(2);
        }
    }

    #[test]
    fn test_driver_address() {
        assert_eq!(Driver::new(0x80), Err(InvalidAddress(0x80)));
        let driver = Driver::new(0x68).unwrap();
        assert_eq!(driver.address(), 0x68);
        assert_eq!(driver.sla(), 0xD0);
    }

    #[test]
    fn test_slave_rejects_bad_address() {
        assert!(Slave::new(0xFF, TARGET, doubler).is_err());
    }

    #[test]
    fn test_slave_write_then_read() {
        let events = Events::new();
        let (bus, mut twi, mut sleeper) = engine(&events);
        let mut write_buf = [0u8; 4];
        let mut read_buf = [0u8; 4];
        let mut slave = Slave::new(ADDRESS, TARGET, doubler).unwrap();
        slave.set_write_buf(&mut write_buf);
        slave.set_read_buf(&mut read_buf);
        slave.begin(&mut twi).unwrap();
        assert_eq!(bus.slave_address(), ADDRESS << 1);

        bus.remote_write(ADDRESS, &[0x01, 0x02, 0x03]);
        while !bus.is_quiescent() {
            slave.listen(&mut twi, &mut sleeper, SleepMode::Idle);
        }

        let event = events.try_receive().unwrap();
        assert_eq!(
            event,
            Event {
                kind: EventKind::WriteCompleted,
                target: TARGET,
                value: 3,
            }
        );
        // Deaf until the request is handled
        assert_eq!(bus.slave_address(), 0);
        assert!(slave.on_event(&mut twi, event));
        assert_eq!(bus.slave_address(), ADDRESS << 1);

        bus.remote_read(ADDRESS, 4);
        while !bus.is_quiescent() {
            slave.listen(&mut twi, &mut sleeper, SleepMode::Idle);
        }

        assert_eq!(twi.state(), State::Idle);
        assert_eq!(bus.remote_received(), vec![0x02, 0x04, 0x06, 0x00]);
        assert_eq!(
            render(&bus.trace()),
            "S @42A w01A w02A w03A P S @43A r02A r04A r06A r00N P"
        );
        assert!(events.try_receive().is_err());
    }

    #[test]
    fn test_slave_write_overflow() {
        let events = Events::new();
        let (bus, mut twi, mut sleeper) = engine(&events);
        let mut write_buf = [0u8; 2];
        let mut slave = Slave::new(ADDRESS, TARGET, |request: &[u8], _: &mut [u8]| {
            assert_eq!(request, &[0x0A, 0x0B]);
        })
        .unwrap();
        slave.set_write_buf(&mut write_buf);
        slave.begin(&mut twi).unwrap();

        bus.remote_write(ADDRESS, &[0x0A, 0x0B, 0x0C, 0x0D]);
        while !bus.is_quiescent() {
            slave.listen(&mut twi, &mut sleeper, SleepMode::Idle);
        }

        assert_eq!(render(&bus.trace()), "S @42A w0aA w0bA w0cN P");
        let event = events.try_receive().unwrap();
        assert_eq!(event.count(), Some(2));
        assert!(slave.on_event(&mut twi, event));
    }

    #[test]
    fn test_slave_empty_read_buffer() {
        let events = Events::new();
        let (bus, mut twi, mut sleeper) = engine(&events);
        let mut slave = Slave::new(ADDRESS, TARGET, doubler).unwrap();
        slave.begin(&mut twi).unwrap();

        bus.remote_read(ADDRESS, 1);
        while !bus.is_quiescent() {
            slave.listen(&mut twi, &mut sleeper, SleepMode::Idle);
        }

        assert_eq!(bus.remote_received(), vec![0xFF]);
        assert_eq!(twi.state(), State::Idle);
    }

    #[test]
    fn test_general_call() {
        let events = Events::new();
        let (bus, mut twi, mut sleeper) = engine(&events);
        let mut write_buf = [0u8; 2];
        let mut slave = Slave::new(ADDRESS, TARGET, doubler).unwrap();
        slave.set_write_buf(&mut write_buf);
        slave.set_general_call(true);
        slave.begin(&mut twi).unwrap();
        assert_eq!(bus.slave_address(), (ADDRESS << 1) | 1);

        bus.remote_write(0x00, &[0x06]);
        while !bus.is_quiescent() {
            slave.listen(&mut twi, &mut sleeper, SleepMode::Idle);
        }

        let event = events.try_receive().unwrap();
        assert_eq!(event.count(), Some(1));
        assert!(slave.on_event(&mut twi, event));
        assert_eq!(bus.slave_address(), (ADDRESS << 1) | 1);
        assert_eq!(render(&bus.trace()), "S @00A w06A P");
    }

    #[test]
    fn test_on_event_ignores_others() {
        let events = Events::new();
        let (bus, mut twi, _sleeper) = engine(&events);
        let mut slave = Slave::new(ADDRESS, TARGET, doubler).unwrap();
        slave.begin(&mut twi).unwrap();
        let address = bus.slave_address();

        let foreign = Event {
            kind: EventKind::WriteCompleted,
            target: Target(1),
            value: 1,
        };
        let read = Event {
            kind: EventKind::ReadCompleted,
            target: TARGET,
            value: 1,
        };
        assert!(!slave.on_event(&mut twi, foreign));
        assert!(!slave.on_event(&mut twi, read));
        assert_eq!(bus.slave_address(), address);
    }

    #[test]
    fn test_slave_end_releases_engine() {
        let events = Events::new();
        let (bus, mut twi, mut sleeper) = engine(&events);
        let mut slave = Slave::new(ADDRESS, TARGET, doubler).unwrap();
        slave.begin(&mut twi).unwrap();
        assert_eq!(slave.begin(&mut twi), Err(TwiError::Busy));

        slave.end(&mut twi, &mut sleeper);

        assert!(!twi.is_bound());
        assert_eq!(bus.control(), 0);
    }

    #[test]
    fn test_handler_access() {
        let mut calls = 0usize;
        let mut slave = Slave::new(ADDRESS, TARGET, |_: &[u8], _: &mut [u8]| calls += 1).unwrap();
        slave.handler_mut().on_request(&[], &mut []);
        assert_eq!(slave.address(), ADDRESS);
        assert_eq!(slave.target(), TARGET);
        drop(slave);
        assert_eq!(calls, 1);
    }
}
