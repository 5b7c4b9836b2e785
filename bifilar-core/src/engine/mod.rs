//! TWI bus engine
//!
//! The engine owns the bus controller. Requests load a transfer
//! descriptor and issue START; from then on every status code captured
//! by the interrupt advances the transfer by exactly one step:
//!
//! ```text
//!           request()                        complete / NACK
//!  Idle ──────────────▶ START ─▶ SLA ─▶ data* ─▶ STOP ─▶ Idle
//!   ▲                    │        │      │
//!   │ begin()            └────────┴──────┴──▶ Error (arbitration lost, bus error)
//!   │
//!   └── address match (slave) ─▶ data* ─▶ STOP/NACK ─▶ Idle
//! ```
//!
//! Status codes are drained from the capture queue by whoever holds the
//! engine: a [`Request`], [`Twi::poll`] for an abandoned transfer, or
//! [`Slave::serve`](crate::role::Slave::serve) in slave mode. The engine
//! is the only writer of its state.

mod request;

pub use request::Request;

use bifilar_hal::twi::twar;
use bifilar_hal::{Sleep, SleepMode, StatusQueue, TwiRegisters};

use crate::command::Command;
use crate::config::{ConfigError, TwiConfig};
use crate::descriptor::{Descriptor, Header, Segment};
use crate::error::TwiError;
use crate::event::{Event, EventKind, EventSink, Target};
use crate::role::Driver;
use crate::status::Condition;

/// Index of the slave receive buffer in a slave descriptor
pub(crate) const WRITE_IX: usize = 0;
/// Index of the slave transmit buffer in a slave descriptor
pub(crate) const READ_IX: usize = 1;

/// Engine state
///
/// Ordered so that every state above [`State::Idle`] is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Last transfer failed; cleared by the next `begin`
    Error,
    /// No transfer in flight
    Idle,
    MasterTransmit,
    MasterReceive,
    SlaveTransmit,
    SlaveReceive,
}

impl State {
    /// Check if a transfer is in flight
    pub fn is_busy(&self) -> bool {
        *self > State::Idle
    }
}

/// Transfer direction of a master request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Write = 0,
    Read = 1,
}

/// Position inside the active descriptor
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    ix: usize,
    pos: usize,
}

/// Interrupt-driven TWI master/slave engine
///
/// - `R`: controller registers
/// - `Q`: status codes captured by the TWI interrupt
/// - `E`: completion event sink
pub struct Twi<R, Q, E> {
    regs: R,
    irq: Q,
    events: E,
    config: TwiConfig,
    bit_rate: u8,
    state: State,
    /// SLA+R/W of the current master transfer
    sla: u8,
    cursor: Cursor,
    /// Bytes moved by the current transfer
    count: usize,
    error: Option<TwiError>,
    condition: Condition,
    driver: Option<Driver>,
    target: Option<Target>,
}

impl<R, Q, E> Twi<R, Q, E>
where
    R: TwiRegisters,
    Q: StatusQueue,
    E: EventSink,
{
    /// Create an idle, unbound engine
    ///
    /// The controller is left untouched until [`Twi::begin`]. Fails if
    /// the configured bus clock cannot be derived from the CPU clock.
    pub fn new(regs: R, irq: Q, events: E, config: TwiConfig) -> Result<Self, ConfigError> {
        let bit_rate = config.bit_rate()?;
        Ok(Self {
            regs,
            irq,
            events,
            config,
            bit_rate,
            state: State::Idle,
            sla: 0,
            cursor: Cursor::default(),
            count: 0,
            error: None,
            condition: Condition::NoInfo,
            driver: None,
            target: None,
        })
    }

    /// Bind a driver and bring up the controller
    ///
    /// Fails with [`TwiError::Busy`] if another driver is bound; the bus
    /// has a single owner until [`Twi::end`].
    pub fn begin(&mut self, driver: &Driver, target: Option<Target>) -> Result<(), TwiError> {
        if self.driver.is_some() {
            return Err(TwiError::Busy);
        }

        self.driver = Some(*driver);
        self.target = target;
        self.state = State::Idle;
        self.error = None;
        self.count = 0;
        self.condition = Condition::NoInfo;

        if self.config.pullups {
            self.regs.enable_pullups();
        }
        self.regs.set_prescaler(0);
        self.regs.set_bit_rate(self.bit_rate);
        self.command(Command::Idle);

        debug!("twi: begin {=u8:#x}", driver.address());
        Ok(())
    }

    /// Wait for any transfer still in flight, then release the bus
    ///
    /// Never cancels: the controller cannot be reconfigured safely in
    /// the middle of a transfer.
    pub fn end<S: Sleep + ?Sized>(&mut self, sleep: &mut S) {
        if self.state.is_busy() {
            debug!("twi: end drains {}", self.state);
            let _ = self.await_completed(sleep, SleepMode::Idle);
        }
        self.driver = None;
        self.target = None;
        self.regs.set_control(0);
    }

    /// Issue a master transfer described by `descriptor`
    ///
    /// Returns as soon as START is requested; the returned handle moves
    /// the bytes.
    pub fn request<'t, 'b>(
        &'t mut self,
        direction: Direction,
        descriptor: Descriptor<'b>,
    ) -> Result<Request<'t, 'b, R, Q, E>, TwiError> {
        let driver = self.driver.ok_or(TwiError::Unbound)?;
        if self.state != State::Idle {
            return Err(TwiError::Busy);
        }

        self.state = match direction {
            Direction::Write => State::MasterTransmit,
            Direction::Read => State::MasterReceive,
        };
        self.sla = driver.sla() | direction as u8;
        self.condition = Condition::NoInfo;
        self.cursor = Cursor::default();
        self.count = 0;
        self.error = None;
        self.command(Command::Start);

        Ok(Request::new(self, descriptor))
    }

    /// Write `buf` to the bound device
    pub fn write_request<'t, 'b>(
        &'t mut self,
        buf: &'b [u8],
    ) -> Result<Request<'t, 'b, R, Q, E>, TwiError> {
        let descriptor = Descriptor::new().tx(buf)?;
        self.request(Direction::Write, descriptor)
    }

    /// Write a 1 or 2 byte header followed by `buf` to the bound device
    pub fn write_header_request<'t, 'b>(
        &'t mut self,
        header: impl Into<Header>,
        buf: &'b [u8],
    ) -> Result<Request<'t, 'b, R, Q, E>, TwiError> {
        let descriptor = Descriptor::new().header(header)?.tx(buf)?;
        self.request(Direction::Write, descriptor)
    }

    /// Read `buf.len()` bytes from the bound device
    pub fn read_request<'t, 'b>(
        &'t mut self,
        buf: &'b mut [u8],
    ) -> Result<Request<'t, 'b, R, Q, E>, TwiError> {
        let descriptor = Descriptor::new().rx(buf)?;
        self.request(Direction::Read, descriptor)
    }

    /// Blocking write; returns the number of bytes written
    pub fn write<S: Sleep + ?Sized>(&mut self, buf: &[u8], sleep: &mut S) -> Result<usize, TwiError> {
        self.write_request(buf)?
            .await_completed(sleep, SleepMode::Idle)
    }

    /// Blocking header + payload write; the count includes the header
    pub fn write_header<S: Sleep + ?Sized>(
        &mut self,
        header: impl Into<Header>,
        buf: &[u8],
        sleep: &mut S,
    ) -> Result<usize, TwiError> {
        self.write_header_request(header, buf)?
            .await_completed(sleep, SleepMode::Idle)
    }

    /// Blocking read; returns the number of bytes read
    pub fn read<S: Sleep + ?Sized>(&mut self, buf: &mut [u8], sleep: &mut S) -> Result<usize, TwiError> {
        self.read_request(buf)?
            .await_completed(sleep, SleepMode::Idle)
    }

    /// Advance a transfer whose [`Request`] was dropped
    ///
    /// No buffers remain: a write ends at the next byte boundary, a read
    /// NACKs and discards. Returns `None` while still busy.
    pub fn poll(&mut self) -> Option<Result<usize, TwiError>> {
        self.drain(&mut [], false);
        self.outcome()
    }

    /// Sleep until a transfer whose [`Request`] was dropped completes
    pub fn await_completed<S: Sleep + ?Sized>(
        &mut self,
        sleep: &mut S,
        mode: SleepMode,
    ) -> Result<usize, TwiError> {
        loop {
            if let Some(outcome) = self.poll() {
                return outcome;
            }
            sleep.sleep(mode, &|| self.irq.is_pending());
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn is_bound(&self) -> bool {
        self.driver.is_some()
    }

    /// Running byte count as reported in events; -1 after an error
    ///
    /// Saturates at `i16::MAX`; [`Request::await_completed`] returns
    /// the exact count.
    pub fn count(&self) -> i16 {
        match self.error {
            Some(_) => -1,
            None => event_value(self.count),
        }
    }

    /// Error of the last transfer, if it failed
    pub fn last_error(&self) -> Option<TwiError> {
        self.error
    }

    /// Last bus condition handled
    pub fn condition(&self) -> Condition {
        self.condition
    }

    pub fn config(&self) -> &TwiConfig {
        &self.config
    }

    /// Give back the controller, capture queue and event sink
    pub fn release(self) -> (R, Q, E) {
        (self.regs, self.irq, self.events)
    }

    /// Outcome of the last transfer, `None` while in flight
    pub(crate) fn outcome(&self) -> Option<Result<usize, TwiError>> {
        if self.state.is_busy() {
            return None;
        }
        Some(match self.error {
            Some(error) => Err(error),
            None => Ok(self.count),
        })
    }

    pub(crate) fn irq_pending(&self) -> bool {
        self.irq.is_pending()
    }

    /// Listen on a 7-bit slave address (TWAR) and arm the controller
    pub(crate) fn listen(&mut self, address: u8, general_call: bool) {
        let gce = if general_call { twar::TWGCE } else { 0 };
        self.regs.set_address((address << 1) | gce);
        self.command(Command::Idle);
    }

    /// Handle every captured status code against `segments`
    ///
    /// `slave` marks a slave descriptor (receive buffer at [`WRITE_IX`],
    /// transmit buffer at [`READ_IX`]). Slave phases arriving while a
    /// master descriptor is loaded run without buffers.
    pub(crate) fn drain(&mut self, segments: &mut [Segment<'_>], slave: bool) {
        while let Some(status) = self.irq.dequeue() {
            let condition = Condition::decode(status);
            if condition.is_slave() && !slave {
                self.handle(condition, &mut []);
            } else {
                self.handle(condition, segments);
            }
        }
    }

    /// One protocol step, the body of the former interrupt handler
    fn handle(&mut self, condition: Condition, segments: &mut [Segment<'_>]) {
        use Condition::*;

        trace!("twi: {} in {}", condition, self.state);
        self.condition = condition;

        match condition {
            Start | RepeatedStart => {
                self.regs.set_data(self.sla);
                self.command(Command::Data);
            }
            ArbitrationLost => {
                // The bus was never ours: release it without a STOP
                self.command(Command::Ack);
                self.fail(TwiError::ArbitrationLost, State::Error);
            }

            // Master transmitter
            MtSlaAck | MtDataAck => match self.next_byte(segments) {
                Some(byte) => {
                    self.regs.set_data(byte);
                    self.count += 1;
                    self.command(Command::Data);
                }
                None => self.complete(EventKind::WriteCompleted),
            },
            // The slave ends a write by NACKing; not an error
            MtDataNack => self.complete(EventKind::WriteCompleted),
            MtSlaNack | MrSlaNack => {
                self.stop();
                self.fail(TwiError::AddressNack, State::Idle);
            }

            // Master receiver
            MrDataAck => {
                self.store(segments);
                self.command(Command::ack_if(room(segments, self.cursor) > 1));
            }
            // ACK/NACK is committed before the byte arrives
            MrSlaAck => self.command(Command::ack_if(room(segments, self.cursor) > 1)),
            MrDataNack => {
                self.store(segments);
                self.complete(EventKind::ReadCompleted);
            }

            // Slave transmitter
            StSlaAck | StArbLostSlaAck => {
                self.yield_bus();
                self.select(State::SlaveTransmit, READ_IX);
                self.transmit(segments);
            }
            StDataAck => self.transmit(segments),
            StDataNack | StLastData => {
                self.command(Command::Ack);
                self.state = State::Idle;
            }

            // Slave receiver
            SrSlaAck | SrArbLostSlaAck | SrGCallAck | SrArbLostGCallAck => {
                self.yield_bus();
                self.select(State::SlaveReceive, WRITE_IX);
                self.command(Command::ack_if(room(segments, self.cursor) > 0));
            }
            SrDataAck | SrGCallDataAck => {
                self.store(segments);
                self.command(Command::ack_if(room(segments, self.cursor) > 0));
            }
            // Receive buffer overflowed: the write phase ends here
            SrDataNack | SrGCallDataNack | SrStop => {
                self.complete(EventKind::WriteCompleted);
                // Deaf until the slave re-arms after handling the request
                self.regs.set_address(0);
            }

            NoInfo => {}
            BusError => {
                self.stop();
                self.fail(TwiError::BusError, State::Error);
            }
            Unknown(code) => {
                warn!("twi: unexpected status {=u8:#x}", code);
                self.command(Command::Ack);
            }
        }
    }

    fn command(&mut self, command: Command) {
        self.regs.set_control(command.bits());
    }

    fn stop(&mut self) {
        self.command(Command::Stop);
        // STOP takes a few bus clocks; nothing else may be queued before it is out
        while self.regs.stop_pending() {}
    }

    /// Fail a master transfer that lost arbitration to a master addressing us
    fn yield_bus(&mut self) {
        if matches!(self.state, State::MasterTransmit | State::MasterReceive) {
            self.fail(TwiError::ArbitrationLost, State::Error);
        }
    }

    /// Start a slave phase on buffer `ix`
    fn select(&mut self, state: State, ix: usize) {
        self.cursor = Cursor { ix, pos: 0 };
        self.count = 0;
        self.state = state;
    }

    /// Send STOP and report success with the byte count
    fn complete(&mut self, kind: EventKind) {
        self.stop();
        self.state = State::Idle;
        self.notify(kind, event_value(self.count));
    }

    fn fail(&mut self, error: TwiError, state: State) {
        warn!("twi: {} after {=usize} bytes", error, self.count);
        self.error = Some(error);
        self.state = state;
        self.notify(EventKind::Error, -1);
    }

    fn notify(&mut self, kind: EventKind, value: i16) {
        let Some(target) = self.target else {
            return;
        };
        if self.events.push(Event { kind, target, value }).is_err() {
            warn!("twi: event queue full, {} dropped", kind);
        }
    }

    /// Next byte to transmit, moving on to the next segment when one runs out
    fn next_byte(&mut self, segments: &[Segment<'_>]) -> Option<u8> {
        while let Some(segment) = segments.get(self.cursor.ix) {
            if let Some(byte) = segment.get(self.cursor.pos) {
                self.cursor.pos += 1;
                return Some(byte);
            }
            self.cursor.ix += 1;
            self.cursor.pos = 0;
        }
        None
    }

    /// Store the received byte at the cursor; dropped when there is no room
    fn store(&mut self, segments: &mut [Segment<'_>]) {
        let byte = self.regs.data();
        while let Some(segment) = segments.get_mut(self.cursor.ix) {
            if segment.set(self.cursor.pos, byte) {
                self.cursor.pos += 1;
                self.count += 1;
                return;
            }
            self.cursor.ix += 1;
            self.cursor.pos = 0;
        }
    }

    /// Slave transmit step; the last byte goes out with TWEA cleared
    fn transmit(&mut self, segments: &[Segment<'_>]) {
        let segment = segments.get(self.cursor.ix);
        match segment.and_then(|s| s.get(self.cursor.pos)) {
            Some(byte) => {
                self.cursor.pos += 1;
                self.count += 1;
                self.regs.set_data(byte);
                let more = segment.map_or(0, |s| s.len()) > self.cursor.pos;
                self.command(Command::ack_if(more));
            }
            None => {
                self.regs.set_data(0xFF);
                self.command(Command::NACK);
            }
        }
    }
}

/// Event value for a byte count
fn event_value(count: usize) -> i16 {
    i16::try_from(count).unwrap_or(i16::MAX)
}

/// Receive room left from `cursor` onwards
fn room(segments: &[Segment<'_>], cursor: Cursor) -> usize {
    segments
        .iter()
        .enumerate()
        .skip(cursor.ix)
        .filter(|(_, segment)| matches!(segment, Segment::Rx(_)))
        .map(|(ix, segment)| {
            if ix == cursor.ix {
                segment.len().saturating_sub(cursor.pos)
            } else {
                segment.len()
            }
        })
        .sum()
}

#[cfg(test)]
mod tests;
