//! Simulated bus controller
//!
//! The model follows the ATmega TWI module closely enough for the bus
//! engine to be tested unmodified: writing the control register with
//! TWINT set performs exactly one bus step, which either produces the
//! next status code (TWINT set again) or, for STOP, completes silently.
//! The interrupt is delivered when the CPU "sleeps", through the same
//! [`capture`] routine a real interrupt vector calls.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::rc::Rc;

use bifilar_hal::irq::capture;
use bifilar_hal::twi::{twar, twcr, twsr};
use bifilar_hal::{Sleep, SleepMode, TwiRegisters};
use heapless::spsc::{Consumer, Producer, Queue};

use crate::device::Device;
use crate::trace::BusEvent;

/// Depth of the capture queue handed to the engine
pub const QUEUE_DEPTH: usize = 4;

/// Capture queue consumer handed to the engine
pub type SimQueue = Consumer<'static, u8, QUEUE_DEPTH>;

/// Datasheet status codes produced by the model
mod code {
    pub const START: u8 = 0x08;
    pub const REP_START: u8 = 0x10;
    pub const MT_SLA_ACK: u8 = 0x18;
    pub const MT_SLA_NACK: u8 = 0x20;
    pub const MT_DATA_ACK: u8 = 0x28;
    pub const MT_DATA_NACK: u8 = 0x30;
    pub const ARB_LOST: u8 = 0x38;
    pub const MR_SLA_ACK: u8 = 0x40;
    pub const MR_SLA_NACK: u8 = 0x48;
    pub const MR_DATA_ACK: u8 = 0x50;
    pub const MR_DATA_NACK: u8 = 0x58;
    pub const SR_SLA_ACK: u8 = 0x60;
    pub const SR_GCALL_ACK: u8 = 0x70;
    pub const SR_DATA_ACK: u8 = 0x80;
    pub const SR_DATA_NACK: u8 = 0x88;
    pub const SR_GCALL_DATA_ACK: u8 = 0x90;
    pub const SR_GCALL_DATA_NACK: u8 = 0x98;
    pub const SR_STOP: u8 = 0xA0;
    pub const ST_SLA_ACK: u8 = 0xA8;
    pub const ST_DATA_ACK: u8 = 0xB8;
    pub const ST_DATA_NACK: u8 = 0xC0;
    pub const ST_LAST_DATA: u8 = 0xC8;
    pub const NO_INFO: u8 = 0xF8;
    pub const BUS_ERROR: u8 = 0x00;
}

/// Injected bus fault
///
/// `phase` counts the bytes of the next master transaction: 0 is the
/// address byte, 1 the first data byte, and so on. A fault fires once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Another master wins the bus
    ArbitrationLost { phase: usize },
    /// Misplaced START/STOP on the bus
    BusError { phase: usize },
    /// A slave holds SCL low; the step never completes
    ClockStretch { phase: usize },
}

impl Fault {
    fn phase(&self) -> usize {
        match self {
            Fault::ArbitrationLost { phase }
            | Fault::BusError { phase }
            | Fault::ClockStretch { phase } => *phase,
        }
    }
}

/// Transaction issued by the scripted remote master
#[derive(Debug, Clone)]
enum Remote {
    Write { address: u8, bytes: VecDeque<u8> },
    Read { address: u8, count: usize },
}

#[derive(Debug)]
enum Mode {
    /// Bus free, controller in not-addressed slave mode
    Idle,
    /// START done, the address byte goes out with the next command
    MasterAddress,
    MasterTransmit(usize),
    MasterReceive(usize),
    /// Address NACKed; only STOP or repeated START make sense
    MasterHold,
    /// Arbitration lost or bus error; waiting for the controller to be released
    Lost,
    /// SCL held low forever
    Stalled,
    SlaveReceive {
        bytes: VecDeque<u8>,
        general_call: bool,
        /// The remote master saw a NACK or sent STOP
        done: bool,
    },
    SlaveTransmit {
        remaining: usize,
        done: bool,
    },
}

struct Model {
    control: u8,
    /// TWINT
    flag: bool,
    status: u8,
    prescaler: u8,
    data: u8,
    address: u8,
    bit_rate: u8,
    pullups: bool,
    mode: Mode,
    phase: usize,
    devices: Vec<Box<dyn Device>>,
    remote: VecDeque<Remote>,
    received: Vec<u8>,
    trace: Vec<BusEvent>,
    commands: Vec<u8>,
    fault: Option<Fault>,
    sleeps: usize,
    sleep_mode: Option<SleepMode>,
}

impl Model {
    fn new() -> Self {
        Self {
            control: 0,
            flag: false,
            status: code::NO_INFO,
            prescaler: 0,
            data: 0xFF,
            address: 0,
            bit_rate: 0,
            pullups: false,
            mode: Mode::Idle,
            phase: 0,
            devices: Vec::new(),
            remote: VecDeque::new(),
            received: Vec::new(),
            trace: Vec::new(),
            commands: Vec::new(),
            fault: None,
            sleeps: 0,
            sleep_mode: None,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.commands.push(value);

        if value & twcr::TWEN == 0 {
            // Disabling the module aborts everything without touching the wire
            self.control = value;
            self.flag = false;
            self.mode = Mode::Idle;
            return;
        }

        // TWSTO reads back as cleared: the model puts STOP on the bus at once
        self.control = value & !(twcr::TWINT | twcr::TWSTO);
        if value & twcr::TWINT != 0 {
            self.flag = false;
            self.step(value);
        }
    }

    fn raise(&mut self, status: u8) {
        self.status = status;
        self.flag = true;
    }

    fn interrupt_pending(&self) -> bool {
        self.flag && self.control & twcr::TWIE != 0 && self.control & twcr::TWEN != 0
    }

    fn step(&mut self, command: u8) {
        let mode = mem::replace(&mut self.mode, Mode::Idle);

        if command & twcr::TWSTO != 0 {
            self.stop(mode);
            return;
        }
        if command & twcr::TWSTA != 0 {
            self.start(mode);
            return;
        }

        let ack = command & twcr::TWEA != 0;
        match mode {
            Mode::Idle | Mode::Lost => {}
            Mode::Stalled => self.mode = Mode::Stalled,
            Mode::MasterHold => self.mode = Mode::MasterHold,
            Mode::MasterAddress => self.address_phase(),
            Mode::MasterTransmit(device) => self.transmit(device),
            Mode::MasterReceive(device) => self.receive(device, ack),
            Mode::SlaveReceive {
                bytes,
                general_call,
                done,
            } => self.slave_receive(bytes, general_call, done, ack),
            Mode::SlaveTransmit { remaining, done } => self.slave_transmit(remaining, done, ack),
        }
    }

    fn start(&mut self, mode: Mode) {
        match mode {
            Mode::MasterTransmit(device) | Mode::MasterReceive(device) => {
                self.devices[device].stop();
                self.trace.push(BusEvent::RepeatedStart);
                self.raise(code::REP_START);
            }
            Mode::MasterAddress | Mode::MasterHold => {
                self.trace.push(BusEvent::RepeatedStart);
                self.raise(code::REP_START);
            }
            _ => {
                self.trace.push(BusEvent::Start);
                self.raise(code::START);
            }
        }
        self.mode = Mode::MasterAddress;
        self.phase = 0;
    }

    fn stop(&mut self, mode: Mode) {
        match mode {
            Mode::MasterTransmit(device) | Mode::MasterReceive(device) => {
                self.devices[device].stop();
                self.trace.push(BusEvent::Stop);
            }
            Mode::MasterAddress | Mode::MasterHold => self.trace.push(BusEvent::Stop),
            // STOP in slave mode only resets the controller; the remote
            // master ends its own transaction
            Mode::SlaveReceive { done, .. } | Mode::SlaveTransmit { done, .. } => {
                if !done {
                    self.trace.push(BusEvent::Stop);
                }
            }
            Mode::Idle | Mode::Lost | Mode::Stalled => {}
        }
        self.mode = Mode::Idle;
    }

    /// Fire the armed fault if this byte is its phase
    fn fault(&mut self, device: Option<usize>) -> bool {
        let Some(fault) = self.fault else {
            return false;
        };
        if fault.phase() != self.phase {
            return false;
        }
        self.fault = None;

        if let Some(device) = device {
            self.devices[device].stop();
        }
        match fault {
            Fault::ArbitrationLost { .. } => {
                self.trace.push(BusEvent::ArbitrationLost);
                self.mode = Mode::Lost;
                self.raise(code::ARB_LOST);
            }
            Fault::BusError { .. } => {
                self.trace.push(BusEvent::BusError);
                self.mode = Mode::Lost;
                self.raise(code::BUS_ERROR);
            }
            Fault::ClockStretch { .. } => self.mode = Mode::Stalled,
        }
        true
    }

    fn address_phase(&mut self) {
        if self.fault(None) {
            return;
        }

        let byte = self.data;
        let read = byte & 1 != 0;
        let target = byte >> 1;
        let device = self.devices.iter().position(|d| d.address() == target);
        let ack = match device {
            Some(index) => self.devices[index].start(read),
            None => false,
        };
        self.trace.push(BusEvent::Address { byte, ack });
        self.phase = 1;

        match (device, ack, read) {
            (Some(index), true, false) => {
                self.mode = Mode::MasterTransmit(index);
                self.raise(code::MT_SLA_ACK);
            }
            (Some(index), true, true) => {
                self.mode = Mode::MasterReceive(index);
                self.raise(code::MR_SLA_ACK);
            }
            (_, _, false) => {
                self.mode = Mode::MasterHold;
                self.raise(code::MT_SLA_NACK);
            }
            (_, _, true) => {
                self.mode = Mode::MasterHold;
                self.raise(code::MR_SLA_NACK);
            }
        }
    }

    fn transmit(&mut self, device: usize) {
        if self.fault(Some(device)) {
            return;
        }

        let byte = self.data;
        let ack = self.devices[device].write(byte);
        self.trace.push(BusEvent::Write { byte, ack });
        self.phase += 1;
        self.mode = Mode::MasterTransmit(device);
        self.raise(if ack { code::MT_DATA_ACK } else { code::MT_DATA_NACK });
    }

    fn receive(&mut self, device: usize, ack: bool) {
        if self.fault(Some(device)) {
            return;
        }

        let byte = self.devices[device].read();
        self.data = byte;
        self.trace.push(BusEvent::Read { byte, ack });
        self.phase += 1;
        self.mode = Mode::MasterReceive(device);
        self.raise(if ack { code::MR_DATA_ACK } else { code::MR_DATA_NACK });
    }

    fn slave_receive(&mut self, mut bytes: VecDeque<u8>, general_call: bool, done: bool, ack: bool) {
        if done {
            // SR_STOP or a NACKed byte was answered; back to not-addressed
            return;
        }

        match bytes.pop_front() {
            Some(byte) => {
                self.data = byte;
                self.trace.push(BusEvent::Write { byte, ack });
                let status = match (general_call, ack) {
                    (false, true) => code::SR_DATA_ACK,
                    (false, false) => code::SR_DATA_NACK,
                    (true, true) => code::SR_GCALL_DATA_ACK,
                    (true, false) => code::SR_GCALL_DATA_NACK,
                };
                if !ack {
                    // The remote master gives up after a NACK
                    self.trace.push(BusEvent::Stop);
                }
                self.mode = Mode::SlaveReceive {
                    bytes,
                    general_call,
                    done: !ack,
                };
                self.raise(status);
            }
            None => {
                self.trace.push(BusEvent::Stop);
                self.mode = Mode::SlaveReceive {
                    bytes,
                    general_call,
                    done: true,
                };
                self.raise(code::SR_STOP);
            }
        }
    }

    fn slave_transmit(&mut self, remaining: usize, done: bool, more: bool) {
        if done {
            self.trace.push(BusEvent::Stop);
            return;
        }

        let byte = self.data;
        let remaining = remaining.saturating_sub(1);
        let ack = remaining > 0;
        self.trace.push(BusEvent::Read { byte, ack });
        self.received.push(byte);

        let status = if !ack {
            code::ST_DATA_NACK
        } else if !more {
            code::ST_LAST_DATA
        } else {
            code::ST_DATA_ACK
        };
        self.mode = Mode::SlaveTransmit {
            remaining,
            done: status != code::ST_DATA_ACK,
        };
        self.raise(status);
    }

    /// Let the scripted remote master address this controller
    fn begin_remote(&mut self) -> bool {
        while matches!(self.mode, Mode::Idle) && !self.flag {
            let Some(op) = self.remote.pop_front() else {
                return false;
            };
            let (address, read) = match &op {
                Remote::Write { address, .. } => (*address, false),
                Remote::Read { address, .. } => (*address, true),
            };
            let byte = (address << 1) | read as u8;
            let listening = self.control & twcr::TWEN != 0 && self.control & twcr::TWEA != 0;
            let own = address != 0 && (self.address & twar::ADDRESS_MASK) >> 1 == address;
            let general_call = address == 0 && !read && self.address & twar::TWGCE != 0;

            self.trace.push(BusEvent::Start);
            if !(listening && (own || general_call)) {
                self.trace.push(BusEvent::Address { byte, ack: false });
                self.trace.push(BusEvent::Stop);
                continue;
            }
            self.trace.push(BusEvent::Address { byte, ack: true });

            match op {
                Remote::Write { bytes, .. } => {
                    self.mode = Mode::SlaveReceive {
                        bytes,
                        general_call,
                        done: false,
                    };
                    self.raise(if general_call {
                        code::SR_GCALL_ACK
                    } else {
                        code::SR_SLA_ACK
                    });
                }
                Remote::Read { count, .. } => {
                    self.mode = Mode::SlaveTransmit {
                        remaining: count,
                        done: false,
                    };
                    self.raise(code::ST_SLA_ACK);
                }
            }
            return true;
        }
        false
    }
}

/// Handle to a simulated bus and everything attached to it
///
/// Created together with the [`Controller`] handles the engine consumes.
#[derive(Clone)]
pub struct SimBus {
    model: Rc<RefCell<Model>>,
}

/// Controller-side handles: register file, capture queue and CPU sleep
pub struct Controller {
    pub registers: SimRegisters,
    pub queue: SimQueue,
    pub sleeper: SimSleep,
}

impl SimBus {
    /// Create an empty bus with an idle, disabled controller
    pub fn new() -> (Self, Controller) {
        let model = Rc::new(RefCell::new(Model::new()));
        // One queue per simulated controller, alive for the test's duration
        let queue: &'static mut Queue<u8, QUEUE_DEPTH> = Box::leak(Box::new(Queue::new()));
        let (producer, consumer) = queue.split();

        let registers = SimRegisters {
            model: model.clone(),
        };
        let controller = Controller {
            registers: registers.clone(),
            queue: consumer,
            sleeper: SimSleep {
                model: model.clone(),
                registers,
                producer,
            },
        };
        (Self { model }, controller)
    }

    /// Attach a slave device
    pub fn attach(&self, device: impl Device + 'static) {
        self.model.borrow_mut().devices.push(Box::new(device));
    }

    /// Script a remote master writing `bytes` to a 7-bit address
    pub fn remote_write(&self, address: u8, bytes: &[u8]) {
        self.model.borrow_mut().remote.push_back(Remote::Write {
            address,
            bytes: bytes.iter().copied().collect(),
        });
    }

    /// Script a remote master reading `count` bytes from a 7-bit address
    pub fn remote_read(&self, address: u8, count: usize) {
        assert!(count > 0, "remote read of zero bytes");
        self.model
            .borrow_mut()
            .remote
            .push_back(Remote::Read { address, count });
    }

    /// Bytes the remote master read from this controller
    pub fn remote_received(&self) -> Vec<u8> {
        self.model.borrow().received.clone()
    }

    /// Arm a fault for the next master transaction
    pub fn inject(&self, fault: Fault) {
        self.model.borrow_mut().fault = Some(fault);
    }

    /// Wire-level trace so far
    pub fn trace(&self) -> Vec<BusEvent> {
        self.model.borrow().trace.clone()
    }

    pub fn clear_trace(&self) {
        self.model.borrow_mut().trace.clear();
    }

    /// Every value written to the control register, in order
    pub fn commands(&self) -> Vec<u8> {
        self.model.borrow().commands.clone()
    }

    /// Raw control register, TWINT included
    pub fn control(&self) -> u8 {
        let model = self.model.borrow();
        model.control | if model.flag { twcr::TWINT } else { 0 }
    }

    pub fn bit_rate(&self) -> u8 {
        self.model.borrow().bit_rate
    }

    pub fn prescaler(&self) -> u8 {
        self.model.borrow().prescaler
    }

    pub fn pullups(&self) -> bool {
        self.model.borrow().pullups
    }

    /// Slave address register (TWAR)
    pub fn slave_address(&self) -> u8 {
        self.model.borrow().address
    }

    /// Number of times the CPU actually slept
    pub fn sleeps(&self) -> usize {
        self.model.borrow().sleeps
    }

    pub fn last_sleep_mode(&self) -> Option<SleepMode> {
        self.model.borrow().sleep_mode
    }

    /// Nothing left to happen on the bus without a new command
    pub fn is_quiescent(&self) -> bool {
        let model = self.model.borrow();
        matches!(model.mode, Mode::Idle) && !model.flag && model.remote.is_empty()
    }
}

/// Simulated register file
#[derive(Clone)]
pub struct SimRegisters {
    model: Rc<RefCell<Model>>,
}

impl TwiRegisters for SimRegisters {
    fn control(&self) -> u8 {
        let model = self.model.borrow();
        model.control | if model.flag { twcr::TWINT } else { 0 }
    }

    fn set_control(&mut self, value: u8) {
        self.model.borrow_mut().write_control(value);
    }

    fn status(&self) -> u8 {
        let model = self.model.borrow();
        model.status | model.prescaler
    }

    fn set_prescaler(&mut self, bits: u8) {
        self.model.borrow_mut().prescaler = bits & twsr::PRESCALER_MASK;
    }

    fn data(&self) -> u8 {
        self.model.borrow().data
    }

    fn set_data(&mut self, value: u8) {
        self.model.borrow_mut().data = value;
    }

    fn set_address(&mut self, value: u8) {
        self.model.borrow_mut().address = value;
    }

    fn set_bit_rate(&mut self, value: u8) {
        self.model.borrow_mut().bit_rate = value;
    }

    fn enable_pullups(&mut self) {
        self.model.borrow_mut().pullups = true;
    }
}

/// Simulated CPU sleep; delivers the TWI interrupt
pub struct SimSleep {
    model: Rc<RefCell<Model>>,
    registers: SimRegisters,
    producer: Producer<'static, u8, QUEUE_DEPTH>,
}

impl Sleep for SimSleep {
    /// Panics if the CPU would sleep forever: no interrupt is pending,
    /// no remote master is scripted and no clock stretch is active.
    fn sleep(&mut self, mode: SleepMode, wake: &dyn Fn() -> bool) {
        if wake() {
            return;
        }

        let interrupt = {
            let mut model = self.model.borrow_mut();
            model.sleeps += 1;
            model.sleep_mode = Some(mode);
            if model.interrupt_pending() || (model.begin_remote() && model.interrupt_pending()) {
                true
            } else if matches!(model.mode, Mode::Stalled) {
                // Only some unrelated interrupt (a timer) wakes the CPU
                false
            } else {
                panic!("bus stalled: CPU sleeping with no TWI event pending");
            }
        };

        if interrupt {
            capture(&mut self.registers, &mut self.producer);
        }
    }
}
