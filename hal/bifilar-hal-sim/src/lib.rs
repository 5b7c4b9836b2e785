//! Host simulation of the Bifilar TWI HAL
//!
//! Implements the `bifilar-hal` traits on top of an in-memory model of
//! the bus controller so the engine and device drivers can be tested on
//! the host without hardware:
//!
//! - [`SimRegisters`] - register file; control writes advance the bus
//! - [`SimQueue`] - capture queue consumer fed by the simulated interrupt
//! - [`SimSleep`] - CPU sleep that delivers the pending interrupt
//! - [`Device`] / [`Memory`] - slave devices answering the master
//! - Scripted remote master for slave-mode tests
//! - [`Fault`] injection: arbitration loss, bus error, clock stretch
//! - [`BusEvent`] trace of everything that reached the wire
//!
//! # Example
//!
//! ```
//! use bifilar_hal::TwiRegisters;
//! use bifilar_hal_sim::{Memory, SimBus};
//!
//! let (bus, mut hw) = SimBus::new();
//! bus.attach(Memory::new(0x50, 16));
//! hw.registers.set_bit_rate(72);
//! assert_eq!(bus.bit_rate(), 72);
//! ```

pub mod bus;
pub mod device;
pub mod trace;

pub use bus::{Controller, Fault, SimBus, SimQueue, SimRegisters, SimSleep, QUEUE_DEPTH};
pub use device::{Device, Memory};
pub use trace::{render, BusEvent};
