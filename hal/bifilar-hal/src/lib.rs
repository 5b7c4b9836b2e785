//! Bifilar Hardware Abstraction Layer
//!
//! This crate defines the register-level view of a TWI (I2C) bus
//! controller that the bus engine in `bifilar-core` drives. Chip-specific
//! crates implement these traits; the simulator in `bifilar-hal-sim`
//! implements them on the host for testing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Device drivers (bifilar-drivers, ...)  │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  bifilar-core (bus engine)              │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  bifilar-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ bifilar-hal-  │       │ bifilar-hal-  │
//! │    atmega     │       │     sim       │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`twi::TwiRegisters`] - Control/status/data/address/bit-rate registers
//! - [`irq::StatusQueue`] - Bus events captured by the TWI interrupt
//! - [`power::Sleep`] - Low-power wait used while a transfer is in flight

#![no_std]
#![deny(unsafe_code)]

pub mod irq;
pub mod power;
pub mod twi;

// Re-export key traits at crate root for convenience
pub use irq::StatusQueue;
pub use power::{Sleep, SleepMode};
pub use twi::TwiRegisters;
