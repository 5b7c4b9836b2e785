//! Interrupt-driven TWI (I2C) bus engine
//!
//! This crate contains the board-agnostic bus logic. It drives any
//! controller implementing the `bifilar-hal` traits:
//!
//! - Bus status decoder
//! - Byte-vector (scatter/gather) transfer descriptors
//! - Master/slave state machine with non-blocking requests
//! - Driver and Slave roles
//! - Completion events for an external event queue
//! - Bus configuration
//!
//! # Architecture
//!
//! ```text
//!  TWI vector                                   application
//! ┌──────────────┐  status codes  ┌───────────────────────────────┐
//! │ irq::capture │ ─────────────▶ │ Twi                           │
//! └──────────────┘  spsc queue    │  begin / write_request / ...  │
//!        ▲                        │  Request::await_completed     │
//!        │ TWINT                  │  Slave::serve / on_event      │
//! ┌──────────────┐    TWCR/TWDR   └───────────────────────────────┘
//! │ TWI hardware │ ◀──────────────────────┘        │
//! └──────────────┘                                 ▼ Event
//!                                         embassy-sync Channel
//! ```
//!
//! # Example
//!
//! ```ignore
//! let rtc = Driver::new(0x68)?;
//! twi.begin(&rtc, None)?;
//! twi.write(&[0x00], &mut cpu)?;
//! let n = twi.read(&mut time, &mut cpu)?;
//! twi.end(&mut cpu);
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod command;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod event;
pub mod role;
pub mod status;

pub use command::Command;
pub use config::{ConfigError, TwiConfig};
pub use descriptor::{Descriptor, Header, Segment, MAX_SEGMENTS};
pub use engine::{Direction, Request, State, Twi};
pub use error::{InvalidAddress, TwiError};
pub use event::{Event, EventKind, EventSink, Target};
pub use role::{Driver, RequestHandler, Slave};
pub use status::Condition;
