//! TWI device drivers
//!
//! Thin drivers for common bus peripherals, built on the bifilar-core
//! engine:
//!
//! - Real-time clocks (DS1307)
//! - A/D and D/A converters (PCF8591)
//!
//! A driver owns only its bus address. Every call borrows the engine and
//! a [`Sleep`](bifilar_hal::Sleep) implementation for the duration of
//! the transaction, so several drivers can share one bus.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod adc;
pub mod error;
pub mod rtc;

pub use error::DriverError;

use bifilar_core::{Driver, EventSink, Twi, TwiError};
use bifilar_hal::{Sleep, StatusQueue, TwiRegisters};

/// Run `f` with the engine bound to `driver`
///
/// The engine is released again whatever `f` returns.
pub(crate) fn with_bus<R, Q, E, S, T>(
    twi: &mut Twi<R, Q, E>,
    driver: &Driver,
    sleep: &mut S,
    f: impl FnOnce(&mut Twi<R, Q, E>, &mut S) -> Result<T, TwiError>,
) -> Result<T, DriverError>
where
    R: TwiRegisters,
    Q: StatusQueue,
    E: EventSink,
    S: Sleep + ?Sized,
{
    twi.begin(driver, None)?;
    let result = f(twi, sleep);
    twi.end(sleep);
    Ok(result?)
}
