//! Power management abstractions
//!
//! The bus engine never busy-waits for a transfer. It sleeps the CPU
//! between bus events through the [`Sleep`] trait and re-checks its
//! state on every wake-up.

/// AVR sleep modes (SMCR.SM2..0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SleepMode {
    /// CPU halted, all peripherals and interrupts running
    #[default]
    Idle = 0b000,
    /// ADC noise reduction
    AdcNoiseReduction = 0b001,
    /// Only external, watchdog and TWI address-match interrupts wake the CPU
    PowerDown = 0b010,
    /// Power-down with the asynchronous timer running
    PowerSave = 0b011,
    /// Power-down with the main oscillator running
    Standby = 0b110,
    /// Power-save with the main oscillator running
    ExtendedStandby = 0b111,
}

impl SleepMode {
    /// Sleep mode select bits, positioned for the SMCR register
    pub fn smcr_bits(self) -> u8 {
        (self as u8) << 1
    }
}

/// Low-power wait
///
/// `sleep` must evaluate `wake` with interrupts masked and only enter the
/// sleep state if it returns false, re-enabling interrupts atomically with
/// the sleep instruction. Otherwise an event captured between the check
/// and the sleep would be lost until some unrelated interrupt fires.
///
/// Implementations return after any interrupt; callers re-check their own
/// condition in a loop.
pub trait Sleep {
    /// Sleep in the given mode unless `wake` reports pending work
    fn sleep(&mut self, mode: SleepMode, wake: &dyn Fn() -> bool);
}

impl<T: Sleep + ?Sized> Sleep for &mut T {
    fn sleep(&mut self, mode: SleepMode, wake: &dyn Fn() -> bool) {
        (**self).sleep(mode, wake)
    }
}
