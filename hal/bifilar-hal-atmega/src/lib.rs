//! ATmega328P binding of the Bifilar HAL
//!
//! Maps the `bifilar-hal` traits onto the memory-mapped TWI, PORTC and
//! CPU registers through `avr-device`:
//!
//! - [`Registers`] - TWCR/TWSR/TWDR/TWAR/TWBR, pull-ups on PC4 (SDA) and PC5 (SCL)
//! - [`Cpu`] - SMCR-based sleep with an atomic `sei; sleep` sequence
//! - [`on_twi_interrupt`] - body of the TWI interrupt vector
//!
//! # Wiring
//!
//! ```ignore
//! static mut QUEUE: Queue<u8, 4> = Queue::new();
//! static mut PRODUCER: Option<Producer<'static, u8, 4>> = None;
//!
//! #[avr_device::interrupt(atmega328p)]
//! fn TWI() {
//!     if let Some(producer) = unsafe { PRODUCER.as_mut() } {
//!         bifilar_hal_atmega::on_twi_interrupt(producer);
//!     }
//! }
//! ```

#![no_std]
#![cfg_attr(target_arch = "avr", feature(asm_experimental_arch))]

use avr_device::atmega328p::{CPU, PORTC, TWI};
use bifilar_hal::twi::twsr;
use bifilar_hal::{Sleep, SleepMode, TwiRegisters};
use heapless::spsc::Producer;

/// SDA and SCL on PORTC
const TWI_PINS: u8 = (1 << 4) | (1 << 5);

/// SMCR sleep enable
const SE: u8 = 1 << 0;

/// TWI register file of the ATmega328P
pub struct Registers {
    twi: TWI,
    portc: PORTC,
}

impl Registers {
    pub fn new(twi: TWI, portc: PORTC) -> Self {
        Self { twi, portc }
    }

    /// Access the registers without owning the peripherals
    ///
    /// # Safety
    ///
    /// Only for the TWI interrupt vector, which never runs concurrently
    /// with the engine writing a command (the vector masks itself).
    pub unsafe fn steal() -> Self {
        let dp = avr_device::atmega328p::Peripherals::steal();
        Self {
            twi: dp.TWI,
            portc: dp.PORTC,
        }
    }

    pub fn release(self) -> (TWI, PORTC) {
        (self.twi, self.portc)
    }
}

impl TwiRegisters for Registers {
    fn control(&self) -> u8 {
        self.twi.twcr.read().bits()
    }

    fn set_control(&mut self, value: u8) {
        self.twi.twcr.write(|w| unsafe { w.bits(value) });
    }

    fn status(&self) -> u8 {
        self.twi.twsr.read().bits()
    }

    fn set_prescaler(&mut self, bits: u8) {
        self.twi
            .twsr
            .write(|w| unsafe { w.bits(bits & twsr::PRESCALER_MASK) });
    }

    fn data(&self) -> u8 {
        self.twi.twdr.read().bits()
    }

    fn set_data(&mut self, value: u8) {
        self.twi.twdr.write(|w| unsafe { w.bits(value) });
    }

    fn set_address(&mut self, value: u8) {
        self.twi.twar.write(|w| unsafe { w.bits(value) });
    }

    fn set_bit_rate(&mut self, value: u8) {
        self.twi.twbr.write(|w| unsafe { w.bits(value) });
    }

    fn enable_pullups(&mut self) {
        self.portc
            .ddrc
            .modify(|r, w| unsafe { w.bits(r.bits() & !TWI_PINS) });
        self.portc
            .portc
            .modify(|r, w| unsafe { w.bits(r.bits() | TWI_PINS) });
    }
}

/// CPU sleep control
pub struct Cpu {
    cpu: CPU,
}

impl Cpu {
    pub fn new(cpu: CPU) -> Self {
        Self { cpu }
    }

    pub fn release(self) -> CPU {
        self.cpu
    }
}

impl Sleep for Cpu {
    fn sleep(&mut self, mode: SleepMode, wake: &dyn Fn() -> bool) {
        avr_device::interrupt::disable();
        if wake() {
            unsafe { avr_device::interrupt::enable() };
            return;
        }

        self.cpu
            .smcr
            .write(|w| unsafe { w.bits(mode.smcr_bits() | SE) });
        // The instruction after SEI always executes before a pending
        // interrupt, so no wake-up can slip in between check and sleep.
        unsafe { core::arch::asm!("sei", "sleep") };
        self.cpu.smcr.write(|w| unsafe { w.bits(0) });
    }
}

/// TWI interrupt vector body
///
/// Captures the status code for the engine and masks the interrupt
/// until the engine answers with its next command.
pub fn on_twi_interrupt<const N: usize>(producer: &mut Producer<'static, u8, N>) -> u8 {
    // SAFETY: the engine cannot be writing TWCR while this vector runs;
    // it only writes after draining, and every write re-arms the vector.
    let mut regs = unsafe { Registers::steal() };
    bifilar_hal::irq::capture(&mut regs, producer)
}
