//! Interrupt capture path
//!
//! The TWI interrupt does as little as possible: it records the bus
//! status code, masks its own interrupt so it does not re-fire while
//! TWINT is still pending, and returns. The bus engine drains the
//! recorded codes from the foreground and writes the next command.
//!
//! ```text
//!   TWI vector                       foreground
//!  ┌────────────┐   spsc::Queue    ┌─────────────┐
//!  │ capture()  │ ───────────────▶ │ Twi::poll() │
//!  │ TWSR&0xF8  │   status codes   │ next TWCR   │
//!  └────────────┘                  └─────────────┘
//! ```
//!
//! Because the interrupt is masked until the engine writes the next
//! command, at most one code is ever in flight.

use heapless::spsc::{Consumer, Producer};

use crate::twi::{twcr, TwiRegisters};

/// Source of captured bus status codes
pub trait StatusQueue {
    /// Take the oldest captured status code
    fn dequeue(&mut self) -> Option<u8>;

    /// Check if a captured status code is waiting
    fn is_pending(&self) -> bool;
}

impl<const N: usize> StatusQueue for Consumer<'_, u8, N> {
    fn dequeue(&mut self) -> Option<u8> {
        Consumer::dequeue(self)
    }

    fn is_pending(&self) -> bool {
        self.ready()
    }
}

impl<T: StatusQueue + ?Sized> StatusQueue for &mut T {
    fn dequeue(&mut self) -> Option<u8> {
        (**self).dequeue()
    }

    fn is_pending(&self) -> bool {
        (**self).is_pending()
    }
}

/// Record the current bus event; call from the TWI interrupt vector
///
/// TWINT stays set (writing it as 0 leaves the flag untouched) so the
/// controller holds SCL low until the engine issues the next command.
/// Returns the captured status code.
pub fn capture<R, const N: usize>(regs: &mut R, queue: &mut Producer<'_, u8, N>) -> u8
where
    R: TwiRegisters + ?Sized,
{
    let status = regs.status_code();
    // Queue full means an earlier code was never consumed; the newest
    // one is dropped and the engine sees the older state first.
    let _ = queue.enqueue(status);
    let control = regs.control();
    regs.set_control(control & !(twcr::TWINT | twcr::TWIE));
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::spsc::Queue;

    struct Regs {
        control: u8,
        status: u8,
    }

    impl TwiRegisters for Regs {
        fn control(&self) -> u8 {
            self.control
        }
        fn set_control(&mut self, value: u8) {
            self.control = value;
        }
        fn status(&self) -> u8 {
            self.status
        }
        fn set_prescaler(&mut self, _bits: u8) {}
        fn data(&self) -> u8 {
            0
        }
        fn set_data(&mut self, _value: u8) {}
        fn set_address(&mut self, _value: u8) {}
        fn set_bit_rate(&mut self, _value: u8) {}
        fn enable_pullups(&mut self) {}
    }

    #[test]
    fn test_capture_masks_prescaler_and_interrupt() {
        let mut queue: Queue<u8, 4> = Queue::new();
        let (mut producer, mut consumer) = queue.split();
        let mut regs = Regs {
            control: twcr::TWINT | twcr::TWEA | twcr::TWEN | twcr::TWIE,
            status: 0x18 | 0x01,
        };

        assert!(!consumer.is_pending());
        assert_eq!(capture(&mut regs, &mut producer), 0x18);

        assert!(consumer.is_pending());
        assert_eq!(StatusQueue::dequeue(&mut consumer), Some(0x18));
        assert_eq!(StatusQueue::dequeue(&mut consumer), None);
        assert_eq!(regs.control, twcr::TWEA | twcr::TWEN);
    }

    #[test]
    fn test_capture_full_queue_keeps_oldest() {
        let mut queue: Queue<u8, 2> = Queue::new();
        let (mut producer, mut consumer) = queue.split();
        let mut regs = Regs {
            control: twcr::TWEN | twcr::TWIE,
            status: 0x08,
        };

        capture(&mut regs, &mut producer);
        regs.status = 0x18;
        capture(&mut regs, &mut producer);

        assert_eq!(StatusQueue::dequeue(&mut consumer), Some(0x08));
        assert_eq!(StatusQueue::dequeue(&mut consumer), None);
    }
}
