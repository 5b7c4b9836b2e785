//! Simulated slave devices
//!
//! A [`Device`] answers the simulated master. The bus model calls it in
//! wire order: `start` for the address byte, then `write` or `read` once
//! per data byte, then `stop` when the transaction ends.

use std::cell::RefCell;
use std::rc::Rc;

/// Slave device attached to the simulated bus
pub trait Device {
    /// 7-bit bus address
    fn address(&self) -> u8;

    /// Address byte matched; return false to NACK it
    fn start(&mut self, read: bool) -> bool;

    /// Byte written by the master; return false to NACK it
    fn write(&mut self, byte: u8) -> bool;

    /// Next byte requested by the master
    fn read(&mut self) -> u8;

    /// Transaction ended (STOP or repeated START)
    fn stop(&mut self) {}
}

#[derive(Debug)]
struct MemoryState {
    address: u8,
    cells: Vec<u8>,
    pointer: usize,
    /// First byte of a write sets the pointer
    pointer_pending: bool,
    /// NACK data bytes once this many were accepted in one write
    accept_limit: Option<usize>,
    accepted: usize,
    present: bool,
    transactions: usize,
}

/// Register-pointer memory device
///
/// Behaves like the common I2C RAM/EEPROM/RTC layout: the first byte of
/// a write selects the register pointer, further bytes are stored at the
/// pointer, and reads return bytes from the pointer. The pointer
/// auto-increments and wraps at the end of the memory.
///
/// Clones share state, so a test keeps one clone to inspect the cells
/// after attaching the other to a bus.
#[derive(Debug, Clone)]
pub struct Memory {
    state: Rc<RefCell<MemoryState>>,
}

impl Memory {
    /// Zero-filled memory of `size` bytes at a 7-bit address
    pub fn new(address: u8, size: usize) -> Self {
        Self::with_contents(address, &vec![0; size])
    }

    /// Memory pre-loaded with `contents`
    pub fn with_contents(address: u8, contents: &[u8]) -> Self {
        Self {
            state: Rc::new(RefCell::new(MemoryState {
                address,
                cells: contents.to_vec(),
                pointer: 0,
                pointer_pending: false,
                accept_limit: None,
                accepted: 0,
                present: true,
                transactions: 0,
            })),
        }
    }

    /// NACK every data byte after the first `limit` bytes of a write
    pub fn accept_at_most(self, limit: usize) -> Self {
        self.state.borrow_mut().accept_limit = Some(limit);
        self
    }

    /// Answer (or stop answering) the address phase
    pub fn set_present(&self, present: bool) {
        self.state.borrow_mut().present = present;
    }

    /// Snapshot of the memory cells
    pub fn contents(&self) -> Vec<u8> {
        self.state.borrow().cells.clone()
    }

    /// Overwrite cells starting at `offset`
    pub fn load(&self, offset: usize, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        let len = state.cells.len();
        for (i, byte) in bytes.iter().enumerate() {
            state.cells[(offset + i) % len] = *byte;
        }
    }

    /// Current register pointer
    pub fn pointer(&self) -> usize {
        self.state.borrow().pointer
    }

    /// Number of acknowledged address phases
    pub fn transactions(&self) -> usize {
        self.state.borrow().transactions
    }
}

impl Device for Memory {
    fn address(&self) -> u8 {
        self.state.borrow().address
    }

    fn start(&mut self, read: bool) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.present {
            return false;
        }
        state.transactions += 1;
        state.pointer_pending = !read;
        state.accepted = 0;
        true
    }

    fn write(&mut self, byte: u8) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(limit) = state.accept_limit {
            if state.accepted >= limit {
                return false;
            }
        }
        state.accepted += 1;

        let len = state.cells.len();
        if len == 0 {
            return true;
        }
        if state.pointer_pending {
            state.pointer = byte as usize % len;
            state.pointer_pending = false;
        } else {
            let pointer = state.pointer;
            state.cells[pointer] = byte;
            state.pointer = (pointer + 1) % len;
        }
        true
    }

    fn read(&mut self) -> u8 {
        let mut state = self.state.borrow_mut();
        let len = state.cells.len();
        if len == 0 {
            return 0xFF;
        }
        let pointer = state.pointer;
        state.pointer = (pointer + 1) % len;
        state.cells[pointer]
    }
}
