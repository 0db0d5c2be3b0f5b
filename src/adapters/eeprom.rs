//! EEPROM adapter.
//!
//! Implements [`EepromPort`] with an in-memory image of the 1 KiB
//! ATmega328PB EEPROM.  A fresh image is erased (`0xFF`), so nothing
//! carries a valid magic id until the firmware writes one.

use log::debug;

use crate::app::ports::{EepromPort, StorageError};

/// Size of the manager's EEPROM.
pub const EEPROM_SIZE: usize = 1024;

pub struct SimEeprom {
    bytes: Vec<u8>,
    busy: bool,
    writes: usize,
}

impl Default for SimEeprom {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEeprom {
    pub fn new() -> Self {
        Self {
            bytes: vec![0xFF; EEPROM_SIZE],
            busy: false,
            writes: 0,
        }
    }

    /// Hold the part busy, as during a slow write cycle.
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Number of bytes actually written since construction.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn slot(&self, addr: u16) -> Result<usize, StorageError> {
        let i = usize::from(addr);
        if i < self.bytes.len() {
            Ok(i)
        } else {
            Err(StorageError::OutOfRange)
        }
    }
}

impl EepromPort for SimEeprom {
    fn is_ready(&self) -> bool {
        !self.busy
    }

    fn read_byte(&self, addr: u16) -> Result<u8, StorageError> {
        Ok(self.bytes[self.slot(addr)?])
    }

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), StorageError> {
        if self.busy {
            return Err(StorageError::NotReady);
        }
        let i = self.slot(addr)?;
        debug!("EEPROM: [0x{:03X}] <- 0x{:02X}", addr, value);
        self.bytes[i] = value;
        self.writes += 1;
        Ok(())
    }
}
