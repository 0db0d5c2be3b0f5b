//! Application core: manager domain logic, zero I/O.
//!
//! This module holds the register command table and the service that
//! ties the day/night machine, host shutdown sequencing and EEPROM
//! persistence together.  All interaction with hardware happens through
//! **port traits** defined in [`ports`], keeping this layer testable
//! without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
