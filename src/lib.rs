//! Solar day/night manager firmware library.
//!
//! The manager classifies ambient light into day and night, notifies an
//! application controller over a two-wire bus, sequences host power and
//! answers a register command table.  Every module is host-testable;
//! hardware is reached only through the port traits in [`app::ports`]
//! and the [`twi::master::TwiPeripheral`] seam.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod host_shutdown;
pub mod protocol;
pub mod references;
pub mod remote;
pub mod scheduler;
pub mod twi;

pub use error::{Error, Result};
