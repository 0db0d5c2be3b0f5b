//! Two-wire (I2C) bus engine.
//!
//! ```text
//!  ┌──────────────┐   one bus step   ┌────────────────┐
//!  │ RegisterAccess│ ───per poll────▶ │   TwiMaster    │──▶ TwiPeripheral
//!  │ EventNotify   │                  │ (async + block)│    (registers / sim)
//!  └──────────────┘                  └────────────────┘
//!
//!  TwiPeripheral ──▶ TwiSlave ──▶ receive / transmit callback slots
//! ```
//!
//! Every cooperative caller goes through the resumable accessors in
//! [`access`]; the blocking wrappers on [`master::TwiMaster`] exist for
//! one-shot code such as self test.

pub mod access;
pub mod master;
pub mod slave;

/// Transfer direction encoded in the low bit of the address byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
}

/// Acknowledge bit sampled after an address or data byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ack,
    Nack,
}
