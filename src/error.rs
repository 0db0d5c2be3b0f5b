//! Unified error types for the manager firmware.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! cooperative loop handles failures uniformly.  All variants are `Copy`
//! so they can be parked inside resumable bus accesses without allocation.
//!
//! Every bus and protocol error carries a stable numeric code.  Text
//! reports render a failed field as `"err<code>"` and the blocking bus
//! wrappers return the same code.

use core::fmt;

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A bus transaction was attempted and failed.
    Bus(BusError),
    /// A transaction was rejected before any bus I/O.
    Protocol(ProtocolMisuse),
    /// A calibration value or user-supplied limit is out of range.
    ConfigInvalid(&'static str),
    /// Non-volatile storage failed.
    Storage(StorageError),
}

impl Error {
    /// Numeric code used in `"err<code>"` report fields.
    pub const fn code(self) -> u8 {
        match self {
            Self::Bus(e) => e.code(),
            Self::Protocol(e) => e.code(),
            Self::ConfigInvalid(_) => 8,
            Self::Storage(_) => 9,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::ConfigInvalid(msg) => write!(f, "config: {msg}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

/// Failures observed on the wire.  Recovered locally by aborting the
/// transaction; never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// Address sent, NACK received.
    AddrNack,
    /// Data byte sent, NACK received.
    DataNack,
    /// Illegal start or stop condition (lost arbitration, bus fault).
    Illegal,
    /// The engine stayed busy.
    Busy,
    /// Fewer bytes arrived than were requested.
    ShortRead,
    /// The reply did not echo the command that was sent.
    BadReply,
}

impl BusError {
    pub const fn code(self) -> u8 {
        match self {
            Self::AddrNack => 2,
            Self::DataNack => 3,
            Self::Illegal => 4,
            Self::Busy => 5,
            Self::ShortRead => 6,
            Self::BadReply => 7,
        }
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddrNack => write!(f, "address NACK"),
            Self::DataNack => write!(f, "data NACK"),
            Self::Illegal => write!(f, "illegal start/stop"),
            Self::Busy => write!(f, "bus busy"),
            Self::ShortRead => write!(f, "short read"),
            Self::BadReply => write!(f, "bad reply"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol misuse
// ---------------------------------------------------------------------------

/// Rejected before any I/O is attempted.  The caller retries or fixes sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMisuse {
    /// More bytes than the 32-byte transfer buffer holds.
    TooMuchData,
    /// The engine is mid-transaction.
    NotReady,
}

impl ProtocolMisuse {
    pub const fn code(self) -> u8 {
        match self {
            Self::TooMuchData => 1,
            Self::NotReady => 5,
        }
    }
}

impl fmt::Display for ProtocolMisuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooMuchData => write!(f, "too much data"),
            Self::NotReady => write!(f, "engine not ready"),
        }
    }
}

impl From<ProtocolMisuse> for Error {
    fn from(e: ProtocolMisuse) -> Self {
        Self::Protocol(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// embedded-hal error kinds
// ---------------------------------------------------------------------------

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
        match self {
            Self::Bus(BusError::AddrNack) => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
            }
            Self::Bus(BusError::DataNack) => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            Self::Bus(BusError::Illegal) => ErrorKind::Bus,
            Self::Protocol(ProtocolMisuse::TooMuchData) => ErrorKind::Overrun,
            _ => ErrorKind::Other,
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::from(ProtocolMisuse::TooMuchData).code(), 1);
        assert_eq!(Error::from(BusError::AddrNack).code(), 2);
        assert_eq!(Error::from(BusError::DataNack).code(), 3);
        assert_eq!(Error::from(BusError::Illegal).code(), 4);
        assert_eq!(Error::from(ProtocolMisuse::NotReady).code(), 5);
        assert_eq!(Error::from(BusError::BadReply).code(), 7);
    }

    #[test]
    fn display_includes_subsystem() {
        let e = Error::from(BusError::AddrNack);
        assert_eq!(format!("{e}"), "bus: address NACK");
    }
}
