//! Resumable bus accesses.
//!
//! Each access is a small state machine driven by repeated `poll` calls
//! from the cooperative loop.  A poll performs at most one bus operation
//! and returns the new [`LoopState`]; the access is complete exactly when
//! that is [`LoopState::Done`].
//!
//! ```text
//!  Raw ─▶ Init ─▶ WaitWrite ─▶ StartRead ─▶ WaitRead ─▶ Done
//!          ▲ bus busy   │ error                │ error
//!          └──┘         ▼                      ▼
//!                    Release ─▶ WaitRelease ─▶ Done
//! ```
//!
//! `Raw` is the escape hatch: [`RegisterAccess::reset`] forces it and the
//! next poll starts over from `Init`.  Polling a `Done` access touches
//! nothing and keeps the last result.

use log::warn;

use super::master::{TransferStatus, TwiMaster, TwiPeripheral};
use crate::error::{BusError, Error, ProtocolMisuse};
use crate::protocol::{Width, encode_request, frame_len};

/// Progress marker of a resumable access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Forced reset; the next poll reinitialises.
    Raw,
    /// Waiting for the bus, then issues the write.
    Init,
    WaitWrite,
    StartRead,
    WaitRead,
    /// A failed transfer left the bus held; issue a STOP-terminated probe.
    Release,
    WaitRelease,
    Done,
}

// ───────────────────────────────────────────────────────────────
// RegisterAccess
// ───────────────────────────────────────────────────────────────

/// Read or write one manager register: `[cmd, offset, value]` out,
/// repeated start, `[cmd, offset, value]` back.
#[derive(Debug, Clone)]
pub struct RegisterAccess {
    address: u8,
    command: u8,
    offset: u8,
    width: Width,
    write: Option<u32>,
    state: LoopState,
    result: Option<Result<u32, Error>>,
}

impl RegisterAccess {
    pub fn read(address: u8, command: u8, offset: u8, width: Width) -> Self {
        Self {
            address,
            command,
            offset,
            width,
            write: None,
            state: LoopState::Init,
            result: None,
        }
    }

    /// Write `value`.  The result is the register's previous value.
    pub fn write(address: u8, command: u8, offset: u8, width: Width, value: u32) -> Self {
        Self {
            write: Some(value & width.max()),
            ..Self::read(address, command, offset, width)
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == LoopState::Done
    }

    /// The value obtained, once done.
    pub fn result(&self) -> Option<Result<u32, Error>> {
        self.result
    }

    /// Abandon whatever is in flight; the next poll starts over.
    pub fn reset(&mut self) {
        self.state = LoopState::Raw;
    }

    /// Advance by at most one bus operation.
    pub fn poll<P: TwiPeripheral>(&mut self, bus: &mut TwiMaster<P>) -> LoopState {
        if self.state == LoopState::Raw {
            self.state = LoopState::Init;
            self.result = None;
        }

        match self.state {
            LoopState::Raw | LoopState::Done => {}
            LoopState::Init => {
                if bus.is_in_use() {
                    return self.state;
                }
                let (frame, len) = encode_request(self.command, self.offset, self.width, self.write);
                match bus.master_async_write(self.address, &frame[..len], false) {
                    Ok(()) => self.state = LoopState::WaitWrite,
                    Err(ProtocolMisuse::NotReady) => {}
                    Err(e) => self.fail(e.into(), bus),
                }
            }
            LoopState::WaitWrite => match bus.master_async_write_status() {
                TransferStatus::Busy => {}
                TransferStatus::Success => self.state = LoopState::StartRead,
                status => self.fail_status(status, bus),
            },
            LoopState::StartRead => {
                match bus.master_async_read(self.address, frame_len(self.width), true) {
                    Ok(()) => self.state = LoopState::WaitRead,
                    Err(ProtocolMisuse::NotReady) => {}
                    Err(e) => self.fail(e.into(), bus),
                }
            }
            LoopState::WaitRead => match bus.master_async_read_status() {
                TransferStatus::Busy => {}
                TransferStatus::Success => {
                    let decoded = self.decode(bus.received());
                    if let Err(e) = decoded {
                        warn!(
                            "TWI: cmd {} at 0x{:02X} bad reply: {}",
                            self.command, self.address, e
                        );
                    }
                    self.result = Some(decoded);
                    self.state = LoopState::Done;
                }
                status => self.fail_status(status, bus),
            },
            LoopState::Release => match bus.master_async_write(self.address, &[], true) {
                Ok(()) => self.state = LoopState::WaitRelease,
                Err(ProtocolMisuse::NotReady) => {}
                Err(_) => self.state = LoopState::Done,
            },
            LoopState::WaitRelease => {
                if bus.master_async_write_status() != TransferStatus::Busy {
                    self.state = LoopState::Done;
                }
            }
        }
        self.state
    }

    fn decode(&self, reply: &[u8]) -> Result<u32, Error> {
        if reply.len() < frame_len(self.width) {
            return Err(BusError::ShortRead.into());
        }
        if reply[0] != self.command {
            return Err(BusError::BadReply.into());
        }
        Ok(self.width.get(&reply[2..]))
    }

    fn fail_status<P: TwiPeripheral>(&mut self, status: TransferStatus, bus: &TwiMaster<P>) {
        let err = match status.into_result() {
            Err(e) => e,
            Ok(()) => BusError::Busy.into(),
        };
        self.fail(err, bus);
    }

    fn fail<P: TwiPeripheral>(&mut self, err: Error, bus: &TwiMaster<P>) {
        warn!(
            "TWI: cmd {} at 0x{:02X} failed: {}",
            self.command, self.address, err
        );
        self.result = Some(Err(err));
        self.state = if bus.is_in_use() {
            LoopState::Release
        } else {
            LoopState::Done
        };
    }
}

// ───────────────────────────────────────────────────────────────
// EventNotify
// ───────────────────────────────────────────────────────────────

/// Write-only `[route, value]` notification terminated by STOP.
#[derive(Debug, Clone)]
pub struct EventNotify {
    address: u8,
    route: u8,
    value: u8,
    state: LoopState,
    result: Option<Result<(), Error>>,
}

impl EventNotify {
    pub fn new(address: u8, route: u8, value: u8) -> Self {
        Self {
            address,
            route,
            value,
            state: LoopState::Init,
            result: None,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn route(&self) -> u8 {
        self.route
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == LoopState::Done
    }

    pub fn result(&self) -> Option<Result<(), Error>> {
        self.result
    }

    pub fn reset(&mut self) {
        self.state = LoopState::Raw;
    }

    /// Advance by at most one bus operation.
    pub fn poll<P: TwiPeripheral>(&mut self, bus: &mut TwiMaster<P>) -> LoopState {
        if self.state == LoopState::Raw {
            self.state = LoopState::Init;
            self.result = None;
        }

        match self.state {
            LoopState::Init => {
                if bus.is_in_use() {
                    return self.state;
                }
                match bus.master_async_write(self.address, &[self.route, self.value], true) {
                    Ok(()) => self.state = LoopState::WaitWrite,
                    Err(ProtocolMisuse::NotReady) => {}
                    Err(e) => {
                        self.result = Some(Err(e.into()));
                        self.state = LoopState::Done;
                    }
                }
            }
            LoopState::WaitWrite => match bus.master_async_write_status() {
                TransferStatus::Busy => {}
                status => {
                    self.result = Some(status.into_result());
                    self.state = LoopState::Done;
                }
            },
            _ => self.state = LoopState::Done,
        }
        self.state
    }
}
