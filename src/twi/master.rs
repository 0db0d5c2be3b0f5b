//! Non-blocking bus master.
//!
//! [`TwiMaster::service`] is what the TWI interrupt would run: it moves
//! the in-flight transfer forward by exactly one bus step (address byte,
//! data byte, or STOP).  The status accessors call it once per poll, so a
//! cooperative loop that only polls still makes progress, one step per
//! call, without ever spinning.
//!
//! A transfer started with `send_stop == false` ends with the bus held
//! (no STOP), ready for a repeated start.  If that transfer fails the bus
//! stays held until someone issues a zero-length write with STOP.

use embedded_hal::i2c::{ErrorType, I2c, Operation};
use heapless::Vec;
use log::debug;

use super::{Ack, Direction};
use crate::error::{BusError, Error, ProtocolMisuse};
use crate::protocol::BUFFER_LENGTH;

// ───────────────────────────────────────────────────────────────
// Hardware seam
// ───────────────────────────────────────────────────────────────

/// One method per bus step.  Implemented over the TWI registers on
/// target and by [`SimPort`](crate::adapters::sim_bus::SimPort) on host.
pub trait TwiPeripheral {
    /// Issue START (or repeated START).  `false` on an illegal condition.
    fn start(&mut self) -> bool;

    /// Send the address byte and sample the acknowledge.
    fn address(&mut self, addr: u8, dir: Direction) -> Ack;

    /// Send one data byte and sample the acknowledge.
    fn write_byte(&mut self, byte: u8) -> Ack;

    /// Clock in one byte, answering with ACK when `ack` is set.
    /// `None` on a bus fault.
    fn read_byte(&mut self, ack: bool) -> Option<u8>;

    /// Issue STOP.
    fn stop(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Status
// ───────────────────────────────────────────────────────────────

/// Outcome of the most recent transfer in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Success,
    Busy,
    AddrNack,
    DataNack,
    Illegal,
}

/// Status of the most recent write.
pub type WriteStatus = TransferStatus;
/// Status of the most recent read.
pub type ReadStatus = TransferStatus;

impl TransferStatus {
    /// `0` on success, otherwise the error code.
    pub fn code(self) -> u8 {
        match self.into_result() {
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }

    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Self::Success => Ok(()),
            Self::Busy => Err(BusError::Busy.into()),
            Self::AddrNack => Err(BusError::AddrNack.into()),
            Self::DataNack => Err(BusError::DataNack.into()),
            Self::Illegal => Err(BusError::Illegal.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Address(Direction),
    Transmit,
    Receive,
}

// ───────────────────────────────────────────────────────────────
// TwiMaster
// ───────────────────────────────────────────────────────────────

pub struct TwiMaster<P> {
    periph: P,
    phase: Phase,
    target: u8,
    send_stop: bool,
    bus_held: bool,
    tx: Vec<u8, BUFFER_LENGTH>,
    tx_index: usize,
    rx: Vec<u8, BUFFER_LENGTH>,
    rx_len: usize,
    write_status: WriteStatus,
    read_status: ReadStatus,
}

impl<P: TwiPeripheral> TwiMaster<P> {
    pub fn new(periph: P) -> Self {
        Self {
            periph,
            phase: Phase::Idle,
            target: 0,
            send_stop: true,
            bus_held: false,
            tx: Vec::new(),
            tx_index: 0,
            rx: Vec::new(),
            rx_len: 0,
            write_status: TransferStatus::Success,
            read_status: TransferStatus::Success,
        }
    }

    pub fn peripheral(&self) -> &P {
        &self.periph
    }

    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.periph
    }

    /// `true` while a transfer is in flight or the bus is held after a
    /// transfer that ended without STOP.
    pub fn is_in_use(&self) -> bool {
        self.phase != Phase::Idle || self.bus_held
    }

    // ── Async write ───────────────────────────────────────────

    /// Start writing `data` to `address`.  The START goes out before this
    /// returns.  A zero-length write only probes the address (and releases
    /// a held bus when `send_stop` is set).
    pub fn master_async_write(
        &mut self,
        address: u8,
        data: &[u8],
        send_stop: bool,
    ) -> Result<(), ProtocolMisuse> {
        if data.len() > BUFFER_LENGTH {
            return Err(ProtocolMisuse::TooMuchData);
        }
        if self.phase != Phase::Idle {
            return Err(ProtocolMisuse::NotReady);
        }
        self.tx.clear();
        self.tx
            .extend_from_slice(data)
            .map_err(|_| ProtocolMisuse::TooMuchData)?;
        self.tx_index = 0;
        self.target = address;
        self.send_stop = send_stop;
        self.write_status = TransferStatus::Busy;
        self.begin(Direction::Write);
        Ok(())
    }

    /// Poll the most recent write, advancing it by one bus step.
    pub fn master_async_write_status(&mut self) -> WriteStatus {
        self.service();
        self.write_status
    }

    // ── Async read ────────────────────────────────────────────

    /// Start reading `len` bytes from `address`.
    pub fn master_async_read(
        &mut self,
        address: u8,
        len: usize,
        send_stop: bool,
    ) -> Result<(), ProtocolMisuse> {
        if len > BUFFER_LENGTH {
            return Err(ProtocolMisuse::TooMuchData);
        }
        if self.phase != Phase::Idle {
            return Err(ProtocolMisuse::NotReady);
        }
        self.rx.clear();
        self.rx_len = len;
        self.target = address;
        self.send_stop = send_stop;
        self.read_status = TransferStatus::Busy;
        self.begin(Direction::Read);
        Ok(())
    }

    /// Poll the most recent read, advancing it by one bus step.
    pub fn master_async_read_status(&mut self) -> ReadStatus {
        self.service();
        self.read_status
    }

    /// Copy out what the most recent read received.  Returns the count,
    /// which is short of the request when the transfer failed.
    pub fn master_async_read_bytes_read(&self, out: &mut [u8]) -> usize {
        let n = self.rx.len().min(out.len());
        out[..n].copy_from_slice(&self.rx[..n]);
        n
    }

    /// Bytes received by the most recent read.
    pub fn received(&self) -> &[u8] {
        &self.rx
    }

    // ── Blocking wrappers ─────────────────────────────────────

    /// Write and poll to completion.  Returns `0` or the error code
    /// (`1` too much data, `2` address NACK, `3` data NACK, `4` illegal,
    /// `5` not ready).
    pub fn master_blocking_write(&mut self, address: u8, data: &[u8], send_stop: bool) -> u8 {
        match self.write_blocking(address, data, send_stop) {
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }

    /// Read and poll to completion.  Returns the number of bytes received.
    pub fn master_blocking_read(&mut self, address: u8, buf: &mut [u8], send_stop: bool) -> usize {
        if self.master_async_read(address, buf.len(), send_stop).is_err() {
            return 0;
        }
        while self.master_async_read_status() == TransferStatus::Busy {}
        self.master_async_read_bytes_read(buf)
    }

    fn write_blocking(&mut self, address: u8, data: &[u8], send_stop: bool) -> Result<(), Error> {
        self.master_async_write(address, data, send_stop)?;
        loop {
            match self.master_async_write_status() {
                TransferStatus::Busy => {}
                status => return status.into_result(),
            }
        }
    }

    fn read_blocking(&mut self, address: u8, len: usize, send_stop: bool) -> Result<(), Error> {
        self.master_async_read(address, len, send_stop)?;
        loop {
            match self.master_async_read_status() {
                TransferStatus::Busy => {}
                status => return status.into_result(),
            }
        }
    }

    // ── Bus steps ─────────────────────────────────────────────

    /// Advance the in-flight transfer by one bus step.  No-op when idle.
    pub fn service(&mut self) {
        match self.phase {
            Phase::Idle => {}
            Phase::Address(dir) => match self.periph.address(self.target, dir) {
                Ack::Nack => self.finish(dir, TransferStatus::AddrNack),
                Ack::Ack => match dir {
                    Direction::Write if self.tx.is_empty() => {
                        self.finish(dir, TransferStatus::Success);
                    }
                    Direction::Write => self.phase = Phase::Transmit,
                    Direction::Read if self.rx_len == 0 => {
                        self.finish(dir, TransferStatus::Success);
                    }
                    Direction::Read => self.phase = Phase::Receive,
                },
            },
            Phase::Transmit => {
                let Some(&byte) = self.tx.get(self.tx_index) else {
                    self.finish(Direction::Write, TransferStatus::Success);
                    return;
                };
                self.tx_index += 1;
                match self.periph.write_byte(byte) {
                    Ack::Nack => self.finish(Direction::Write, TransferStatus::DataNack),
                    Ack::Ack if self.tx_index >= self.tx.len() => {
                        self.finish(Direction::Write, TransferStatus::Success);
                    }
                    Ack::Ack => {}
                }
            }
            Phase::Receive => {
                let more = self.rx.len() + 1 < self.rx_len;
                match self.periph.read_byte(more) {
                    None => self.finish(Direction::Read, TransferStatus::Illegal),
                    Some(byte) => {
                        // Capacity is checked against BUFFER_LENGTH on start.
                        let _ = self.rx.push(byte);
                        if self.rx.len() >= self.rx_len {
                            self.finish(Direction::Read, TransferStatus::Success);
                        }
                    }
                }
            }
        }
    }

    fn begin(&mut self, dir: Direction) {
        if self.periph.start() {
            self.phase = Phase::Address(dir);
        } else {
            self.finish(dir, TransferStatus::Illegal);
        }
    }

    fn finish(&mut self, dir: Direction, status: TransferStatus) {
        if self.send_stop || status == TransferStatus::Illegal {
            self.periph.stop();
            self.bus_held = false;
        } else {
            self.bus_held = true;
        }
        self.phase = Phase::Idle;
        match dir {
            Direction::Write => self.write_status = status,
            Direction::Read => self.read_status = status,
        }
        if status != TransferStatus::Success {
            debug!(
                "TWI: {:?} to 0x{:02X} ended {:?} (held={})",
                dir, self.target, status, self.bus_held
            );
        }
    }
}

// ───────────────────────────────────────────────────────────────
// embedded-hal
// ───────────────────────────────────────────────────────────────

impl<P: TwiPeripheral> ErrorType for TwiMaster<P> {
    type Error = Error;
}

/// Blocking `embedded-hal` access for drivers written against the HAL.
///
/// Adjacent operations of the same kind are merged into one transfer,
/// limited to [`BUFFER_LENGTH`] bytes; a change of direction is a
/// repeated start and the final transfer ends with STOP.
impl<P: TwiPeripheral> I2c for TwiMaster<P> {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut i = 0;
        while i < operations.len() {
            let reading = matches!(operations[i], Operation::Read(_));
            let mut j = i + 1;
            while j < operations.len() && matches!(operations[j], Operation::Read(_)) == reading {
                j += 1;
            }
            let last = j == operations.len();

            let result = if reading {
                self.read_group(address, &mut operations[i..j], last)
            } else {
                self.write_group(address, &operations[i..j], last)
            };
            if let Err(e) = result {
                if self.bus_held {
                    let _ = self.write_blocking(address, &[], true);
                }
                return Err(e);
            }
            i = j;
        }
        Ok(())
    }
}

impl<P: TwiPeripheral> TwiMaster<P> {
    fn write_group(
        &mut self,
        address: u8,
        ops: &[Operation<'_>],
        send_stop: bool,
    ) -> Result<(), Error> {
        let mut buf: Vec<u8, BUFFER_LENGTH> = Vec::new();
        for op in ops {
            if let Operation::Write(data) = op {
                buf.extend_from_slice(data)
                    .map_err(|_| ProtocolMisuse::TooMuchData)?;
            }
        }
        self.write_blocking(address, &buf, send_stop)
    }

    fn read_group(
        &mut self,
        address: u8,
        ops: &mut [Operation<'_>],
        send_stop: bool,
    ) -> Result<(), Error> {
        let total: usize = ops
            .iter()
            .map(|op| match op {
                Operation::Read(buf) => buf.len(),
                Operation::Write(_) => 0,
            })
            .sum();
        self.read_blocking(address, total, send_stop)?;

        let mut offset = 0;
        for op in ops.iter_mut() {
            if let Operation::Read(buf) = op {
                let end = offset + buf.len();
                let src = self.rx.get(offset..end).ok_or(BusError::ShortRead)?;
                buf.copy_from_slice(src);
                offset = end;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Step {
        Start,
        Address(u8, Direction),
        Write(u8),
        Read,
        Stop,
    }

    /// Scripted bus: devices in `present` acknowledge, reads return `reply`.
    struct FakeBus {
        present: Vec<u8, 4>,
        reply: [u8; 4],
        read_index: usize,
        steps: std::vec::Vec<Step>,
    }

    impl FakeBus {
        fn new(present: &[u8]) -> Self {
            let mut p = Vec::new();
            p.extend_from_slice(present).unwrap();
            Self {
                present: p,
                reply: [0xA1, 0xB2, 0xC3, 0xD4],
                read_index: 0,
                steps: std::vec::Vec::new(),
            }
        }
    }

    impl TwiPeripheral for FakeBus {
        fn start(&mut self) -> bool {
            self.steps.push(Step::Start);
            self.read_index = 0;
            true
        }
        fn address(&mut self, addr: u8, dir: Direction) -> Ack {
            self.steps.push(Step::Address(addr, dir));
            if self.present.contains(&addr) {
                Ack::Ack
            } else {
                Ack::Nack
            }
        }
        fn write_byte(&mut self, byte: u8) -> Ack {
            self.steps.push(Step::Write(byte));
            Ack::Ack
        }
        fn read_byte(&mut self, _ack: bool) -> Option<u8> {
            self.steps.push(Step::Read);
            let b = self.reply.get(self.read_index).copied().unwrap_or(0xFF);
            self.read_index += 1;
            Some(b)
        }
        fn stop(&mut self) {
            self.steps.push(Step::Stop);
        }
    }

    #[test]
    fn too_much_data_rejected_before_io() {
        let mut m = TwiMaster::new(FakeBus::new(&[0x29]));
        let data = [0u8; BUFFER_LENGTH + 1];
        assert_eq!(
            m.master_async_write(0x29, &data, true),
            Err(ProtocolMisuse::TooMuchData)
        );
        assert!(m.peripheral().steps.is_empty());
        assert_eq!(m.master_blocking_write(0x29, &data, true), 1);
    }

    #[test]
    fn second_start_while_busy_is_not_ready() {
        let mut m = TwiMaster::new(FakeBus::new(&[0x29]));
        m.master_async_write(0x29, &[1, 2], true).unwrap();
        assert_eq!(
            m.master_async_write(0x29, &[3], true),
            Err(ProtocolMisuse::NotReady)
        );
        assert_eq!(
            m.master_async_read(0x29, 2, true),
            Err(ProtocolMisuse::NotReady)
        );
    }

    #[test]
    fn one_bus_step_per_poll() {
        let mut m = TwiMaster::new(FakeBus::new(&[0x29]));
        m.master_async_write(0x29, &[7, 8, 9], true).unwrap();
        assert_eq!(m.peripheral().steps, [Step::Start]);

        assert_eq!(m.master_async_write_status(), TransferStatus::Busy);
        assert_eq!(m.peripheral().steps.len(), 2);
        assert_eq!(m.master_async_write_status(), TransferStatus::Busy);
        assert_eq!(m.master_async_write_status(), TransferStatus::Busy);
        assert_eq!(m.master_async_write_status(), TransferStatus::Success);
        assert_eq!(m.peripheral().steps.last(), Some(&Step::Stop));
        assert!(!m.is_in_use());

        // Further polls do nothing.
        let n = m.peripheral().steps.len();
        assert_eq!(m.master_async_write_status(), TransferStatus::Success);
        assert_eq!(m.peripheral().steps.len(), n);
    }

    #[test]
    fn blocking_write_to_missing_address_returns_addr_nack() {
        let mut m = TwiMaster::new(FakeBus::new(&[0x29]));
        assert_eq!(m.master_blocking_write(0x50, &[1, 2, 3], true), 2);
        assert!(!m.peripheral().steps.contains(&Step::Read));
        assert!(!m.peripheral().steps.contains(&Step::Write(1)));
        assert!(!m.is_in_use());
    }

    #[test]
    fn failed_repeated_start_holds_bus_until_stop_write() {
        let mut m = TwiMaster::new(FakeBus::new(&[0x29]));
        assert_eq!(m.master_blocking_write(0x50, &[1], false), 2);
        assert!(m.is_in_use());
        assert!(!m.peripheral().steps.contains(&Step::Stop));

        m.master_blocking_write(0x50, &[], true);
        assert!(!m.is_in_use());
        assert_eq!(m.peripheral().steps.last(), Some(&Step::Stop));
    }

    #[test]
    fn blocking_read_returns_count() {
        let mut m = TwiMaster::new(FakeBus::new(&[0x29]));
        let mut buf = [0u8; 3];
        assert_eq!(m.master_blocking_read(0x29, &mut buf, true), 3);
        assert_eq!(buf, [0xA1, 0xB2, 0xC3]);

        assert_eq!(m.master_blocking_read(0x30, &mut buf, true), 0);
        assert_eq!(m.master_async_read_status(), TransferStatus::AddrNack);
    }

    #[test]
    fn hal_write_read_uses_repeated_start() {
        let mut m = TwiMaster::new(FakeBus::new(&[0x29]));
        let mut buf = [0u8; 2];
        m.write_read(0x29, &[0x17, 0x20], &mut buf).unwrap();
        assert_eq!(buf, [0xA1, 0xB2]);
        let steps = &m.peripheral().steps;
        let stops = steps.iter().filter(|s| **s == Step::Stop).count();
        assert_eq!(stops, 1);
        assert_eq!(steps.iter().filter(|s| **s == Step::Start).count(), 2);
    }

    #[test]
    fn hal_error_kind_maps_nack() {
        use embedded_hal::i2c::{Error as _, ErrorKind, NoAcknowledgeSource};
        let mut m = TwiMaster::new(FakeBus::new(&[]));
        let err = m.write(0x29, &[1]).unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
        );
    }
}
