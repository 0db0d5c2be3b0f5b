//! Wire protocol shared by the manager and the application controller.
//!
//! A register access is one write followed, after a repeated start, by
//! one read:
//!
//! ```text
//!  master ─▶ [ command | offset(+RW_WRITE_BIT) | value BE ... ]   (no STOP)
//!  master ◀─ [ command | offset                | value BE ... ]   (STOP)
//! ```
//!
//! The reply carries the value *before* any write, so a write doubles as
//! an exchange.  Event notifications from the manager are write-only
//! `[route, value]` frames terminated by STOP.

/// Size of every transmit and receive buffer on the bus.
pub const BUFFER_LENGTH: usize = 32;

/// Offset-byte flag selecting a write.
pub const RW_WRITE_BIT: u8 = 0x80;
/// Offset-byte value selecting a read.
pub const RW_READ_BIT: u8 = 0x00;
/// Offset bits that remain after the RW flag is removed.
pub const OFFSET_MASK: u8 = 0x7F;

/// Reply sent for unknown commands and malformed frames.
pub const ERROR_REPLY: u8 = 0xFF;

/// Command numbers understood by the manager.
pub mod cmd {
    pub const MANAGER_ADDRESS: u8 = 0;
    pub const SHUTDOWN_DETECT: u8 = 4;
    pub const SHUTDOWN_SET: u8 = 5;
    pub const STATUS_READ: u8 = 6;
    pub const STATUS_WRITE: u8 = 7;
    pub const SHUTDOWN_INT: u8 = 8;
    pub const SHUTDOWN_UL: u8 = 9;
    pub const BATTERY_START_CHARGE: u8 = 18;
    pub const BATTERY_DONE_CHARGE: u8 = 19;
    pub const BATTERY_CHARGE_TIME: u8 = 20;
    pub const MORNING_THRESHOLD: u8 = 21;
    pub const EVENING_THRESHOLD: u8 = 22;
    pub const DAYNIGHT_STATE: u8 = 23;
    pub const CALLBACK_ADDRESS: u8 = 24;
    pub const CALLBACK_ROUTE: u8 = 25;
    pub const DAY_WORK_ROUTE: u8 = 26;
    pub const NIGHT_WORK_ROUTE: u8 = 27;
    pub const CALLBACK_POKE: u8 = 28;
    pub const ANALOG_READ: u8 = 32;
    pub const TIMED_ACCUMULATION: u8 = 37;
    pub const REFERENCE_AVCC: u8 = 38;
    pub const REFERENCE_1V1: u8 = 39;
    pub const START_TEST_MODE: u8 = 48;
    pub const END_TEST_MODE: u8 = 49;
    pub const XCVR_READ: u8 = 50;
    pub const XCVR_WRITE: u8 = 51;
    pub const EVENING_DEBOUNCE: u8 = 52;
    pub const MORNING_DEBOUNCE: u8 = 53;
    pub const DAYNIGHT_TIMER: u8 = 54;
}

/// Offsets within [`cmd::SHUTDOWN_INT`].
pub const SHUTDOWN_HALT_CURR_OFFSET: u8 = 0;

/// Offsets within [`cmd::SHUTDOWN_UL`].
pub mod shutdown_ul {
    pub const TTL: u8 = 0;
    pub const DELAY: u8 = 1;
    pub const WEARLEVEL: u8 = 2;
    pub const KRUNTIME: u8 = 3;
}

/// Offsets within [`cmd::TIMED_ACCUMULATION`].
pub mod accumulation {
    pub const ALT: u8 = 0;
    pub const PWR: u8 = 1;
    pub const ALT_AT_NIGHT: u8 = 2;
    pub const PWR_AT_NIGHT: u8 = 3;
    pub const ALT_AT_DAY: u8 = 4;
    pub const PWR_AT_DAY: u8 = 5;
}

/// [`cmd::DAYNIGHT_STATE`] offset flag: include the work nibble.
pub const DAYNIGHT_SHOW_WORK: u8 = 0x20;
/// [`cmd::DAYNIGHT_STATE`] offset flag: clear the work nibble after reading.
pub const DAYNIGHT_CLEAR_WORK: u8 = 0x10;
/// Work nibble bit set when night work is due.
pub const NIGHT_WORK_BIT: u8 = 0x80;
/// Work nibble bit set when day work is due.
pub const DAY_WORK_BIT: u8 = 0x40;

/// Manager ADC channels.
pub mod channel {
    /// Number of ADC channels.
    pub const COUNT: u8 = 8;
    pub const ALT_I: u8 = 0;
    pub const ALT_V: u8 = 1;
    pub const PWR_I: u8 = 6;
    pub const PWR_V: u8 = 7;
}

/// Application status bit: the last status poll failed on the bus.
pub const STATUS_TWI_FAIL: u8 = 0x02;

/// Width of a register value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Width {
    U8 = 1,
    U16 = 2,
    U32 = 4,
}

impl Width {
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Largest value representable at this width.
    pub const fn max(self) -> u32 {
        match self {
            Self::U8 => 0xFF,
            Self::U16 => 0xFFFF,
            Self::U32 => u32::MAX,
        }
    }

    /// Write `value` big-endian into the first `self.bytes()` of `out`.
    pub fn put(self, value: u32, out: &mut [u8]) {
        let be = value.to_be_bytes();
        out[..self.bytes()].copy_from_slice(&be[4 - self.bytes()..]);
    }

    /// Read a big-endian value from the first `self.bytes()` of `bytes`.
    pub fn get(self, bytes: &[u8]) -> u32 {
        bytes[..self.bytes()]
            .iter()
            .fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
    }
}

/// Total frame size of a register access at `width`.
pub const fn frame_len(width: Width) -> usize {
    2 + width.bytes()
}

/// A decoded register request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub command: u8,
    /// Offset with the RW flag removed.
    pub offset: u8,
    pub write: bool,
    /// Value bytes following the offset (may be empty for reads).
    pub value: u32,
}

impl Request {
    /// Split a received frame.  Needs at least command and offset; the
    /// value is whatever big-endian bytes follow, up to four.
    pub fn decode(frame: &[u8]) -> Option<Self> {
        let (&command, rest) = frame.split_first()?;
        let (&raw_offset, value_bytes) = rest.split_first()?;
        if value_bytes.len() > 4 {
            return None;
        }
        let value = value_bytes
            .iter()
            .fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
        Some(Self {
            command,
            offset: raw_offset & OFFSET_MASK,
            write: raw_offset & RW_WRITE_BIT != 0,
            value,
        })
    }
}

/// Build the write half of a register access.
pub fn encode_request(command: u8, offset: u8, width: Width, write: Option<u32>) -> ([u8; 6], usize) {
    let mut frame = [0u8; 6];
    frame[0] = command;
    frame[1] = (offset & OFFSET_MASK) | if write.is_some() { RW_WRITE_BIT } else { RW_READ_BIT };
    width.put(write.unwrap_or(0), &mut frame[2..]);
    (frame, frame_len(width))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_put_get_is_big_endian() {
        let mut out = [0u8; 4];
        Width::U16.put(0x1234, &mut out);
        assert_eq!(&out[..2], &[0x12, 0x34]);
        assert_eq!(Width::U16.get(&out), 0x1234);

        Width::U32.put(18_000, &mut out);
        assert_eq!(out, [0x00, 0x00, 0x46, 0x50]);
    }

    #[test]
    fn decode_write_request() {
        let req = Request::decode(&[cmd::EVENING_THRESHOLD, RW_WRITE_BIT, 0x01, 0x2C]).unwrap();
        assert_eq!(req.command, cmd::EVENING_THRESHOLD);
        assert_eq!(req.offset, 0);
        assert!(req.write);
        assert_eq!(req.value, 300);
    }

    #[test]
    fn decode_rejects_truncated_frames() {
        assert!(Request::decode(&[]).is_none());
        assert!(Request::decode(&[cmd::STATUS_READ]).is_none());
        assert!(Request::decode(&[0, 0, 1, 2, 3, 4, 5]).is_none());
    }

    #[test]
    fn encode_read_request_has_zero_value() {
        let (frame, len) = encode_request(cmd::SHUTDOWN_UL, shutdown_ul::DELAY, Width::U32, None);
        assert_eq!(len, 6);
        assert_eq!(&frame[..len], &[cmd::SHUTDOWN_UL, 1, 0, 0, 0, 0]);
    }
}
