//! Host shutdown control from the application controller.
//!
//! - [`EnableShutdown`] toggles the manager's host power sequencer.
//! - [`ShutdownReport`] streams the sequencer's limits and progress.
//! - [`LimitCommand`] sets (optionally) and reads back one limit.
//!
//! All three are polled from the cooperative loop; each poll performs at
//! most one bus operation.

use core::fmt::{self, Write};

use super::report::{FieldSource, Format, ReportField, ReportPhase, StreamingReport};
use super::{Progress, write_err};
use crate::config::ADC_MAX;
use crate::host_shutdown::{HostRequest, HostShutdownState};
use crate::protocol::{SHUTDOWN_HALT_CURR_OFFSET, Width, channel, cmd, shutdown_ul};
use crate::twi::access::{LoopState, RegisterAccess};
use crate::twi::master::{TwiMaster, TwiPeripheral};

// ───────────────────────────────────────────────────────────────
// EnableShutdown
// ───────────────────────────────────────────────────────────────

enum EnableStep {
    ReadState(RegisterAccess),
    Toggle(RegisterAccess, HostRequest),
    Finished,
}

/// Read the host state and request the opposite stable state.
///
/// Prints `{"hs_en":"DOWN"}` or `{"hs_en":"UP"}`; a sequence already in
/// progress prints `{"hs_en":"BUSY"}` and changes nothing.
pub struct EnableShutdown {
    manager: u8,
    step: EnableStep,
}

impl EnableShutdown {
    pub fn new(manager: u8) -> Self {
        Self {
            manager,
            step: EnableStep::ReadState(RegisterAccess::read(
                manager,
                cmd::SHUTDOWN_DETECT,
                0,
                Width::U8,
            )),
        }
    }

    pub fn poll<P: TwiPeripheral>(
        &mut self,
        bus: &mut TwiMaster<P>,
        out: &mut impl Write,
    ) -> Result<Progress, fmt::Error> {
        match &mut self.step {
            EnableStep::Finished => return Ok(Progress::Done),
            EnableStep::ReadState(access) => {
                if access.poll(bus) != LoopState::Done {
                    return Ok(Progress::Pending);
                }
                let state = match access.result() {
                    Some(Ok(v)) => HostShutdownState::from_wire(v as u8),
                    Some(Err(e)) => {
                        out.write_str("{\"hs_en\":")?;
                        write_err(out, e)?;
                        out.write_str("}\r\n")?;
                        self.step = EnableStep::Finished;
                        return Ok(Progress::Done);
                    }
                    None => None,
                };
                let request = match state {
                    Some(HostShutdownState::Up) => HostRequest::TakeDown,
                    Some(HostShutdownState::Down) => HostRequest::BringUp,
                    _ => {
                        out.write_str("{\"hs_en\":\"BUSY\"}\r\n")?;
                        self.step = EnableStep::Finished;
                        return Ok(Progress::Done);
                    }
                };
                let toggle = RegisterAccess::write(
                    self.manager,
                    cmd::SHUTDOWN_SET,
                    0,
                    Width::U8,
                    request as u32,
                );
                self.step = EnableStep::Toggle(toggle, request);
            }
            EnableStep::Toggle(access, request) => {
                if access.poll(bus) != LoopState::Done {
                    return Ok(Progress::Pending);
                }
                out.write_str("{\"hs_en\":")?;
                match access.result() {
                    Some(Err(e)) => write_err(out, e)?,
                    _ if *request == HostRequest::BringUp => out.write_str("\"UP\"")?,
                    _ => out.write_str("\"DOWN\"")?,
                }
                out.write_str("}\r\n")?;
                self.step = EnableStep::Finished;
                return Ok(Progress::Done);
            }
        }
        Ok(Progress::Pending)
    }
}

// ───────────────────────────────────────────────────────────────
// ShutdownReport
// ───────────────────────────────────────────────────────────────

const fn remote(command: u8, offset: u8, width: Width, format: Format) -> FieldSource<()> {
    FieldSource::Remote {
        command,
        offset,
        width,
        format,
    }
}

static SHUTDOWN_FIELDS: [ReportField<()>; 7] = [
    ReportField {
        name: "hs_state",
        source: remote(cmd::SHUTDOWN_DETECT, 0, Width::U8, Format::Hex),
    },
    ReportField {
        name: "hs_halt_curr",
        source: remote(cmd::SHUTDOWN_INT, SHUTDOWN_HALT_CURR_OFFSET, Width::U16, Format::Decimal),
    },
    ReportField {
        name: "adc_pwr_i",
        source: remote(cmd::ANALOG_READ, channel::PWR_I, Width::U16, Format::Decimal),
    },
    ReportField {
        name: "hs_ttl",
        source: remote(cmd::SHUTDOWN_UL, shutdown_ul::TTL, Width::U32, Format::Decimal),
    },
    ReportField {
        name: "hs_delay",
        source: remote(cmd::SHUTDOWN_UL, shutdown_ul::DELAY, Width::U32, Format::Decimal),
    },
    ReportField {
        name: "hs_wearlv",
        source: remote(cmd::SHUTDOWN_UL, shutdown_ul::WEARLEVEL, Width::U32, Format::Decimal),
    },
    ReportField {
        name: "hs_timer",
        source: remote(cmd::SHUTDOWN_UL, shutdown_ul::KRUNTIME, Width::U32, Format::Decimal),
    },
];

/// Repeating host shutdown status report.
pub struct ShutdownReport {
    inner: StreamingReport<()>,
}

impl ShutdownReport {
    pub fn new(manager: u8, repeat_ms: u32) -> Self {
        Self {
            inner: StreamingReport::new(manager, &SHUTDOWN_FIELDS, repeat_ms),
        }
    }

    pub fn start(&mut self, now_ms: u32) {
        self.inner.start(now_ms);
    }

    pub fn interrupt(&mut self) {
        self.inner.interrupt();
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub fn poll<P: TwiPeripheral>(
        &mut self,
        now_ms: u32,
        bus: &mut TwiMaster<P>,
        out: &mut impl Write,
    ) -> Result<ReportPhase, fmt::Error> {
        self.inner.poll(now_ms, bus, &(), out)
    }
}

// ───────────────────────────────────────────────────────────────
// LimitCommand
// ───────────────────────────────────────────────────────────────

/// A host shutdown limit on the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownLimit {
    HaltCurr,
    Ttl,
    Delay,
    Wearleveling,
}

impl ShutdownLimit {
    fn key(self) -> &'static str {
        match self {
            Self::HaltCurr => "hs_halt_curr",
            Self::Ttl => "hs_ttl",
            Self::Delay => "hs_delay",
            Self::Wearleveling => "hs_wearlv",
        }
    }

    fn register(self) -> (u8, u8, Width) {
        match self {
            Self::HaltCurr => (cmd::SHUTDOWN_INT, SHUTDOWN_HALT_CURR_OFFSET, Width::U16),
            Self::Ttl => (cmd::SHUTDOWN_UL, shutdown_ul::TTL, Width::U32),
            Self::Delay => (cmd::SHUTDOWN_UL, shutdown_ul::DELAY, Width::U32),
            Self::Wearleveling => (cmd::SHUTDOWN_UL, shutdown_ul::WEARLEVEL, Width::U32),
        }
    }

    fn rejection(self) -> &'static str {
        match self {
            Self::HaltCurr => "HSHaltCurrMax 1023",
            Self::Ttl => "HSttl NaN",
            Self::Delay => "HSdelay NaN",
            Self::Wearleveling => "HSwearlv NaN",
        }
    }

    /// Parse a user argument.  The halt current feeds a 10-bit ADC
    /// comparison and must stay below 1024.
    fn parse(self, arg: &str) -> Option<u32> {
        let value: u32 = arg.trim().parse().ok()?;
        match self {
            Self::HaltCurr if value > u32::from(ADC_MAX) => None,
            _ => Some(value),
        }
    }
}

/// An argument that failed validation; nothing was sent to the manager.
///
/// Displays as the error line, e.g. `{"err":"HSttl NaN"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected(pub &'static str);

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{\"err\":\"{}\"}}", self.0)
    }
}

enum LimitStep {
    Open,
    Write(RegisterAccess),
    ReadBack(RegisterAccess),
    Finished,
}

/// Optionally write one limit, then print the value the manager holds.
///
/// The read-back is the authority: the write's outcome is not trusted.
pub struct LimitCommand {
    manager: u8,
    limit: ShutdownLimit,
    value: Option<u32>,
    step: LimitStep,
}

impl LimitCommand {
    /// Validate `arg` up front.  `None` only reads the limit.
    pub fn new(manager: u8, limit: ShutdownLimit, arg: Option<&str>) -> Result<Self, Rejected> {
        let value = match arg {
            Some(a) => Some(limit.parse(a).ok_or(Rejected(limit.rejection()))?),
            None => None,
        };
        Ok(Self {
            manager,
            limit,
            value,
            step: LimitStep::Open,
        })
    }

    fn read_back(&self) -> RegisterAccess {
        let (command, offset, width) = self.limit.register();
        RegisterAccess::read(self.manager, command, offset, width)
    }

    pub fn poll<P: TwiPeripheral>(
        &mut self,
        bus: &mut TwiMaster<P>,
        out: &mut impl Write,
    ) -> Result<Progress, fmt::Error> {
        match &mut self.step {
            LimitStep::Finished => return Ok(Progress::Done),
            LimitStep::Open => {
                write!(out, "{{\"{}\":", self.limit.key())?;
                self.step = match self.value {
                    Some(v) => {
                        let (command, offset, width) = self.limit.register();
                        LimitStep::Write(RegisterAccess::write(self.manager, command, offset, width, v))
                    }
                    None => LimitStep::ReadBack(self.read_back()),
                };
            }
            LimitStep::Write(access) => {
                if access.poll(bus) == LoopState::Done {
                    self.step = LimitStep::ReadBack(self.read_back());
                }
            }
            LimitStep::ReadBack(access) => {
                if access.poll(bus) != LoopState::Done {
                    return Ok(Progress::Pending);
                }
                match access.result() {
                    Some(Ok(v)) => write!(out, "\"{}\"", v)?,
                    Some(Err(e)) => write_err(out, e)?,
                    None => out.write_str("\"\"")?,
                }
                out.write_str("}\r\n")?;
                self.step = LimitStep::Finished;
                return Ok(Progress::Done);
            }
        }
        Ok(Progress::Pending)
    }
}
