//! Streaming field-by-field reports.
//!
//! A report is a fixed list of named fields printed as one JSON object:
//!
//! ```text
//! {"hs_state":"0x0","hs_halt_curr":"100",...,"hs_timer":"0"}\r\n
//! ```
//!
//! Each poll emits at most one field.  Remote fields are fetched with a
//! [`RegisterAccess`] that is advanced one bus step per poll; a failed
//! access prints `"err<code>"` in place of the value and the report
//! carries on.  After the closing brace the report waits out its repeat
//! delay and starts again, until [`interrupt`](StreamingReport::interrupt)
//! stops it.

use core::fmt::Write;

use super::write_err;
use crate::protocol::Width;
use crate::twi::access::{LoopState, RegisterAccess};
use crate::twi::master::{TwiMaster, TwiPeripheral};

/// How a remote value is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Hex,
    Decimal,
}

/// Where a field's value comes from.
pub enum FieldSource<C: 'static> {
    /// Application-side value, printed as hex.
    Local(fn(&C) -> u32),
    /// Manager register read.
    Remote {
        command: u8,
        offset: u8,
        width: Width,
        format: Format,
    },
}

pub struct ReportField<C: 'static> {
    pub name: &'static str,
    pub source: FieldSource<C>,
}

/// Where the report is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPhase {
    Stopped,
    /// Next field to print.
    Field(usize),
    Closing,
    /// Waiting for the repeat delay.
    Waiting,
}

pub struct StreamingReport<C: 'static> {
    manager: u8,
    fields: &'static [ReportField<C>],
    repeat_ms: u32,
    started_ms: u32,
    phase: ReportPhase,
    access: Option<RegisterAccess>,
    stopping: bool,
}

impl<C: 'static> StreamingReport<C> {
    pub fn new(manager: u8, fields: &'static [ReportField<C>], repeat_ms: u32) -> Self {
        Self {
            manager,
            fields,
            repeat_ms,
            started_ms: 0,
            phase: ReportPhase::Stopped,
            access: None,
            stopping: false,
        }
    }

    pub fn phase(&self) -> ReportPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase != ReportPhase::Stopped
    }

    /// Begin a new report cycle at `now_ms`.  Ignored while a bus access
    /// of an interrupted cycle is still completing.
    pub fn start(&mut self, now_ms: u32) {
        if self.access.is_some() {
            return;
        }
        self.started_ms = now_ms;
        self.stopping = false;
        self.phase = ReportPhase::Field(0);
    }

    /// Stop after any in-flight access completes, so the bus is never
    /// left held mid-transaction.
    pub fn interrupt(&mut self) {
        if self.access.is_some() {
            self.stopping = true;
        } else {
            self.phase = ReportPhase::Stopped;
        }
    }

    /// Advance by at most one field (and at most one bus operation).
    pub fn poll<P, W>(
        &mut self,
        now_ms: u32,
        bus: &mut TwiMaster<P>,
        ctx: &C,
        out: &mut W,
    ) -> Result<ReportPhase, core::fmt::Error>
    where
        P: TwiPeripheral,
        W: Write,
    {
        if let Some(access) = self.access.as_mut() {
            if access.poll(bus) == LoopState::Done {
                self.finish_remote(out)?;
            }
            return Ok(self.phase);
        }

        let fields = self.fields;
        match self.phase {
            ReportPhase::Stopped => {}
            ReportPhase::Field(i) => match fields.get(i) {
                None => self.phase = ReportPhase::Closing,
                Some(field) => match field.source {
                    FieldSource::Local(read) => {
                        self.open_field(i, out)?;
                        write!(out, "\"0x{:X}\"", read(ctx))?;
                        self.phase = ReportPhase::Field(i + 1);
                    }
                    FieldSource::Remote {
                        command,
                        offset,
                        width,
                        ..
                    } => {
                        let mut access = RegisterAccess::read(self.manager, command, offset, width);
                        let state = access.poll(bus);
                        self.access = Some(access);
                        if state == LoopState::Done {
                            self.finish_remote(out)?;
                        }
                    }
                },
            },
            ReportPhase::Closing => {
                if self.fields.is_empty() {
                    out.write_char('{')?;
                }
                out.write_str("}\r\n")?;
                self.phase = ReportPhase::Waiting;
            }
            ReportPhase::Waiting => {
                if now_ms.wrapping_sub(self.started_ms) > self.repeat_ms {
                    self.started_ms = self.started_ms.wrapping_add(self.repeat_ms);
                    self.phase = ReportPhase::Field(0);
                }
            }
        }
        Ok(self.phase)
    }

    fn open_field<W: Write>(&self, i: usize, out: &mut W) -> core::fmt::Result {
        out.write_char(if i == 0 { '{' } else { ',' })?;
        write!(out, "\"{}\":", self.fields[i].name)
    }

    fn finish_remote<W: Write>(&mut self, out: &mut W) -> core::fmt::Result {
        let Some(access) = self.access.take() else {
            return Ok(());
        };
        if self.stopping {
            self.stopping = false;
            self.phase = ReportPhase::Stopped;
            return Ok(());
        }
        let ReportPhase::Field(i) = self.phase else {
            return Ok(());
        };
        let format = match self.fields[i].source {
            FieldSource::Remote { format, .. } => format,
            FieldSource::Local(_) => Format::Hex,
        };
        self.open_field(i, out)?;
        match access.result() {
            Some(Ok(v)) if format == Format::Hex => write!(out, "\"0x{:X}\"", v)?,
            Some(Ok(v)) => write!(out, "\"{}\"", v)?,
            Some(Err(e)) => write_err(out, e)?,
            None => out.write_str("\"\"")?,
        }
        self.phase = ReportPhase::Field(i + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim_bus::{SimBus, SimPort};
    use crate::twi::slave::TwiSlave;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct View {
        state: u8,
    }

    fn view_state(v: &View) -> u32 {
        u32::from(v.state)
    }

    static FIELDS: [ReportField<View>; 2] = [
        ReportField {
            name: "state",
            source: FieldSource::Local(view_state),
        },
        ReportField {
            name: "reg",
            source: FieldSource::Remote {
                command: 21,
                offset: 0,
                width: Width::U16,
                format: Format::Decimal,
            },
        },
    ];

    /// Slave answering command 21 with 300.
    fn manager(bus: &SimBus) {
        let slave = Rc::new(RefCell::new(TwiSlave::new(0x29)));
        slave.borrow_mut().register_transmit(|tx| {
            let _ = tx.extend_from_slice(&[21, 0, 0x01, 0x2C]);
        });
        bus.attach(slave);
    }

    fn run_cycle(report: &mut StreamingReport<View>, m: &mut TwiMaster<SimPort>) -> String {
        let mut out = String::new();
        let view = View { state: 0x0B };
        for _ in 0..100 {
            if report.poll(0, m, &view, &mut out).unwrap() == ReportPhase::Waiting {
                break;
            }
        }
        out
    }

    #[test]
    fn prints_local_and_remote_fields() {
        let bus = SimBus::new();
        manager(&bus);
        let mut m = TwiMaster::new(bus.port());
        let mut report = StreamingReport::new(0x29, &FIELDS, 1_000);
        report.start(0);
        assert_eq!(run_cycle(&mut report, &mut m), "{\"state\":\"0xB\",\"reg\":\"300\"}\r\n");
    }

    #[test]
    fn failing_field_prints_error_code() {
        let bus = SimBus::new();
        let mut m = TwiMaster::new(bus.port());
        let mut report = StreamingReport::new(0x29, &FIELDS, 1_000);
        report.start(0);
        assert_eq!(run_cycle(&mut report, &mut m), "{\"state\":\"0xB\",\"reg\":\"err2\"}\r\n");
    }

    #[test]
    fn repeats_after_delay() {
        let bus = SimBus::new();
        manager(&bus);
        let mut m = TwiMaster::new(bus.port());
        let mut report = StreamingReport::new(0x29, &FIELDS, 1_000);
        report.start(0);
        run_cycle(&mut report, &mut m);

        let view = View { state: 1 };
        let mut out = String::new();
        assert_eq!(report.poll(1_000, &mut m, &view, &mut out).unwrap(), ReportPhase::Waiting);
        assert_eq!(report.poll(1_001, &mut m, &view, &mut out).unwrap(), ReportPhase::Field(0));
    }

    #[test]
    fn interrupt_lets_access_finish() {
        let bus = SimBus::new();
        manager(&bus);
        let mut m = TwiMaster::new(bus.port());
        let mut report = StreamingReport::new(0x29, &FIELDS, 1_000);
        let view = View { state: 1 };
        let mut out = String::new();
        report.start(0);
        report.poll(0, &mut m, &view, &mut out).unwrap();
        report.poll(0, &mut m, &view, &mut out).unwrap();
        report.interrupt();
        assert!(report.is_running());
        for _ in 0..50 {
            report.poll(0, &mut m, &view, &mut out).unwrap();
        }
        assert_eq!(report.phase(), ReportPhase::Stopped);
        assert!(!m.is_in_use());
        assert_eq!(out, "{\"state\":\"0x1\"");
    }
}
