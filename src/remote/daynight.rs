//! Day/night client on the application controller.
//!
//! The manager pushes state notifications to the application's slave as
//! `[route, value]` frames; [`DayNightClient::handle_event`] consumes
//! them.  The client can also poll the manager for the state and its
//! work nibble, run the attached work handlers and clear the nibble, and
//! stream the `Day` report.
//!
//! ```text
//!   manager ──[route,value]──▶ app slave ──▶ handle_event()
//!   app ──cmd 23 (0x20)──▶ manager   work bits? ──▶ handlers ──▶ cmd 23 (0x10)
//! ```

use core::fmt::{self, Write};

use log::{debug, info, warn};

use super::Progress;
use super::report::{FieldSource, Format, ReportField, ReportPhase, StreamingReport};
use crate::fsm::DayNightState;
use crate::protocol::{
    DAY_WORK_BIT, DAYNIGHT_CLEAR_WORK, DAYNIGHT_SHOW_WORK, NIGHT_WORK_BIT, STATUS_TWI_FAIL, Width,
    channel, cmd,
};
use crate::twi::access::{LoopState, RegisterAccess};
use crate::twi::master::{TwiMaster, TwiPeripheral};

/// Work handler attached with [`DayNightClient::attach_day_work`] or
/// [`DayNightClient::attach_night_work`].
pub type WorkFn = Box<dyn FnMut()>;

/// Routes the manager is told to use when notifying this application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRoutes {
    /// This application's own bus address.
    pub address: u8,
    pub state_route: u8,
    pub day_work_route: u8,
    pub night_work_route: u8,
}

/// Values the `Day` report prints from the application side.
#[derive(Debug, Clone, Copy, Default)]
pub struct DayNightView {
    pub state: u8,
    pub mgr_status: u8,
}

fn view_state(v: &DayNightView) -> u32 {
    u32::from(v.state)
}

fn view_mgr_status(v: &DayNightView) -> u32 {
    u32::from(v.mgr_status)
}

const fn remote(command: u8, offset: u8, width: Width) -> FieldSource<DayNightView> {
    FieldSource::Remote {
        command,
        offset,
        width,
        format: Format::Decimal,
    }
}

static DAY_FIELDS: [ReportField<DayNightView>; 8] = [
    ReportField {
        name: "state",
        source: FieldSource::Local(view_state),
    },
    ReportField {
        name: "mgr_status",
        source: FieldSource::Local(view_mgr_status),
    },
    ReportField {
        name: "mor_threshold",
        source: remote(cmd::MORNING_THRESHOLD, 0, Width::U16),
    },
    ReportField {
        name: "eve_threshold",
        source: remote(cmd::EVENING_THRESHOLD, 0, Width::U16),
    },
    ReportField {
        name: "adc_alt_v",
        source: remote(cmd::ANALOG_READ, channel::ALT_V, Width::U16),
    },
    ReportField {
        name: "mor_debounce",
        source: remote(cmd::MORNING_DEBOUNCE, 0, Width::U32),
    },
    ReportField {
        name: "eve_debounce",
        source: remote(cmd::EVENING_DEBOUNCE, 0, Width::U32),
    },
    ReportField {
        name: "dn_timer",
        source: remote(cmd::DAYNIGHT_TIMER, 0, Width::U32),
    },
];

/// Manager register operation in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    ReadState,
    ClearWork,
    ReadStatus,
    /// Index into the route registers 24..=27.
    SetupRoute(u8),
}

pub struct DayNightClient {
    manager: u8,
    routes: ClientRoutes,
    view: DayNightView,
    day_work: Option<WorkFn>,
    night_work: Option<WorkFn>,
    pending: Option<(Op, RegisterAccess)>,
    report: StreamingReport<DayNightView>,
}

impl DayNightClient {
    pub fn new(manager: u8, routes: ClientRoutes, report_repeat_ms: u32) -> Self {
        Self {
            manager,
            routes,
            view: DayNightView::default(),
            day_work: None,
            night_work: None,
            pending: None,
            report: StreamingReport::new(manager, &DAY_FIELDS, report_repeat_ms),
        }
    }

    pub fn attach_day_work(&mut self, f: impl FnMut() + 'static) {
        self.day_work = Some(Box::new(f));
    }

    pub fn attach_night_work(&mut self, f: impl FnMut() + 'static) {
        self.night_work = Some(Box::new(f));
    }

    /// Last state learned from the manager (raw wire value).
    pub fn state_raw(&self) -> u8 {
        self.view.state
    }

    pub fn state(&self) -> Option<DayNightState> {
        DayNightState::from_wire(self.view.state)
    }

    /// Last manager status byte; `0x02` after a failed poll.
    pub fn manager_status(&self) -> u8 {
        self.view.mgr_status
    }

    pub fn routes(&self) -> ClientRoutes {
        self.routes
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    fn run_day_work(&mut self) {
        if let Some(f) = self.day_work.as_mut() {
            f();
        }
    }

    fn run_night_work(&mut self) {
        if let Some(f) = self.night_work.as_mut() {
            f();
        }
    }

    // ── Notifications from the manager ────────────────────────

    /// Handle one frame received on the application's slave.  Returns
    /// `true` when the frame carried one of our routes.
    pub fn handle_event(&mut self, frame: &[u8]) -> bool {
        let [route, value] = *frame else {
            debug!("DAYNIGHT: ignoring {}-byte frame", frame.len());
            return false;
        };
        if route == 0 {
            return false;
        }
        if route == self.routes.state_route {
            info!("DAYNIGHT: manager reports 0x{:02X}", value);
            self.view.state = value;
        } else if route == self.routes.night_work_route {
            self.run_night_work();
        } else if route == self.routes.day_work_route {
            self.run_day_work();
        } else {
            return false;
        }
        true
    }

    // ── Polled register operations ────────────────────────────

    fn begin(&mut self, op: Op, access: RegisterAccess) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some((op, access));
        true
    }

    /// Queue a read of the state with its work nibble.  `false` while
    /// another operation is pending.
    pub fn check_state(&mut self) -> bool {
        let access = RegisterAccess::read(self.manager, cmd::DAYNIGHT_STATE, DAYNIGHT_SHOW_WORK, Width::U8);
        self.begin(Op::ReadState, access)
    }

    /// Queue a read of the manager status byte.
    pub fn check_status(&mut self) -> bool {
        let access = RegisterAccess::read(self.manager, cmd::STATUS_READ, 0, Width::U8);
        self.begin(Op::ReadStatus, access)
    }

    /// Queue writes of our address and routes into the manager's
    /// callback registers.
    pub fn setup_routes(&mut self) -> bool {
        let access = self.route_write(0);
        self.begin(Op::SetupRoute(0), access)
    }

    fn route_write(&self, index: u8) -> RegisterAccess {
        let value = match index {
            0 => self.routes.address,
            1 => self.routes.state_route,
            2 => self.routes.day_work_route,
            _ => self.routes.night_work_route,
        };
        RegisterAccess::write(
            self.manager,
            cmd::CALLBACK_ADDRESS + index,
            0,
            Width::U8,
            u32::from(value),
        )
    }

    /// Advance the pending operation by at most one bus step.
    pub fn poll<P: TwiPeripheral>(&mut self, bus: &mut TwiMaster<P>) -> Progress {
        let Some((op, access)) = self.pending.as_mut() else {
            return Progress::Done;
        };
        if access.poll(bus) != LoopState::Done {
            return Progress::Pending;
        }
        let op = *op;
        let result = access.result();
        self.pending = None;

        match (op, result) {
            (Op::ReadState, Some(Ok(v))) => {
                let value = v as u8;
                if value & 0xF0 != 0 {
                    if value & NIGHT_WORK_BIT != 0 {
                        self.run_night_work();
                    }
                    if value & DAY_WORK_BIT != 0 {
                        self.run_day_work();
                    }
                    let clear =
                        RegisterAccess::read(self.manager, cmd::DAYNIGHT_STATE, DAYNIGHT_CLEAR_WORK, Width::U8);
                    self.pending = Some((Op::ClearWork, clear));
                }
                self.view.state = value & 0x0F;
            }
            (Op::ClearWork, Some(Ok(v))) => self.view.state = v as u8 & 0x0F,
            (Op::ReadStatus, Some(Ok(v))) => self.view.mgr_status = v as u8,
            (Op::ReadStatus, _) => self.view.mgr_status = STATUS_TWI_FAIL,
            (Op::SetupRoute(i), Some(Ok(_))) if i < 3 => {
                let next = self.route_write(i + 1);
                self.pending = Some((Op::SetupRoute(i + 1), next));
            }
            (Op::SetupRoute(_), Some(Ok(_))) => info!("DAYNIGHT: callback routes installed"),
            (op, Some(Err(e))) => warn!("DAYNIGHT: {:?} failed: {}", op, e),
            (_, _) => {}
        }
        if self.pending.is_some() {
            Progress::Pending
        } else {
            Progress::Done
        }
    }

    // ── Day report ────────────────────────────────────────────

    pub fn start_report(&mut self, now_ms: u32) {
        self.report.start(now_ms);
    }

    pub fn interrupt_report(&mut self) {
        self.report.interrupt();
    }

    pub fn report_running(&self) -> bool {
        self.report.is_running()
    }

    pub fn poll_report<P: TwiPeripheral>(
        &mut self,
        now_ms: u32,
        bus: &mut TwiMaster<P>,
        out: &mut impl Write,
    ) -> Result<ReportPhase, fmt::Error> {
        let view = self.view;
        self.report.poll(now_ms, bus, &view, out)
    }
}
