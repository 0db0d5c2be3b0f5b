//! Day/night controller: the state table plus its bus-facing duties.
//!
//! The controller owns every piece of day/night state (the engine, its
//! context, the listener registration table and the in-flight
//! notification).  The bus master, the analog inputs and the event sink
//! are injected per tick.

use log::{debug, info, warn};

use super::context::{DayNightContext, EnergySnapshot, Notify};
use super::{DayNightState, Fsm, states};
use crate::app::events::AppEvent;
use crate::app::ports::{AnalogPort, EnergyPort, EventSink};
use crate::config::{DayNightLimits, FailReport};
use crate::protocol::channel;
use crate::twi::access::EventNotify;
use crate::twi::master::{TwiMaster, TwiPeripheral};

/// Listener registration table.  A zero address or route disables the
/// corresponding notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallbackRoutes {
    pub address: u8,
    pub route: u8,
    pub day_work_route: u8,
    pub night_work_route: u8,
}

impl CallbackRoutes {
    /// Route for `n`, if that notification is enabled.
    fn route_for(&self, n: Notify) -> Option<u8> {
        let route = match n {
            Notify::Remote(_) => self.route,
            Notify::NightWork => self.night_work_route,
            Notify::DayWork => self.day_work_route,
        };
        (self.address != 0 && route != 0).then_some(route)
    }
}

/// What happened during one [`DayNightController::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Skipped: bus busy elsewhere, limits being saved, or our own
    /// notification still in flight.
    Deferred,
    /// The machine ran (possibly without a transition).
    Ran,
    /// A poke was serviced instead of a normal tick.
    Poked,
}

pub struct DayNightController {
    fsm: Fsm,
    ctx: DayNightContext,
    routes: CallbackRoutes,
    poke: bool,
    in_flight: Option<EventNotify>,
}

impl DayNightController {
    /// Build the machine in `Start` with its settle timer at `now_ms`.
    pub fn new(limits: DayNightLimits, fail_report: FailReport, now_ms: u32) -> Self {
        let mut ctx = DayNightContext::new(limits, fail_report);
        ctx.now_ms = now_ms;
        let mut fsm = Fsm::new(states::build_state_table(), DayNightState::Start);
        fsm.start(&mut ctx);
        Self {
            fsm,
            ctx,
            routes: CallbackRoutes::default(),
            poke: false,
            in_flight: None,
        }
    }

    pub fn state(&self) -> DayNightState {
        self.fsm.current_state()
    }

    pub fn context(&self) -> &DayNightContext {
        &self.ctx
    }

    pub fn routes(&self) -> &CallbackRoutes {
        &self.routes
    }

    pub fn routes_mut(&mut self) -> &mut CallbackRoutes {
        &mut self.routes
    }

    pub fn set_limits(&mut self, limits: DayNightLimits) {
        self.ctx.limits = limits;
    }

    /// Ask for the current state to be re-delivered on the next tick.
    pub fn request_poke(&mut self) {
        self.poke = true;
    }

    pub fn poke_pending(&self) -> bool {
        self.poke
    }

    /// Milliseconds in the current state as of `now_ms`.
    pub fn time_in_state(&self, now_ms: u32) -> u32 {
        now_ms.wrapping_sub(self.ctx.state_timer)
    }

    pub fn work_flags(&self) -> u8 {
        self.ctx.work_flags
    }

    pub fn clear_work_flags(&mut self) {
        self.ctx.work_flags = 0;
    }

    pub fn energy_at_night(&self) -> EnergySnapshot {
        self.ctx.at_night
    }

    pub fn energy_at_day(&self) -> EnergySnapshot {
        self.ctx.at_day
    }

    /// `true` while a notification is still being delivered.
    pub fn notify_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// One pass of the cooperative loop.
    ///
    /// `limits_saving` is the deferred-persistence guard: while limits are
    /// being written the machine must not run on half-updated values.
    pub fn tick<P, H, S>(
        &mut self,
        now_ms: u32,
        bus: &mut TwiMaster<P>,
        hw: &mut H,
        limits_saving: bool,
        sink: &mut S,
    ) -> TickOutcome
    where
        P: TwiPeripheral,
        H: AnalogPort + EnergyPort,
        S: EventSink,
    {
        if self.in_flight.is_some() {
            self.advance_notify(bus, sink);
            return TickOutcome::Deferred;
        }
        if bus.is_in_use() || limits_saving {
            return TickOutcome::Deferred;
        }

        self.ctx.now_ms = now_ms;

        if self.poke {
            self.poke = false;
            let state = self.state();
            info!("DAYNIGHT: poke, re-sending {}", state);
            self.dispatch(Notify::Remote(state), bus, sink);
            if state == DayNightState::Fail {
                self.fsm.force_transition(DayNightState::Start, &mut self.ctx);
                sink.emit(&AppEvent::DayNightChanged {
                    from: DayNightState::Fail,
                    to: DayNightState::Start,
                });
            }
            return TickOutcome::Poked;
        }

        self.ctx.light = hw.read_channel(channel::ALT_V);
        self.ctx.energy = EnergySnapshot {
            alt: hw.alt_accumulated(),
            pwr: hw.pwr_accumulated(),
        };

        let from = self.state();
        if let Some(to) = self.fsm.tick(&mut self.ctx) {
            sink.emit(&AppEvent::DayNightChanged { from, to });
        }

        if self.ctx.clear_charge_time {
            self.ctx.clear_charge_time = false;
            hw.clear_charge_time();
        }

        if let Some(n) = self.ctx.outbox.take() {
            self.dispatch(n, bus, sink);
        }
        TickOutcome::Ran
    }

    /// Start delivering `n` if its route is enabled; the first bus step
    /// happens now.
    fn dispatch<P: TwiPeripheral, S: EventSink>(
        &mut self,
        n: Notify,
        bus: &mut TwiMaster<P>,
        sink: &mut S,
    ) {
        let Some(route) = self.routes.route_for(n) else {
            debug!("DAYNIGHT: {:?} not routed", n);
            return;
        };
        let value = match n {
            Notify::Remote(state) => state as u8,
            Notify::NightWork => DayNightState::NightWork as u8,
            Notify::DayWork => DayNightState::DayWork as u8,
        };
        self.in_flight = Some(EventNotify::new(self.routes.address, route, value));
        self.advance_notify(bus, sink);
    }

    fn advance_notify<P: TwiPeripheral, S: EventSink>(
        &mut self,
        bus: &mut TwiMaster<P>,
        sink: &mut S,
    ) {
        let Some(notify) = self.in_flight.as_mut() else {
            return;
        };
        notify.poll(bus);
        let Some(result) = notify.result() else {
            return;
        };
        let (address, route, value) = (notify.address(), notify.route(), notify.value());
        self.in_flight = None;
        match result {
            Ok(()) => sink.emit(&AppEvent::NotifySent {
                address,
                route,
                value,
            }),
            Err(e) => {
                warn!(
                    "DAYNIGHT: notify 0x{:02X} route {} failed: {}",
                    address, route, e
                );
                sink.emit(&AppEvent::NotifyFailed {
                    address,
                    route,
                    code: e.code(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::hardware::SimBoard;
    use crate::adapters::sim_bus::{SimBus, SimPort};
    use crate::twi::slave::TwiSlave;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder(Vec<AppEvent>);

    impl EventSink for Recorder {
        fn emit(&mut self, event: &AppEvent) {
            self.0.push(*event);
        }
    }

    struct Rig {
        ctl: DayNightController,
        bus: TwiMaster<SimPort>,
        board: SimBoard,
        sink: Recorder,
        frames: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    fn rig() -> Rig {
        let sim = SimBus::new();
        let frames = Rc::new(RefCell::new(Vec::new()));
        let listener = Rc::new(RefCell::new(TwiSlave::new(0x2A)));
        let log = frames.clone();
        listener
            .borrow_mut()
            .register_receive(move |f| log.borrow_mut().push(f.to_vec()));
        sim.attach(listener);

        let limits = DayNightLimits {
            evening_threshold: 300,
            morning_threshold: 400,
            evening_debounce_ms: 5000,
            morning_debounce_ms: 5000,
        };
        let mut ctl = DayNightController::new(limits, FailReport::Once, 0);
        *ctl.routes_mut() = CallbackRoutes {
            address: 0x2A,
            route: 1,
            day_work_route: 2,
            night_work_route: 3,
        };
        Rig {
            ctl,
            bus: TwiMaster::new(sim.port()),
            board: SimBoard::new(),
            sink: Recorder::default(),
            frames,
        }
    }

    impl Rig {
        /// Tick at `now` and keep ticking (same time) until the notify lands.
        fn run(&mut self, now: u32, light: u16) {
            self.board.set_light(light);
            self.ctl
                .tick(now, &mut self.bus, &mut self.board, false, &mut self.sink);
            for _ in 0..16 {
                if !self.ctl.notify_in_flight() {
                    break;
                }
                self.ctl
                    .tick(now, &mut self.bus, &mut self.board, false, &mut self.sink);
            }
        }
    }

    #[test]
    fn settled_bright_start_notifies_day() {
        let mut r = rig();
        r.run(12_000, 500);
        assert_eq!(r.ctl.state(), DayNightState::Day);
        assert_eq!(*r.frames.borrow(), vec![vec![1, DayNightState::Day as u8]]);
        assert!(r.sink.0.contains(&AppEvent::NotifySent {
            address: 0x2A,
            route: 1,
            value: 1
        }));
    }

    #[test]
    fn in_flight_notify_defers_the_machine() {
        let mut r = rig();
        r.board.set_light(500);
        r.ctl
            .tick(12_000, &mut r.bus, &mut r.board, false, &mut r.sink);
        assert!(r.ctl.notify_in_flight());
        r.board.set_light(100);
        let out = r
            .ctl
            .tick(12_001, &mut r.bus, &mut r.board, false, &mut r.sink);
        assert_eq!(out, TickOutcome::Deferred);
        assert_eq!(r.ctl.state(), DayNightState::Day);
    }

    #[test]
    fn saving_limits_skips_tick() {
        let mut r = rig();
        r.board.set_light(500);
        let out = r
            .ctl
            .tick(12_000, &mut r.bus, &mut r.board, true, &mut r.sink);
        assert_eq!(out, TickOutcome::Deferred);
        assert_eq!(r.ctl.state(), DayNightState::Start);
    }

    #[test]
    fn evening_sequence_sends_one_night_work_event() {
        let mut r = rig();
        r.run(12_000, 500);
        r.run(20_000, 200);
        r.run(25_001, 200);
        r.run(25_002, 200);
        r.run(26_000, 200);
        assert_eq!(r.ctl.state(), DayNightState::Night);
        let frames = r.frames.borrow();
        let night_work: Vec<_> = frames.iter().filter(|f| f[0] == 3).collect();
        assert_eq!(night_work, vec![&vec![3, DayNightState::NightWork as u8]]);
        assert!(frames.contains(&vec![1, DayNightState::Night as u8]));
    }

    #[test]
    fn zero_route_suppresses_notification() {
        let mut r = rig();
        r.ctl.routes_mut().route = 0;
        r.run(12_000, 500);
        assert_eq!(r.ctl.state(), DayNightState::Day);
        assert!(r.frames.borrow().is_empty());
    }

    #[test]
    fn missing_listener_reports_failure_and_moves_on() {
        let mut r = rig();
        r.ctl.routes_mut().address = 0x33;
        r.run(12_000, 500);
        assert!(!r.ctl.notify_in_flight());
        assert!(r.sink.0.contains(&AppEvent::NotifyFailed {
            address: 0x33,
            route: 1,
            code: 2
        }));
    }

    #[test]
    fn poke_restarts_failed_machine() {
        let mut r = rig();
        r.run(12_000, 500);
        r.run(12_000 + 72_000_001, 500);
        assert_eq!(r.ctl.state(), DayNightState::Fail);
        r.frames.borrow_mut().clear();

        r.ctl.request_poke();
        r.run(80_000_000, 500);
        assert_eq!(r.ctl.state(), DayNightState::Start);
        assert_eq!(*r.frames.borrow(), vec![vec![1, DayNightState::Fail as u8]]);
        assert!(!r.ctl.context().fail_reported);

        // Settle delay applies again from the restart.
        r.run(80_005_000, 500);
        assert_eq!(r.ctl.state(), DayNightState::Start);
        r.run(80_011_000, 500);
        assert_eq!(r.ctl.state(), DayNightState::Day);
    }

    #[test]
    fn day_work_clears_charge_timer() {
        let mut r = rig();
        r.board.set_channel(channel::ALT_I, 10);
        r.board.accumulate(1000);
        r.run(12_000, 100);
        r.run(13_000, 500);
        r.run(18_001, 500);
        r.run(18_002, 500);
        assert_eq!(r.ctl.state(), DayNightState::Day);
        assert_eq!(r.board.charge_time_ms(), 0);
        assert_eq!(r.ctl.energy_at_day().alt, 10);
    }
}
