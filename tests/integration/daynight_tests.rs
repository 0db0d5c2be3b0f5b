//! Day/night classification end to end: light level on the manager's
//! board, notifications on the bus, handlers on the application.

use std::cell::Cell;
use std::rc::Rc;

use solar_mgr::app::events::AppEvent;
use solar_mgr::app::ports::EnergyPort;
use solar_mgr::fsm::DayNightState;
use solar_mgr::protocol::{DAYNIGHT_SHOW_WORK, Width, accumulation, channel, cmd};
use solar_mgr::remote::daynight::ClientRoutes;
use solar_mgr::remote::report::ReportPhase;
use solar_mgr::twi::access::RegisterAccess;

use crate::mock_hw::{
    APP, BRIGHT, DARK, MANAGER, NIGHT_WORK_ROUTE, Rig, STATE_ROUTE, all_routes, test_config,
};

fn counter() -> (Rc<Cell<u32>>, impl FnMut() + 'static) {
    let n = Rc::new(Cell::new(0));
    let handle = n.clone();
    (n, move || handle.set(handle.get() + 1))
}

// ── Start ─────────────────────────────────────────────────────

#[test]
fn bright_start_settles_then_reports_day() {
    let mut rig = Rig::new();
    rig.set_light(BRIGHT);

    rig.run_until(10_900);
    assert_eq!(rig.manager.service().daynight_state(), DayNightState::Start);
    assert!(rig.sink.sent_on(STATE_ROUTE).is_empty());

    rig.run_until(12_000);
    assert_eq!(rig.manager.service().daynight_state(), DayNightState::Day);
    assert_eq!(rig.sink.sent_on(STATE_ROUTE), [DayNightState::Day as u8]);
    assert_eq!(rig.app.client().state(), Some(DayNightState::Day));
}

#[test]
fn dark_start_reports_night_without_night_work() {
    let mut rig = Rig::new();
    let (night_runs, handler) = counter();
    rig.app.client_mut().attach_night_work(handler);
    rig.set_light(DARK);

    rig.run_until(12_000);
    assert_eq!(rig.manager.service().daynight_state(), DayNightState::Night);
    assert_eq!(rig.app.client().state(), Some(DayNightState::Night));
    assert_eq!(night_runs.get(), 0);
}

// ── Evening ───────────────────────────────────────────────────

#[test]
fn evening_runs_night_work_exactly_once() {
    let mut rig = Rig::new();
    let (night_runs, handler) = counter();
    rig.app.client_mut().attach_night_work(handler);
    rig.to_day();

    rig.set_light(DARK);
    rig.step(1_000);
    assert_eq!(
        rig.manager.service().daynight_state(),
        DayNightState::EveningDebounce
    );

    rig.step(18_000 + 1_000);
    assert_eq!(rig.manager.service().daynight_state(), DayNightState::Night);
    assert_eq!(rig.app.client().state(), Some(DayNightState::Night));
    assert_eq!(night_runs.get(), 1);
    assert_eq!(rig.sink.sent_on(NIGHT_WORK_ROUTE).len(), 1);

    // Staying dark does not repeat the work.
    rig.step(30_000);
    assert_eq!(night_runs.get(), 1);
}

#[test]
fn light_recovering_during_debounce_returns_to_day() {
    let mut rig = Rig::new();
    let (night_runs, handler) = counter();
    rig.app.client_mut().attach_night_work(handler);
    rig.to_day();

    rig.set_light(DARK);
    rig.step(5_000);
    rig.set_light(BRIGHT);
    rig.step(100);

    assert_eq!(rig.manager.service().daynight_state(), DayNightState::Day);
    assert_eq!(rig.app.client().state(), Some(DayNightState::Day));
    assert_eq!(night_runs.get(), 0);
    assert!(rig.sink.events.contains(&AppEvent::DayNightChanged {
        from: DayNightState::EveningDebounce,
        to: DayNightState::Day,
    }));
}

#[test]
fn threshold_equal_to_light_does_not_start_evening() {
    let mut rig = Rig::new();
    rig.to_day();
    rig.set_light(300);
    rig.step(5_000);
    assert_eq!(rig.manager.service().daynight_state(), DayNightState::Day);
}

// ── Morning ───────────────────────────────────────────────────

#[test]
fn morning_runs_day_work_and_resets_charge_time() {
    let mut rig = Rig::new();
    let (day_runs, handler) = counter();
    rig.app.client_mut().attach_day_work(handler);
    rig.set_light(DARK);
    rig.run_until(12_000);

    rig.set_light(BRIGHT);
    {
        let mut board = rig.manager.board();
        board.set_channel(channel::ALT_I, 50);
        board.accumulate(1_000);
    }
    rig.step(18_000 + 1_000);

    assert_eq!(rig.manager.service().daynight_state(), DayNightState::Day);
    assert_eq!(day_runs.get(), 1);
    assert_eq!(rig.manager.board().charge_time_ms(), 0);
    let charge = rig.access(RegisterAccess::read(MANAGER, cmd::BATTERY_CHARGE_TIME, 0, Width::U32));
    assert_eq!(charge, Ok(0));
    assert_eq!(rig.manager.service().daynight().energy_at_day().alt, 50);
    let alt_at_day = rig
        .access(RegisterAccess::read(MANAGER, cmd::TIMED_ACCUMULATION, accumulation::ALT_AT_DAY, Width::U32))
        .expect("accumulator read");
    assert_eq!(alt_at_day, 50);
}

// ── Poke / polling ────────────────────────────────────────────

#[test]
fn poke_redelivers_current_state() {
    let mut rig = Rig::new();
    rig.to_day();
    assert_eq!(rig.sink.sent_on(STATE_ROUTE).len(), 1);

    rig.access(RegisterAccess::write(MANAGER, cmd::CALLBACK_POKE, 0, Width::U8, 1))
        .expect("poke write");
    rig.step(50);

    assert_eq!(
        rig.sink.sent_on(STATE_ROUTE),
        [DayNightState::Day as u8, DayNightState::Day as u8]
    );
    assert!(!rig.manager.service().daynight().poke_pending());
}

#[test]
fn polled_work_nibble_runs_handler_and_is_cleared() {
    // No work routes: the application learns about work by polling.
    let routes = ClientRoutes {
        day_work_route: 0,
        night_work_route: 0,
        ..all_routes()
    };
    let mut rig = Rig::with(test_config(), routes);
    let (night_runs, handler) = counter();
    rig.app.client_mut().attach_night_work(handler);
    rig.to_day();
    rig.set_light(DARK);
    rig.step(20_000);
    assert_eq!(rig.manager.service().daynight_state(), DayNightState::Night);
    assert!(rig.sink.sent_on(NIGHT_WORK_ROUTE).is_empty());
    assert_eq!(night_runs.get(), 0);

    assert!(rig.app.client_mut().check_state());
    rig.finish_client();
    assert_eq!(night_runs.get(), 1);
    assert_eq!(rig.manager.service().daynight().work_flags(), 0);

    assert!(rig.app.client_mut().check_state());
    rig.finish_client();
    assert_eq!(night_runs.get(), 1);
    assert_eq!(rig.app.client().state(), Some(DayNightState::Night));
}

#[test]
fn state_register_shows_work_bits_only_when_asked() {
    let mut rig = Rig::new();
    rig.to_day();
    rig.set_light(DARK);
    rig.step(20_000);

    let plain = rig
        .access(RegisterAccess::read(MANAGER, cmd::DAYNIGHT_STATE, 0, Width::U8))
        .expect("state read");
    assert_eq!(plain, DayNightState::Night as u32);

    let shown = rig
        .access(RegisterAccess::read(
            MANAGER,
            cmd::DAYNIGHT_STATE,
            DAYNIGHT_SHOW_WORK,
            Width::U8,
        ))
        .expect("state read");
    assert_eq!(shown & 0x0F, DayNightState::Night as u32);
    assert_ne!(shown & 0xF0, 0);
}

#[test]
fn missing_listener_reports_failed_notify_and_keeps_running() {
    let mut rig = Rig::new();
    rig.bus.detach(APP);
    rig.to_day();

    assert_eq!(rig.manager.service().daynight_state(), DayNightState::Day);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::NotifyFailed { code: 2, .. })),
        1
    );
}

// ── Report ────────────────────────────────────────────────────

#[test]
fn day_report_streams_state_and_limits() {
    let mut rig = Rig::new();
    rig.to_day();

    rig.app.client_mut().start_report(0);
    let mut out = String::new();
    for _ in 0..2_000 {
        let (client, master) = rig.app.parts();
        if client.poll_report(0, master, &mut out).unwrap() == ReportPhase::Waiting {
            break;
        }
        rig.step(1);
    }
    assert!(out.starts_with("{\"state\":\"0x1\",\"mgr_status\":\"0x0\","), "{out}");
    assert!(out.ends_with("}\r\n"), "{out}");

    let v: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
    assert_eq!(v["mor_threshold"], "400");
    assert_eq!(v["eve_threshold"], "300");
    assert_eq!(v["adc_alt_v"], BRIGHT.to_string());
    assert_eq!(v["eve_debounce"], "18000");

    assert!(rig.app.client().report_running());
    rig.app.client_mut().interrupt_report();
    assert!(!rig.app.client().report_running());
}
