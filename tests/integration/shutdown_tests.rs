//! Host shutdown over the bus: the application's enable command, limit
//! commands and the streaming shutdown report against a live manager.

use solar_mgr::app::events::AppEvent;
use solar_mgr::app::ports::HostPowerPort;
use solar_mgr::host_shutdown::HostShutdownState;
use solar_mgr::protocol::channel;
use solar_mgr::remote::Progress;
use solar_mgr::remote::report::ReportPhase;
use solar_mgr::remote::shutdown::{
    EnableShutdown, LimitCommand, Rejected, ShutdownLimit, ShutdownReport,
};

use crate::mock_hw::{MANAGER, Rig};

fn run_enable(rig: &mut Rig) -> String {
    let mut cmd = EnableShutdown::new(MANAGER);
    let mut out = String::new();
    for _ in 0..1_000 {
        if cmd.poll(rig.app.master(), &mut out).unwrap() == Progress::Done {
            return out;
        }
        rig.step(1);
    }
    panic!("enable never finished: {out}");
}

fn run_limit(rig: &mut Rig, mut cmd: LimitCommand) -> String {
    let mut out = String::new();
    for _ in 0..1_000 {
        if cmd.poll(rig.app.master(), &mut out).unwrap() == Progress::Done {
            return out;
        }
        rig.step(1);
    }
    panic!("limit command never finished: {out}");
}

// ── Enable ────────────────────────────────────────────────────

#[test]
fn enable_takes_host_down_then_reports_busy() {
    let mut rig = Rig::new();
    rig.manager.board().set_channel(channel::PWR_I, 300);

    assert_eq!(run_enable(&mut rig), "{\"hs_en\":\"DOWN\"}\r\n");
    assert_eq!(
        rig.manager.service().host_state(),
        HostShutdownState::HaltCurrCheck
    );
    assert!(rig.manager.board().shutdown_signal());

    assert_eq!(run_enable(&mut rig), "{\"hs_en\":\"BUSY\"}\r\n");
}

#[test]
fn full_sequence_powers_host_off_and_back_up() {
    let mut rig = Rig::new();
    assert_eq!(run_enable(&mut rig), "{\"hs_en\":\"DOWN\"}\r\n");

    // PWR_I idles at zero: halt current passes at once, then delay and
    // wear leveling run out.
    rig.step(20_000 + 5_000 + 100);
    assert_eq!(rig.manager.service().host_state(), HostShutdownState::Down);
    assert!(!rig.manager.board().host_power());
    assert!(rig.sink.events.contains(&AppEvent::HostShutdownChanged {
        from: HostShutdownState::Wearleveling,
        to: HostShutdownState::Down,
    }));

    assert_eq!(run_enable(&mut rig), "{\"hs_en\":\"UP\"}\r\n");
    assert_eq!(rig.manager.service().host_state(), HostShutdownState::Up);
    assert!(rig.manager.board().host_power());
}

#[test]
fn enable_against_missing_manager_prints_error() {
    let mut rig = Rig::new();
    rig.bus.detach(MANAGER);
    assert_eq!(run_enable(&mut rig), "{\"hs_en\":\"err2\"}\r\n");
}

// ── Limits ────────────────────────────────────────────────────

#[test]
fn out_of_range_halt_curr_is_rejected_without_bus_traffic() {
    let mut rig = Rig::new();
    let before = rig.bus.step_count();

    let err = LimitCommand::new(MANAGER, ShutdownLimit::HaltCurr, Some("2000"))
        .err()
        .expect("2000 must be rejected");
    assert_eq!(err, Rejected("HSHaltCurrMax 1023"));
    assert_eq!(err.to_string(), "{\"err\":\"HSHaltCurrMax 1023\"}");

    assert_eq!(rig.bus.step_count(), before);
    assert_eq!(rig.manager.service().config().shutdown.halt_curr, 100);
}

#[test]
fn ttl_write_is_read_back() {
    let mut rig = Rig::new();
    let cmd = LimitCommand::new(MANAGER, ShutdownLimit::Ttl, Some("90000")).unwrap();
    assert_eq!(run_limit(&mut rig, cmd), "{\"hs_ttl\":\"90000\"}\r\n");
    assert_eq!(rig.manager.service().config().shutdown.ttl_ms, 90_000);
}

#[test]
fn limit_query_without_argument_only_reads() {
    let mut rig = Rig::new();
    let cmd = LimitCommand::new(MANAGER, ShutdownLimit::Delay, None).unwrap();
    assert_eq!(run_limit(&mut rig, cmd), "{\"hs_delay\":\"20000\"}\r\n");
}

#[test]
fn non_numeric_limit_is_rejected() {
    let err = LimitCommand::new(MANAGER, ShutdownLimit::Wearleveling, Some("soon"))
        .err()
        .expect("text must be rejected");
    assert_eq!(err.0, "HSwearlv NaN");
}

// ── Report ────────────────────────────────────────────────────

#[test]
fn report_prints_fields_in_order_as_json() {
    let mut rig = Rig::new();
    rig.manager.board().set_channel(channel::PWR_I, 42);

    let mut report = ShutdownReport::new(MANAGER, 60_000);
    report.start(0);
    let mut out = String::new();
    for _ in 0..2_000 {
        let phase = report.poll(0, rig.app.master(), &mut out).unwrap();
        if phase == ReportPhase::Waiting {
            break;
        }
        rig.step(1);
    }
    assert!(out.ends_with("}\r\n"), "incomplete report: {out}");

    let keys = [
        "hs_state",
        "hs_halt_curr",
        "adc_pwr_i",
        "hs_ttl",
        "hs_delay",
        "hs_wearlv",
        "hs_timer",
    ];
    let positions: Vec<usize> = keys
        .iter()
        .map(|k| out.find(&format!("\"{k}\"")).expect(k))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    let v: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
    assert_eq!(v["hs_state"], "0x0");
    assert_eq!(v["hs_halt_curr"], "100");
    assert_eq!(v["adc_pwr_i"], "42");
    assert_eq!(v["hs_ttl"], "180000");
    assert_eq!(v["hs_timer"], "0");
}
