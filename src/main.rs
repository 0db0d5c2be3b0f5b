//! Solar manager simulation: two devices on one in-memory bus.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SimBus (TWI)                          │
//! │                                                              │
//! │  ManagerNode 0x29                    ApplicationNode 0x2A    │
//! │  ┌──────────────────────┐  notify    ┌────────────────────┐  │
//! │  │ ManagerService       │──────────▶ │ DayNightClient     │  │
//! │  │ DayNight · HS · EE   │ ◀──────────│ ShutdownReport     │  │
//! │  └──────────────────────┘  cmd table └────────────────────┘  │
//! │            ▲                                                 │
//! │   SimBoard (light curve, PWR_I)                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A 1 ms "timer interrupt" advances the clock; the scheduler decides
//! which client work runs on each pass.  Usage:
//! `solar-mgr-sim [duration_s]` (default 600 simulated seconds).

#![deny(unused_must_use)]

use std::f32::consts::PI;
use std::fmt::Write as _;

use anyhow::{Context, Result, anyhow};
use log::info;

use solar_mgr::adapters::eeprom::SimEeprom;
use solar_mgr::adapters::log_sink::LogEventSink;
use solar_mgr::adapters::sim_bus::SimBus;
use solar_mgr::adapters::sim_node::{ApplicationNode, ManagerNode};
use solar_mgr::adapters::time::{SysTickClock, on_timer_tick};
use solar_mgr::app::ports::{Clock, ScheduleFiredKind, SchedulerDelegate};
use solar_mgr::config::{DayNightLimits, ManagerConfig};
use solar_mgr::protocol::channel;
use solar_mgr::remote::Progress;
use solar_mgr::remote::daynight::ClientRoutes;
use solar_mgr::remote::shutdown::{EnableShutdown, ShutdownReport};
use solar_mgr::scheduler::{Schedule, ScheduleKind, Scheduler};

/// One simulated sun cycle.
const SUN_PERIOD_MS: u32 = 240_000;
/// Peak ALT_V counts at noon.
const SUN_PEAK: f32 = 600.0;
/// How often the application polls the manager's state.
const CHK_DAYNIGHT_MS: u32 = 2_000;
const SHUTDOWN_REPORT_MS: u32 = 60_000;

// ── Scheduler delegate ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    CheckDayNight,
    CheckStatus,
    Accumulate,
    HostShutdown,
}

/// Collects due tasks; the loop runs them after the scheduler tick.
#[derive(Default)]
struct DueTasks(Vec<Task>);

impl SchedulerDelegate<Task> for DueTasks {
    fn on_schedule_fired(&mut self, task: Task, kind: ScheduleFiredKind) {
        if kind == ScheduleFiredKind::OneShot {
            info!("Schedule fired: {:?}", task);
        }
        self.0.push(task);
    }
}

fn light_at(now_ms: u32) -> u16 {
    let phase = (now_ms % SUN_PERIOD_MS) as f32 / SUN_PERIOD_MS as f32;
    (SUN_PEAK * (2.0 * PI * phase).sin()).max(0.0) as u16
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let duration_s: u32 = match std::env::args().nth(1) {
        Some(arg) => arg.parse().context("duration must be whole seconds")?,
        None => 600,
    };

    info!("╔══════════════════════════════════════╗");
    info!("║  solar-mgr sim v{}                ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 1. Configuration ──────────────────────────────────────
    let config = ManagerConfig {
        daynight: DayNightLimits {
            morning_threshold: 120,
            evening_threshold: 80,
            ..DayNightLimits::default()
        },
        ..ManagerConfig::default()
    };
    config
        .validate()
        .map_err(|e| anyhow!("invalid manager config: {}", e))?;

    // ── 2. Devices on the bus ─────────────────────────────────
    let bus = SimBus::new();
    let clock = SysTickClock;
    let mut sink = LogEventSink::new();
    let mut manager = ManagerNode::new(&bus, config.clone(), SimEeprom::new(), clock);
    let mut app = ApplicationNode::new(
        &bus,
        config.manager_address,
        ClientRoutes {
            address: config.app_address,
            state_route: 1,
            day_work_route: 2,
            night_work_route: 3,
        },
        SHUTDOWN_REPORT_MS,
    );
    app.client_mut()
        .attach_day_work(|| info!("APP: day work (charge battery)"));
    app.client_mut()
        .attach_night_work(|| info!("APP: night work (log accumulators)"));
    app.client_mut().setup_routes();
    manager.start(&mut sink);

    // ── 3. Schedules ──────────────────────────────────────────
    let mut sched = Scheduler::new();
    sched.add(
        Schedule {
            label: "check daynight",
            task: Task::CheckDayNight,
            kind: ScheduleKind::Periodic {
                interval_ms: CHK_DAYNIGHT_MS,
            },
        },
        0,
    );
    sched.add(
        Schedule {
            label: "check status",
            task: Task::CheckStatus,
            kind: ScheduleKind::Periodic { interval_ms: 5_000 },
        },
        0,
    );
    sched.add(
        Schedule {
            label: "accumulate",
            task: Task::Accumulate,
            kind: ScheduleKind::Periodic { interval_ms: 100 },
        },
        0,
    );
    sched.add(
        Schedule {
            label: "host shutdown",
            task: Task::HostShutdown,
            kind: ScheduleKind::OneShot {
                delay_ms: duration_s * 1000 / 2,
            },
        },
        0,
    );

    let mut report = ShutdownReport::new(config.manager_address, SHUTDOWN_REPORT_MS);
    report.start(clock.millis());
    let mut enable: Option<EnableShutdown> = None;
    let mut due = DueTasks::default();
    let mut out = String::new();
    let mut cmd_out = String::new();

    // ── 4. Cooperative loop ───────────────────────────────────
    for _ in 0..duration_s.saturating_mul(1000) {
        on_timer_tick();
        let now = clock.millis();

        sched.tick(now, &mut due);
        for task in due.0.drain(..) {
            match task {
                Task::CheckDayNight => {
                    app.client_mut().check_state();
                }
                Task::CheckStatus => {
                    app.client_mut().check_status();
                }
                Task::Accumulate => {
                    let mut board = manager.board();
                    board.set_light(light_at(now));
                    board.set_channel(channel::ALT_I, light_at(now) / 4);
                    board.accumulate(100);
                }
                Task::HostShutdown => {
                    // Host idles down so the halt-current gate opens.
                    manager.board().set_channel(channel::PWR_I, 40);
                    enable = Some(EnableShutdown::new(config.manager_address));
                }
            }
        }

        manager.tick(&mut sink);
        app.pump_events();

        // Every client polls each pass; a client whose access finds the
        // master in use waits in its Init step.
        let (client, master) = app.parts();
        client.poll(master);
        if let Some(cmd) = enable.as_mut() {
            if cmd.poll(master, &mut cmd_out)? == Progress::Done {
                enable = None;
            }
        }
        report.poll(now, master, &mut out)?;

        for buf in [&mut out, &mut cmd_out] {
            if buf.ends_with('\n') {
                print!("{}", buf);
                buf.clear();
            }
        }
    }

    let svc = manager.service();
    writeln!(
        out,
        "{{\"daynight\":\"{}\",\"host\":\"{:?}\",\"ee_writes\":\"{}\"}}",
        svc.daynight_state(),
        svc.host_state(),
        manager.eeprom().write_count()
    )?;
    print!("{}", out);
    Ok(())
}
