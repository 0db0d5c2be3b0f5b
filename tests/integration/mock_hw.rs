//! Simulated two-device rig for integration tests.
//!
//! A [`Rig`] holds a manager and an application node on one [`SimBus`],
//! a shared [`ManualClock`] and a [`RecordingSink`] so tests can assert
//! on the full event history.

use solar_mgr::adapters::eeprom::SimEeprom;
use solar_mgr::adapters::sim_bus::SimBus;
use solar_mgr::adapters::sim_node::{ApplicationNode, ManagerNode};
use solar_mgr::adapters::time::ManualClock;
use solar_mgr::app::events::AppEvent;
use solar_mgr::app::ports::{Clock, EventSink};
use solar_mgr::config::{DayNightLimits, ManagerConfig};
use solar_mgr::remote::Progress;
use solar_mgr::remote::daynight::ClientRoutes;
use solar_mgr::twi::access::{LoopState, RegisterAccess};
use solar_mgr::Error;

pub const MANAGER: u8 = 0x29;
pub const APP: u8 = 0x2A;
pub const STATE_ROUTE: u8 = 1;
pub const DAY_WORK_ROUTE: u8 = 2;
pub const NIGHT_WORK_ROUTE: u8 = 3;

pub const BRIGHT: u16 = 500;
pub const DARK: u16 = 100;

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    /// Successful notifications sent on `route`.
    pub fn sent_on(&self, route: u8) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::NotifySent { route: r, value, .. } if *r == route => Some(*value),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(*event);
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// Evening threshold 300, morning threshold 400, default debounces.
pub fn test_config() -> ManagerConfig {
    ManagerConfig {
        daynight: DayNightLimits {
            morning_threshold: 400,
            evening_threshold: 300,
            ..DayNightLimits::default()
        },
        ..ManagerConfig::default()
    }
}

pub fn all_routes() -> ClientRoutes {
    ClientRoutes {
        address: APP,
        state_route: STATE_ROUTE,
        day_work_route: DAY_WORK_ROUTE,
        night_work_route: NIGHT_WORK_ROUTE,
    }
}

pub struct Rig {
    pub clock: ManualClock,
    pub bus: SimBus,
    pub manager: ManagerNode<ManualClock>,
    pub app: ApplicationNode,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with(test_config(), all_routes())
    }

    /// Build the rig and install the application's routes.
    pub fn with(config: ManagerConfig, routes: ClientRoutes) -> Self {
        let clock = ManualClock::new(0);
        let bus = SimBus::new();
        let mut sink = RecordingSink::default();
        let mut manager = ManagerNode::new(&bus, config, SimEeprom::new(), clock.clone());
        let mut app = ApplicationNode::new(&bus, MANAGER, routes, 60_000);
        manager.start(&mut sink);
        assert!(app.client_mut().setup_routes());

        let mut rig = Self {
            clock,
            bus,
            manager,
            app,
            sink,
        };
        for _ in 0..1_000 {
            if !rig.app.client().is_busy() {
                break;
            }
            rig.step(1);
        }
        assert!(!rig.app.client().is_busy(), "route setup never finished");
        rig
    }

    pub fn set_light(&mut self, counts: u16) {
        self.manager.board().set_light(counts);
    }

    /// Advance `ms` milliseconds, one loop pass per millisecond.
    pub fn step(&mut self, ms: u32) {
        for _ in 0..ms {
            self.clock.advance(1);
            self.manager.tick(&mut self.sink);
            self.app.pump_events();
            let (client, master) = self.app.parts();
            client.poll(master);
        }
    }

    /// Step until the absolute time `ms`.
    pub fn run_until(&mut self, ms: u32) {
        let now = self.clock.millis();
        if ms > now {
            self.step(ms - now);
        }
    }

    /// Run a register access from the application's master to completion,
    /// ticking the manager in between.
    pub fn access(&mut self, mut access: RegisterAccess) -> Result<u32, Error> {
        for _ in 0..1_000 {
            if access.poll(self.app.master()) == LoopState::Done {
                return access.result().expect("done access has a result");
            }
            self.clock.advance(1);
            self.manager.tick(&mut self.sink);
        }
        panic!("access never finished");
    }

    /// Drive a client operation to completion.
    pub fn finish_client(&mut self) {
        for _ in 0..1_000 {
            let (client, master) = self.app.parts();
            if client.poll(master) == Progress::Done {
                return;
            }
            self.clock.advance(1);
            self.manager.tick(&mut self.sink);
            self.app.pump_events();
        }
        panic!("client operation never finished");
    }

    /// Bright start: settle, classify as Day and deliver it.
    pub fn to_day(&mut self) {
        self.set_light(BRIGHT);
        self.run_until(12_000);
    }
}
