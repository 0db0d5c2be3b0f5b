//! Shared mutable context threaded through every day/night handler.
//!
//! `DayNightContext` is the "blackboard" state handlers read from and write
//! to: the latest light sample and accumulator readings go in before each
//! tick, and the handlers leave snapshots, work flags and at most one
//! pending notification behind for the controller.

use crate::config::{DayNightLimits, FailReport};

use super::DayNightState;

/// Startup settle delay before the first classification.
pub const STARTUP_DELAY_MS: u32 = 11_000;

/// `Day` or `Night` lasting longer than this is a stuck sensor.
pub const DAYNIGHT_TIMEOUT_MS: u32 = 72_000_000;

/// [`DAYNIGHT_TIMEOUT_MS`] in whole hours, for logs.
pub const DAYNIGHT_TIMEOUT_H: u32 = DAYNIGHT_TIMEOUT_MS / 3_600_000;

/// Work nibble bit set on entering `NightWork`.
pub const NIGHT_WORK_FLAG: u8 = crate::protocol::NIGHT_WORK_BIT;
/// Work nibble bit set on entering `DayWork`.
pub const DAY_WORK_FLAG: u8 = crate::protocol::DAY_WORK_BIT;

/// Running current-time products of the alternate (solar) and power
/// (battery) inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnergySnapshot {
    pub alt: u32,
    pub pwr: u32,
}

/// A notification a handler wants delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    /// State update on the listener's main route.
    Remote(DayNightState),
    /// One-shot night work event on the night-work route.
    NightWork,
    /// One-shot day work event on the day-work route.
    DayWork,
}

pub struct DayNightContext {
    // -- Timing --
    /// Current time, set before each tick.
    pub now_ms: u32,
    /// Timestamp of the most recent transition.
    pub state_timer: u32,
    /// Timestamp of the last night-work checkpoint.
    pub at_night_ms: u32,
    /// Timestamp of the last day-work checkpoint.
    pub at_day_ms: u32,

    // -- Inputs --
    /// ALT_V sample in ADC counts (the solar panel doubles as light sensor).
    pub light: u16,
    /// Live accumulator readings.
    pub energy: EnergySnapshot,
    pub limits: DayNightLimits,
    pub fail_report: FailReport,

    // -- Outputs --
    pub at_night: EnergySnapshot,
    pub at_day: EnergySnapshot,
    /// High nibble of the command 23 reply.
    pub work_flags: u8,
    pub fail_reported: bool,
    pub outbox: Option<Notify>,
    /// Set when the battery charge timer should restart.
    pub clear_charge_time: bool,
}

impl DayNightContext {
    pub fn new(limits: DayNightLimits, fail_report: FailReport) -> Self {
        Self {
            now_ms: 0,
            state_timer: 0,
            at_night_ms: 0,
            at_day_ms: 0,
            light: 0,
            energy: EnergySnapshot::default(),
            limits,
            fail_report,
            at_night: EnergySnapshot::default(),
            at_day: EnergySnapshot::default(),
            work_flags: 0,
            fail_reported: false,
            outbox: None,
            clear_charge_time: false,
        }
    }

    /// Milliseconds since the last transition.
    pub fn time_in_state(&self) -> u32 {
        self.now_ms.wrapping_sub(self.state_timer)
    }

    /// Queue a notification.  A newer one replaces an undelivered one.
    pub fn notify(&mut self, n: Notify) {
        self.outbox = Some(n);
    }
}
