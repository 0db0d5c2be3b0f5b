//! Concrete state handler functions and table builder.
//!
//! Each state is three plain `fn` pointers; handlers only read and write
//! the [`DayNightContext`].  Light `L`, evening threshold `E` and morning
//! threshold `M` are ADC counts, higher is brighter.
//!
//! ```text
//!  START ──[settled, L > E]──▶ DAY ◀──────────[L >= E]─────────┐
//!    │                         │  ▲                            │
//!    │                  [L < E]  └──── DAY_WORK ◀─┐      EVENING_DEBOUNCE
//!    │                         ▼                  │            │
//!    │                 EVENING_DEBOUNCE   [debounced, L > M]   [debounced]
//!    │                                            │            ▼
//!    └──[settled, L <= E]──▶ NIGHT ◀──────────── NIGHT_WORK ◀──┘
//!                            │   ▲
//!                     [L > M]    └──[L <= M]── MORNING_DEBOUNCE
//!                            ▼
//!                     MORNING_DEBOUNCE
//!
//!  DAY / NIGHT ──[in state > 20 h]──▶ FAIL ──[poke]──▶ START
//! ```

use super::context::{
    DayNightContext, Notify, DAYNIGHT_TIMEOUT_H, DAYNIGHT_TIMEOUT_MS, DAY_WORK_FLAG,
    NIGHT_WORK_FLAG, STARTUP_DELAY_MS,
};
use super::{DayNightState, StateDescriptor};
use crate::config::FailReport;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; DayNightState::COUNT] {
    [
        StateDescriptor {
            id: DayNightState::Start,
            name: "Start",
            on_enter: Some(start_enter),
            on_exit: None,
            on_update: start_update,
        },
        StateDescriptor {
            id: DayNightState::Day,
            name: "Day",
            on_enter: None,
            on_exit: None,
            on_update: day_update,
        },
        StateDescriptor {
            id: DayNightState::EveningDebounce,
            name: "EveningDebounce",
            on_enter: None,
            on_exit: None,
            on_update: evening_debounce_update,
        },
        StateDescriptor {
            id: DayNightState::NightWork,
            name: "NightWork",
            on_enter: Some(night_work_enter),
            on_exit: Some(night_work_exit),
            on_update: night_work_update,
        },
        StateDescriptor {
            id: DayNightState::Night,
            name: "Night",
            on_enter: None,
            on_exit: None,
            on_update: night_update,
        },
        StateDescriptor {
            id: DayNightState::MorningDebounce,
            name: "MorningDebounce",
            on_enter: None,
            on_exit: None,
            on_update: morning_debounce_update,
        },
        StateDescriptor {
            id: DayNightState::DayWork,
            name: "DayWork",
            on_enter: Some(day_work_enter),
            on_exit: Some(day_work_exit),
            on_update: day_work_update,
        },
        StateDescriptor {
            id: DayNightState::Fail,
            name: "Fail",
            on_enter: Some(fail_enter),
            on_exit: None,
            on_update: fail_update,
        },
    ]
}

/// Queue a main-route notification and hand back the next state.
fn goto(ctx: &mut DayNightContext, next: DayNightState) -> Option<DayNightState> {
    ctx.notify(Notify::Remote(next));
    Some(next)
}

// ═══════════════════════════════════════════════════════════════════════════
//  START: wait for ALT_V to settle, then classify once
// ═══════════════════════════════════════════════════════════════════════════

fn start_enter(ctx: &mut DayNightContext) {
    ctx.fail_reported = false;
}

fn start_update(ctx: &mut DayNightContext) -> Option<DayNightState> {
    if ctx.time_in_state() < STARTUP_DELAY_MS {
        return None;
    }
    if ctx.light > ctx.limits.evening_threshold {
        goto(ctx, DayNightState::Day)
    } else {
        goto(ctx, DayNightState::Night)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  DAY / EVENING_DEBOUNCE
// ═══════════════════════════════════════════════════════════════════════════

fn day_update(ctx: &mut DayNightContext) -> Option<DayNightState> {
    if ctx.time_in_state() > DAYNIGHT_TIMEOUT_MS {
        return Some(DayNightState::Fail);
    }
    if ctx.light < ctx.limits.evening_threshold {
        return goto(ctx, DayNightState::EveningDebounce);
    }
    None
}

fn evening_debounce_update(ctx: &mut DayNightContext) -> Option<DayNightState> {
    if ctx.light >= ctx.limits.evening_threshold {
        return goto(ctx, DayNightState::Day);
    }
    if ctx.time_in_state() > ctx.limits.evening_debounce_ms {
        // The listener is told Night; NightWork is local and lasts one tick.
        ctx.notify(Notify::Remote(DayNightState::Night));
        return Some(DayNightState::NightWork);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  NIGHT_WORK: one tick to fire the night work event
// ═══════════════════════════════════════════════════════════════════════════

fn night_work_enter(ctx: &mut DayNightContext) {
    ctx.work_flags |= NIGHT_WORK_FLAG;
}

fn night_work_update(ctx: &mut DayNightContext) -> Option<DayNightState> {
    ctx.notify(Notify::NightWork);
    Some(DayNightState::Night)
}

fn night_work_exit(ctx: &mut DayNightContext) {
    ctx.at_night = ctx.energy;
    ctx.at_night_ms = ctx.now_ms;
    info!(
        "DAYNIGHT: night checkpoint alt={} pwr={}",
        ctx.at_night.alt, ctx.at_night.pwr
    );
}

// ═══════════════════════════════════════════════════════════════════════════
//  NIGHT / MORNING_DEBOUNCE
// ═══════════════════════════════════════════════════════════════════════════

fn night_update(ctx: &mut DayNightContext) -> Option<DayNightState> {
    if ctx.time_in_state() > DAYNIGHT_TIMEOUT_MS {
        return Some(DayNightState::Fail);
    }
    if ctx.light > ctx.limits.morning_threshold {
        return goto(ctx, DayNightState::MorningDebounce);
    }
    None
}

fn morning_debounce_update(ctx: &mut DayNightContext) -> Option<DayNightState> {
    if ctx.light <= ctx.limits.morning_threshold {
        return goto(ctx, DayNightState::Night);
    }
    if ctx.time_in_state() > ctx.limits.morning_debounce_ms {
        ctx.notify(Notify::Remote(DayNightState::Day));
        return Some(DayNightState::DayWork);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  DAY_WORK: one tick to fire the day work event
// ═══════════════════════════════════════════════════════════════════════════

fn day_work_enter(ctx: &mut DayNightContext) {
    ctx.work_flags |= DAY_WORK_FLAG;
}

fn day_work_update(ctx: &mut DayNightContext) -> Option<DayNightState> {
    ctx.notify(Notify::DayWork);
    Some(DayNightState::Day)
}

fn day_work_exit(ctx: &mut DayNightContext) {
    ctx.clear_charge_time = true;
    ctx.at_day = ctx.energy;
    ctx.at_day_ms = ctx.now_ms;
    info!(
        "DAYNIGHT: day checkpoint alt={} pwr={}",
        ctx.at_day.alt, ctx.at_day.pwr
    );
}

// ═══════════════════════════════════════════════════════════════════════════
//  FAIL: terminal until poked
// ═══════════════════════════════════════════════════════════════════════════

fn fail_enter(ctx: &mut DayNightContext) {
    warn!(
        "DAYNIGHT: no transition for {} h, light sensor presumed stuck (light {})",
        DAYNIGHT_TIMEOUT_H, ctx.light
    );
    // The entry notification is the edge-triggered report.
    ctx.notify(Notify::Remote(DayNightState::Fail));
    ctx.fail_reported = true;
}

fn fail_update(ctx: &mut DayNightContext) -> Option<DayNightState> {
    match ctx.fail_report {
        FailReport::EveryTick => ctx.notify(Notify::Remote(DayNightState::Fail)),
        FailReport::Once if !ctx.fail_reported => {
            ctx.notify(Notify::Remote(DayNightState::Fail));
        }
        FailReport::Once => {}
    }
    ctx.fail_reported = true;
    None
}
