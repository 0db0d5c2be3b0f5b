//! Cooperative timer/scheduler engine.
//!
//! The main loop owns one [`Scheduler`] and ticks it with the current
//! millisecond count.  Due schedules are reported through a
//! [`SchedulerDelegate`]; the loop implements the delegate and decides
//! which service to run.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  SysTick (1 ms ISR)                  │
//! └──────────────────────────┬───────────────────────────┘
//!                            ▼
//! ┌──────────────────────────────────────────────────────┐
//! │   Scheduler::tick(now_ms)                            │
//! │   ┌──────────┐  ┌──────────┐  ┌──────────┐           │
//! │   │ Periodic │  │ Periodic │  │ One-Shot │  ... (8)  │
//! │   └────┬─────┘  └────┬─────┘  └────┬─────┘           │
//! └────────┼─────────────┼─────────────┼─────────────────┘
//!          ▼             ▼             ▼
//!   SchedulerDelegate::on_schedule_fired(task, kind)
//!          │
//!          ▼
//!   ManagerService::tick() · DayNightClient::poll() · reports
//! ```

use crate::app::ports::{ScheduleFiredKind, SchedulerDelegate};
use log::{debug, info};

// ═══════════════════════════════════════════════════════════════
//  Schedule types
// ═══════════════════════════════════════════════════════════════

/// How and when a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    /// Fire every `interval_ms`.
    Periodic { interval_ms: u32 },
    /// Fire once after `delay_ms`, then auto-disable.
    OneShot { delay_ms: u32 },
}

/// A single schedule entry.
#[derive(Debug, Clone, Copy)]
pub struct Schedule<T> {
    /// Human-readable label for logs.
    pub label: &'static str,
    /// Identifier passed back to the delegate.
    pub task: T,
    pub kind: ScheduleKind,
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

/// Maximum number of concurrent schedules (stack-allocated).
pub const MAX_SCHEDULES: usize = 8;

#[derive(Debug, Clone, Copy)]
struct ScheduleEntry<T> {
    schedule: Schedule<T>,
    /// When the schedule was added or last fired.
    last_ms: u32,
    enabled: bool,
}

/// The scheduler engine.
///
/// Elapsed time uses wrapping arithmetic, so a schedule keeps working
/// across the 49-day rollover of the millisecond counter.
pub struct Scheduler<T> {
    schedules: [Option<ScheduleEntry<T>>; MAX_SCHEDULES],
    enabled: bool,
}

impl<T: Copy> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            schedules: [None; MAX_SCHEDULES],
            enabled: true,
        }
    }

    /// Add a schedule starting at `now_ms`.  Returns the slot index, or
    /// `None` if full.
    pub fn add(&mut self, schedule: Schedule<T>, now_ms: u32) -> Option<usize> {
        let (i, slot) = self
            .schedules
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.is_none())?;
        info!("Scheduler: added '{}' at slot {}", schedule.label, i);
        *slot = Some(ScheduleEntry {
            schedule,
            last_ms: now_ms,
            enabled: true,
        });
        Some(i)
    }

    /// Remove a schedule by slot index.
    pub fn remove(&mut self, slot: usize) {
        if let Some(entry) = self.schedules.get_mut(slot).and_then(Option::take) {
            info!(
                "Scheduler: removed '{}' from slot {}",
                entry.schedule.label, slot
            );
        }
    }

    /// Restart a schedule's interval from `now_ms` and re-enable it.
    pub fn restart(&mut self, slot: usize, now_ms: u32) {
        if let Some(Some(entry)) = self.schedules.get_mut(slot) {
            entry.last_ms = now_ms;
            entry.enabled = true;
        }
    }

    /// Enable or disable the entire scheduler.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Fire every due schedule.  Call once per loop pass.
    pub fn tick(&mut self, now_ms: u32, delegate: &mut dyn SchedulerDelegate<T>) {
        if !self.enabled {
            return;
        }

        for entry in self.schedules.iter_mut().flatten() {
            if !entry.enabled {
                continue;
            }
            let elapsed = now_ms.wrapping_sub(entry.last_ms);
            match entry.schedule.kind {
                ScheduleKind::Periodic { interval_ms } => {
                    if elapsed >= interval_ms {
                        debug!("Scheduler: '{}' periodic fire", entry.schedule.label);
                        entry.last_ms = now_ms;
                        delegate.on_schedule_fired(entry.schedule.task, ScheduleFiredKind::Periodic);
                    }
                }
                ScheduleKind::OneShot { delay_ms } => {
                    if elapsed >= delay_ms {
                        info!(
                            "Scheduler: '{}' one-shot fired (after {} ms)",
                            entry.schedule.label, delay_ms
                        );
                        entry.enabled = false; // Auto-disable.
                        delegate.on_schedule_fired(entry.schedule.task, ScheduleFiredKind::OneShot);
                    }
                }
            }
        }
    }

    /// Number of active (enabled) schedules.
    pub fn active_count(&self) -> usize {
        self.schedules.iter().flatten().filter(|e| e.enabled).count()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
