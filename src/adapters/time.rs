//! Millisecond time base.
//!
//! - [`SysTickClock`] reads the counter the 1 ms timer interrupt advances
//!   through [`on_timer_tick`].  The counter is four bytes wide, wider than
//!   an AVR load, so every access goes through a `critical_section`.
//! - [`ManualClock`] is set by hand for tests and replays.

use core::cell::Cell;
use std::rc::Rc;

use critical_section::Mutex;

use crate::app::ports::Clock;

static MILLIS: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

/// Timer interrupt body: advance the counter by one millisecond.
pub fn on_timer_tick() {
    advance_millis(1);
}

/// Advance the counter by `ms` (several timer ticks at once, as a
/// simulation catching up on wall time does).
pub fn advance_millis(ms: u32) {
    critical_section::with(|cs| {
        let counter = MILLIS.borrow(cs);
        counter.set(counter.get().wrapping_add(ms));
    });
}

/// Clock backed by the interrupt-fed counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysTickClock;

impl Clock for SysTickClock {
    fn millis(&self) -> u32 {
        critical_section::with(|cs| MILLIS.borrow(cs).get())
    }
}

/// Hand-driven clock.  Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u32>>,
}

impl ManualClock {
    pub fn new(start_ms: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u32 {
        self.now.get()
    }
}
