//! Function-pointer finite state machine engine for the day/night
//! classifier.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌─────────────────┬───────────┬──────────┬───────────────┐  │
//! │  │ DayNightState   │ on_enter  │ on_exit  │ on_update     │  │
//! │  ├─────────────────┼───────────┼──────────┼───────────────┤  │
//! │  │ Start           │ fn(ctx)   │    -     │ fn(ctx)->Opt  │  │
//! │  │ Day             │    -      │    -     │ fn(ctx)->Opt  │  │
//! │  │ EveningDebounce │    -      │    -     │ fn(ctx)->Opt  │  │
//! │  │ NightWork       │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Opt  │  │
//! │  │ Night           │    -      │    -     │ fn(ctx)->Opt  │  │
//! │  │ MorningDebounce │    -      │    -     │ fn(ctx)->Opt  │  │
//! │  │ DayWork         │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Opt  │  │
//! │  │ Fail            │ fn(ctx)   │    -     │ fn(ctx)->Opt  │  │
//! │  └─────────────────┴───────────┴──────────┴───────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next)`, the engine runs `on_exit` for the current
//! state, restarts the state timer, then runs `on_enter` for the next.
//! Handlers never touch the bus; they leave at most one notification in
//! [`DayNightContext::outbox`] for the controller to deliver.

pub mod context;
pub mod controller;
pub mod states;

use context::DayNightContext;
use log::info;

pub use controller::DayNightController;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Day/night lifecycle.  The discriminants are the wire values of
/// command 23 and of every notification payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DayNightState {
    Start = 0,
    Day = 1,
    EveningDebounce = 2,
    NightWork = 3,
    Night = 4,
    MorningDebounce = 5,
    DayWork = 6,
    Fail = 7,
}

impl DayNightState {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 8;

    /// Convert a table index back to a state.  Out-of-range indices map to
    /// `Fail`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Start,
            1 => Self::Day,
            2 => Self::EveningDebounce,
            3 => Self::NightWork,
            4 => Self::Night,
            5 => Self::MorningDebounce,
            6 => Self::DayWork,
            7 => Self::Fail,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Fail
            }
        }
    }

    /// Decode the low nibble of a wire value.
    pub fn from_wire(value: u8) -> Option<Self> {
        let idx = usize::from(value & 0x0F);
        (idx < Self::COUNT).then(|| Self::from_index(idx))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Day => "Day",
            Self::EveningDebounce => "EveningDebounce",
            Self::NightWork => "NightWork",
            Self::Night => "Night",
            Self::MorningDebounce => "MorningDebounce",
            Self::DayWork => "DayWork",
            Self::Fail => "Fail",
        }
    }
}

impl core::fmt::Display for DayNightState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut DayNightContext);

/// Per-tick update handler.  Returns `Some(next)` to trigger a transition.
pub type StateUpdateFn = fn(&mut DayNightContext) -> Option<DayNightState>;

/// Static descriptor for a single state (one row in the table).
pub struct StateDescriptor {
    pub id: DayNightState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The state machine engine.
///
/// Time in state is wall-clock: the engine stamps
/// [`DayNightContext::state_timer`] with `now_ms` on every transition, and
/// handlers measure against that stamp.
pub struct Fsm {
    /// Fixed-size table indexed by `DayNightState as usize`.
    table: [StateDescriptor; DayNightState::COUNT],
    /// Index of the currently active state.
    current: usize,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; DayNightState::COUNT], initial: DayNightState) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter` and start the state timer.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut DayNightContext) {
        info!("DAYNIGHT: starting in {}", self.table[self.current].name);
        ctx.state_timer = ctx.now_ms;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance by one tick.  Returns the new state if a transition
    /// happened.
    pub fn tick(&mut self, ctx: &mut DayNightContext) -> Option<DayNightState> {
        let next = (self.table[self.current].on_update)(ctx)?;
        self.transition(next, ctx);
        Some(next)
    }

    /// Jump straight to `next`, running exit and enter actions (used by
    /// the poke restart out of `Fail`).
    pub fn force_transition(&mut self, next: DayNightState, ctx: &mut DayNightContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> DayNightState {
        DayNightState::from_index(self.current)
    }

    fn transition(&mut self, next: DayNightState, ctx: &mut DayNightContext) {
        let next_idx = next as usize;

        info!(
            "DAYNIGHT: {} -> {} after {} ms (light {})",
            self.table[self.current].name,
            self.table[next_idx].name,
            ctx.time_in_state(),
            ctx.light
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        ctx.state_timer = ctx.now_ms;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
