//! Host power sequencing on the manager.
//!
//! Taking the single-board computer down is gated on its current draw:
//!
//! ```text
//!  UP ──[request down]──▶ HALT_CURR_CHECK ──[PWR_I < halt_curr]──▶ DELAY
//!   ▲                                                               │
//!   │                                                      [delay elapsed]
//!   │                                                               ▼
//!  DOWN ◀──[PWR_I steady for wearleveling]──────────────── WEARLEVELING
//!   │
//!   └──[request up]──▶ UP
//!
//!  any transient state ──[ttl since request]──▶ DOWN
//! ```
//!
//! Requests that arrive while a sequence is running are refused; the
//! application reports them as busy.

use log::{info, warn};

use crate::app::ports::{AnalogPort, HostPowerPort};
use crate::config::ShutdownLimits;
use crate::protocol::channel;

/// Largest PWR_I wobble (counts) still counted as steady.
const WEARLEVEL_BAND: u16 = 2;

/// Wire value of command 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HostShutdownState {
    Up = 0,
    HaltCurrCheck = 1,
    Delay = 2,
    Wearleveling = 3,
    Down = 4,
}

impl HostShutdownState {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Up),
            1 => Some(Self::HaltCurrCheck),
            2 => Some(Self::Delay),
            3 => Some(Self::Wearleveling),
            4 => Some(Self::Down),
            _ => None,
        }
    }

    /// `true` for `Up` and `Down`, the only states that accept requests.
    pub fn is_stable(self) -> bool {
        matches!(self, Self::Up | Self::Down)
    }
}

/// Value written to command 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HostRequest {
    TakeDown = 0,
    BringUp = 1,
}

impl HostRequest {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::TakeDown),
            1 => Some(Self::BringUp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostShutdown {
    state: HostShutdownState,
    /// When the running sequence was requested.
    started_ms: u32,
    /// When the current phase began (the wear-leveling window restarts).
    phase_ms: u32,
    wear_ref: u16,
}

impl Default for HostShutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl HostShutdown {
    pub fn new() -> Self {
        Self {
            state: HostShutdownState::Up,
            started_ms: 0,
            phase_ms: 0,
            wear_ref: 0,
        }
    }

    pub fn state(&self) -> HostShutdownState {
        self.state
    }

    /// Milliseconds since the running sequence was requested; zero when
    /// no sequence is running.
    pub fn sequence_timer(&self, now_ms: u32) -> u32 {
        if self.state.is_stable() {
            0
        } else {
            now_ms.wrapping_sub(self.started_ms)
        }
    }

    /// Apply a request.  Returns `false` when it does not fit the current
    /// state (nothing changes).
    pub fn request(&mut self, req: HostRequest, now_ms: u32, hw: &mut impl HostPowerPort) -> bool {
        match (self.state, req) {
            (HostShutdownState::Up, HostRequest::TakeDown) => {
                info!("HS: shutdown requested");
                hw.set_shutdown_signal(true);
                self.started_ms = now_ms;
                self.enter(HostShutdownState::HaltCurrCheck, now_ms);
                true
            }
            (HostShutdownState::Down, HostRequest::BringUp) => {
                info!("HS: power up");
                hw.set_shutdown_signal(false);
                hw.set_host_power(true);
                self.enter(HostShutdownState::Up, now_ms);
                true
            }
            (state, req) => {
                warn!("HS: {:?} refused in {:?}", req, state);
                false
            }
        }
    }

    /// Advance the sequence.  Returns the state change, if any.
    pub fn tick<H>(
        &mut self,
        now_ms: u32,
        limits: &ShutdownLimits,
        hw: &mut H,
    ) -> Option<(HostShutdownState, HostShutdownState)>
    where
        H: AnalogPort + HostPowerPort,
    {
        let from = self.state;
        if from.is_stable() {
            return None;
        }

        if now_ms.wrapping_sub(self.started_ms) > limits.ttl_ms {
            warn!("HS: ttl {} ms expired in {:?}, forcing power off", limits.ttl_ms, from);
            self.power_off(now_ms, hw);
            return Some((from, self.state));
        }

        let pwr_i = hw.read_channel(channel::PWR_I);
        let in_phase = now_ms.wrapping_sub(self.phase_ms);
        match from {
            HostShutdownState::HaltCurrCheck if pwr_i < limits.halt_curr => {
                self.enter(HostShutdownState::Delay, now_ms);
            }
            HostShutdownState::Delay if in_phase > limits.delay_ms => {
                self.wear_ref = pwr_i;
                self.enter(HostShutdownState::Wearleveling, now_ms);
            }
            HostShutdownState::Wearleveling => {
                if pwr_i.abs_diff(self.wear_ref) > WEARLEVEL_BAND {
                    self.wear_ref = pwr_i;
                    self.phase_ms = now_ms;
                } else if in_phase > limits.wearleveling_ms {
                    self.power_off(now_ms, hw);
                }
            }
            _ => {}
        }

        (self.state != from).then_some((from, self.state))
    }

    fn power_off(&mut self, now_ms: u32, hw: &mut impl HostPowerPort) {
        hw.set_host_power(false);
        hw.set_shutdown_signal(false);
        self.enter(HostShutdownState::Down, now_ms);
    }

    fn enter(&mut self, next: HostShutdownState, now_ms: u32) {
        info!("HS: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.phase_ms = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::hardware::SimBoard;

    fn limits() -> ShutdownLimits {
        ShutdownLimits {
            halt_curr: 100,
            ttl_ms: 180_000,
            delay_ms: 20_000,
            wearleveling_ms: 5_000,
        }
    }

    #[test]
    fn full_sequence_powers_host_off() {
        let mut hs = HostShutdown::new();
        let mut board = SimBoard::new();
        board.set_channel(channel::PWR_I, 300);

        assert!(hs.request(HostRequest::TakeDown, 1_000, &mut board));
        assert!(board.shutdown_signal());
        assert_eq!(hs.tick(2_000, &limits(), &mut board), None);

        board.set_channel(channel::PWR_I, 60);
        assert_eq!(
            hs.tick(3_000, &limits(), &mut board),
            Some((HostShutdownState::HaltCurrCheck, HostShutdownState::Delay))
        );
        assert_eq!(hs.tick(23_000, &limits(), &mut board), None);
        hs.tick(23_001, &limits(), &mut board);
        assert_eq!(hs.state(), HostShutdownState::Wearleveling);

        hs.tick(28_002, &limits(), &mut board);
        assert_eq!(hs.state(), HostShutdownState::Down);
        assert!(!board.host_power());
        assert!(!board.shutdown_signal());
    }

    #[test]
    fn current_change_restarts_wearleveling_window() {
        let mut hs = HostShutdown::new();
        let mut board = SimBoard::new();
        board.set_channel(channel::PWR_I, 50);
        hs.request(HostRequest::TakeDown, 0, &mut board);
        hs.tick(1, &limits(), &mut board);
        hs.tick(20_002, &limits(), &mut board);
        assert_eq!(hs.state(), HostShutdownState::Wearleveling);

        board.set_channel(channel::PWR_I, 45);
        hs.tick(24_000, &limits(), &mut board);
        hs.tick(25_100, &limits(), &mut board);
        assert_eq!(hs.state(), HostShutdownState::Wearleveling);
        hs.tick(29_001, &limits(), &mut board);
        assert_eq!(hs.state(), HostShutdownState::Down);
    }

    #[test]
    fn ttl_forces_down() {
        let mut hs = HostShutdown::new();
        let mut board = SimBoard::new();
        board.set_channel(channel::PWR_I, 900);
        hs.request(HostRequest::TakeDown, 0, &mut board);
        assert_eq!(hs.sequence_timer(90_000), 90_000);
        hs.tick(180_001, &limits(), &mut board);
        assert_eq!(hs.state(), HostShutdownState::Down);
        assert_eq!(hs.sequence_timer(180_002), 0);
    }

    #[test]
    fn requests_refused_mid_sequence() {
        let mut hs = HostShutdown::new();
        let mut board = SimBoard::new();
        assert!(!hs.request(HostRequest::BringUp, 0, &mut board));
        hs.request(HostRequest::TakeDown, 0, &mut board);
        assert!(!hs.request(HostRequest::BringUp, 10, &mut board));
        assert!(!hs.request(HostRequest::TakeDown, 10, &mut board));
        assert_eq!(hs.state(), HostShutdownState::HaltCurrCheck);
    }

    #[test]
    fn bring_up_from_down() {
        let mut hs = HostShutdown::new();
        let mut board = SimBoard::new();
        hs.request(HostRequest::TakeDown, 0, &mut board);
        hs.tick(200_000, &limits(), &mut board);
        assert!(hs.request(HostRequest::BringUp, 200_001, &mut board));
        assert_eq!(hs.state(), HostShutdownState::Up);
        assert!(board.host_power());
    }
}
