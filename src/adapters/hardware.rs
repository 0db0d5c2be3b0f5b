//! Board adapter: bridges the manager's analog front end and host power
//! switch to domain port traits.
//!
//! [`SimBoard`] stands in for the ADC burst sampler, the current
//! accumulators and the SBC power switch on host.  Readings are set
//! directly by the caller (a test or the simulation's light curve).

use crate::app::ports::{AnalogPort, EnergyPort, HostPowerPort};
use crate::protocol::channel;

const ADC_CHANNELS: usize = channel::COUNT as usize;

/// Simulated analog front end and host power switch.
#[derive(Debug, Clone)]
pub struct SimBoard {
    adc: [u16; ADC_CHANNELS],
    alt_accumulated: u32,
    pwr_accumulated: u32,
    charge_time_ms: u32,
    shutdown_signal: bool,
    host_power: bool,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            adc: [0; ADC_CHANNELS],
            alt_accumulated: 0,
            pwr_accumulated: 0,
            charge_time_ms: 0,
            shutdown_signal: false,
            host_power: true,
        }
    }

    pub fn set_channel(&mut self, ch: u8, counts: u16) {
        if let Some(slot) = self.adc.get_mut(usize::from(ch)) {
            *slot = counts.min(crate::config::ADC_MAX);
        }
    }

    /// Set the light level seen on ALT_V.
    pub fn set_light(&mut self, counts: u16) {
        self.set_channel(channel::ALT_V, counts);
    }

    /// Integrate ALT_I and PWR_I over `dt_ms`; charging time accrues
    /// while ALT_I is non-zero.
    pub fn accumulate(&mut self, dt_ms: u32) {
        let alt_i = u32::from(self.adc[usize::from(channel::ALT_I)]);
        let pwr_i = u32::from(self.adc[usize::from(channel::PWR_I)]);
        self.alt_accumulated = self.alt_accumulated.wrapping_add(alt_i * dt_ms / 1000);
        self.pwr_accumulated = self.pwr_accumulated.wrapping_add(pwr_i * dt_ms / 1000);
        if alt_i > 0 {
            self.charge_time_ms = self.charge_time_ms.wrapping_add(dt_ms);
        }
    }

    pub fn shutdown_signal(&self) -> bool {
        self.shutdown_signal
    }
}

// ── AnalogPort implementation ─────────────────────────────────

impl AnalogPort for SimBoard {
    fn read_channel(&mut self, ch: u8) -> u16 {
        self.adc.get(usize::from(ch)).copied().unwrap_or(0)
    }
}

// ── EnergyPort implementation ─────────────────────────────────

impl EnergyPort for SimBoard {
    fn alt_accumulated(&self) -> u32 {
        self.alt_accumulated
    }

    fn pwr_accumulated(&self) -> u32 {
        self.pwr_accumulated
    }

    fn charge_time_ms(&self) -> u32 {
        self.charge_time_ms
    }

    fn clear_charge_time(&mut self) {
        self.charge_time_ms = 0;
    }
}

// ── HostPowerPort implementation ──────────────────────────────

impl HostPowerPort for SimBoard {
    fn set_shutdown_signal(&mut self, asserted: bool) {
        self.shutdown_signal = asserted;
    }

    fn set_host_power(&mut self, on: bool) {
        self.host_power = on;
    }

    fn host_power(&self) -> bool {
        self.host_power
    }
}
