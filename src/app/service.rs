//! Manager service: the hexagonal core of the manager device.
//!
//! [`ManagerService`] owns the day/night controller, the persisted limits
//! and references, and the host shutdown sequencer.  All I/O flows through
//! port traits and the bus master injected at call sites.
//!
//! ```text
//!   AnalogPort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!   EnergyPort ──▶ │        ManagerService        │ ──▶ TwiMaster (notify)
//! HostPowerPort ◀──│ DayNight · HostShutdown · EE │ ◀─▶ EepromPort
//!                  └──────────────────────────────┘
//!                     ▲ dispatch(frame) ▼ reply
//!                        TwiSlave callbacks
//! ```

use log::{debug, info, warn};

use crate::app::commands::{Accumulator, ManagerCommand, ShutdownTimer};
use crate::config::{
    ADC_MAX, DayNightLimitsStore, LimitField, MAX_DEBOUNCE_MS, ManagerConfig, PersistOutcome,
};
use crate::fsm::{DayNightController, DayNightState};
use crate::host_shutdown::{HostRequest, HostShutdown, HostShutdownState};
use crate::protocol::{ERROR_REPLY, Request, channel};
use crate::references::AnalogReferences;
use crate::twi::master::{TwiMaster, TwiPeripheral};
use crate::twi::slave::TxBuffer;

use super::events::{AppEvent, PersistedField};
use super::ports::{AnalogPort, EepromPort, EnergyPort, EventSink, HostPowerPort};

/// Why a frame was answered with the error reply.
type Refusal = &'static str;

// ───────────────────────────────────────────────────────────────
// ManagerService
// ───────────────────────────────────────────────────────────────

pub struct ManagerService {
    config: ManagerConfig,
    daynight: DayNightController,
    limits: DayNightLimitsStore,
    references: AnalogReferences,
    host: HostShutdown,
    /// Host state last reported through the sink.
    host_seen: HostShutdownState,
    status: u8,
    test_mode: bool,
    xcvr: u8,
}

impl ManagerService {
    /// Build the service, loading limits and references from EEPROM.
    ///
    /// Limits missing from EEPROM come from `config.daynight`.
    pub fn new(config: ManagerConfig, eeprom: &impl EepromPort, now_ms: u32) -> Self {
        let mut limits = DayNightLimitsStore::load(eeprom);
        if !limits.is_loaded() {
            limits = DayNightLimitsStore::new(config.daynight);
        }
        let daynight = DayNightController::new(*limits.limits(), config.fail_report, now_ms);
        Self {
            daynight,
            limits,
            references: AnalogReferences::load(eeprom),
            host: HostShutdown::new(),
            host_seen: HostShutdownState::Up,
            status: 0,
            test_mode: false,
            xcvr: 0,
            config,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Started(self.daynight.state()));
        info!(
            "Manager 0x{:02X} started in {}",
            self.config.manager_address,
            self.daynight.state()
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// One pass of the cooperative loop: persistence, host sequencing,
    /// then the day/night machine.
    pub fn tick<P, H, E, S>(
        &mut self,
        now_ms: u32,
        bus: &mut TwiMaster<P>,
        hw: &mut H,
        eeprom: &mut E,
        sink: &mut S,
    ) where
        P: TwiPeripheral,
        H: AnalogPort + EnergyPort + HostPowerPort,
        E: EepromPort,
        S: EventSink,
    {
        self.persist(eeprom, sink);

        self.host.tick(now_ms, &self.config.shutdown, hw);
        let host_now = self.host.state();
        if host_now != self.host_seen {
            sink.emit(&AppEvent::HostShutdownChanged {
                from: self.host_seen,
                to: host_now,
            });
            self.host_seen = host_now;
        }

        self.daynight.set_limits(*self.limits.limits());
        self.daynight
            .tick(now_ms, bus, hw, self.limits.is_saving(), sink);
    }

    /// At most one EEPROM field per pass, references first.
    fn persist(&mut self, eeprom: &mut impl EepromPort, sink: &mut impl EventSink) {
        match self.references.persist_step(eeprom) {
            Ok(PersistOutcome::Idle) => {}
            Ok(outcome) => {
                report_persist(outcome, PersistedField::ReferenceId, sink);
                return;
            }
            Err(e) => {
                warn!("REF: persist failed: {}", e);
                return;
            }
        }
        match self.limits.persist_step(eeprom) {
            Ok(outcome) => report_persist(outcome, PersistedField::LimitsId, sink),
            Err(e) => warn!("DAYNIGHT: persist failed: {}", e),
        }
    }

    // ── Command table ─────────────────────────────────────────

    /// Execute one register frame received on the slave port and build
    /// the reply: `[command, offset, previous value]`, or `[0xFF]` for
    /// unknown commands and malformed frames.  An empty frame (a bus
    /// release probe) gets no reply.
    pub fn dispatch<H>(&mut self, frame: &[u8], now_ms: u32, hw: &mut H) -> TxBuffer
    where
        H: AnalogPort + EnergyPort + HostPowerPort,
    {
        let mut reply = TxBuffer::new();
        if frame.is_empty() {
            return reply;
        }

        let decoded = Request::decode(frame)
            .ok_or("malformed frame")
            .and_then(|req| {
                let cmd = ManagerCommand::parse(&req).ok_or("unknown command")?;
                Ok((req, cmd))
            });

        let result = decoded.and_then(|(req, cmd)| {
            if req.write {
                if cmd.is_read_only() {
                    return Err("read-only");
                }
                if frame.len() - 2 != cmd.width().bytes() {
                    return Err("value width");
                }
            }
            let value = self.execute(cmd, &req, now_ms, hw)?;
            Ok((req, cmd, value))
        });

        match result {
            Ok((req, cmd, value)) => {
                let mut bytes = [0u8; 4];
                cmd.width().put(value, &mut bytes);
                // Capacity is 32; a reply is at most 6 bytes.
                let _ = reply.push(req.command);
                let _ = reply.push(frame[1]);
                let _ = reply.extend_from_slice(&bytes[..cmd.width().bytes()]);
            }
            Err(why) => {
                debug!("TWI: refused {:02X?}: {}", frame, why);
                let _ = reply.push(ERROR_REPLY);
            }
        }
        reply
    }

    /// Apply `cmd` and return the value the reply carries.
    fn execute<H>(
        &mut self,
        cmd: ManagerCommand,
        req: &Request,
        now_ms: u32,
        hw: &mut H,
    ) -> Result<u32, Refusal>
    where
        H: AnalogPort + EnergyPort + HostPowerPort,
    {
        use ManagerCommand as C;
        let write = req.write.then_some(req.value);

        let old = match cmd {
            C::ManagerAddress => {
                let old = self.config.manager_address;
                if let Some(v) = write {
                    if v == 0 || v > 0x7F || v as u8 == self.config.app_address {
                        return Err("address");
                    }
                    info!("TWI: manager address 0x{:02X} -> 0x{:02X}", old, v);
                    self.config.manager_address = v as u8;
                }
                u32::from(old)
            }
            C::ShutdownDetect => self.host.state() as u32,
            C::ShutdownSet => {
                let old = self.host.state();
                if let Some(v) = write {
                    let request = HostRequest::from_wire(v as u8).ok_or("shutdown request")?;
                    self.host.request(request, now_ms, hw);
                }
                old as u32
            }
            C::StatusRead => u32::from(self.status),
            C::StatusWrite => swap_u8(&mut self.status, write),
            C::HaltCurr => {
                let old = self.config.shutdown.halt_curr;
                if let Some(v) = write {
                    self.config.shutdown.halt_curr = adc_counts(v)?;
                }
                u32::from(old)
            }
            C::ShutdownTimer(timer) => {
                let slot = match timer {
                    ShutdownTimer::Ttl => &mut self.config.shutdown.ttl_ms,
                    ShutdownTimer::Delay => &mut self.config.shutdown.delay_ms,
                    ShutdownTimer::Wearleveling => &mut self.config.shutdown.wearleveling_ms,
                    ShutdownTimer::Sequence => return Ok(self.host.sequence_timer(now_ms)),
                };
                let old = *slot;
                if let Some(v) = write {
                    *slot = v;
                }
                old
            }
            C::BatteryStartCharge => {
                let old = self.config.battery.start_charge;
                if let Some(v) = write {
                    self.config.battery.start_charge = adc_counts(v)?;
                }
                u32::from(old)
            }
            C::BatteryDoneCharge => {
                let old = self.config.battery.done_charge;
                if let Some(v) = write {
                    self.config.battery.done_charge = adc_counts(v)?;
                }
                u32::from(old)
            }
            C::BatteryChargeTime => hw.charge_time_ms(),
            C::MorningThreshold => self.set_limit(LimitField::MorningThreshold, write)?,
            C::EveningThreshold => self.set_limit(LimitField::EveningThreshold, write)?,
            C::MorningDebounce => self.set_limit(LimitField::MorningDebounce, write)?,
            C::EveningDebounce => self.set_limit(LimitField::EveningDebounce, write)?,
            C::DayNightState {
                show_work,
                clear_work,
            } => {
                let mut value = self.daynight.state() as u8;
                if show_work {
                    value |= self.daynight.work_flags();
                }
                if clear_work {
                    self.daynight.clear_work_flags();
                }
                u32::from(value)
            }
            C::CallbackAddress => swap_u8(&mut self.daynight.routes_mut().address, write),
            C::CallbackRoute => swap_u8(&mut self.daynight.routes_mut().route, write),
            C::DayWorkRoute => swap_u8(&mut self.daynight.routes_mut().day_work_route, write),
            C::NightWorkRoute => swap_u8(&mut self.daynight.routes_mut().night_work_route, write),
            C::CallbackPoke => {
                let old = u32::from(self.daynight.poke_pending());
                if write.is_some() {
                    self.daynight.request_poke();
                }
                old
            }
            C::AnalogRead(ch) => {
                if ch >= channel::COUNT {
                    return Err("channel");
                }
                u32::from(hw.read_channel(ch))
            }
            C::TimedAccumulation(acc) => match acc {
                Accumulator::Alt => hw.alt_accumulated(),
                Accumulator::Pwr => hw.pwr_accumulated(),
                Accumulator::AltAtNight => self.daynight.energy_at_night().alt,
                Accumulator::PwrAtNight => self.daynight.energy_at_night().pwr,
                Accumulator::AltAtDay => self.daynight.energy_at_day().alt,
                Accumulator::PwrAtDay => self.daynight.energy_at_day().pwr,
            },
            C::ReferenceAvcc => match write {
                Some(v) => self.references.set_avcc(v),
                None => self.references.avcc_uv(),
            },
            C::Reference1V1 => match write {
                Some(v) => self.references.set_intern_1v1(v),
                None => self.references.intern_1v1_uv(),
            },
            C::StartTestMode => {
                let old = u32::from(self.test_mode);
                self.test_mode = true;
                old
            }
            C::EndTestMode => {
                let old = u32::from(self.test_mode);
                self.test_mode = false;
                old
            }
            C::XcvrRead => u32::from(self.xcvr),
            C::XcvrWrite => {
                if write.is_some() && !self.test_mode {
                    return Err("not in test mode");
                }
                swap_u8(&mut self.xcvr, write)
            }
            C::DayNightTimer => self.daynight.time_in_state(now_ms),
        };
        Ok(old)
    }

    fn set_limit(&mut self, field: LimitField, write: Option<u32>) -> Result<u32, Refusal> {
        let Some(v) = write else {
            return Ok(self.limits.get(field));
        };
        match field {
            LimitField::MorningThreshold | LimitField::EveningThreshold => {
                adc_counts(v)?;
            }
            LimitField::MorningDebounce | LimitField::EveningDebounce => {
                if v > MAX_DEBOUNCE_MS {
                    return Err("debounce");
                }
            }
        }
        Ok(self.limits.set(field, v))
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn daynight_state(&self) -> DayNightState {
        self.daynight.state()
    }

    pub fn daynight(&self) -> &DayNightController {
        &self.daynight
    }

    pub fn host_state(&self) -> HostShutdownState {
        self.host.state()
    }

    /// Address the slave port should answer on.
    pub fn address(&self) -> u8 {
        self.config.manager_address
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn limits(&self) -> &DayNightLimitsStore {
        &self.limits
    }

    pub fn references(&self) -> &AnalogReferences {
        &self.references
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }
}

fn swap_u8(slot: &mut u8, write: Option<u32>) -> u32 {
    let old = *slot;
    if let Some(v) = write {
        *slot = v as u8;
    }
    u32::from(old)
}

fn adc_counts(v: u32) -> Result<u16, Refusal> {
    if v > u32::from(ADC_MAX) {
        return Err("exceeds 10-bit range");
    }
    Ok(v as u16)
}

fn report_persist(outcome: PersistOutcome, block: PersistedField, sink: &mut impl EventSink) {
    match outcome {
        PersistOutcome::Wrote(field) => sink.emit(&AppEvent::Persisted(field)),
        PersistOutcome::Rejected => sink.emit(&AppEvent::PersistRejected(block)),
        PersistOutcome::Idle | PersistOutcome::Busy => {}
    }
}
