//! System configuration parameters
//!
//! All tunable parameters for the manager.  Day/night limits can be
//! changed over the I2C command table and are persisted to EEPROM one
//! field per loop pass; everything else starts from the defaults below.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::events::PersistedField;
use crate::app::ports::{ConfigError, EepromPort, StorageError};

/// Largest 10-bit ADC reading.
pub const ADC_MAX: u16 = 1023;

/// Upper bound for either debounce window (one hour).
pub const MAX_DEBOUNCE_MS: u32 = 3_600_000;

// ---------------------------------------------------------------------------
// Day/night limits
// ---------------------------------------------------------------------------

/// Light thresholds and debounce windows for the day/night machine.
///
/// Thresholds are raw ALT_V counts.  With the 11:1 divider and a 5 V
/// reference, 40 counts is about 2.1 V on the panel and 80 about 4.3 V.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayNightLimits {
    /// Reading above which night turns toward morning.
    pub morning_threshold: u16,
    /// Reading below which day turns toward evening.
    pub evening_threshold: u16,
    /// Time the morning condition must hold before day work runs.
    pub morning_debounce_ms: u32,
    /// Time the evening condition must hold before night work runs.
    pub evening_debounce_ms: u32,
}

impl Default for DayNightLimits {
    fn default() -> Self {
        Self {
            morning_threshold: 80,
            evening_threshold: 40,
            morning_debounce_ms: 18_000,
            evening_debounce_ms: 18_000,
        }
    }
}

impl DayNightLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.morning_threshold > ADC_MAX {
            return Err(ConfigError::ValidationFailed("morning_threshold >= 1024"));
        }
        if self.evening_threshold > ADC_MAX {
            return Err(ConfigError::ValidationFailed("evening_threshold >= 1024"));
        }
        if self.morning_debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::ValidationFailed("morning_debounce_ms > 1h"));
        }
        if self.evening_debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::ValidationFailed("evening_debounce_ms > 1h"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Host shutdown limits
// ---------------------------------------------------------------------------

/// Gates for the host power-down sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownLimits {
    /// PWR_I must fall below this (counts) before the delay starts.
    pub halt_curr: u16,
    /// Whole sequence gives up and powers off after this long.
    pub ttl_ms: u32,
    /// Wait after the current drops before checking for stability.
    pub delay_ms: u32,
    /// PWR_I must stay stable this long (flash wear-leveling finished).
    pub wearleveling_ms: u32,
}

impl Default for ShutdownLimits {
    fn default() -> Self {
        Self {
            halt_curr: 100,
            ttl_ms: 180_000,
            delay_ms: 20_000,
            wearleveling_ms: 5_000,
        }
    }
}

impl ShutdownLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.halt_curr > ADC_MAX {
            return Err(ConfigError::ValidationFailed("halt_curr >= 1024"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Battery limits
// ---------------------------------------------------------------------------

/// PWR_V counts at which charging starts and stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryLimits {
    pub start_charge: u16,
    pub done_charge: u16,
}

impl Default for BatteryLimits {
    fn default() -> Self {
        Self {
            start_charge: 356,
            done_charge: 372,
        }
    }
}

// ---------------------------------------------------------------------------
// Fail reporting
// ---------------------------------------------------------------------------

/// How often the `Fail` state is reported to the remote listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailReport {
    /// Report once on entering `Fail`, then stay silent until poked.
    #[default]
    Once,
    /// Report on every tick the bus allows while failed.
    EveryTick,
}

// ---------------------------------------------------------------------------
// Manager configuration
// ---------------------------------------------------------------------------

/// Core manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Bus address the manager answers on.
    pub manager_address: u8,
    /// Bus address of the application controller.
    pub app_address: u8,
    pub daynight: DayNightLimits,
    pub shutdown: ShutdownLimits,
    pub battery: BatteryLimits,
    pub fail_report: FailReport,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            manager_address: 0x29,
            app_address: 0x2A,
            daynight: DayNightLimits::default(),
            shutdown: ShutdownLimits::default(),
            battery: BatteryLimits::default(),
            fail_report: FailReport::default(),
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manager_address == 0 || self.manager_address > 0x7F {
            return Err(ConfigError::ValidationFailed("manager_address not 7-bit"));
        }
        if self.app_address == 0 || self.app_address > 0x7F {
            return Err(ConfigError::ValidationFailed("app_address not 7-bit"));
        }
        if self.manager_address == self.app_address {
            return Err(ConfigError::ValidationFailed("addresses collide"));
        }
        self.daynight.validate()?;
        self.shutdown.validate()
    }
}

// ---------------------------------------------------------------------------
// Day/night limit persistence
// ---------------------------------------------------------------------------

/// EEPROM base of the day/night limits block.
pub const EE_DAYNIGHT_BASE: u16 = 0x40;
/// "DN"
pub const EE_DAYNIGHT_ID: u16 = 0x444E;

const EE_MORNING_THRESHOLD: u16 = 2;
const EE_EVENING_THRESHOLD: u16 = 4;
const EE_MORNING_DEBOUNCE: u16 = 6;
const EE_EVENING_DEBOUNCE: u16 = 10;

/// One changeable day/night limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LimitField {
    MorningThreshold = 0b0001,
    EveningThreshold = 0b0010,
    MorningDebounce = 0b0100,
    EveningDebounce = 0b1000,
}

impl LimitField {
    const ALL: [Self; 4] = [
        Self::MorningThreshold,
        Self::EveningThreshold,
        Self::MorningDebounce,
        Self::EveningDebounce,
    ];
    const ALL_MASK: u8 = 0b1111;

    fn mask(self) -> u8 {
        self as u8
    }

    fn persisted(self) -> PersistedField {
        match self {
            Self::MorningThreshold => PersistedField::MorningThreshold,
            Self::EveningThreshold => PersistedField::EveningThreshold,
            Self::MorningDebounce => PersistedField::MorningDebounce,
            Self::EveningDebounce => PersistedField::EveningDebounce,
        }
    }
}

/// Result of one [`DayNightLimitsStore::persist_step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Nothing pending.
    Idle,
    /// EEPROM busy; call again later.
    Busy,
    /// One field written (or found already equal).
    Wrote(PersistedField),
    /// Pending values failed validation and were replaced from EEPROM.
    Rejected,
}

/// Day/night limits plus their deferred-write bookkeeping.
///
/// Command-table writes land in [`set`](Self::set) and mark the field
/// pending.  While anything is pending the day/night tick is skipped,
/// so the machine never runs on half-updated limits.
#[derive(Debug, Clone)]
pub struct DayNightLimitsStore {
    limits: DayNightLimits,
    loaded: bool,
    pending: u8,
}

impl DayNightLimitsStore {
    pub fn new(limits: DayNightLimits) -> Self {
        Self {
            limits,
            loaded: false,
            pending: 0,
        }
    }

    /// Load from EEPROM, falling back to defaults when the id is missing
    /// or any stored value is out of range.
    pub fn load(eeprom: &impl EepromPort) -> Self {
        match Self::read_block(eeprom) {
            Ok(limits) => {
                info!("DAYNIGHT: limits loaded from EEPROM {:?}", limits);
                Self {
                    limits,
                    loaded: true,
                    pending: 0,
                }
            }
            Err(e) => {
                warn!("DAYNIGHT: using default limits ({})", e);
                Self::new(DayNightLimits::default())
            }
        }
    }

    fn read_block(eeprom: &impl EepromPort) -> Result<DayNightLimits, ConfigError> {
        let lost = |_: StorageError| ConfigError::NotFound;
        if eeprom.read_u16(EE_DAYNIGHT_BASE).map_err(lost)? != EE_DAYNIGHT_ID {
            return Err(ConfigError::NotFound);
        }
        let limits = DayNightLimits {
            morning_threshold: eeprom
                .read_u16(EE_DAYNIGHT_BASE + EE_MORNING_THRESHOLD)
                .map_err(lost)?,
            evening_threshold: eeprom
                .read_u16(EE_DAYNIGHT_BASE + EE_EVENING_THRESHOLD)
                .map_err(lost)?,
            morning_debounce_ms: eeprom
                .read_u32(EE_DAYNIGHT_BASE + EE_MORNING_DEBOUNCE)
                .map_err(lost)?,
            evening_debounce_ms: eeprom
                .read_u32(EE_DAYNIGHT_BASE + EE_EVENING_DEBOUNCE)
                .map_err(lost)?,
        };
        limits.validate()?;
        Ok(limits)
    }

    pub fn limits(&self) -> &DayNightLimits {
        &self.limits
    }

    /// `true` when the limits came from EEPROM rather than defaults.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// `true` while any field waits to be written.
    pub fn is_saving(&self) -> bool {
        self.pending != 0
    }

    /// Change one field and mark it for saving.  Returns the previous value.
    pub fn set(&mut self, field: LimitField, value: u32) -> u32 {
        let old = self.get(field);
        match field {
            LimitField::MorningThreshold => self.limits.morning_threshold = value as u16,
            LimitField::EveningThreshold => self.limits.evening_threshold = value as u16,
            LimitField::MorningDebounce => self.limits.morning_debounce_ms = value,
            LimitField::EveningDebounce => self.limits.evening_debounce_ms = value,
        }
        self.pending |= field.mask();
        old
    }

    pub fn get(&self, field: LimitField) -> u32 {
        match field {
            LimitField::MorningThreshold => u32::from(self.limits.morning_threshold),
            LimitField::EveningThreshold => u32::from(self.limits.evening_threshold),
            LimitField::MorningDebounce => self.limits.morning_debounce_ms,
            LimitField::EveningDebounce => self.limits.evening_debounce_ms,
        }
    }

    /// Write at most one pending field.  Call once per loop pass.
    pub fn persist_step(
        &mut self,
        eeprom: &mut impl EepromPort,
    ) -> Result<PersistOutcome, StorageError> {
        if self.pending == 0 {
            return Ok(PersistOutcome::Idle);
        }

        if let Err(e) = self.limits.validate() {
            warn!("DAYNIGHT: discarding pending limits: {}", e);
            let reloaded = Self::load(eeprom);
            self.limits = reloaded.limits;
            self.loaded = reloaded.loaded;
            self.pending = 0;
            return Ok(PersistOutcome::Rejected);
        }

        if !eeprom.is_ready() {
            return Ok(PersistOutcome::Busy);
        }

        if eeprom.read_u16(EE_DAYNIGHT_BASE)? != EE_DAYNIGHT_ID {
            eeprom.write_u16(EE_DAYNIGHT_BASE, EE_DAYNIGHT_ID)?;
            // Fresh block: every field has to follow the id.
            self.pending = LimitField::ALL_MASK;
            return Ok(PersistOutcome::Wrote(PersistedField::LimitsId));
        }

        let Some(field) = LimitField::ALL
            .into_iter()
            .find(|f| self.pending & f.mask() != 0)
        else {
            return Ok(PersistOutcome::Idle);
        };

        match field {
            LimitField::MorningThreshold | LimitField::EveningThreshold => {
                let addr = EE_DAYNIGHT_BASE
                    + if field == LimitField::MorningThreshold {
                        EE_MORNING_THRESHOLD
                    } else {
                        EE_EVENING_THRESHOLD
                    };
                let value = self.get(field) as u16;
                if eeprom.read_u16(addr)? != value {
                    eeprom.write_u16(addr, value)?;
                }
            }
            LimitField::MorningDebounce | LimitField::EveningDebounce => {
                let addr = EE_DAYNIGHT_BASE
                    + if field == LimitField::MorningDebounce {
                        EE_MORNING_DEBOUNCE
                    } else {
                        EE_EVENING_DEBOUNCE
                    };
                let value = self.get(field);
                if eeprom.read_u32(addr)? != value {
                    eeprom.write_u32(addr, value)?;
                }
            }
        }

        self.pending &= !field.mask();
        if self.pending == 0 {
            self.loaded = true;
        }
        Ok(PersistOutcome::Wrote(field.persisted()))
    }
}
