//! Analog reference calibration.
//!
//! Two reference voltages convert raw ADC counts to physical units: the
//! external AVCC rail and the internal 1.1 V band-gap.  Both live in
//! EEPROM behind a magic id:
//!
//! ```text
//!  0x20  id    u16  0x4144 ("AD")
//!  0x22  avcc  u32  µV
//!  0x26  1v1   u32  µV
//! ```
//!
//! New values arrive over the command table and are only marked for
//! saving; [`AnalogReferences::persist_step`] writes them out one field
//! per loop pass so the loop never waits on EEPROM write latency.

use log::{info, warn};

use crate::app::events::PersistedField;
use crate::app::ports::{EepromPort, StorageError};
use crate::config::{ADC_MAX, PersistOutcome};

pub const EE_ANALOG_BASE: u16 = 0x20;
/// 'A' 0x41, 'D' 0x44
pub const EE_ANALOG_ID: u16 = 0x4144;
const EE_REF_AVCC: u16 = 2;
const EE_REF_1V1: u16 = 6;

pub const AVCC_DEFAULT_UV: u32 = 5_000_000;
pub const INTERN_1V1_DEFAULT_UV: u32 = 1_080_000;

const AVCC_MIN_UV: u32 = 4_500_000;
const AVCC_MAX_UV: u32 = 5_500_000;
const INTERN_1V1_MIN_UV: u32 = 1_000_000;
const INTERN_1V1_MAX_UV: u32 = 1_200_000;

/// ALT_V sits behind an 11:1 divider.
const ALT_V_DIVIDER: u64 = 11;

/// Which reference is waiting to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefField {
    Avcc,
    Intern1V1,
    Both,
}

impl RefField {
    fn with(self, other: Self) -> Self {
        if self == other { self } else { Self::Both }
    }
}

/// Trust level of the values in RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefState {
    /// Hard-coded defaults; EEPROM held no valid block.
    Default,
    /// Matches EEPROM.
    Loaded,
    /// Changed in RAM, not yet written.
    ToSave(RefField),
}

pub fn is_valid_avcc(uv: u32) -> bool {
    uv > AVCC_MIN_UV && uv < AVCC_MAX_UV
}

pub fn is_valid_1v1(uv: u32) -> bool {
    uv > INTERN_1V1_MIN_UV && uv < INTERN_1V1_MAX_UV
}

#[derive(Debug, Clone)]
pub struct AnalogReferences {
    avcc_uv: u32,
    intern_1v1_uv: u32,
    state: RefState,
}

impl Default for AnalogReferences {
    fn default() -> Self {
        Self {
            avcc_uv: AVCC_DEFAULT_UV,
            intern_1v1_uv: INTERN_1V1_DEFAULT_UV,
            state: RefState::Default,
        }
    }
}

impl AnalogReferences {
    /// Stored values when the id matches, defaults otherwise.
    pub fn load(eeprom: &impl EepromPort) -> Self {
        match read_block(eeprom) {
            Ok(Some((avcc_uv, intern_1v1_uv))) => {
                info!("REF: loaded avcc={} uV 1v1={} uV", avcc_uv, intern_1v1_uv);
                Self {
                    avcc_uv,
                    intern_1v1_uv,
                    state: RefState::Loaded,
                }
            }
            Ok(None) => {
                info!("REF: no calibration in EEPROM, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!("REF: EEPROM read failed ({}), using defaults", e);
                Self::default()
            }
        }
    }

    pub fn avcc_uv(&self) -> u32 {
        self.avcc_uv
    }

    pub fn intern_1v1_uv(&self) -> u32 {
        self.intern_1v1_uv
    }

    pub fn state(&self) -> RefState {
        self.state
    }

    /// Take a new AVCC value and mark it for saving.  Returns the old one.
    pub fn set_avcc(&mut self, uv: u32) -> u32 {
        let old = core::mem::replace(&mut self.avcc_uv, uv);
        self.mark(RefField::Avcc);
        old
    }

    /// Take a new band-gap value and mark it for saving.  Returns the old one.
    pub fn set_intern_1v1(&mut self, uv: u32) -> u32 {
        let old = core::mem::replace(&mut self.intern_1v1_uv, uv);
        self.mark(RefField::Intern1V1);
        old
    }

    fn mark(&mut self, field: RefField) {
        self.state = match self.state {
            RefState::ToSave(pending) => RefState::ToSave(pending.with(field)),
            _ => RefState::ToSave(field),
        };
    }

    /// Write the magic id if it differs.  `Ok(false)` means the EEPROM
    /// was busy and nothing happened.
    pub fn write_ee_reference_id(&self, eeprom: &mut impl EepromPort) -> Result<bool, StorageError> {
        if !eeprom.is_ready() {
            return Ok(false);
        }
        if eeprom.read_u16(EE_ANALOG_BASE)? != EE_ANALOG_ID {
            eeprom.write_u16(EE_ANALOG_BASE, EE_ANALOG_ID)?;
        }
        Ok(true)
    }

    pub fn write_ee_reference_avcc(&self, eeprom: &mut impl EepromPort) -> Result<bool, StorageError> {
        write_if_changed(eeprom, EE_ANALOG_BASE + EE_REF_AVCC, self.avcc_uv)
    }

    pub fn write_ee_reference_1v1(&self, eeprom: &mut impl EepromPort) -> Result<bool, StorageError> {
        write_if_changed(eeprom, EE_ANALOG_BASE + EE_REF_1V1, self.intern_1v1_uv)
    }

    /// Resolve a pending save by at most one EEPROM write.
    ///
    /// Implausible pending values are dropped by reloading from EEPROM.
    pub fn persist_step(&mut self, eeprom: &mut impl EepromPort) -> Result<PersistOutcome, StorageError> {
        let RefState::ToSave(pending) = self.state else {
            return Ok(PersistOutcome::Idle);
        };

        if !(is_valid_avcc(self.avcc_uv) && is_valid_1v1(self.intern_1v1_uv)) {
            warn!(
                "REF: implausible avcc={} 1v1={}, reloading",
                self.avcc_uv, self.intern_1v1_uv
            );
            *self = Self::load(eeprom);
            return Ok(PersistOutcome::Rejected);
        }

        if eeprom.read_u16(EE_ANALOG_BASE)? != EE_ANALOG_ID {
            if !self.write_ee_reference_id(eeprom)? {
                return Ok(PersistOutcome::Busy);
            }
            // Fresh block: both values have to follow the id.
            self.state = RefState::ToSave(RefField::Both);
            return Ok(PersistOutcome::Wrote(PersistedField::ReferenceId));
        }

        match pending {
            RefField::Intern1V1 | RefField::Both => {
                if !self.write_ee_reference_1v1(eeprom)? {
                    return Ok(PersistOutcome::Busy);
                }
                self.state = if pending == RefField::Both {
                    RefState::ToSave(RefField::Avcc)
                } else {
                    RefState::Loaded
                };
                Ok(PersistOutcome::Wrote(PersistedField::Reference1V1))
            }
            RefField::Avcc => {
                if !self.write_ee_reference_avcc(eeprom)? {
                    return Ok(PersistOutcome::Busy);
                }
                self.state = RefState::Loaded;
                Ok(PersistOutcome::Wrote(PersistedField::ReferenceAvcc))
            }
        }
    }

    /// ADC counts to microvolts at the ADC pin, scaled by AVCC.
    pub fn adc_to_uv(&self, counts: u16) -> u32 {
        (u64::from(counts) * u64::from(self.avcc_uv) / (u64::from(ADC_MAX) + 1)) as u32
    }

    /// ALT_V counts to millivolts at the solar input.
    pub fn alt_v_mv(&self, counts: u16) -> u32 {
        (u64::from(self.adc_to_uv(counts)) * ALT_V_DIVIDER / 1000) as u32
    }
}

fn read_block(eeprom: &impl EepromPort) -> Result<Option<(u32, u32)>, StorageError> {
    if eeprom.read_u16(EE_ANALOG_BASE)? != EE_ANALOG_ID {
        return Ok(None);
    }
    Ok(Some((
        eeprom.read_u32(EE_ANALOG_BASE + EE_REF_AVCC)?,
        eeprom.read_u32(EE_ANALOG_BASE + EE_REF_1V1)?,
    )))
}

fn write_if_changed(eeprom: &mut impl EepromPort, addr: u16, value: u32) -> Result<bool, StorageError> {
    if !eeprom.is_ready() {
        return Ok(false);
    }
    if eeprom.read_u32(addr)? != value {
        eeprom.write_u32(addr, value)?;
    }
    Ok(true)
}
