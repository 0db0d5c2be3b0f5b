//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ManagerService / remote clients (domain)
//! ```
//!
//! Driven adapters (ADC, accumulators, host power switch, EEPROM, event
//! sinks) implement these traits.  The domain consumes them via generics
//! injected at call sites, so the core never touches registers directly.
//!
//! The two-wire bus itself is not a port here: it has its own hardware
//! seam in [`TwiPeripheral`](crate::twi::master::TwiPeripheral).

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: timer ISR → domain)
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond counter maintained by a timer interrupt.
///
/// The counter wraps at `u32::MAX` (about 49.7 days); every consumer
/// measures intervals with [`Clock::elapsed`], which uses wrapping
/// arithmetic, so the wrap is invisible to the state machines.
pub trait Clock {
    /// Milliseconds since boot.
    fn millis(&self) -> u32;

    /// Milliseconds since `since`, correct across one counter wrap.
    fn elapsed(&self, since: u32) -> u32 {
        self.millis().wrapping_sub(since)
    }
}

// ───────────────────────────────────────────────────────────────
// Analog port (driven adapter: ADC → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port for the 10-bit ADC channels on the manager.
pub trait AnalogPort {
    /// Latest conversion for `channel` (0..=1023).  Unknown channels read 0.
    fn read_channel(&mut self, channel: u8) -> u16;
}

// ───────────────────────────────────────────────────────────────
// Energy port (driven adapter: accumulator ISR → domain)
// ───────────────────────────────────────────────────────────────

/// Continuously integrated current-time products owned by the ADC burst
/// logic.  The domain only ever copies these out.
pub trait EnergyPort {
    /// Alternate (solar) source accumulated current-time product.
    fn alt_accumulated(&self) -> u32;

    /// Power (battery) source accumulated current-time product.
    fn pwr_accumulated(&self) -> u32;

    /// Milliseconds the charger has been active today.
    fn charge_time_ms(&self) -> u32;

    /// Reset the charge timer (done at the start of each day).
    fn clear_charge_time(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Host power port (driven adapter: domain → SBC power switch)
// ───────────────────────────────────────────────────────────────

/// Controls the attached single-board computer.
pub trait HostPowerPort {
    /// Drive the shutdown-request line seen by the host.
    fn set_shutdown_signal(&mut self, asserted: bool);

    /// Switch host power.
    fn set_host_power(&mut self, on: bool);

    /// Whether host power is currently switched on.
    fn host_power(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// EEPROM port (driven adapter: domain ↔ non-volatile bytes)
// ───────────────────────────────────────────────────────────────

/// Byte-addressed EEPROM.
///
/// Writes are slow on real parts; callers check [`is_ready`](Self::is_ready)
/// before each write and come back on a later tick when it is busy.  The
/// multi-byte helpers use AVR native (little-endian) order.
pub trait EepromPort {
    /// `true` when no write is in progress.
    fn is_ready(&self) -> bool;

    fn read_byte(&self, addr: u16) -> Result<u8, StorageError>;

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), StorageError>;

    fn read_u16(&self, addr: u16) -> Result<u16, StorageError> {
        Ok(u16::from_le_bytes([
            self.read_byte(addr)?,
            self.read_byte(addr + 1)?,
        ]))
    }

    fn read_u32(&self, addr: u16) -> Result<u32, StorageError> {
        Ok(u32::from_le_bytes([
            self.read_byte(addr)?,
            self.read_byte(addr + 1)?,
            self.read_byte(addr + 2)?,
            self.read_byte(addr + 3)?,
        ]))
    }

    fn write_u16(&mut self, addr: u16, value: u16) -> Result<(), StorageError> {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.write_byte(addr + i as u16, b)?;
        }
        Ok(())
    }

    fn write_u32(&mut self, addr: u16, value: u32) -> Result<(), StorageError> {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.write_byte(addr + i as u16, b)?;
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, test
/// recorder, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (decouples scheduler from the main loop)
// ───────────────────────────────────────────────────────────────

/// Callback trait that the scheduler invokes when a schedule fires.
///
/// This decouples the [`Scheduler`](crate::scheduler::Scheduler) from
/// whatever the main loop does with a due task.  `T` is the caller's task
/// identifier, usually a small `Copy` enum.
pub trait SchedulerDelegate<T> {
    /// Called when a schedule fires.
    ///
    /// * `task`: the identifier the schedule was registered with.
    /// * `kind`: whether it was a periodic or one-shot fire.
    fn on_schedule_fired(&mut self, task: T, kind: ScheduleFiredKind);
}

/// Discriminant passed to [`SchedulerDelegate::on_schedule_fired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleFiredKind {
    /// A recurring periodic schedule fired.
    Periodic,
    /// A one-shot schedule fired (auto-disables after).
    OneShot,
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from configuration validation and loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No valid magic id in storage (first boot or erased part).
    NotFound,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

/// Errors from [`EepromPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Address beyond the end of the part.
    OutOfRange,
    /// A write was attempted while the previous one is still in progress.
    NotReady,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "address out of range"),
            Self::NotReady => write!(f, "eeprom busy"),
        }
    }
}
