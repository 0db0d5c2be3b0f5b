//! Outbound application events.
//!
//! The [`ManagerService`](super::service::ManagerService) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them: log to serial, record
//! in a test, etc.

use crate::fsm::DayNightState;
use crate::host_shutdown::HostShutdownState;

/// Structured events emitted by the manager core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// The service has started (carries the initial day/night state).
    Started(DayNightState),

    /// The day/night machine moved between states.
    DayNightChanged {
        from: DayNightState,
        to: DayNightState,
    },

    /// A state notification was delivered to a remote listener.
    NotifySent { address: u8, route: u8, value: u8 },

    /// A state notification failed on the bus.  Not retried.
    NotifyFailed { address: u8, route: u8, code: u8 },

    /// The host power sequencer moved between states.
    HostShutdownChanged {
        from: HostShutdownState,
        to: HostShutdownState,
    },

    /// One persisted field was written to EEPROM.
    Persisted(PersistedField),

    /// A pending value failed its plausibility check and was discarded.
    PersistRejected(PersistedField),
}

/// Identifies a single persisted EEPROM field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistedField {
    ReferenceId,
    ReferenceAvcc,
    Reference1V1,
    LimitsId,
    MorningThreshold,
    EveningThreshold,
    MorningDebounce,
    EveningDebounce,
}
