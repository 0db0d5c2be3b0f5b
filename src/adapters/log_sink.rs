//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured manager events through
//! the `log` facade (serial console on the device, `env_logger` in the
//! simulator).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | daynight={}", state);
            }
            AppEvent::DayNightChanged { from, to } => {
                info!("DAYNIGHT | {} -> {}", from, to);
            }
            AppEvent::NotifySent {
                address,
                route,
                value,
            } => {
                info!(
                    "NOTIFY | 0x{:02X} route={} value=0x{:02X}",
                    address, route, value
                );
            }
            AppEvent::NotifyFailed {
                address,
                route,
                code,
            } => {
                warn!("NOTIFY | 0x{:02X} route={} failed code={}", address, route, code);
            }
            AppEvent::HostShutdownChanged { from, to } => {
                info!("HS | {:?} -> {:?}", from, to);
            }
            AppEvent::Persisted(field) => {
                info!("EEPROM | wrote {:?}", field);
            }
            AppEvent::PersistRejected(field) => {
                warn!("EEPROM | rejected {:?}, reloaded", field);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::DayNightState;

    #[test]
    fn every_event_logs_without_panicking() {
        let mut sink = LogEventSink::new();
        sink.emit(&AppEvent::Started(DayNightState::Start));
        sink.emit(&AppEvent::NotifyFailed {
            address: 0x2A,
            route: 1,
            code: 2,
        });
    }
}
