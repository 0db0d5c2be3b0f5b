//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements                | Connects to                  |
//! |-------------|---------------------------|------------------------------|
//! | `eeprom`    | EepromPort                | In-memory 1 KiB EEPROM       |
//! | `hardware`  | AnalogPort                | Simulated ADC channels       |
//! |             | EnergyPort                | Charge/discharge integrators |
//! |             | HostPowerPort             | SBC power switch, shutdown   |
//! | `log_sink`  | EventSink                 | `log` facade                 |
//! | `sim_bus`   | TwiPeripheral             | In-memory two-wire bus       |
//! | `sim_node`  |:                         | Manager + application wiring |
//! | `time`      | Clock                     | 1 ms timer ISR counter       |

pub mod eeprom;
pub mod hardware;
pub mod log_sink;
pub mod sim_bus;
pub mod sim_node;
pub mod time;
