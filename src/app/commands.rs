//! Inbound commands to the manager service.
//!
//! Every register frame received on the manager's slave port decodes to
//! one [`ManagerCommand`].  The [`ManagerService`](super::service::ManagerService)
//! executes it and answers with `[command, offset, previous value]`.

use crate::protocol::{
    DAYNIGHT_CLEAR_WORK, DAYNIGHT_SHOW_WORK, Request, SHUTDOWN_HALT_CURR_OFFSET, Width,
    accumulation, cmd, shutdown_ul,
};

/// Which host-shutdown timer a command 9 access targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTimer {
    Ttl,
    Delay,
    Wearleveling,
    /// Time since the running sequence started (read-only).
    Sequence,
}

/// Which accumulator a command 37 access targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulator {
    Alt,
    Pwr,
    AltAtNight,
    PwrAtNight,
    AltAtDay,
    PwrAtDay,
}

/// Commands the manager answers on its slave port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerCommand {
    ManagerAddress,
    ShutdownDetect,
    ShutdownSet,
    StatusRead,
    StatusWrite,
    HaltCurr,
    ShutdownTimer(ShutdownTimer),
    BatteryStartCharge,
    BatteryDoneCharge,
    BatteryChargeTime,
    MorningThreshold,
    EveningThreshold,
    DayNightState { show_work: bool, clear_work: bool },
    CallbackAddress,
    CallbackRoute,
    DayWorkRoute,
    NightWorkRoute,
    CallbackPoke,
    AnalogRead(u8),
    TimedAccumulation(Accumulator),
    ReferenceAvcc,
    Reference1V1,
    StartTestMode,
    EndTestMode,
    XcvrRead,
    XcvrWrite,
    EveningDebounce,
    MorningDebounce,
    DayNightTimer,
}

impl ManagerCommand {
    /// Decode a request.  `None` for unknown commands and offsets.
    pub fn parse(req: &Request) -> Option<Self> {
        use ManagerCommand as C;
        let cmd = match req.command {
            cmd::MANAGER_ADDRESS => C::ManagerAddress,
            cmd::SHUTDOWN_DETECT => C::ShutdownDetect,
            cmd::SHUTDOWN_SET => C::ShutdownSet,
            cmd::STATUS_READ => C::StatusRead,
            cmd::STATUS_WRITE => C::StatusWrite,
            cmd::SHUTDOWN_INT if req.offset == SHUTDOWN_HALT_CURR_OFFSET => C::HaltCurr,
            cmd::SHUTDOWN_UL => C::ShutdownTimer(match req.offset {
                shutdown_ul::TTL => ShutdownTimer::Ttl,
                shutdown_ul::DELAY => ShutdownTimer::Delay,
                shutdown_ul::WEARLEVEL => ShutdownTimer::Wearleveling,
                shutdown_ul::KRUNTIME => ShutdownTimer::Sequence,
                _ => return None,
            }),
            cmd::BATTERY_START_CHARGE => C::BatteryStartCharge,
            cmd::BATTERY_DONE_CHARGE => C::BatteryDoneCharge,
            cmd::BATTERY_CHARGE_TIME => C::BatteryChargeTime,
            cmd::MORNING_THRESHOLD => C::MorningThreshold,
            cmd::EVENING_THRESHOLD => C::EveningThreshold,
            cmd::DAYNIGHT_STATE => C::DayNightState {
                show_work: req.offset & DAYNIGHT_SHOW_WORK != 0,
                clear_work: req.offset & DAYNIGHT_CLEAR_WORK != 0,
            },
            cmd::CALLBACK_ADDRESS => C::CallbackAddress,
            cmd::CALLBACK_ROUTE => C::CallbackRoute,
            cmd::DAY_WORK_ROUTE => C::DayWorkRoute,
            cmd::NIGHT_WORK_ROUTE => C::NightWorkRoute,
            cmd::CALLBACK_POKE => C::CallbackPoke,
            cmd::ANALOG_READ => C::AnalogRead(req.offset),
            cmd::TIMED_ACCUMULATION => C::TimedAccumulation(match req.offset {
                accumulation::ALT => Accumulator::Alt,
                accumulation::PWR => Accumulator::Pwr,
                accumulation::ALT_AT_NIGHT => Accumulator::AltAtNight,
                accumulation::PWR_AT_NIGHT => Accumulator::PwrAtNight,
                accumulation::ALT_AT_DAY => Accumulator::AltAtDay,
                accumulation::PWR_AT_DAY => Accumulator::PwrAtDay,
                _ => return None,
            }),
            cmd::REFERENCE_AVCC => C::ReferenceAvcc,
            cmd::REFERENCE_1V1 => C::Reference1V1,
            cmd::START_TEST_MODE => C::StartTestMode,
            cmd::END_TEST_MODE => C::EndTestMode,
            cmd::XCVR_READ => C::XcvrRead,
            cmd::XCVR_WRITE => C::XcvrWrite,
            cmd::EVENING_DEBOUNCE => C::EveningDebounce,
            cmd::MORNING_DEBOUNCE => C::MorningDebounce,
            cmd::DAYNIGHT_TIMER => C::DayNightTimer,
            _ => return None,
        };
        Some(cmd)
    }

    /// Value width on the wire.
    pub fn width(self) -> Width {
        use ManagerCommand as C;
        match self {
            C::HaltCurr
            | C::BatteryStartCharge
            | C::BatteryDoneCharge
            | C::MorningThreshold
            | C::EveningThreshold
            | C::AnalogRead(_) => Width::U16,
            C::ShutdownTimer(_)
            | C::BatteryChargeTime
            | C::TimedAccumulation(_)
            | C::ReferenceAvcc
            | C::Reference1V1
            | C::EveningDebounce
            | C::MorningDebounce
            | C::DayNightTimer => Width::U32,
            _ => Width::U8,
        }
    }

    /// `true` when a write access is meaningless and must be refused.
    pub fn is_read_only(self) -> bool {
        use ManagerCommand as C;
        matches!(
            self,
            C::ShutdownDetect
                | C::StatusRead
                | C::ShutdownTimer(ShutdownTimer::Sequence)
                | C::BatteryChargeTime
                | C::AnalogRead(_)
                | C::TimedAccumulation(_)
                | C::XcvrRead
                | C::DayNightTimer
        )
    }
}
