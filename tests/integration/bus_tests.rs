//! Command table over the bus: register accesses from the application's
//! master against the manager's slave.

use solar_mgr::app::events::{AppEvent, PersistedField};
use solar_mgr::error::{BusError, Error};
use solar_mgr::protocol::{Width, cmd};
use solar_mgr::twi::access::RegisterAccess;

use crate::mock_hw::{MANAGER, Rig};

#[test]
fn blocking_write_to_missing_address_returns_addr_nack() {
    let mut rig = Rig::new();
    assert_eq!(rig.app.master().master_blocking_write(0x55, &[0x01], true), 2);
    assert!(!rig.app.master().is_in_use());
}

#[test]
fn threshold_read_returns_configured_value() {
    let mut rig = Rig::new();
    let v = rig.access(RegisterAccess::read(
        MANAGER,
        cmd::EVENING_THRESHOLD,
        0,
        Width::U16,
    ));
    assert_eq!(v, Ok(300));
}

#[test]
fn threshold_write_replies_old_value_and_persists() {
    let mut rig = Rig::new();
    let old = rig.access(RegisterAccess::write(
        MANAGER,
        cmd::MORNING_THRESHOLD,
        0,
        Width::U16,
        450,
    ));
    assert_eq!(old, Ok(400));
    assert!(rig.manager.service().limits().is_saving());

    rig.step(100);
    assert!(!rig.manager.service().limits().is_saving());
    assert_eq!(rig.manager.service().limits().limits().morning_threshold, 450);
    assert!(rig.manager.eeprom().write_count() > 0);
    assert!(
        rig.sink
            .events
            .contains(&AppEvent::Persisted(PersistedField::MorningThreshold))
    );

    let now = rig.access(RegisterAccess::read(
        MANAGER,
        cmd::MORNING_THRESHOLD,
        0,
        Width::U16,
    ));
    assert_eq!(now, Ok(450));
}

#[test]
fn refused_command_fails_the_access() {
    let mut rig = Rig::new();
    let r = rig.access(RegisterAccess::read(MANAGER, 99, 0, Width::U8));
    assert!(r.is_err());

    // Threshold beyond the ADC range.
    let r = rig.access(RegisterAccess::write(
        MANAGER,
        cmd::EVENING_THRESHOLD,
        0,
        Width::U16,
        5_000,
    ));
    assert!(r.is_err());
    assert_eq!(
        rig.manager.service().limits().limits().evening_threshold,
        300
    );
}

#[test]
fn manager_address_change_moves_the_slave() {
    let mut rig = Rig::new();
    let old = rig.access(RegisterAccess::write(
        MANAGER,
        cmd::MANAGER_ADDRESS,
        0,
        Width::U8,
        0x31,
    ));
    assert_eq!(old, Ok(u32::from(MANAGER)));
    rig.step(1);
    assert_eq!(rig.manager.address(), 0x31);

    let gone = rig.access(RegisterAccess::read(MANAGER, cmd::STATUS_READ, 0, Width::U8));
    assert_eq!(gone, Err(Error::Bus(BusError::AddrNack)));
    let moved = rig.access(RegisterAccess::read(0x31, cmd::STATUS_READ, 0, Width::U8));
    assert!(moved.is_ok());
}

#[test]
fn status_failure_is_visible_to_the_client() {
    let mut rig = Rig::new();
    rig.bus.detach(MANAGER);
    assert!(rig.app.client_mut().check_status());
    rig.finish_client();
    assert_eq!(rig.app.client().manager_status(), 0x02);
}
