//! Fuzz target: `ManagerService::dispatch`
//!
//! Feeds arbitrary frames to the command table, one after another against
//! the same service, and asserts that every reply fits the bus buffer
//! and that the service keeps its configuration valid.
//!
//! cargo fuzz run fuzz_command_table

#![no_main]

use libfuzzer_sys::fuzz_target;
use solar_mgr::adapters::eeprom::SimEeprom;
use solar_mgr::adapters::hardware::SimBoard;
use solar_mgr::app::service::ManagerService;
use solar_mgr::config::ManagerConfig;
use solar_mgr::protocol::{BUFFER_LENGTH, ERROR_REPLY};

fuzz_target!(|data: &[u8]| {
    let mut svc = ManagerService::new(ManagerConfig::default(), &SimEeprom::new(), 0);
    let mut board = SimBoard::new();

    // First byte of each chunk is the frame length.
    let mut rest = data;
    let mut now = 0u32;
    while let Some((&len, tail)) = rest.split_first() {
        let n = usize::from(len).min(tail.len());
        let (frame, next) = tail.split_at(n);
        rest = next;
        now = now.wrapping_add(7);

        let reply = svc.dispatch(frame, now, &mut board);
        assert!(reply.len() <= BUFFER_LENGTH, "reply exceeds bus buffer");
        if !frame.is_empty() && reply.as_slice() != [ERROR_REPLY] {
            assert_eq!(reply[0], frame[0], "reply must echo the command");
        }
    }

    assert!(svc.config().validate().is_ok(), "accepted writes broke the config");
    assert!(svc.limits().limits().validate().is_ok());
});
