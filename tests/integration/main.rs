//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! with a manager and an application node on one simulated bus.  All
//! tests run on the host with no real hardware required.

mod bus_tests;
mod daynight_tests;
mod mock_hw;
mod shutdown_tests;
