//! Application-side clients of the manager.
//!
//! Everything here runs on the application controller and talks to the
//! manager through resumable [`RegisterAccess`](crate::twi::access::RegisterAccess)
//! steps.  Each client exposes a `poll` that performs at most one bus
//! operation, so several of them can share the cooperative loop.
//!
//! Text output goes to any [`core::fmt::Write`] as one JSON object per
//! line, terminated by `\r\n`.

pub mod daynight;
pub mod report;
pub mod shutdown;

use crate::error::Error;

/// Result of one `poll` of a multi-step client command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Call `poll` again on a later pass.
    Pending,
    /// The command finished; further polls do nothing.
    Done,
}

/// Render a failed remote field the way every report does.
pub(crate) fn write_err(out: &mut dyn core::fmt::Write, err: Error) -> core::fmt::Result {
    write!(out, "\"err{}\"", err.code())
}
