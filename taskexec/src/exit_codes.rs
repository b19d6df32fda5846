//! Stable exit codes for `taskexec` commands.

use crate::core::types::TaskResult;

/// Command succeeded or the task completed.
pub const OK: i32 = 0;
/// Invalid configuration, I/O failure, or the task ended with an error.
pub const ERROR: i32 = 1;
/// The task ran but did not complete (edit loop out of iterations).
pub const FAILED: i32 = 4;
/// Interrupted by SIGINT; state was saved for resumption.
pub const INTERRUPTED: i32 = 130;

/// Exit code for a finished task.
pub fn for_result(result: &TaskResult) -> i32 {
    if result.completed {
        OK
    } else if result.error.is_some() {
        ERROR
    } else {
        FAILED
    }
}
