//! Exit code constants for the drover CLI.
//!
//! - 0: Success (feature reached a terminal status)
//! - 1: User error (bad args, missing feature, invalid working directory)
//! - 2: Agent failure (classified provider error or pipeline failure)
//! - 4: Feature is already running
//! - 130: Execution was interrupted

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, missing feature, or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// The agent or a pipeline step failed.
pub const AGENT_FAILURE: i32 = 2;

/// Another execution already holds the feature's concurrency slot.
pub const ALREADY_RUNNING: i32 = 4;

/// The execution was cancelled (Ctrl-C or an explicit stop).
pub const INTERRUPTED: i32 = 130;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, USER_ERROR, AGENT_FAILURE, ALREADY_RUNNING, INTERRUPTED];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn exit_codes_fit_in_a_byte() {
        for code in [SUCCESS, USER_ERROR, AGENT_FAILURE, ALREADY_RUNNING, INTERRUPTED] {
            assert!((0..=255).contains(&code));
        }
    }
}
