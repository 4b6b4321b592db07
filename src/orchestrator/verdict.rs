//! Terminal status decision.

use crate::feature::FeatureStatus;

/// Line prefix the transcript uses for every tool call.
pub const TOOL_MARKER: &str = "🔧 Tool:";

/// Trimmed transcript length below which a run is not trusted as real work.
pub const DEFAULT_MIN_CHARS: usize = 200;

/// Status a successful execution finishes in.
///
/// `skip_tests` always yields `waiting_approval`. Otherwise the transcript
/// must contain a tool marker and be at least `min_chars` characters once
/// trimmed to count as `verified`; agents that exit almost immediately
/// without touching anything land in `waiting_approval`.
pub fn terminal_status(transcript: &str, skip_tests: bool, min_chars: usize) -> FeatureStatus {
    if skip_tests {
        return FeatureStatus::WaitingApproval;
    }

    let trimmed = transcript.trim();
    let used_tools = trimmed.contains(TOOL_MARKER);
    let long_enough = trimmed.chars().count() >= min_chars;

    if used_tools && long_enough {
        FeatureStatus::Verified
    } else {
        FeatureStatus::WaitingApproval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrative(len: usize) -> String {
        "The change was applied and the tests pass. "
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    #[test]
    fn test_short_transcript_with_tool_waits_for_approval() {
        let transcript = "🔧 Tool: Read\nFile read.";
        assert_eq!(
            terminal_status(transcript, false, DEFAULT_MIN_CHARS),
            FeatureStatus::WaitingApproval
        );
    }

    #[test]
    fn test_tool_marker_and_long_narrative_is_verified() {
        let transcript = format!("🔧 Tool: Edit\n{}", narrative(220));
        assert_eq!(
            terminal_status(&transcript, false, DEFAULT_MIN_CHARS),
            FeatureStatus::Verified
        );
    }

    #[test]
    fn test_skip_tests_always_wins() {
        let transcript = format!("🔧 Tool: Edit\n{}", narrative(500));
        assert_eq!(
            terminal_status(&transcript, true, DEFAULT_MIN_CHARS),
            FeatureStatus::WaitingApproval
        );
    }

    #[test]
    fn test_long_transcript_without_tools_waits() {
        assert_eq!(
            terminal_status(&narrative(1000), false, DEFAULT_MIN_CHARS),
            FeatureStatus::WaitingApproval
        );
    }

    #[test]
    fn test_length_is_measured_after_trimming() {
        let padded = format!("\n\n   🔧 Tool: Bash\n{}   \n\n\n", narrative(150));
        assert_eq!(
            terminal_status(&padded, false, DEFAULT_MIN_CHARS),
            FeatureStatus::WaitingApproval
        );
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // 199 chars, but well over 200 bytes.
        let body: String = "é".repeat(199 - "🔧 Tool: X".chars().count());
        let transcript = format!("🔧 Tool: X{}", body);
        assert_eq!(transcript.chars().count(), 199);
        assert_eq!(
            terminal_status(&transcript, false, DEFAULT_MIN_CHARS),
            FeatureStatus::WaitingApproval
        );
        assert_eq!(
            terminal_status(&format!("{}é", transcript), false, DEFAULT_MIN_CHARS),
            FeatureStatus::Verified
        );
    }
}
