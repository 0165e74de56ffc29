//! Remote Status Vocabulary and Step Outcomes
//!
//! The status strings are part of the processor's wire contract and are
//! matched exactly.

use std::fmt;

/// Recipient is approved and can receive transfers
pub const RECIPIENT_APPROVED: &str = "approved";

/// Transfer is queued for execution by the processor
pub const TRANSFER_ENQUEUED: &str = "enqueued";

/// Entity permanently rejected by the processor (local marker)
pub const NON_VALID: &str = "NON_VALID";

/// Check whether a recipient status needs no further remote calls
#[inline]
pub fn recipient_is_terminal(status: Option<&str>) -> bool {
    matches!(status, Some(RECIPIENT_APPROVED) | Some(NON_VALID))
}

/// Check whether a transfer status needs no further remote calls
#[inline]
pub fn transfer_is_terminal(status: Option<&str>) -> bool {
    matches!(status, Some(TRANSFER_ENQUEUED) | Some(NON_VALID))
}

/// Result of checking an entity against the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Entity reached its terminal-success status
    Settled,
    /// Entity is missing or idle remotely; the caller must create or advance it
    Unsettled,
    /// Processor reports a transition in flight; retry on the next pass
    Pending,
    /// Gateway call failed; leave the entity alone until the next pass
    Deferred,
}

impl Validation {
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Validation::Pending)
    }

    /// Whether the caller should create or advance the entity now
    #[inline]
    pub fn needs_enrollment(&self) -> bool {
        matches!(self, Validation::Unsettled)
    }
}

/// Result of creating or advancing an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enrollment {
    /// Request accepted; the outcome is observed on the next validation
    Submitted,
    /// A fresh entity was created and cannot be approved yet
    Pending,
    /// No request sent (terminal-invalid, or the call failed and will be retried)
    Skipped,
}

impl Enrollment {
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Enrollment::Pending)
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every recipient and transfer reached a terminal status
    Done,
    /// Attempts ran out (or shutdown was requested) while work was still pending
    Exhausted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Done => "DONE",
            RunOutcome::Exhausted => "EXHAUSTED",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(recipient_is_terminal(Some("approved")));
        assert!(recipient_is_terminal(Some("NON_VALID")));
        assert!(!recipient_is_terminal(Some("draft")));
        assert!(!recipient_is_terminal(None));

        assert!(transfer_is_terminal(Some("enqueued")));
        assert!(transfer_is_terminal(Some("NON_VALID")));
        assert!(!transfer_is_terminal(Some("approved")));
        assert!(!transfer_is_terminal(None));
    }

    #[test]
    fn test_status_matching_is_exact() {
        assert!(!recipient_is_terminal(Some("Approved")));
        assert!(!transfer_is_terminal(Some("non_valid")));
    }

    #[test]
    fn test_display() {
        assert_eq!(RunOutcome::Done.to_string(), "DONE");
        assert_eq!(RunOutcome::Exhausted.to_string(), "EXHAUSTED");
    }
}
