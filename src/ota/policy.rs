//! Error recovery policy.
//!
//! Keeps the session's transition table declarative: the session classifies
//! a failure and the policy decides whether the current transfer survives it.

use super::error::ErrorKind;

/// Where a failure was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The buffer itself could not be decoded.
    Decode,
    /// The buffer decoded but does not fit the session's sequence.
    Sequence,
    /// The storage collaborator failed.
    Storage,
}

/// Session phase at the time of the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No transfer active (idle, complete, or aborted).
    Inactive,
    /// A validated transfer is receiving chunks.
    InProgress,
}

/// A classified failure handed to the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failure {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Where it was detected.
    pub stage: Stage,
    /// Session phase when it happened.
    pub phase: Phase,
}

/// What the session does about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Leave session state untouched and report the rejection.
    Report,
    /// Discard the session and force the sender to restart from offset 0.
    Abort,
}

/// Decides how the session reacts to failures.
pub trait RecoveryPolicy {
    /// Map a failure to an action. Storage failures abort regardless of
    /// the answer.
    fn decide(&self, failure: Failure) -> Action;

    /// Whether an exact retransmission of the previous chunk is accepted
    /// idempotently. When false it is handled like any other gap.
    fn accepts_duplicates(&self) -> bool {
        true
    }
}

/// Default policy.
///
/// Decode errors and anything arriving outside a transfer are reported and
/// otherwise ignored, so the sender may simply retransmit. Sequencing or
/// corruption errors during a transfer abort it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LenientPolicy;

impl RecoveryPolicy for LenientPolicy {
    fn decide(&self, failure: Failure) -> Action {
        match (failure.stage, failure.phase) {
            (Stage::Storage, _) => Action::Abort,
            (Stage::Decode, _) => Action::Report,
            (Stage::Sequence, Phase::Inactive) => Action::Report,
            (Stage::Sequence, Phase::InProgress) => Action::Abort,
        }
    }
}

/// Strict policy: every failure aborts and duplicates count as gaps.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictPolicy;

impl RecoveryPolicy for StrictPolicy {
    fn decide(&self, _failure: Failure) -> Action {
        Action::Abort
    }

    fn accepts_duplicates(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(kind: ErrorKind, stage: Stage, phase: Phase) -> Failure {
        Failure { kind, stage, phase }
    }

    #[test]
    fn test_lenient_reports_decode_errors() {
        let policy = LenientPolicy;
        for phase in [Phase::Inactive, Phase::InProgress] {
            assert_eq!(
                policy.decide(failure(ErrorKind::MalformedHeader, Stage::Decode, phase)),
                Action::Report
            );
            assert_eq!(
                policy.decide(failure(ErrorKind::PayloadOverflow, Stage::Decode, phase)),
                Action::Report
            );
        }
    }

    #[test]
    fn test_lenient_idle_rejections_do_not_abort() {
        let policy = LenientPolicy;
        for kind in [
            ErrorKind::SignatureInvalid,
            ErrorKind::OutOfOrderStart,
            ErrorKind::NoActiveSession,
        ] {
            assert_eq!(
                policy.decide(failure(kind, Stage::Sequence, Phase::Inactive)),
                Action::Report
            );
        }
    }

    #[test]
    fn test_lenient_aborts_on_gap() {
        assert_eq!(
            LenientPolicy.decide(failure(
                ErrorKind::SequenceGap,
                Stage::Sequence,
                Phase::InProgress
            )),
            Action::Abort
        );
        assert!(LenientPolicy.accepts_duplicates());
    }

    #[test]
    fn test_storage_failures_abort() {
        assert_eq!(
            LenientPolicy.decide(failure(
                ErrorKind::WriteFailed,
                Stage::Storage,
                Phase::InProgress
            )),
            Action::Abort
        );
    }

    #[test]
    fn test_strict_aborts_everything() {
        assert_eq!(
            StrictPolicy.decide(failure(
                ErrorKind::MalformedHeader,
                Stage::Decode,
                Phase::Inactive
            )),
            Action::Abort
        );
        assert!(!StrictPolicy.accepts_duplicates());
    }
}
