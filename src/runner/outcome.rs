//! What a run did, for reporting and the process exit status.

use uuid::Uuid;

use crate::error::{DeliveryError, GenError, StoreError};
use crate::store::LeadRecord;

use super::state::{PhaseTracker, RunPhase};

/// The lead a run worked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadSummary {
    /// Zero-based data row in the store.
    pub row: usize,
    /// Company name as stored.
    pub company: String,
    /// Recipient address as stored, untrimmed.
    pub email: String,
    /// Role being pitched for.
    pub role: String,
}

impl LeadSummary {
    pub fn new(row: usize, lead: &LeadRecord) -> Self {
        Self {
            row,
            company: lead.company.clone(),
            email: lead.email.clone(),
            role: lead.role.clone(),
        }
    }
}

/// Why a run ended without sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    NothingEligible,
    DailyCapReached { sent_today: usize, limit: usize },
}

/// Result of remote publication. Reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncReport {
    NotAttempted,
    Published,
    Failed(String),
}

/// Where and why a run failed.
#[derive(Debug, thiserror::Error)]
pub enum RunFailure {
    #[error("lead store unavailable: {0}")]
    Store(#[source] StoreError),

    #[error("pitch generation failed: {0}")]
    Generation(#[source] GenError),

    #[error("delivery failed: {0}")]
    Delivery(#[source] DeliveryError),

    /// The message went out but the store did not record it.
    #[error("message sent but not recorded: {0}")]
    Commit(#[source] StoreError),
}

impl RunFailure {
    pub fn is_escalated(&self) -> bool {
        matches!(self, Self::Commit(_))
    }
}

/// Overall classification, mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunClass {
    /// Nothing eligible, or the daily cap was reached.
    NoOp,
    /// Sent and committed; sync may have failed.
    Success,
    /// Failed before any durable effect.
    Failed,
    /// Sent but not recorded. Next run may send a duplicate.
    Escalated,
}

impl RunClass {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NoOp | Self::Success => 0,
            Self::Failed => 1,
            Self::Escalated => 3,
        }
    }
}

/// Exit status for configuration and precondition errors.
pub const CONFIG_EXIT_CODE: u8 = 2;

/// Everything one invocation did.
#[derive(Debug)]
pub struct RunOutcome {
    /// Correlates this run's log lines.
    pub run_id: Uuid,
    /// Current phase and every transition that led to it.
    pub tracker: PhaseTracker,
    /// Set once a lead has been selected.
    pub lead: Option<LeadSummary>,
    /// Set only when the run ended in `Aborted`.
    pub abort_reason: Option<AbortReason>,
    /// Generation calls made, when known.
    pub generation_attempts: u32,
    /// Token budget of each generation call.
    pub token_budgets: Vec<u32>,
    /// Subject line of the composed message.
    pub subject: Option<String>,
    /// The transport accepted the message.
    pub delivered: bool,
    /// The sent flag reached disk.
    pub committed: bool,
    /// Remote publication result; never affects the classification.
    pub sync: SyncReport,
    /// First fatal failure, if any.
    pub failure: Option<RunFailure>,
}

impl RunOutcome {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            tracker: PhaseTracker::new(),
            lead: None,
            abort_reason: None,
            generation_attempts: 0,
            token_budgets: Vec::new(),
            subject: None,
            delivered: false,
            committed: false,
            sync: SyncReport::NotAttempted,
            failure: None,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.tracker.phase()
    }

    pub fn classification(&self) -> RunClass {
        match (&self.failure, self.phase()) {
            (Some(f), _) if f.is_escalated() => RunClass::Escalated,
            (Some(_), _) => RunClass::Failed,
            (None, RunPhase::Done) => RunClass::Success,
            (None, RunPhase::Aborted) => RunClass::NoOp,
            // Unfinished runs are never reported as success.
            (None, _) => RunClass::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.classification(), RunClass::NoOp | RunClass::Success)
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let target = self
            .lead
            .as_ref()
            .map(|l| format!("{} ({})", l.company, l.role))
            .unwrap_or_else(|| "no lead".to_string());

        match self.classification() {
            RunClass::NoOp => match &self.abort_reason {
                Some(AbortReason::DailyCapReached { sent_today, limit }) => {
                    format!("Daily cap reached ({sent_today}/{limit}). Nothing sent.")
                }
                _ => "No unsent leads remaining. Nothing to do.".to_string(),
            },
            RunClass::Success => match &self.sync {
                SyncReport::Published => format!("Pitched {target}. Store synced."),
                SyncReport::Failed(e) => {
                    format!("Pitched {target}. Sync failed (non-fatal): {e}")
                }
                SyncReport::NotAttempted => format!("Pitched {target}."),
            },
            RunClass::Failed => match &self.failure {
                Some(f) => format!("Run failed for {target}: {f}"),
                None => format!("Run ended in phase {} for {target}", self.phase()),
            },
            RunClass::Escalated => match &self.failure {
                Some(f) => format!("ESCALATED: {target}: {f}"),
                None => format!("ESCALATED: {target}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn outcome_through(phases: &[RunPhase]) -> RunOutcome {
        let mut o = RunOutcome::new(Uuid::new_v4());
        for p in phases {
            o.tracker.transition_to(*p, None).unwrap();
        }
        o
    }

    #[test]
    fn done_with_failed_sync_is_success() {
        use RunPhase::*;
        let mut o = outcome_through(&[Selecting, Generating, Delivering, Committing, Syncing, Done]);
        o.sync = SyncReport::Failed("502".into());
        assert_eq!(o.classification(), RunClass::Success);
        assert_eq!(o.classification().exit_code(), 0);
        assert!(o.summary().contains("non-fatal"));
    }

    #[test]
    fn aborted_is_noop() {
        let mut o = outcome_through(&[RunPhase::Selecting, RunPhase::Aborted]);
        o.abort_reason = Some(AbortReason::NothingEligible);
        assert_eq!(o.classification(), RunClass::NoOp);
        assert!(o.is_success());
    }

    #[test]
    fn commit_failure_is_escalated_and_distinct() {
        use RunPhase::*;
        let mut o = outcome_through(&[Selecting, Generating, Delivering, Committing, Failed]);
        o.failure = Some(RunFailure::Commit(StoreError::PersistFailure {
            path: PathBuf::from("leads.csv"),
            reason: "disk full".into(),
        }));
        assert_eq!(o.classification(), RunClass::Escalated);
        assert_eq!(o.classification().exit_code(), 3);
        assert!(!o.is_success());
        assert!(o.summary().starts_with("ESCALATED"));
    }

    #[test]
    fn delivery_failure_is_handled_failure() {
        use RunPhase::*;
        let mut o = outcome_through(&[Selecting, Generating, Delivering, Failed]);
        o.failure = Some(RunFailure::Delivery(DeliveryError::AuthFailed("535".into())));
        assert_eq!(o.classification(), RunClass::Failed);
        assert_eq!(o.classification().exit_code(), 1);
    }

    #[test]
    fn locked_store_reported_as_unavailable() {
        let failure = RunFailure::Store(StoreError::Locked {
            path: PathBuf::from("leads.csv.lock"),
        });
        let text = failure.to_string();
        assert!(text.starts_with("lead store unavailable"));
        assert!(text.contains("locked by another run"));
        assert!(!text.contains("could not open"));
        assert!(!failure.is_escalated());
    }

    #[test]
    fn unfinished_run_is_not_success() {
        let o = outcome_through(&[RunPhase::Selecting, RunPhase::Generating]);
        assert_eq!(o.classification(), RunClass::Failed);
    }
}
