//! Run state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a single drip run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Selecting,
    Generating,
    Delivering,
    Committing,
    Syncing,
    /// Lead sent and committed. Sync may still have failed.
    Done,
    /// Nothing to do this run.
    Aborted,
    Failed,
}

impl RunPhase {
    /// Check if this phase allows transitioning to another phase.
    pub fn can_transition_to(&self, target: RunPhase) -> bool {
        use RunPhase::*;

        matches!(
            (self, target),
            (Idle, Selecting) |
            (Selecting, Generating) | (Selecting, Aborted) | (Selecting, Failed) |
            (Generating, Delivering) | (Generating, Failed) |
            (Delivering, Committing) | (Delivering, Failed) |
            (Committing, Syncing) | (Committing, Failed) |
            (Syncing, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted | Self::Failed)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Selecting => "selecting",
            Self::Generating => "generating",
            Self::Delivering => "delivering",
            Self::Committing => "committing",
            Self::Syncing => "syncing",
            Self::Done => "done",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A phase change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: RunPhase,
    pub to: RunPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Current phase plus the path taken to reach it.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseTracker {
    phase: RunPhase,
    transitions: Vec<PhaseTransition>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            transitions: Vec::new(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    /// Phases visited, starting from `Idle`.
    pub fn path(&self) -> Vec<RunPhase> {
        std::iter::once(RunPhase::Idle)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }

    pub fn transition_to(&mut self, next: RunPhase, reason: Option<String>) -> Result<(), String> {
        if !self.phase.can_transition_to(next) {
            return Err(format!("Cannot transition from {} to {}", self.phase, next));
        }
        tracing::debug!(from = %self.phase, to = %next, "Run phase change");
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to: next,
            timestamp: Utc::now(),
            reason,
        });
        self.phase = next;
        Ok(())
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RunPhase::*;

    #[test]
    fn happy_path_is_valid() {
        let mut t = PhaseTracker::new();
        for next in [Selecting, Generating, Delivering, Committing, Syncing, Done] {
            t.transition_to(next, None).unwrap();
        }
        assert_eq!(t.phase(), Done);
        assert_eq!(t.path().len(), 7);
        assert!(t.phase().is_terminal());
    }

    #[test]
    fn failure_edges() {
        assert!(Selecting.can_transition_to(Aborted));
        assert!(Generating.can_transition_to(Failed));
        assert!(Delivering.can_transition_to(Failed));
        assert!(Committing.can_transition_to(Failed));
        // A sync failure never fails the run.
        assert!(!Syncing.can_transition_to(Failed));
    }

    #[test]
    fn no_skipping_delivery() {
        assert!(!Generating.can_transition_to(Committing));
        assert!(!Selecting.can_transition_to(Delivering));
        assert!(!Idle.can_transition_to(Done));
    }

    #[test]
    fn terminal_phases_are_final() {
        for terminal in [Done, Aborted, Failed] {
            for next in [Idle, Selecting, Generating, Delivering, Committing, Syncing, Done, Aborted, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn invalid_transition_reports_error() {
        let mut t = PhaseTracker::new();
        let err = t.transition_to(Delivering, None).unwrap_err();
        assert_eq!(err, "Cannot transition from idle to delivering");
        assert_eq!(t.phase(), Idle);
        assert!(t.transitions().is_empty());
    }
}
