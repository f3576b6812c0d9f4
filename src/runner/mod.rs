//! Run controller: phase tracking, outcome reporting, and the drip loop.

pub mod drip;
pub mod outcome;
pub mod state;

pub use drip::DripRunner;
pub use outcome::{
    AbortReason, CONFIG_EXIT_CODE, LeadSummary, RunClass, RunFailure, RunOutcome, SyncReport,
};
pub use state::{PhaseTracker, PhaseTransition, RunPhase};
