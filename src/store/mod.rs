//! Persistence layer: the CSV lead store and its run lock.

pub mod csv_store;
pub mod lead;
pub mod lock;

pub use csv_store::{CommitOutcome, LeadHandle, LeadStore, StoreSnapshot};
pub use lead::LeadRecord;
pub use lock::RunLock;
