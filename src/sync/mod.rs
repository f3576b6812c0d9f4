//! Remote publication of the lead store.
//!
//! The local file is the source of truth. Publishing is advisory: callers
//! record a failure in the run outcome and carry on.

pub mod github;

pub use github::{GithubSync, GithubSyncConfig};

use async_trait::async_trait;

use crate::error::SyncError;
use crate::store::StoreSnapshot;

#[async_trait]
pub trait StoreSync: Send + Sync {
    fn name(&self) -> &str;

    /// Push the full store content as a new remote revision.
    async fn publish(&self, snapshot: &StoreSnapshot) -> Result<(), SyncError>;
}
