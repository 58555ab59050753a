//! Membership source seam

use crate::{GroupDefinition, GroupId, SourceError};
use async_trait::async_trait;
use std::sync::Arc;

/// A MembershipSource supplies the current hosts of one dispatcher set and
/// blocks on changes to them.
///
/// Implementations keep their snapshot behind their own lock and replace it
/// wholesale, so `hosts` and `export` never observe a partial update.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    /// Dispatcher set index this source feeds
    fn id(&self) -> GroupId;

    /// Refresh the snapshot once from the backend
    async fn update(&self) -> Result<(), SourceError>;

    /// Block until the membership changes.
    ///
    /// Returns `Ok(())` after the snapshot has been replaced, or
    /// `Err(SourceError::StreamClosed)` when the underlying watch ended.
    async fn watch(&self) -> Result<(), SourceError>;

    /// Render the snapshot as dispatcher list lines
    fn export(&self) -> String;

    /// Current member addresses, in no particular order
    fn hosts(&self) -> Vec<String>;
}

/// Builds membership sources from set definitions
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn create(
        &self,
        definition: &GroupDefinition,
    ) -> Result<Arc<dyn MembershipSource>, SourceError>;
}
