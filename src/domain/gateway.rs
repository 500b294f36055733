//! Gateway trait for the authoritative link backend.

use crate::domain::change_event::ChannelEvent;
use crate::domain::entities::{Link, LinkPatch, NewLink};
use crate::error::SyncError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One entry of a reorder batch: the link and the dense position it
/// should land on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionUpdate {
    pub id: String,
    pub position: u32,
}

/// Interface to the authoritative backend for one user's link list.
///
/// Every call is remote and fallible. The engine treats whatever a
/// successful call returns as the truth for the affected rows and merges
/// it over local optimistic state. Implementations enforce ownership,
/// uniqueness, and the public-link cap on their side; the engine's local
/// pre-checks only exist to fail fast.
///
/// # Implementations
///
/// - [`crate::infrastructure::memory::InMemoryGateway`] - In-process
///   reference backend used by tests and the demo binary
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkGateway: Send + Sync {
    /// Fetches the full link list of `owner_id`, sorted by position.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PermissionDenied`] if the caller may not read
    /// that list, [`SyncError::Network`] on transport failure.
    async fn list(&self, owner_id: &str) -> Result<Vec<Link>, SyncError>;

    /// Creates a link and returns the authoritative row, including the
    /// server-assigned id and final position.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] on duplicate title/url or when the
    /// public-link cap would be exceeded, [`SyncError::Network`] on
    /// transport failure.
    async fn create(&self, new_link: NewLink) -> Result<Link, SyncError>;

    /// Partially updates a link. `None` fields are unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the link does not exist,
    /// [`SyncError::PermissionDenied`] if it belongs to someone else,
    /// [`SyncError::Conflict`] on duplicate title/url.
    async fn update(&self, id: &str, patch: LinkPatch) -> Result<Link, SyncError>;

    /// Deletes a link. Returns the remaining rows of the owner's list,
    /// renumbered densely by the backend.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the link does not exist,
    /// [`SyncError::PermissionDenied`] if it belongs to someone else.
    async fn delete(&self, id: &str) -> Result<Vec<Link>, SyncError>;

    /// Applies a batch of position moves atomically: either every move
    /// commits or none does. Returns the full reordered list.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if any referenced link is gone,
    /// [`SyncError::Conflict`] if the requested positions do not form a
    /// dense block.
    async fn reorder_batch(&self, moves: Vec<PositionUpdate>) -> Result<Vec<Link>, SyncError>;

    /// Sets the visibility flag of a link.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] when making a link public would
    /// exceed the cap, [`SyncError::NotFound`] /
    /// [`SyncError::PermissionDenied`] as for [`update`](Self::update).
    async fn set_visibility(&self, id: &str, is_public: bool) -> Result<Link, SyncError>;

    /// Opens a realtime subscription for `owner_id`'s list.
    ///
    /// The returned receiver yields row-level change events in backend
    /// commit order. The channel closing, or an explicit
    /// [`ChannelEvent::Interrupted`], means events were lost and the
    /// consumer must resynchronize via [`list`](Self::list) plus a fresh
    /// subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PermissionDenied`] if the caller may not
    /// observe that list, [`SyncError::Network`] on transport failure.
    async fn subscribe(&self, owner_id: &str) -> Result<mpsc::Receiver<ChannelEvent>, SyncError>;
}
