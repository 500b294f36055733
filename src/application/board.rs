//! The board: UI-facing surface of one owner's synchronized link list.
//!
//! A [`LinkBoard`] owns the local store, the reorder session, the per-link
//! mutation queue, and the background task that merges realtime events.
//! The UI reads ordered snapshots (pull via [`LinkBoard::snapshot`], push
//! via [`LinkBoard::subscribe`]) and never observes intermediate state:
//! every visible transition is published as one complete snapshot.
//!
//! Locking: board state lives behind a `parking_lot` mutex that is never
//! held across an await. Remote calls run between two short critical
//! sections (optimistic apply, then merge or rollback).

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::merge::{self, MergeBuffer};
use crate::application::mutation_queue::MutationQueue;
use crate::application::reorder::{effective_order, ReorderSession};
use crate::application::store::LinkStore;
use crate::config::SyncConfig;
use crate::domain::change_event::ChannelStatus;
use crate::domain::entities::Link;
use crate::domain::gateway::LinkGateway;
use crate::error::SyncError;

/// Everything the board, its mutation pipelines, and the merge task share.
pub(crate) struct Shared<G> {
    pub gateway: Arc<G>,
    pub owner_id: String,
    pub config: SyncConfig,
    pub state: Mutex<BoardState>,
    pub queue: MutationQueue,
    pub snapshot_tx: watch::Sender<Vec<Link>>,
    pub status_tx: watch::Sender<ChannelStatus>,
}

/// Mutable board state, guarded by [`Shared::state`].
pub(crate) struct BoardState {
    pub store: LinkStore,
    pub session: ReorderSession,
    pub buffer: MergeBuffer,
}

/// Synchronized view of one owner's link list.
///
/// Created with [`LinkBoard::connect`]. Dropping the board stops the
/// background merge task.
pub struct LinkBoard<G> {
    shared: Arc<Shared<G>>,
    merge_task: JoinHandle<()>,
}

impl<G: LinkGateway + 'static> LinkBoard<G> {
    /// Connects to the backend: subscribes to realtime changes, loads the
    /// initial list, and starts the merge task.
    ///
    /// The subscription is opened before the list is fetched so that no
    /// change can fall between the two; an event that races the initial
    /// load is simply re-applied over the listed state.
    ///
    /// `config` is taken as given; binaries should run
    /// [`SyncConfig::validate`] first.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PermissionDenied`] when `owner_id` is not
    /// accessible, [`SyncError::Network`] when the backend is unreachable.
    pub async fn connect(
        gateway: Arc<G>,
        owner_id: impl Into<String>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        let owner_id = owner_id.into();

        let events = gateway.subscribe(&owner_id).await?;
        let links = gateway.list(&owner_id).await?;
        tracing::info!(owner_id = %owner_id, links = links.len(), "link board connected");

        let mut store = LinkStore::new();
        store.replace_all(links);
        let initial = store.ordered();

        let (snapshot_tx, _) = watch::channel(initial);
        let (status_tx, _) = watch::channel(ChannelStatus::Live);

        let shared = Arc::new(Shared {
            gateway,
            owner_id,
            config,
            state: Mutex::new(BoardState {
                store,
                session: ReorderSession::new(),
                buffer: MergeBuffer::new(),
            }),
            queue: MutationQueue::new(),
            snapshot_tx,
            status_tx,
        });

        let merge_task = tokio::spawn(merge::run_merge_task(Arc::clone(&shared), events));

        Ok(Self { shared, merge_task })
    }

    pub fn owner_id(&self) -> &str {
        &self.shared.owner_id
    }

    /// Current rendered order: the candidate order while a drag or commit
    /// is active, the store order otherwise.
    pub fn snapshot(&self) -> Vec<Link> {
        let state = self.shared.state.lock();
        rendered_snapshot(&state)
    }

    /// Watch channel carrying every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Link>> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn channel_status(&self) -> ChannelStatus {
        self.shared.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Starts dragging `id`. The list keeps rendering in the captured
    /// candidate order until the drag is committed or cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] for unknown ids and
    /// [`SyncError::Conflict`] when a session is already active.
    pub fn begin_drag(&self, id: &str) -> Result<(), SyncError> {
        let mut state = self.shared.state.lock();
        let order = state.store.order_ids();
        state.session.begin(order, id)?;
        tracing::debug!(id, "drag started");
        Ok(())
    }

    /// Previews the dragged link at `target_index`. Purely local; no
    /// remote traffic, no position rewrites.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] when no drag is active.
    pub fn drag_over(&self, target_index: usize) -> Result<(), SyncError> {
        let mut state = self.shared.state.lock();
        let moved = state.session.drag_over(target_index)?;
        if moved {
            publish_locked(&state, &self.shared.snapshot_tx);
        }
        Ok(())
    }

    /// Abandons the active drag and snaps rendering back to the store
    /// order. Remote events that piled up behind the session are applied
    /// now.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] when idle or when the commit is
    /// already in flight.
    pub fn cancel_drag(&self) -> Result<(), SyncError> {
        let mut state = self.shared.state.lock();
        state.session.cancel()?;
        merge::drain_session(&mut state, &self.shared.queue, &self.shared.owner_id);
        publish_locked(&state, &self.shared.snapshot_tx);
        tracing::debug!("drag cancelled");
        Ok(())
    }

    /// Discards local knowledge and reloads the full list from the
    /// backend. Deferred realtime events are dropped; the fresh list
    /// already reflects them.
    ///
    /// # Errors
    ///
    /// Propagates the gateway failure unchanged; local state is kept
    /// as-is in that case.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        metrics::counter!("linkboard_resyncs_total", "reason" => "manual").increment(1);
        let links = self.shared.gateway.list(&self.shared.owner_id).await?;

        let mut state = self.shared.state.lock();
        state.buffer.clear();
        state.store.replace_all(links);
        publish_locked(&state, &self.shared.snapshot_tx);
        tracing::info!(links = state.store.len(), "refreshed from backend");
        Ok(())
    }

    pub(crate) fn shared(&self) -> &Arc<Shared<G>> {
        &self.shared
    }
}

impl<G> Drop for LinkBoard<G> {
    fn drop(&mut self) {
        self.merge_task.abort();
    }
}

impl<G> std::fmt::Debug for LinkBoard<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkBoard")
            .field("owner_id", &self.shared.owner_id)
            .finish_non_exhaustive()
    }
}

/// Builds the list the UI should render right now.
pub(crate) fn rendered_snapshot(state: &BoardState) -> Vec<Link> {
    match state.session.render_order() {
        Some(candidate) => effective_order(&state.store, candidate)
            .iter()
            .filter_map(|id| state.store.get(id).cloned())
            .collect(),
        None => state.store.ordered(),
    }
}

/// Publishes the current rendered snapshot. Callers hold the state lock,
/// so snapshots go out in the same order the changes happened.
pub(crate) fn publish_locked(state: &BoardState, tx: &watch::Sender<Vec<Link>>) {
    tx.send_replace(rendered_snapshot(state));
}
