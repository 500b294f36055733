//! Realtime merge layer.
//!
//! Consumes the gateway subscription and folds remote changes into the
//! local store. Three situations make an event unsafe to apply right away:
//!
//! 1. a reorder session is active (applying would fight the candidate
//!    order the user is looking at),
//! 2. the event's link has a mutation in flight (the mutation's own
//!    resolution will bring newer truth),
//! 3. the event is the `Inserted` echo of this client's own unresolved
//!    create, recognizable only by URL until the server id exists.
//!
//! Such events are parked in the [`MergeBuffer`] and re-routed, in receipt
//! order, when the blocking condition clears. If the buffer outgrows its
//! budget, or the channel reports a gap, incremental merging is abandoned
//! for a full resynchronization.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::application::board::{publish_locked, BoardState, Shared};
use crate::application::mutation_queue::MutationQueue;
use crate::domain::change_event::{ChannelEvent, ChannelStatus, LinkChange};
use crate::domain::gateway::LinkGateway;
use crate::error::SyncError;
use crate::utils::url_normalizer::dedup_key;

/// Parked remote events, in receipt order per bucket.
pub(crate) struct MergeBuffer {
    /// Everything that arrived while a reorder session was active.
    session: VecDeque<LinkChange>,
    /// Events parked behind one in-flight mutation, keyed by the id that
    /// blocks them (for create echoes: the provisional id).
    by_id: HashMap<String, VecDeque<LinkChange>>,
}

impl MergeBuffer {
    pub fn new() -> Self {
        Self {
            session: VecDeque::new(),
            by_id: HashMap::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.session.len() + self.by_id.values().map(VecDeque::len).sum::<usize>()
    }

    pub fn clear(&mut self) {
        self.session.clear();
        self.by_id.clear();
    }

    fn push_session(&mut self, change: LinkChange) {
        self.session.push_back(change);
    }

    fn push_for_id(&mut self, id: &str, change: LinkChange) {
        self.by_id.entry(id.to_string()).or_default().push_back(change);
    }

    fn has_id(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    fn take_session(&mut self) -> VecDeque<LinkChange> {
        std::mem::take(&mut self.session)
    }

    fn take_for_id(&mut self, id: &str) -> VecDeque<LinkChange> {
        self.by_id.remove(id).unwrap_or_default()
    }
}

/// Routes one remote change: applies it, or parks it behind whatever
/// blocks it. Returns whether visible state moved.
pub(crate) fn route_change(
    state: &mut BoardState,
    queue: &MutationQueue,
    owner_id: &str,
    change: LinkChange,
) -> bool {
    if change.owner_id() != owner_id {
        // Not our list; a well-behaved backend never sends these.
        tracing::warn!(
            id = change.link_id(),
            owner_id = change.owner_id(),
            "dropping event for foreign owner"
        );
        return false;
    }

    if state.session.is_active() {
        metrics::counter!("linkboard_events_buffered_total", "cause" => "session").increment(1);
        state.buffer.push_session(change);
        return false;
    }

    let id = change.link_id().to_string();
    if queue.is_inflight(&id) || state.buffer.has_id(&id) {
        metrics::counter!("linkboard_events_buffered_total", "cause" => "inflight").increment(1);
        state.buffer.push_for_id(&id, change);
        return false;
    }

    if let LinkChange::Inserted(link) = &change {
        if let Some(pending) = queue.pending_create_for_url(&dedup_key(&link.url)) {
            // Echo of our own create, racing its confirmation.
            metrics::counter!("linkboard_events_buffered_total", "cause" => "create_echo")
                .increment(1);
            state.buffer.push_for_id(&pending, change);
            return false;
        }
    }

    state.store.apply_change(&change)
}

/// Re-routes the events parked behind `id` after its mutation settled.
/// Returns whether visible state moved.
pub(crate) fn drain_for_id(
    state: &mut BoardState,
    queue: &MutationQueue,
    owner_id: &str,
    id: &str,
) -> bool {
    let parked = state.buffer.take_for_id(id);
    let mut visible = false;
    for change in parked {
        visible |= route_change(state, queue, owner_id, change);
    }
    visible
}

/// Re-routes everything parked behind the reorder session after it ended.
/// Returns whether visible state moved.
pub(crate) fn drain_session(state: &mut BoardState, queue: &MutationQueue, owner_id: &str) -> bool {
    let parked = state.buffer.take_session();
    let mut visible = false;
    for change in parked {
        visible |= route_change(state, queue, owner_id, change);
    }
    visible
}

/// Background consumer of the realtime subscription. Runs until the board
/// is dropped or reconnecting fails with a non-retryable error.
pub(crate) async fn run_merge_task<G: LinkGateway + 'static>(
    shared: Arc<Shared<G>>,
    mut events: mpsc::Receiver<ChannelEvent>,
) {
    loop {
        let interruption = match events.recv().await {
            Some(ChannelEvent::Changed(change)) => {
                let over_budget = {
                    let mut state = shared.state.lock();
                    let visible = route_change(&mut state, &shared.queue, &shared.owner_id, change);
                    if visible {
                        publish_locked(&state, &shared.snapshot_tx);
                    }
                    state.buffer.total() > shared.config.event_buffer_limit
                };
                if !over_budget {
                    continue;
                }
                "buffer_overflow"
            }
            Some(ChannelEvent::Interrupted) => "interrupted",
            None => "closed",
        };

        tracing::warn!(reason = interruption, "realtime channel needs resync");
        match resync(&shared).await {
            Ok(fresh) => events = fresh,
            Err(err) => {
                tracing::error!(error = %err, "giving up on the realtime channel");
                break;
            }
        }
    }

    shared.status_tx.send_replace(ChannelStatus::Lost);
}

/// Replaces local state with a freshly listed one and reopens the
/// subscription, retrying transient failures with capped exponential
/// backoff. Non-retryable failures (most importantly
/// [`SyncError::PermissionDenied`]) abort immediately.
async fn resync<G: LinkGateway>(
    shared: &Shared<G>,
) -> Result<mpsc::Receiver<ChannelEvent>, SyncError> {
    metrics::counter!("linkboard_resyncs_total", "reason" => "channel").increment(1);

    // First delay ~= base, doubling up to the cap.
    let base = shared.config.reconnect_base_delay_ms;
    let strategy = ExponentialBackoff::from_millis(2)
        .factor((base / 2).max(1))
        .max_delay(std::time::Duration::from_millis(
            shared.config.reconnect_max_delay_ms,
        ))
        .map(jitter);

    let attempts = AtomicU32::new(0);

    let outcome = RetryIf::spawn(
        strategy,
        || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            shared
                .status_tx
                .send_replace(ChannelStatus::Reconnecting { attempt });
            tracing::debug!(attempt, "resynchronizing with backend");
            async move {
                // Subscribe before listing so no change can fall
                // between the snapshot and the new channel.
                let events = shared.gateway.subscribe(&shared.owner_id).await?;
                let links = shared.gateway.list(&shared.owner_id).await?;
                Ok::<_, SyncError>((links, events))
            }
        },
        |err: &SyncError| err.is_retryable(),
    )
    .await;

    let (links, events) = outcome?;

    {
        let mut state = shared.state.lock();
        // Everything parked is stale now; the listed state contains it.
        state.buffer.clear();
        state.store.replace_all(links);
        publish_locked(&state, &shared.snapshot_tx);
        tracing::info!(links = state.store.len(), "resynchronized");
    }
    shared.status_tx.send_replace(ChannelStatus::Live);

    Ok(events)
}
