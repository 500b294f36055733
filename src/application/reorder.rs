//! Drag-reorder session state machine.
//!
//! At most one session exists per board. The session only manipulates an
//! id permutation (the candidate order); positions stay untouched until
//! the commit pipeline derives the minimal renumbering diff.
//!
//! ```text
//!            begin_drag            commit_drag
//!   Idle ───────────────► Dragging ───────────► Committing
//!    ▲                       │                      │
//!    │      cancel_drag      │                      │ batch settles
//!    └───────────────────────┴──────────────────────┘
//! ```

use serde_json::json;

use crate::application::store::LinkStore;
use crate::domain::gateway::PositionUpdate;
use crate::error::SyncError;

/// Live data of an active drag: what is being dragged, where it started,
/// and the order the list would have if dropped right now.
#[derive(Debug, Clone)]
pub(crate) struct DragState {
    pub dragged_id: String,
    pub source_index: usize,
    pub candidate_order: Vec<String>,
}

#[derive(Debug)]
pub(crate) enum ReorderSession {
    Idle,
    Dragging(DragState),
    /// The drop happened and the batch is on the wire. The candidate
    /// order keeps driving rendering until the batch settles, and no new
    /// drag may start.
    Committing(DragState),
}

impl ReorderSession {
    pub fn new() -> Self {
        Self::Idle
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Candidate order to render from, if a session is active.
    pub fn render_order(&self) -> Option<&[String]> {
        match self {
            Self::Idle => None,
            Self::Dragging(state) | Self::Committing(state) => Some(&state.candidate_order),
        }
    }

    /// Starts a drag of `dragged_id` against the given current order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] if a session is already active and
    /// [`SyncError::NotFound`] if the id is not part of the order.
    pub fn begin(&mut self, current_order: Vec<String>, dragged_id: &str) -> Result<(), SyncError> {
        match self {
            Self::Dragging(_) => Err(SyncError::conflict(
                "A drag is already active",
                json!({ "dragged_id": dragged_id }),
            )),
            Self::Committing(_) => Err(SyncError::conflict(
                "A reorder commit is still in flight",
                json!({ "dragged_id": dragged_id }),
            )),
            Self::Idle => {
                let Some(source_index) = current_order.iter().position(|id| id == dragged_id)
                else {
                    return Err(SyncError::not_found(
                        "Link not found",
                        json!({ "id": dragged_id }),
                    ));
                };
                *self = Self::Dragging(DragState {
                    dragged_id: dragged_id.to_string(),
                    source_index,
                    candidate_order: current_order,
                });
                Ok(())
            }
        }
    }

    /// Moves the dragged link to `target_index` in the candidate order.
    /// Out-of-range targets clamp to the last slot. Returns whether the
    /// order actually changed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] when no drag is active.
    pub fn drag_over(&mut self, target_index: usize) -> Result<bool, SyncError> {
        let state = match self {
            Self::Dragging(state) => state,
            Self::Idle => return Err(SyncError::conflict("No active drag", json!({}))),
            Self::Committing(_) => {
                return Err(SyncError::conflict(
                    "A reorder commit is still in flight",
                    json!({}),
                ));
            }
        };

        // The dragged id is in the order by construction.
        let current_index = state
            .candidate_order
            .iter()
            .position(|id| id == &state.dragged_id)
            .unwrap_or(state.source_index);

        let clamped = target_index.min(state.candidate_order.len() - 1);
        if clamped == current_index {
            return Ok(false);
        }

        let id = state.candidate_order.remove(current_index);
        state.candidate_order.insert(clamped, id);
        Ok(true)
    }

    /// Abandons the drag and returns rendering to the store order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] when idle or when the commit is
    /// already in flight, since the remote batch cannot be recalled.
    pub fn cancel(&mut self) -> Result<(), SyncError> {
        match self {
            Self::Idle => Err(SyncError::conflict("No active drag to cancel", json!({}))),
            Self::Committing(_) => Err(SyncError::conflict(
                "A reorder commit is still in flight",
                json!({}),
            )),
            Self::Dragging(_) => {
                *self = Self::Idle;
                Ok(())
            }
        }
    }

    /// Transitions `Dragging -> Committing` and hands the frozen drag
    /// state to the commit pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] when idle or already committing.
    pub fn begin_commit(&mut self) -> Result<DragState, SyncError> {
        match self {
            Self::Idle => Err(SyncError::conflict("No active drag to commit", json!({}))),
            Self::Committing(_) => Err(SyncError::conflict(
                "A reorder commit is still in flight",
                json!({}),
            )),
            Self::Dragging(state) => {
                let frozen = state.clone();
                *self = Self::Committing(frozen.clone());
                Ok(frozen)
            }
        }
    }

    /// Ends the session once the commit pipeline settled, in success and
    /// in failure.
    pub fn finish_commit(&mut self) {
        if matches!(self, Self::Committing(_)) {
            *self = Self::Idle;
        }
    }
}

/// Reconciles a candidate id order against the current store content:
/// ids that vanished are dropped, rows created since the order was
/// captured are appended in store order.
pub(crate) fn effective_order(store: &LinkStore, candidate: &[String]) -> Vec<String> {
    let mut order: Vec<String> = candidate
        .iter()
        .filter(|id| store.contains(id))
        .cloned()
        .collect();
    for id in store.order_ids() {
        if !order.contains(&id) {
            order.push(id);
        }
    }
    order
}

/// Minimal dense renumbering for `order`: one update per link whose
/// stored position differs from its slot index.
pub(crate) fn position_diff(store: &LinkStore, order: &[String]) -> Vec<PositionUpdate> {
    order
        .iter()
        .enumerate()
        .filter_map(|(index, id)| {
            let target = index as u32;
            match store.position_of(id) {
                Some(current) if current == target => None,
                Some(_) => Some(PositionUpdate {
                    id: id.clone(),
                    position: target,
                }),
                // Vanished ids are the caller's concern; skip here.
                None => None,
            }
        })
        .collect()
}
