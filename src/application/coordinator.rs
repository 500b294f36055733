//! Optimistic mutation pipelines.
//!
//! Every remote mutation follows the same shape:
//!
//! 1. validate and normalize the input, rejecting locally when possible,
//! 2. under the state lock: run duplicate/cap pre-checks against current
//!    local state, capture a rollback plan for exactly the rows about to
//!    change, apply the optimistic result, publish,
//! 3. call the gateway with no lock held,
//! 4. under the state lock again: merge the authoritative result, or
//!    apply the rollback plan, then release deferred events and publish.
//!
//! Per-link FIFO admission comes from the mutation queue. The drag commit
//! takes no permits; the session state machine already guarantees there
//! is only ever one batch in flight.

use std::collections::HashSet;

use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::application::board::{publish_locked, BoardState, LinkBoard};
use crate::application::merge;
use crate::application::mutation_queue::{MutationPermit, MutationQueue};
use crate::application::reorder::{effective_order, position_diff};
use crate::application::store::RollbackPlan;
use crate::domain::entities::link::provisional_id;
use crate::domain::entities::{normalize_title, Link, LinkDraft, LinkPatch, NewLink};
use crate::domain::gateway::LinkGateway;
use crate::domain::policy;
use crate::error::SyncError;
use crate::utils::url_normalizer::{dedup_key, normalize_url};

impl<G: LinkGateway + 'static> LinkBoard<G> {
    /// Adds a link at the end of the list.
    ///
    /// The new row appears immediately under a provisional id; once the
    /// backend confirms, the row is swapped for the authoritative one and
    /// later mutations issued against the provisional id are redirected.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] for malformed input,
    /// [`SyncError::Conflict`] for duplicate title/url or a full public
    /// cap (local pre-check or remote rejection), and the gateway error
    /// after rollback otherwise.
    pub async fn add_link(&self, draft: LinkDraft) -> Result<Link, SyncError> {
        metrics::counter!("linkboard_mutations_total", "op" => "add").increment(1);
        draft.validate()?;
        let title = normalize_title(&draft.title)
            .map_err(|e| SyncError::validation(e.to_string(), json!({ "field": "title" })))?;
        let url = normalize_url(&draft.url)
            .map_err(|e| SyncError::validation(e.to_string(), json!({ "field": "url" })))?;
        let url_key = dedup_key(&url);

        let shared = self.shared();
        let provisional = provisional_id();
        let mut permit = shared.queue.acquire(&provisional).await;

        let (outbound, plan) = {
            let mut state = shared.state.lock();
            if state.store.title_taken(&title, None) {
                return Err(SyncError::conflict(
                    "A link with this title already exists",
                    json!({ "field": "title", "title": title }),
                ));
            }
            if state.store.url_taken(&url_key, None) {
                return Err(SyncError::conflict(
                    "A link with this URL already exists",
                    json!({ "field": "url", "url": url }),
                ));
            }
            if draft.is_public
                && !policy::can_make_public(
                    state.store.public_count(),
                    shared.config.max_public_links,
                )
            {
                return Err(SyncError::conflict(
                    "Maximum number of public links reached",
                    json!({ "cap": shared.config.max_public_links }),
                ));
            }

            let now = Utc::now();
            let position = state.store.len() as u32;
            let plan = RollbackPlan::capture(&state.store, [provisional.as_str()]);
            state.store.upsert(Link::new(
                provisional.clone(),
                shared.owner_id.clone(),
                title.clone(),
                url.clone(),
                position,
                draft.is_public,
                0,
                now,
                now,
            ));
            shared.queue.mark_create(&provisional, &url_key);
            publish_locked(&state, &shared.snapshot_tx);

            let outbound = NewLink {
                owner_id: shared.owner_id.clone(),
                title,
                url,
                position,
                is_public: draft.is_public,
            };
            (outbound, plan)
        };
        tracing::debug!(id = %provisional, "link added optimistically");

        match shared.gateway.create(outbound).await {
            Ok(confirmed) => {
                let mut state = shared.state.lock();
                state.store.remove(&provisional);
                shared.queue.record_alias(&provisional, &confirmed.id);
                state.store.upsert(confirmed.clone());
                permit.complete();
                merge::drain_for_id(&mut state, &shared.queue, &shared.owner_id, &provisional);
                publish_locked(&state, &shared.snapshot_tx);
                drop(state);
                tracing::info!(id = %confirmed.id, "link created");
                Ok(confirmed)
            }
            Err(err) => Err(self.reject_with_rollback("add", plan, &mut permit, err)),
        }
    }

    /// Edits title and/or url of a link.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] for malformed or empty patches,
    /// [`SyncError::NotFound`] when the link is gone,
    /// [`SyncError::Conflict`] on duplicates, and the gateway error after
    /// rollback otherwise.
    pub async fn edit_link(&self, id: &str, patch: LinkPatch) -> Result<Link, SyncError> {
        metrics::counter!("linkboard_mutations_total", "op" => "edit").increment(1);
        patch.validate()?;
        if patch.is_empty() {
            return Err(SyncError::validation(
                "Patch must change at least one field",
                json!({}),
            ));
        }
        let title = patch
            .title
            .as_deref()
            .map(normalize_title)
            .transpose()
            .map_err(|e| SyncError::validation(e.to_string(), json!({ "field": "title" })))?;
        let url = patch
            .url
            .as_deref()
            .map(normalize_url)
            .transpose()
            .map_err(|e| SyncError::validation(e.to_string(), json!({ "field": "url" })))?;
        let url_key = url.as_deref().map(dedup_key);

        let shared = self.shared();
        let mut permit = shared.queue.acquire(id).await;
        let target = permit.id().to_string();

        let (outbound, plan) = {
            let mut state = shared.state.lock();
            let Some(current) = state.store.get(&target).cloned() else {
                return Err(SyncError::not_found(
                    "Link not found",
                    json!({ "id": target }),
                ));
            };
            if let Some(t) = &title {
                if state.store.title_taken(t, Some(&target)) {
                    return Err(SyncError::conflict(
                        "A link with this title already exists",
                        json!({ "field": "title", "title": t }),
                    ));
                }
            }
            if let Some(key) = &url_key {
                if state.store.url_taken(key, Some(&target)) {
                    return Err(SyncError::conflict(
                        "A link with this URL already exists",
                        json!({ "field": "url" }),
                    ));
                }
            }

            let plan = RollbackPlan::capture(&state.store, [target.as_str()]);
            let mut next = current;
            if let Some(t) = &title {
                next.title = t.clone();
            }
            if let Some(u) = &url {
                next.url = u.clone();
            }
            next.updated_at = Utc::now();
            state.store.upsert(next);
            publish_locked(&state, &shared.snapshot_tx);

            (LinkPatch { title, url }, plan)
        };
        tracing::debug!(id = %target, "link edited optimistically");

        match shared.gateway.update(&target, outbound).await {
            Ok(confirmed) => {
                let mut state = shared.state.lock();
                state.store.upsert(confirmed.clone());
                permit.complete();
                merge::drain_for_id(&mut state, &shared.queue, &shared.owner_id, &target);
                publish_locked(&state, &shared.snapshot_tx);
                drop(state);
                tracing::info!(id = %confirmed.id, "link updated");
                Ok(confirmed)
            }
            Err(err) => Err(self.reject_with_rollback("edit", plan, &mut permit, err)),
        }
    }

    /// Deletes a link. Followers close the gap immediately; the backend's
    /// response renumbers authoritatively.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] when the link is gone, and the
    /// gateway error after rollback otherwise.
    pub async fn delete_link(&self, id: &str) -> Result<(), SyncError> {
        metrics::counter!("linkboard_mutations_total", "op" => "delete").increment(1);

        let shared = self.shared();
        let mut permit = shared.queue.acquire(id).await;
        let target = permit.id().to_string();

        let plan = {
            let mut state = shared.state.lock();
            let Some(current) = state.store.get(&target) else {
                return Err(SyncError::not_found(
                    "Link not found",
                    json!({ "id": target }),
                ));
            };
            let removed_position = current.position;

            let followers: Vec<Link> = state
                .store
                .ordered()
                .into_iter()
                .filter(|l| l.position > removed_position)
                .collect();
            let mut touched: Vec<String> = vec![target.clone()];
            touched.extend(followers.iter().map(|l| l.id.clone()));

            let plan = RollbackPlan::capture(&state.store, touched.iter().map(String::as_str));
            state.store.remove(&target);
            for mut follower in followers {
                follower.position -= 1;
                state.store.upsert(follower);
            }
            publish_locked(&state, &shared.snapshot_tx);
            plan
        };
        tracing::debug!(id = %target, "link deleted optimistically");

        match shared.gateway.delete(&target).await {
            Ok(remaining) => {
                let mut state = shared.state.lock();
                merge_authoritative_rows(&mut state, &shared.queue, remaining);
                permit.complete();
                merge::drain_for_id(&mut state, &shared.queue, &shared.owner_id, &target);
                publish_locked(&state, &shared.snapshot_tx);
                drop(state);
                tracing::info!(id = %target, "link deleted");
                Ok(())
            }
            Err(err) => Err(self.reject_with_rollback("delete", plan, &mut permit, err)),
        }
    }

    /// Makes a link public or private.
    ///
    /// Toggling to the value the link already has is a local no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] when going public would exceed the
    /// cap (checked locally first, enforced remotely regardless),
    /// [`SyncError::NotFound`] when the link is gone, and the gateway
    /// error after rollback otherwise.
    pub async fn toggle_visibility(&self, id: &str, make_public: bool) -> Result<Link, SyncError> {
        metrics::counter!("linkboard_mutations_total", "op" => "visibility").increment(1);

        let shared = self.shared();
        let mut permit = shared.queue.acquire(id).await;
        let target = permit.id().to_string();

        let plan = {
            let mut state = shared.state.lock();
            let Some(current) = state.store.get(&target).cloned() else {
                return Err(SyncError::not_found(
                    "Link not found",
                    json!({ "id": target }),
                ));
            };
            if current.is_public == make_public {
                return Ok(current);
            }
            if make_public
                && !policy::can_make_public(
                    state.store.public_count(),
                    shared.config.max_public_links,
                )
            {
                return Err(SyncError::conflict(
                    "Maximum number of public links reached",
                    json!({
                        "cap": shared.config.max_public_links,
                        "public_count": state.store.public_count(),
                    }),
                ));
            }

            let plan = RollbackPlan::capture(&state.store, [target.as_str()]);
            let mut next = current;
            next.is_public = make_public;
            next.updated_at = Utc::now();
            state.store.upsert(next);
            publish_locked(&state, &shared.snapshot_tx);
            plan
        };
        tracing::debug!(id = %target, make_public, "visibility toggled optimistically");

        match shared.gateway.set_visibility(&target, make_public).await {
            Ok(confirmed) => {
                let mut state = shared.state.lock();
                state.store.upsert(confirmed.clone());
                permit.complete();
                merge::drain_for_id(&mut state, &shared.queue, &shared.owner_id, &target);
                publish_locked(&state, &shared.snapshot_tx);
                drop(state);
                tracing::info!(id = %confirmed.id, public = confirmed.is_public, "visibility changed");
                Ok(confirmed)
            }
            Err(err) => Err(self.reject_with_rollback("visibility", plan, &mut permit, err)),
        }
    }

    /// Commits the active drag: derives the minimal renumbering, applies
    /// it optimistically, and sends it as one atomic batch.
    ///
    /// A drop on the original slot commits trivially without remote
    /// traffic. The session stays in its committing state until the batch
    /// settles; only then can the next drag begin.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] when no drag is active or a commit
    /// is already in flight, and the gateway error after rollback
    /// otherwise.
    pub async fn commit_drag(&self) -> Result<(), SyncError> {
        metrics::counter!("linkboard_mutations_total", "op" => "reorder").increment(1);
        let shared = self.shared();

        let (moves, plan) = {
            let mut state = shared.state.lock();
            let frozen = state.session.begin_commit()?;
            let order = effective_order(&state.store, &frozen.candidate_order);
            let moves = position_diff(&state.store, &order);

            if moves.is_empty() {
                state.session.finish_commit();
                merge::drain_session(&mut state, &shared.queue, &shared.owner_id);
                publish_locked(&state, &shared.snapshot_tx);
                tracing::debug!("drag commit was a no-op");
                return Ok(());
            }

            let touched: Vec<String> = moves.iter().map(|m| m.id.clone()).collect();
            let plan = RollbackPlan::capture(&state.store, touched.iter().map(String::as_str));
            let now = Utc::now();
            for update in &moves {
                if let Some(link) = state.store.get(&update.id) {
                    let mut next = link.clone();
                    next.position = update.position;
                    next.updated_at = now;
                    state.store.upsert(next);
                }
            }
            publish_locked(&state, &shared.snapshot_tx);
            (moves, plan)
        };
        tracing::debug!(moves = moves.len(), "reorder committed optimistically");

        match shared.gateway.reorder_batch(moves).await {
            Ok(rows) => {
                let mut state = shared.state.lock();
                merge_authoritative_rows(&mut state, &shared.queue, rows);
                state.session.finish_commit();
                merge::drain_session(&mut state, &shared.queue, &shared.owner_id);
                publish_locked(&state, &shared.snapshot_tx);
                drop(state);
                tracing::info!("reorder confirmed");
                Ok(())
            }
            Err(err) => {
                metrics::counter!("linkboard_rollbacks_total", "op" => "reorder").increment(1);
                let mut state = shared.state.lock();
                let restored = plan.apply(&mut state.store);
                state.session.finish_commit();
                merge::drain_session(&mut state, &shared.queue, &shared.owner_id);
                publish_locked(&state, &shared.snapshot_tx);
                drop(state);
                tracing::warn!(error = %err, restored, "reorder rejected, order restored");
                Err(err)
            }
        }
    }

    /// Rollback tail shared by the permit-carrying pipelines.
    fn reject_with_rollback(
        &self,
        op: &'static str,
        plan: RollbackPlan,
        permit: &mut MutationPermit,
        err: SyncError,
    ) -> SyncError {
        metrics::counter!("linkboard_rollbacks_total", "op" => op).increment(1);
        let shared = self.shared();
        let mut state = shared.state.lock();
        let restored = plan.apply(&mut state.store);
        permit.complete();
        merge::drain_for_id(&mut state, &shared.queue, &shared.owner_id, permit.id());
        publish_locked(&state, &shared.snapshot_tx);
        drop(state);
        tracing::warn!(op, error = %err, restored, "mutation rejected, optimistic state rolled back");
        err
    }
}

/// Folds a full-list gateway response into the store. Rows whose id has
/// its own mutation in flight are skipped (that mutation's resolution
/// carries newer truth); rows the response no longer contains are removed
/// under the same condition.
fn merge_authoritative_rows(state: &mut BoardState, queue: &MutationQueue, rows: Vec<Link>) {
    let returned: HashSet<String> = rows.iter().map(|l| l.id.clone()).collect();
    for row in rows {
        if queue.is_inflight(&row.id) {
            continue;
        }
        state.store.upsert(row);
    }
    for id in state.store.ids() {
        if !returned.contains(&id) && !queue.is_inflight(&id) {
            state.store.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::domain::change_event::ChannelEvent;
    use crate::domain::gateway::{MockLinkGateway, PositionUpdate};
    use crate::error::SyncErrorKind;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    const OWNER: &str = "owner-a";

    fn link(id: &str, title: &str, url: &str, position: u32) -> Link {
        let now = Utc::now();
        Link::new(
            id.to_string(),
            OWNER.to_string(),
            title.to_string(),
            url.to_string(),
            position,
            true,
            0,
            now,
            now,
        )
    }

    fn draft(title: &str, url: &str) -> LinkDraft {
        LinkDraft {
            title: title.to_string(),
            url: url.to_string(),
            is_public: true,
        }
    }

    fn open_subscription(gateway: &mut MockLinkGateway) {
        gateway.expect_subscribe().times(1).returning(|_| {
            let (tx, rx) = mpsc::channel::<ChannelEvent>(8);
            // Keep the channel open for the board's lifetime
            std::mem::forget(tx);
            Ok(rx)
        });
    }

    fn seeded_list(gateway: &mut MockLinkGateway, links: Vec<Link>) {
        gateway
            .expect_list()
            .times(1)
            .returning(move |_| Ok(links.clone()));
    }

    async fn board(gateway: MockLinkGateway) -> LinkBoard<MockLinkGateway> {
        LinkBoard::connect(Arc::new(gateway), OWNER, SyncConfig::default())
            .await
            .unwrap()
    }

    fn snapshot_ids(board: &LinkBoard<MockLinkGateway>) -> Vec<String> {
        board.snapshot().into_iter().map(|l| l.id).collect()
    }

    // ─── ADD ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_add_link_confirms_and_swaps_provisional_id() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(&mut gateway, vec![]);
        gateway
            .expect_create()
            .withf(|new_link| {
                new_link.title == "My Blog"
                    && new_link.url == "https://example.com/blog"
                    && new_link.position == 0
                    && new_link.is_public
            })
            .times(1)
            .returning(|n| {
                Ok(link("lnk-1", &n.title, &n.url, n.position))
            });

        let board = board(gateway).await;
        let created = board
            .add_link(draft("  My Blog  ", "https://example.com/blog"))
            .await
            .unwrap();

        assert_eq!(created.id, "lnk-1");
        assert!(!created.is_provisional());
        assert_eq!(snapshot_ids(&board), vec!["lnk-1"]);
    }

    #[tokio::test]
    async fn test_add_link_rejects_duplicate_title_locally() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(
            &mut gateway,
            vec![link("a", "My Blog", "https://example.com/a", 0)],
        );
        // No expect_create: the duplicate must never reach the gateway

        let board = board(gateway).await;
        let err = board
            .add_link(draft("my blog", "https://example.com/other"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), SyncErrorKind::Conflict);
        assert_eq!(snapshot_ids(&board), vec!["a"]);
    }

    #[tokio::test]
    async fn test_add_link_rejects_duplicate_url_ignoring_trailing_slash() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(
            &mut gateway,
            vec![link("a", "Mine", "https://github.com/me", 0)],
        );

        let board = board(gateway).await;
        let err = board
            .add_link(draft("Other Title", "https://github.com/me/"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), SyncErrorKind::Conflict);
        assert_eq!(err.details()["field"], "url");
    }

    #[tokio::test]
    async fn test_add_link_validation_never_touches_gateway() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(&mut gateway, vec![]);

        let board = board(gateway).await;

        let err = board
            .add_link(draft("My Blog", "ftp://example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::Validation);

        let err = board
            .add_link(draft("", "https://example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::Validation);

        assert!(board.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_add_link_rolls_back_on_remote_conflict() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(&mut gateway, vec![]);
        gateway.expect_create().times(1).returning(|_| {
            Err(SyncError::conflict(
                "A link with this URL already exists",
                json!({ "field": "url" }),
            ))
        });

        let board = board(gateway).await;
        let err = board
            .add_link(draft("My Blog", "https://example.com/blog"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), SyncErrorKind::Conflict);
        // The optimistic row is gone again
        assert!(board.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_add_public_link_rejected_at_cap() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        let full_house: Vec<Link> = (0..5)
            .map(|i| {
                link(
                    &format!("l{i}"),
                    &format!("Link {i}"),
                    &format!("https://example.com/{i}"),
                    i,
                )
            })
            .collect();
        seeded_list(&mut gateway, full_house);

        let board = board(gateway).await;
        let err = board
            .add_link(draft("One More", "https://example.com/more"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), SyncErrorKind::Conflict);
        assert_eq!(err.details()["cap"], 5);
    }

    #[tokio::test]
    async fn test_add_private_link_bypasses_cap() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        let full_house: Vec<Link> = (0..5)
            .map(|i| {
                link(
                    &format!("l{i}"),
                    &format!("Link {i}"),
                    &format!("https://example.com/{i}"),
                    i,
                )
            })
            .collect();
        seeded_list(&mut gateway, full_house);
        gateway
            .expect_create()
            .withf(|n| !n.is_public)
            .times(1)
            .returning(|n| Ok(link("lnk-6", &n.title, &n.url, n.position)));

        let board = board(gateway).await;
        let mut hidden = draft("One More", "https://example.com/more");
        hidden.is_public = false;
        assert!(board.add_link(hidden).await.is_ok());
    }

    // ─── EDIT ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_edit_link_merges_confirmed_row() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(
            &mut gateway,
            vec![link("a", "Old Title", "https://example.com/a", 0)],
        );
        gateway
            .expect_update()
            .withf(|id, patch| {
                id == "a" && patch.title.as_deref() == Some("New Title") && patch.url.is_none()
            })
            .times(1)
            .returning(|id, patch| {
                let mut confirmed = link(id, patch.title.as_deref().unwrap(), "https://example.com/a", 0);
                confirmed.click_count = 7;
                Ok(confirmed)
            });

        let board = board(gateway).await;
        let confirmed = board
            .edit_link(
                "a",
                LinkPatch {
                    title: Some("New Title".to_string()),
                    url: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(confirmed.title, "New Title");
        // The authoritative row wins wholesale, click count included
        assert_eq!(board.snapshot()[0].click_count, 7);
    }

    #[tokio::test]
    async fn test_edit_link_unknown_id() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(&mut gateway, vec![]);

        let board = board(gateway).await;
        let err = board
            .edit_link(
                "ghost",
                LinkPatch {
                    title: Some("New".to_string()),
                    url: None,
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), SyncErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_edit_link_rejects_empty_patch() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(
            &mut gateway,
            vec![link("a", "Title", "https://example.com/a", 0)],
        );

        let board = board(gateway).await;
        let err = board.edit_link("a", LinkPatch::default()).await.unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_edit_link_rolls_back_on_network_error() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(
            &mut gateway,
            vec![link("a", "Old Title", "https://example.com/a", 0)],
        );
        gateway.expect_update().times(1).returning(|_, _| {
            Err(SyncError::network("connection reset", json!({})))
        });

        let board = board(gateway).await;
        let err = board
            .edit_link(
                "a",
                LinkPatch {
                    title: Some("New Title".to_string()),
                    url: None,
                },
            )
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(board.snapshot()[0].title, "Old Title");
    }

    // ─── DELETE ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_delete_link_renumbers_followers() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(
            &mut gateway,
            vec![
                link("a", "A", "https://example.com/a", 0),
                link("b", "B", "https://example.com/b", 1),
                link("c", "C", "https://example.com/c", 2),
            ],
        );
        gateway
            .expect_delete()
            .withf(|id| id == "b")
            .times(1)
            .returning(|_| {
                Ok(vec![
                    link("a", "A", "https://example.com/a", 0),
                    link("c", "C", "https://example.com/c", 1),
                ])
            });

        let board = board(gateway).await;
        board.delete_link("b").await.unwrap();

        let snapshot = board.snapshot();
        let ids: Vec<&str> = snapshot.iter().map(|l| l.id.as_str()).collect();
        let positions: Vec<u32> = snapshot.iter().map(|l| l.position).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(positions, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_delete_link_rolls_back_on_failure() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(
            &mut gateway,
            vec![
                link("a", "A", "https://example.com/a", 0),
                link("b", "B", "https://example.com/b", 1),
            ],
        );
        gateway
            .expect_delete()
            .times(1)
            .returning(|_| Err(SyncError::network("timeout", json!({}))));

        let board = board(gateway).await;
        assert!(board.delete_link("a").await.is_err());

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, "a");
        assert_eq!(snapshot[1].position, 1);
    }

    // ─── VISIBILITY ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_toggle_visibility_same_value_skips_gateway() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(
            &mut gateway,
            vec![link("a", "A", "https://example.com/a", 0)],
        );
        // No expect_set_visibility

        let board = board(gateway).await;
        let unchanged = board.toggle_visibility("a", true).await.unwrap();
        assert!(unchanged.is_public);
    }

    #[tokio::test]
    async fn test_toggle_visibility_cap_enforced_locally() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        let mut links: Vec<Link> = (0..5)
            .map(|i| {
                link(
                    &format!("l{i}"),
                    &format!("Link {i}"),
                    &format!("https://example.com/{i}"),
                    i,
                )
            })
            .collect();
        let mut hidden = link("h", "Hidden", "https://example.com/h", 5);
        hidden.is_public = false;
        links.push(hidden);
        seeded_list(&mut gateway, links);

        let board = board(gateway).await;
        let err = board.toggle_visibility("h", true).await.unwrap_err();

        assert_eq!(err.kind(), SyncErrorKind::Conflict);
        assert_eq!(err.details()["cap"], 5);
        // Hiding one frees a slot; a retry would now pass the local check
        assert_eq!(
            policy::remaining_public_slots(board.snapshot().iter().filter(|l| l.is_public).count(), 5),
            0
        );
    }

    #[tokio::test]
    async fn test_toggle_visibility_confirms_remote_row() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        let mut hidden = link("h", "Hidden", "https://example.com/h", 0);
        hidden.is_public = false;
        seeded_list(&mut gateway, vec![hidden]);
        gateway
            .expect_set_visibility()
            .withf(|id, public| id == "h" && *public)
            .times(1)
            .returning(|id, public| {
                let mut confirmed = link(id, "Hidden", "https://example.com/h", 0);
                confirmed.is_public = public;
                Ok(confirmed)
            });

        let board = board(gateway).await;
        let confirmed = board.toggle_visibility("h", true).await.unwrap();
        assert!(confirmed.is_public);
        assert!(board.snapshot()[0].is_public);
    }

    #[tokio::test]
    async fn test_toggle_visibility_rolls_back_on_remote_cap() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        let mut hidden = link("h", "Hidden", "https://example.com/h", 0);
        hidden.is_public = false;
        seeded_list(&mut gateway, vec![hidden]);
        // Local state sees a free slot, but the backend knows better
        gateway.expect_set_visibility().times(1).returning(|_, _| {
            Err(SyncError::conflict(
                "Maximum number of public links reached",
                json!({ "cap": 5 }),
            ))
        });

        let board = board(gateway).await;
        let err = board.toggle_visibility("h", true).await.unwrap_err();

        assert_eq!(err.kind(), SyncErrorKind::Conflict);
        assert!(!board.snapshot()[0].is_public);
    }

    // ─── REORDER COMMIT ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_commit_drag_sends_minimal_batch() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(
            &mut gateway,
            vec![
                link("a", "A", "https://example.com/a", 0),
                link("b", "B", "https://example.com/b", 1),
                link("c", "C", "https://example.com/c", 2),
            ],
        );
        gateway
            .expect_reorder_batch()
            .withf(|moves| {
                moves
                    == &vec![
                        PositionUpdate {
                            id: "c".to_string(),
                            position: 0,
                        },
                        PositionUpdate {
                            id: "a".to_string(),
                            position: 1,
                        },
                        PositionUpdate {
                            id: "b".to_string(),
                            position: 2,
                        },
                    ]
            })
            .times(1)
            .returning(|_| {
                Ok(vec![
                    link("c", "C", "https://example.com/c", 0),
                    link("a", "A", "https://example.com/a", 1),
                    link("b", "B", "https://example.com/b", 2),
                ])
            });

        let board = board(gateway).await;
        board.begin_drag("c").unwrap();
        board.drag_over(0).unwrap();
        board.commit_drag().await.unwrap();

        assert_eq!(snapshot_ids(&board), vec!["c", "a", "b"]);
        // Session is idle again: a new drag may start
        board.begin_drag("a").unwrap();
    }

    #[tokio::test]
    async fn test_commit_drag_without_movement_skips_gateway() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(
            &mut gateway,
            vec![
                link("a", "A", "https://example.com/a", 0),
                link("b", "B", "https://example.com/b", 1),
            ],
        );
        // No expect_reorder_batch

        let board = board(gateway).await;
        board.begin_drag("a").unwrap();
        board.drag_over(1).unwrap();
        board.drag_over(0).unwrap();
        board.commit_drag().await.unwrap();

        assert_eq!(snapshot_ids(&board), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_commit_drag_restores_order_on_failure() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(
            &mut gateway,
            vec![
                link("a", "A", "https://example.com/a", 0),
                link("b", "B", "https://example.com/b", 1),
                link("c", "C", "https://example.com/c", 2),
            ],
        );
        gateway
            .expect_reorder_batch()
            .times(1)
            .returning(|_| Err(SyncError::network("timeout", json!({}))));

        let board = board(gateway).await;
        board.begin_drag("a").unwrap();
        board.drag_over(2).unwrap();
        let err = board.commit_drag().await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(snapshot_ids(&board), vec!["a", "b", "c"]);
        // Session ended despite the failure
        board.begin_drag("b").unwrap();
    }

    #[tokio::test]
    async fn test_commit_drag_requires_active_session() {
        let mut gateway = MockLinkGateway::new();
        open_subscription(&mut gateway);
        seeded_list(&mut gateway, vec![]);

        let board = board(gateway).await;
        let err = board.commit_drag().await.unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::Conflict);
    }
}
