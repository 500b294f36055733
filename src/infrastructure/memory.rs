//! In-memory backend with realtime fan-out, for demos and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::domain::change_event::{ChannelEvent, LinkChange};
use crate::domain::entities::{title_key, Link, LinkPatch, NewLink};
use crate::domain::gateway::{LinkGateway, PositionUpdate};
use crate::error::SyncError;
use crate::utils::url_normalizer::dedup_key;

const CHANNEL_CAPACITY: usize = 256;
const DEFAULT_PUBLIC_CAP: usize = 5;

struct BackendInner {
    rows: HashMap<String, Link>,
    subscribers: HashMap<String, Vec<mpsc::Sender<ChannelEvent>>>,
    fail_queue: VecDeque<SyncError>,
    latency: Duration,
    public_cap: usize,
    counter: u64,
}

impl BackendInner {
    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("lnk-{}", self.counter)
    }
}

/// Authoritative link storage held entirely in memory.
///
/// One backend serves any number of owners; each owner gets a
/// [`LinkGateway`] handle through [`InMemoryBackend::gateway_for`], and
/// change events fan out to every subscription of the affected owner.
/// Which makes two boards on the same backend behave like two devices of
/// one account.
///
/// # Test Hooks
///
/// - [`fail_next`](InMemoryBackend::fail_next) queues an error for the
///   next data call
/// - [`set_latency`](InMemoryBackend::set_latency) delays every data call
/// - [`interrupt`](InMemoryBackend::interrupt) and
///   [`drop_channel`](InMemoryBackend::drop_channel) exercise the
///   channel-loss paths
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<BackendInner>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        tracing::debug!("using in-memory backend");
        Self {
            inner: Arc::new(Mutex::new(BackendInner {
                rows: HashMap::new(),
                subscribers: HashMap::new(),
                fail_queue: VecDeque::new(),
                latency: Duration::ZERO,
                public_cap: DEFAULT_PUBLIC_CAP,
                counter: 0,
            })),
        }
    }

    /// Returns a gateway handle scoped to one owner.
    pub fn gateway_for(&self, owner_id: impl Into<String>) -> InMemoryGateway {
        InMemoryGateway {
            inner: Arc::clone(&self.inner),
            owner_id: owner_id.into(),
        }
    }

    /// Delays every subsequent data call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().latency = latency;
    }

    /// Queues `err` to be returned by the next data call. Multiple queued
    /// errors are consumed one call at a time.
    pub fn fail_next(&self, err: SyncError) {
        self.inner.lock().fail_queue.push_back(err);
    }

    /// Changes the server-side public link cap.
    pub fn set_public_cap(&self, cap: usize) {
        self.inner.lock().public_cap = cap;
    }

    /// Current rows for `owner_id` in list order.
    pub fn links_for(&self, owner_id: &str) -> Vec<Link> {
        sorted_owner_rows(&self.inner.lock(), owner_id)
    }

    /// Registers a visit on a link and notifies the owner's
    /// subscriptions. Returns the new count.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] for an unknown id.
    pub fn record_click(&self, id: &str) -> Result<u64, SyncError> {
        let mut inner = self.inner.lock();
        let Some(row) = inner.rows.get_mut(id) else {
            return Err(SyncError::not_found("Link not found", json!({ "id": id })));
        };
        row.click_count += 1;
        row.updated_at = Utc::now();
        let row = row.clone();
        let count = row.click_count;
        let owner_id = row.owner_id.clone();
        emit(&mut inner, &owner_id, LinkChange::Updated(row));
        Ok(count)
    }

    /// Pushes a stream interruption marker to every subscription of
    /// `owner_id` without closing the channels.
    pub fn interrupt(&self, owner_id: &str) {
        fan_out(&mut self.inner.lock(), owner_id, &ChannelEvent::Interrupted);
    }

    /// Closes every subscription of `owner_id`.
    pub fn drop_channel(&self, owner_id: &str) {
        self.inner.lock().subscribers.remove(owner_id);
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-owner handle into an [`InMemoryBackend`].
pub struct InMemoryGateway {
    inner: Arc<Mutex<BackendInner>>,
    owner_id: String,
}

impl InMemoryGateway {
    /// Applies the configured latency, then the next queued failure.
    async fn gate(&self) -> Result<(), SyncError> {
        let (latency, failure) = {
            let mut inner = self.inner.lock();
            (inner.latency, inner.fail_queue.pop_front())
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn owner_guard(&self, owner_id: &str) -> Result<(), SyncError> {
        if owner_id == self.owner_id {
            Ok(())
        } else {
            Err(SyncError::permission_denied(
                "Not allowed for this owner",
                json!({ "owner_id": owner_id }),
            ))
        }
    }
}

#[async_trait]
impl LinkGateway for InMemoryGateway {
    async fn list(&self, owner_id: &str) -> Result<Vec<Link>, SyncError> {
        self.gate().await?;
        self.owner_guard(owner_id)?;
        Ok(sorted_owner_rows(&self.inner.lock(), owner_id))
    }

    async fn create(&self, new_link: NewLink) -> Result<Link, SyncError> {
        self.gate().await?;
        self.owner_guard(&new_link.owner_id)?;
        let mut inner = self.inner.lock();

        let title = title_key(&new_link.title);
        let url = dedup_key(&new_link.url);
        let mut owner_count = 0usize;
        let mut public_count = 0usize;
        for row in inner.rows.values().filter(|r| r.owner_id == self.owner_id) {
            if title_key(&row.title) == title {
                return Err(SyncError::conflict(
                    "A link with this title already exists",
                    json!({ "field": "title" }),
                ));
            }
            if dedup_key(&row.url) == url {
                return Err(SyncError::conflict(
                    "A link with this URL already exists",
                    json!({ "field": "url" }),
                ));
            }
            owner_count += 1;
            if row.is_public {
                public_count += 1;
            }
        }
        if new_link.is_public && public_count >= inner.public_cap {
            return Err(SyncError::conflict(
                "Maximum number of public links reached",
                json!({ "cap": inner.public_cap }),
            ));
        }

        // The position the client expected is ignored; a link always
        // lands at the end of the server's list.
        let id = inner.next_id();
        let now = Utc::now();
        let link = Link::new(
            id,
            self.owner_id.clone(),
            new_link.title,
            new_link.url,
            owner_count as u32,
            new_link.is_public,
            0,
            now,
            now,
        );
        inner.rows.insert(link.id.clone(), link.clone());
        emit(&mut inner, &self.owner_id, LinkChange::Inserted(link.clone()));
        Ok(link)
    }

    async fn update(&self, id: &str, patch: LinkPatch) -> Result<Link, SyncError> {
        self.gate().await?;
        let mut inner = self.inner.lock();

        let Some(current) = inner.rows.get(id) else {
            return Err(SyncError::not_found("Link not found", json!({ "id": id })));
        };
        self.owner_guard(&current.owner_id)?;

        if let Some(t) = &patch.title {
            let key = title_key(t);
            if inner
                .rows
                .values()
                .any(|r| r.owner_id == self.owner_id && r.id != id && title_key(&r.title) == key)
            {
                return Err(SyncError::conflict(
                    "A link with this title already exists",
                    json!({ "field": "title" }),
                ));
            }
        }
        if let Some(u) = &patch.url {
            let key = dedup_key(u);
            if inner
                .rows
                .values()
                .any(|r| r.owner_id == self.owner_id && r.id != id && dedup_key(&r.url) == key)
            {
                return Err(SyncError::conflict(
                    "A link with this URL already exists",
                    json!({ "field": "url" }),
                ));
            }
        }

        let row = match inner.rows.get_mut(id) {
            Some(row) => row,
            None => {
                return Err(SyncError::not_found("Link not found", json!({ "id": id })));
            }
        };
        if let Some(t) = patch.title {
            row.title = t;
        }
        if let Some(u) = patch.url {
            row.url = u;
        }
        row.updated_at = Utc::now();
        let updated = row.clone();
        emit(&mut inner, &self.owner_id, LinkChange::Updated(updated.clone()));
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<Vec<Link>, SyncError> {
        self.gate().await?;
        let mut inner = self.inner.lock();

        let Some(current) = inner.rows.get(id) else {
            return Err(SyncError::not_found("Link not found", json!({ "id": id })));
        };
        self.owner_guard(&current.owner_id)?;
        let removed_position = current.position;

        inner.rows.remove(id);
        emit(
            &mut inner,
            &self.owner_id,
            LinkChange::Deleted {
                id: id.to_string(),
                owner_id: self.owner_id.clone(),
            },
        );

        let now = Utc::now();
        let mut shifted = Vec::new();
        for row in inner.rows.values_mut() {
            if row.owner_id == self.owner_id && row.position > removed_position {
                row.position -= 1;
                row.updated_at = now;
                shifted.push(row.clone());
            }
        }
        for row in shifted {
            emit(&mut inner, &self.owner_id, LinkChange::Updated(row));
        }

        Ok(sorted_owner_rows(&inner, &self.owner_id))
    }

    async fn reorder_batch(&self, moves: Vec<PositionUpdate>) -> Result<Vec<Link>, SyncError> {
        self.gate().await?;
        let mut inner = self.inner.lock();

        for update in &moves {
            let Some(row) = inner.rows.get(&update.id) else {
                return Err(SyncError::not_found(
                    "Link not found",
                    json!({ "id": update.id }),
                ));
            };
            self.owner_guard(&row.owner_id)?;
        }

        // Validate before touching anything: the moved and unmoved
        // positions together must renumber the whole list densely.
        let mut scratch: HashMap<String, u32> = inner
            .rows
            .values()
            .filter(|r| r.owner_id == self.owner_id)
            .map(|r| (r.id.clone(), r.position))
            .collect();
        for update in &moves {
            scratch.insert(update.id.clone(), update.position);
        }
        let mut positions: Vec<u32> = scratch.into_values().collect();
        positions.sort_unstable();
        if positions
            .iter()
            .enumerate()
            .any(|(index, position)| *position != index as u32)
        {
            return Err(SyncError::conflict(
                "Batch does not produce a dense ordering",
                json!({ "positions": positions }),
            ));
        }

        let now = Utc::now();
        let mut changed = Vec::new();
        for update in &moves {
            if let Some(row) = inner.rows.get_mut(&update.id) {
                if row.position != update.position {
                    row.position = update.position;
                    row.updated_at = now;
                    changed.push(row.clone());
                }
            }
        }
        for row in changed {
            emit(&mut inner, &self.owner_id, LinkChange::Updated(row));
        }

        Ok(sorted_owner_rows(&inner, &self.owner_id))
    }

    async fn set_visibility(&self, id: &str, is_public: bool) -> Result<Link, SyncError> {
        self.gate().await?;
        let mut inner = self.inner.lock();

        let Some(current) = inner.rows.get(id) else {
            return Err(SyncError::not_found("Link not found", json!({ "id": id })));
        };
        self.owner_guard(&current.owner_id)?;

        if is_public && !current.is_public {
            let public_count = inner
                .rows
                .values()
                .filter(|r| r.owner_id == self.owner_id && r.is_public)
                .count();
            if public_count >= inner.public_cap {
                return Err(SyncError::conflict(
                    "Maximum number of public links reached",
                    json!({ "cap": inner.public_cap }),
                ));
            }
        }

        let row = match inner.rows.get_mut(id) {
            Some(row) => row,
            None => {
                return Err(SyncError::not_found("Link not found", json!({ "id": id })));
            }
        };
        if row.is_public != is_public {
            row.is_public = is_public;
            row.updated_at = Utc::now();
        }
        let updated = row.clone();
        emit(&mut inner, &self.owner_id, LinkChange::Updated(updated.clone()));
        Ok(updated)
    }

    async fn subscribe(&self, owner_id: &str) -> Result<mpsc::Receiver<ChannelEvent>, SyncError> {
        self.owner_guard(owner_id)?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.inner
            .lock()
            .subscribers
            .entry(owner_id.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

fn sorted_owner_rows(inner: &BackendInner, owner_id: &str) -> Vec<Link> {
    let mut rows: Vec<Link> = inner
        .rows
        .values()
        .filter(|r| r.owner_id == owner_id)
        .cloned()
        .collect();
    rows.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    rows
}

fn emit(inner: &mut BackendInner, owner_id: &str, change: LinkChange) {
    fan_out(inner, owner_id, &ChannelEvent::Changed(change));
}

fn fan_out(inner: &mut BackendInner, owner_id: &str, event: &ChannelEvent) {
    if let Some(senders) = inner.subscribers.get_mut(owner_id) {
        senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            // A receiver this far behind is cut off; the closed channel
            // makes its consumer resync.
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncErrorKind;

    fn new_link(owner: &str, title: &str, url: &str, public: bool) -> NewLink {
        NewLink {
            owner_id: owner.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            position: 0,
            is_public: public,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_ids_and_dense_positions() {
        let backend = InMemoryBackend::new();
        let gateway = backend.gateway_for("owner-a");

        for i in 0..3 {
            gateway
                .create(new_link(
                    "owner-a",
                    &format!("Link {i}"),
                    &format!("https://example.com/{i}"),
                    true,
                ))
                .await
                .unwrap();
        }

        let rows = backend.links_for("owner-a");
        let ids: Vec<&str> = rows.iter().map(|l| l.id.as_str()).collect();
        let positions: Vec<u32> = rows.iter().map(|l| l.position).collect();
        assert_eq!(ids, vec!["lnk-1", "lnk-2", "lnk-3"]);
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_create_checks_duplicates_server_side() {
        let backend = InMemoryBackend::new();
        let gateway = backend.gateway_for("owner-a");

        gateway
            .create(new_link("owner-a", "Blog", "https://example.com/blog", true))
            .await
            .unwrap();

        let err = gateway
            .create(new_link("owner-a", "blog", "https://example.com/other", true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::Conflict);

        let err = gateway
            .create(new_link("owner-a", "Other", "https://example.com/blog/", true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_delete_renumbers_and_notifies() {
        let backend = InMemoryBackend::new();
        let gateway = backend.gateway_for("owner-a");
        let mut rx = gateway.subscribe("owner-a").await.unwrap();

        for i in 0..3 {
            gateway
                .create(new_link(
                    "owner-a",
                    &format!("Link {i}"),
                    &format!("https://example.com/{i}"),
                    true,
                ))
                .await
                .unwrap();
        }
        let remaining = gateway.delete("lnk-2").await.unwrap();

        let ids: Vec<&str> = remaining.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["lnk-1", "lnk-3"]);
        assert_eq!(remaining[1].position, 1);

        // Three inserts, one delete, one renumber update
        let mut kinds = Vec::new();
        for _ in 0..5 {
            match rx.recv().await.unwrap() {
                ChannelEvent::Changed(LinkChange::Inserted(_)) => kinds.push("ins"),
                ChannelEvent::Changed(LinkChange::Updated(l)) => {
                    assert_eq!(l.id, "lnk-3");
                    assert_eq!(l.position, 1);
                    kinds.push("upd");
                }
                ChannelEvent::Changed(LinkChange::Deleted { id, .. }) => {
                    assert_eq!(id, "lnk-2");
                    kinds.push("del");
                }
                ChannelEvent::Interrupted => kinds.push("int"),
            }
        }
        assert_eq!(kinds, vec!["ins", "ins", "ins", "del", "upd"]);
    }

    #[tokio::test]
    async fn test_reorder_batch_rejects_sparse_positions() {
        let backend = InMemoryBackend::new();
        let gateway = backend.gateway_for("owner-a");
        for i in 0..3 {
            gateway
                .create(new_link(
                    "owner-a",
                    &format!("Link {i}"),
                    &format!("https://example.com/{i}"),
                    true,
                ))
                .await
                .unwrap();
        }

        let err = gateway
            .reorder_batch(vec![PositionUpdate {
                id: "lnk-1".to_string(),
                position: 5,
            }])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::Conflict);

        // Nothing moved
        let positions: Vec<u32> = backend
            .links_for("owner-a")
            .iter()
            .map(|l| l.position)
            .collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_reorder_batch_applies_valid_swap() {
        let backend = InMemoryBackend::new();
        let gateway = backend.gateway_for("owner-a");
        for i in 0..2 {
            gateway
                .create(new_link(
                    "owner-a",
                    &format!("Link {i}"),
                    &format!("https://example.com/{i}"),
                    true,
                ))
                .await
                .unwrap();
        }

        let rows = gateway
            .reorder_batch(vec![
                PositionUpdate {
                    id: "lnk-1".to_string(),
                    position: 1,
                },
                PositionUpdate {
                    id: "lnk-2".to_string(),
                    position: 0,
                },
            ])
            .await
            .unwrap();

        let ids: Vec<&str> = rows.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["lnk-2", "lnk-1"]);
    }

    #[tokio::test]
    async fn test_visibility_cap_enforced_server_side() {
        let backend = InMemoryBackend::new();
        let gateway = backend.gateway_for("owner-a");
        for i in 0..5 {
            gateway
                .create(new_link(
                    "owner-a",
                    &format!("Link {i}"),
                    &format!("https://example.com/{i}"),
                    true,
                ))
                .await
                .unwrap();
        }

        let err = gateway
            .create(new_link("owner-a", "Sixth", "https://example.com/6", true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::Conflict);

        gateway
            .create(new_link("owner-a", "Hidden", "https://example.com/h", false))
            .await
            .unwrap();
        let err = gateway.set_visibility("lnk-6", true).await.unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::Conflict);
        assert_eq!(err.details()["cap"], 5);
    }

    #[tokio::test]
    async fn test_owner_isolation() {
        let backend = InMemoryBackend::new();
        let alices = backend.gateway_for("owner-a");
        let bobs = backend.gateway_for("owner-b");

        alices
            .create(new_link("owner-a", "Mine", "https://example.com/a", true))
            .await
            .unwrap();

        let err = alices.list("owner-b").await.unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::PermissionDenied);

        let err = bobs.delete("lnk-1").await.unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::PermissionDenied);

        assert!(backend.links_for("owner-b").is_empty());
    }

    #[tokio::test]
    async fn test_fail_next_hits_exactly_one_call() {
        let backend = InMemoryBackend::new();
        let gateway = backend.gateway_for("owner-a");

        backend.fail_next(SyncError::network("connection reset", json!({})));
        let err = gateway.list("owner-a").await.unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::Network);

        assert!(gateway.list("owner-a").await.is_ok());
    }

    #[tokio::test]
    async fn test_record_click_notifies_subscribers() {
        let backend = InMemoryBackend::new();
        let gateway = backend.gateway_for("owner-a");
        let mut rx = gateway.subscribe("owner-a").await.unwrap();

        gateway
            .create(new_link("owner-a", "Blog", "https://example.com/blog", true))
            .await
            .unwrap();
        assert_eq!(backend.record_click("lnk-1").unwrap(), 1);
        assert_eq!(backend.record_click("lnk-1").unwrap(), 2);

        let _insert = rx.recv().await.unwrap();
        match rx.recv().await.unwrap() {
            ChannelEvent::Changed(LinkChange::Updated(link)) => {
                assert_eq!(link.click_count, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
