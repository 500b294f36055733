//! Per-link FIFO admission for remote mutations.
//!
//! Mutations targeting the same link run strictly one at a time, in the
//! order they were issued; mutations on different links overlap freely.
//! The queue also tracks which ids currently have a mutation in flight
//! (the merge layer defers realtime events for those) and resolves
//! provisional ids to their server-assigned replacements, so an edit
//! issued against a not-yet-confirmed link queues behind its creation
//! and then runs under the real id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Clone)]
pub(crate) struct MutationQueue {
    inner: Arc<Mutex<QueueInner>>,
}

struct QueueInner {
    /// One fair async mutex per id with queued mutations. Entries are
    /// pruned once the last interested task lets go.
    locks: HashMap<String, Arc<AsyncMutex<()>>>,
    /// provisional id -> server id, recorded when a create resolves.
    /// Grows with the number of creates in one board session.
    aliases: HashMap<String, String>,
    /// Canonical ids with a mutation currently in flight.
    inflight: HashSet<String>,
    /// URL dedup key -> provisional id of an unresolved create. Used to
    /// recognize the realtime echo of our own create before the server
    /// id is known.
    creates_by_url: HashMap<String, String>,
}

/// Exclusive right to run one remote mutation for [`MutationPermit::id`].
///
/// Successors for the same id stay parked until this permit is dropped.
/// [`MutationPermit::complete`] unregisters the mutation early (so the
/// merge layer stops deferring events for the id) while still holding the
/// FIFO slot.
pub(crate) struct MutationPermit {
    id: String,
    queue: MutationQueue,
    guard: Option<OwnedMutexGuard<()>>,
    done: bool,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                locks: HashMap::new(),
                aliases: HashMap::new(),
                inflight: HashSet::new(),
                creates_by_url: HashMap::new(),
            })),
        }
    }

    /// Waits for the FIFO slot of `id` and registers the mutation as in
    /// flight.
    ///
    /// `id` is first resolved through the alias table, and re-resolved
    /// after every wait: a create ahead of us in the queue may have
    /// swapped the provisional id for a server id while we were parked.
    pub async fn acquire(&self, id: &str) -> MutationPermit {
        let mut target = id.to_string();
        loop {
            let (canonical, lock) = {
                let mut inner = self.inner.lock();
                let canonical = resolve_in(&inner.aliases, &target);
                let lock = inner
                    .locks
                    .entry(canonical.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                    .clone();
                (canonical, lock)
            };

            // tokio's Mutex is fair: waiters are admitted in arrival order.
            let guard = lock.lock_owned().await;

            let mut inner = self.inner.lock();
            if resolve_in(&inner.aliases, &canonical) == canonical {
                inner.inflight.insert(canonical.clone());
                drop(inner);
                return MutationPermit {
                    id: canonical,
                    queue: self.clone(),
                    guard: Some(guard),
                    done: false,
                };
            }

            // The id was re-aliased while we waited. Queue up again under
            // the canonical id.
            drop(inner);
            drop(guard);
            target = canonical;
        }
    }

    /// Follows the alias chain to the canonical id.
    pub fn resolve(&self, id: &str) -> String {
        let inner = self.inner.lock();
        resolve_in(&inner.aliases, id)
    }

    /// Records that `provisional` now lives under `server_id`.
    pub fn record_alias(&self, provisional: &str, server_id: &str) {
        if provisional == server_id {
            return;
        }
        let mut inner = self.inner.lock();
        inner
            .aliases
            .insert(provisional.to_string(), server_id.to_string());
    }

    /// Registers an unresolved create so its realtime echo can be matched
    /// by URL before the server id exists. Cleared when the owning permit
    /// completes.
    pub fn mark_create(&self, provisional_id: &str, url_key: &str) {
        let mut inner = self.inner.lock();
        inner
            .creates_by_url
            .insert(url_key.to_string(), provisional_id.to_string());
    }

    pub fn is_inflight(&self, id: &str) -> bool {
        self.inner.lock().inflight.contains(id)
    }

    pub fn pending_create_for_url(&self, url_key: &str) -> Option<String> {
        self.inner.lock().creates_by_url.get(url_key).cloned()
    }

    fn unregister(&self, id: &str) {
        let mut inner = self.inner.lock();
        inner.inflight.remove(id);
        inner.creates_by_url.retain(|_, pending| pending != id);
    }

    fn prune(&self, id: &str) {
        let mut inner = self.inner.lock();
        if let Some(lock) = inner.locks.get(id) {
            // Only the map itself still holds the lock: no waiters, no
            // holder. Safe to forget the entry.
            if Arc::strong_count(lock) == 1 {
                inner.locks.remove(id);
            }
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.inner.lock().locks.len()
    }
}

impl MutationPermit {
    /// Canonical id this permit serializes, resolved at acquisition time.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Unregisters the mutation (in-flight flag, pending-create URL)
    /// without giving up the FIFO slot yet. Idempotent.
    pub fn complete(&mut self) {
        if !self.done {
            self.done = true;
            self.queue.unregister(&self.id);
        }
    }
}

impl Drop for MutationPermit {
    fn drop(&mut self) {
        self.complete();
        // Release the slot first so a parked successor can move, then
        // drop the map entry if nobody is interested anymore.
        self.guard.take();
        self.queue.prune(&self.id);
    }
}

fn resolve_in(aliases: &HashMap<String, String>, id: &str) -> String {
    let mut current = id;
    while let Some(next) = aliases.get(current) {
        current = next;
    }
    current.to_string()
}
