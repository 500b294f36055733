//! Local mirror of one owner's link list.
//!
//! The store is the single source the UI renders from. It holds optimistic
//! rows and authoritative rows side by side in one map; callers cannot tell
//! them apart and never need to. Mutation goes exclusively through the
//! coordinator and the merge layer, reads flow out as ordered snapshots.

use std::collections::HashMap;

use crate::domain::change_event::LinkChange;
use crate::domain::entities::{title_key, Link};
use crate::utils::url_normalizer::dedup_key;

/// Keyed link state plus the derived ordered view.
pub(crate) struct LinkStore {
    links: HashMap<String, Link>,
    /// Bumped whenever the whole map is replaced by a resync. Rollback
    /// plans captured before the bump become no-ops.
    generation: u64,
}

impl LinkStore {
    pub fn new() -> Self {
        Self {
            links: HashMap::new(),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: &str) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.links.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.links.keys().cloned().collect()
    }

    pub fn position_of(&self, id: &str) -> Option<u32> {
        self.links.get(id).map(|l| l.position)
    }

    pub fn public_count(&self) -> usize {
        self.links.values().filter(|l| l.is_public).count()
    }

    /// Rows sorted by `(position, created_at, id)`. Position is the real
    /// key; the trailing fields only break ties during transient states so
    /// the rendered order never flickers nondeterministically.
    pub fn ordered(&self) -> Vec<Link> {
        let mut rows: Vec<Link> = self.links.values().cloned().collect();
        rows.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        rows
    }

    pub fn order_ids(&self) -> Vec<String> {
        self.ordered().into_iter().map(|l| l.id).collect()
    }

    pub fn upsert(&mut self, link: Link) {
        self.links.insert(link.id.clone(), link);
    }

    pub fn remove(&mut self, id: &str) -> Option<Link> {
        self.links.remove(id)
    }

    /// Replaces the whole map with a freshly listed state and bumps the
    /// generation, neutralizing every rollback plan still in flight.
    pub fn replace_all(&mut self, links: Vec<Link>) {
        self.links = links.into_iter().map(|l| (l.id.clone(), l)).collect();
        self.generation += 1;
    }

    /// Applies one remote change. Returns whether visible state moved.
    pub fn apply_change(&mut self, change: &LinkChange) -> bool {
        match change {
            LinkChange::Inserted(link) | LinkChange::Updated(link) => {
                match self.links.get(&link.id) {
                    Some(existing) if existing == link => false,
                    _ => {
                        self.links.insert(link.id.clone(), link.clone());
                        true
                    }
                }
            }
            LinkChange::Deleted { id, .. } => self.links.remove(id).is_some(),
        }
    }

    /// Case-insensitive title collision probe.
    pub fn title_taken(&self, title: &str, exclude_id: Option<&str>) -> bool {
        let candidate = title_key(title);
        self.links
            .values()
            .filter(|l| exclude_id != Some(l.id.as_str()))
            .any(|l| title_key(&l.title) == candidate)
    }

    /// URL collision probe. `candidate_key` must come from
    /// [`dedup_key`](crate::utils::url_normalizer::dedup_key).
    pub fn url_taken(&self, candidate_key: &str, exclude_id: Option<&str>) -> bool {
        self.links
            .values()
            .filter(|l| exclude_id != Some(l.id.as_str()))
            .any(|l| dedup_key(&l.url) == candidate_key)
    }
}

/// Inverse of one optimistic mutation: the prior records of exactly the
/// rows it touched.
///
/// Restoring only the touched ids keeps a rollback from clobbering
/// concurrent optimistic state on other rows. A plan captured before a
/// resync replaced the store applies as a no-op, since the resync already
/// delivered the authoritative truth.
pub(crate) struct RollbackPlan {
    generation: u64,
    prior: Vec<(String, Option<Link>)>,
}

impl RollbackPlan {
    pub fn capture<'a>(store: &LinkStore, ids: impl IntoIterator<Item = &'a str>) -> Self {
        let prior = ids
            .into_iter()
            .map(|id| (id.to_string(), store.get(id).cloned()))
            .collect();
        Self {
            generation: store.generation(),
            prior,
        }
    }

    /// Restores the captured rows. Returns `false` (leaving the store
    /// untouched) when the store was replaced since capture.
    pub fn apply(self, store: &mut LinkStore) -> bool {
        if self.generation != store.generation() {
            return false;
        }
        for (id, prior) in self.prior {
            match prior {
                Some(link) => store.upsert(link),
                None => {
                    store.remove(&id);
                }
            }
        }
        true
    }
}
