//! Dep Implementation
//!
//! A Dep is a point of observation: one exists per reactive property and one
//! per observed object or array. It records which watchers read it and
//! notifies them when it changes.
//!
//! # How Deps Work
//!
//! 1. When a reactive property is read while a watcher is evaluating, the
//!    property's dep calls [`Dep::depend`], which links the dep and the
//!    watcher in both directions.
//!
//! 2. When the property is written with a different value, the dep calls
//!    [`Dep::notify`], which invokes `update()` on every subscriber.
//!
//! 3. Subscribers are held weakly. A watcher that was dropped without being
//!    torn down simply stops receiving notifications.
//!
//! # Ordering
//!
//! Subscribers are kept in registration order and notified in that order,
//! except that lazy watchers are always invalidated before any eager watcher
//! re-runs. With `sort_notifications` enabled (diagnostic mode only) they are
//! sorted by creation id first, so parent watchers update before children.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context::EvaluationContext;
use super::subscriber::{DepId, WatcherId};
use super::watcher::{Watcher, WatcherInner};
use crate::config;
use crate::error::Result;

/// A subject that watchers subscribe to.
///
/// Cloning a `Dep` creates a new handle to the same subject.
#[derive(Clone)]
pub struct Dep {
    inner: Arc<DepInner>,
}

struct DepInner {
    id: DepId,

    /// Subscribers in registration order. Keyed by id so a watcher
    /// appears at most once.
    subs: Mutex<IndexMap<WatcherId, Weak<WatcherInner>>>,
}

impl Dep {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DepInner {
                id: DepId::new(),
                subs: Mutex::new(IndexMap::new()),
            }),
        }
    }

    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Register `watcher` as a subscriber. Idempotent.
    pub fn add_sub(&self, watcher: &Watcher) {
        self.inner
            .subs
            .lock()
            .entry(watcher.id())
            .or_insert_with(|| watcher.downgrade());
    }

    /// Remove the subscriber with the given id. No-op if absent.
    pub fn remove_sub(&self, id: WatcherId) {
        self.inner.subs.lock().shift_remove(&id);
    }

    /// Register this dep with the watcher currently evaluating, if any.
    ///
    /// The watcher decides whether the link is new for this pass; see
    /// [`Watcher::add_dep`].
    pub fn depend(&self) {
        if let Some(target) = EvaluationContext::current() {
            target.add_dep(self);
        }
    }

    /// Notify every subscriber that this dep changed.
    ///
    /// Iterates over a snapshot, so subscribers may add or remove
    /// themselves while being updated. The first error raised by an
    /// internal watcher aborts the pass and is returned.
    pub fn notify(&self) -> Result<()> {
        let mut snapshot: SmallVec<[Watcher; 4]> = {
            let mut subs = self.inner.subs.lock();
            subs.retain(|_, weak| weak.strong_count() > 0);
            subs.values()
                .filter_map(|weak| weak.upgrade().map(Watcher::from_inner))
                .collect()
        };

        if snapshot.is_empty() {
            return Ok(());
        }

        if config::sort_notifications() {
            snapshot.sort_by_key(Watcher::id);
        }
        // Lazy watchers only mark themselves dirty. They go first so an eager
        // watcher re-run below never reads a stale cached value.
        snapshot.sort_by_key(|watcher| !watcher.options().lazy);

        tracing::trace!(dep = %self.id(), subscribers = snapshot.len(), "notify");

        for watcher in &snapshot {
            watcher.update()?;
        }
        Ok(())
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subs
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Whether the watcher with `id` is subscribed.
    pub fn has_sub(&self, id: WatcherId) -> bool {
        self.inner.subs.lock().contains_key(&id)
    }

    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
