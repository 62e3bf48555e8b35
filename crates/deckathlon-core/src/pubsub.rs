// ── Publish/subscribe ──
//
// Synchronous in-process fan-out. A `Topic` is one listenable channel;
// `PubSub` keys many topics by an arbitrary value. Listeners are called
// outside the listener lock, so a callback may listen, unsubscribe or
// trigger again without deadlocking.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;
type Listeners<A> = Mutex<Vec<(u64, Callback<A>)>>;

// ── Subscription ─────────────────────────────────────────────────────

/// Handle returned by every `listen` call.
///
/// Dropping the handle keeps the listener attached; call
/// [`unsubscribe`](Self::unsubscribe) to detach it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Detach the listener. Later triggers no longer reach it.
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

// ── Topic ────────────────────────────────────────────────────────────

/// A single listenable channel carrying values of type `A`.
pub struct Topic<A> {
    next_id: AtomicU64,
    listeners: Arc<Listeners<A>>,
}

impl<A: 'static> Topic<A> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register `callback` for every later trigger.
    pub fn listen(&self, callback: impl Fn(&A) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(callback)));

        let weak: Weak<Listeners<A>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = weak.upgrade() {
                listeners.lock().retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Call every listener attached at the time of the trigger, in
    /// registration order.
    pub fn trigger(&self, value: &A) {
        let snapshot: Vec<Callback<A>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<A: 'static> Default for Topic<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Topic<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

/// Anything that embeds a [`Topic`] and exposes it as its own
/// `listen`/`trigger` pair.
pub trait Listenable<A: 'static> {
    fn topic(&self) -> &Topic<A>;

    fn listen(&self, callback: impl Fn(&A) + Send + Sync + 'static) -> Subscription
    where
        Self: Sized,
    {
        self.topic().listen(callback)
    }

    fn trigger(&self, value: &A) {
        self.topic().trigger(value);
    }
}

// ── Keyed topics ─────────────────────────────────────────────────────

/// Topics addressed by key, created on first use.
pub struct PubSub<K, A> {
    topics: Mutex<HashMap<K, Arc<Topic<A>>>>,
}

impl<K, A> PubSub<K, A>
where
    K: Eq + Hash + Clone,
    A: 'static,
{
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// The topic for `key`, created if missing.
    pub fn topic(&self, key: &K) -> Arc<Topic<A>> {
        Arc::clone(
            self.topics
                .lock()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Topic::new())),
        )
    }

    pub fn listen(
        &self,
        key: &K,
        callback: impl Fn(&A) + Send + Sync + 'static,
    ) -> Subscription {
        self.topic(key).listen(callback)
    }

    /// Trigger `key`. A key nobody listened to is a no-op.
    pub fn trigger(&self, key: &K, value: &A) {
        let topic = self.topics.lock().get(key).cloned();
        if let Some(topic) = topic {
            topic.trigger(value);
        }
    }
}

impl<K, A> Default for PubSub<K, A>
where
    K: Eq + Hash + Clone,
    A: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A> fmt::Debug for PubSub<K, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSub")
            .field("topics", &self.topics.lock().len())
            .finish()
    }
}
