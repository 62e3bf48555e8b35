// ── Action surface ──
//
// Fire-and-forget commands for view code that should not hold a
// registry handle. `save` and `remove` are keyed topics of one PubSub,
// `update` a plain topic; the registry listens to all of them from
// construction. Batches run on the Tokio runtime and report to an
// optional callback, updates apply synchronously.

use std::fmt;
use std::sync::Arc;

use crate::error::DataError;
use crate::model::Item;
use crate::pubsub::{PubSub, Subscription, Topic};

/// Result of a save or remove batch.
///
/// Batches are not atomic: `items` holds what was committed locally and
/// `error` the joined messages of whatever failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub items: Vec<Item>,
    pub error: Option<DataError>,
}

impl BatchOutcome {
    pub fn ok(items: Vec<Item>) -> Self {
        Self { items, error: None }
    }

    pub fn failed(error: DataError) -> Self {
        Self {
            items: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Callback receiving a batch outcome.
pub type OutcomeCallback = Arc<dyn Fn(BatchOutcome) + Send + Sync>;

/// Which backend operation a batch action asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    Save,
    Remove,
}

/// Payload of a `save` or `remove` action.
#[derive(Clone)]
pub struct BatchAction {
    pub type_name: String,
    pub items: Vec<Item>,
    pub on_done: Option<OutcomeCallback>,
}

impl fmt::Debug for BatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchAction")
            .field("type_name", &self.type_name)
            .field("items", &self.items.len())
            .field("on_done", &self.on_done.is_some())
            .finish()
    }
}

/// Payload of an `update` action.
#[derive(Debug, Clone)]
pub struct UpdateAction {
    pub type_name: String,
    pub items: Vec<Item>,
}

/// The save/remove/update topics.
#[derive(Debug, Default)]
pub struct DataActions {
    batches: PubSub<BatchKind, BatchAction>,
    update: Topic<UpdateAction>,
}

impl DataActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save items through the registry; `on_done` gets the outcome.
    pub fn save(
        &self,
        type_name: impl Into<String>,
        items: Vec<Item>,
        on_done: Option<OutcomeCallback>,
    ) {
        self.batch(BatchKind::Save, type_name.into(), items, on_done);
    }

    /// Remove items through the registry; `on_done` gets the outcome.
    pub fn remove(
        &self,
        type_name: impl Into<String>,
        items: Vec<Item>,
        on_done: Option<OutcomeCallback>,
    ) {
        self.batch(BatchKind::Remove, type_name.into(), items, on_done);
    }

    fn batch(
        &self,
        kind: BatchKind,
        type_name: String,
        items: Vec<Item>,
        on_done: Option<OutcomeCallback>,
    ) {
        self.batches.trigger(&kind, &BatchAction {
            type_name,
            items,
            on_done,
        });
    }

    /// Upsert items locally, as for server-pushed data.
    pub fn update(&self, type_name: impl Into<String>, items: Vec<Item>) {
        self.update.trigger(&UpdateAction {
            type_name: type_name.into(),
            items,
        });
    }

    pub fn on_batch(
        &self,
        kind: BatchKind,
        f: impl Fn(&BatchAction) + Send + Sync + 'static,
    ) -> Subscription {
        self.batches.listen(&kind, f)
    }

    pub fn on_save(&self, f: impl Fn(&BatchAction) + Send + Sync + 'static) -> Subscription {
        self.on_batch(BatchKind::Save, f)
    }

    pub fn on_remove(&self, f: impl Fn(&BatchAction) + Send + Sync + 'static) -> Subscription {
        self.on_batch(BatchKind::Remove, f)
    }

    pub fn on_update(&self, f: impl Fn(&UpdateAction) + Send + Sync + 'static) -> Subscription {
        self.update.listen(f)
    }
}
