// ── Data registry ──
//
// Owns the schema and every TypeStore, runs backend sync, polling and
// relation lookups. The registry is an explicit value handed to whoever
// needs it; nothing here is global.

mod cache;
mod poll;
mod query;
mod relations;
mod sync;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{SecondsFormat, Utc};
use deckathlon_api::Transport;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actions::{BatchAction, BatchKind, DataActions};
use crate::config::RegistryOptions;
use crate::error::DataError;
use crate::hooks::{Hooks, NoHooks};
use crate::model::{FieldKind, Item, TypeSchema, items_from_value};
use crate::pubsub::{Listenable, Subscription};
use crate::store::{StoreOptions, TypeStore};

pub use cache::CachePolicy;
pub use poll::{PollData, PollPhase, PollState};
pub use query::{Query, QueryOptions, RetryHandle};

use poll::PollEntry;

// ── Builder ──────────────────────────────────────────────────────────

/// Builder for [`DataRegistry`].
#[derive(Default)]
pub struct DataRegistryBuilder {
    transport: Option<Arc<dyn Transport>>,
    hooks: Option<Arc<dyn Hooks>>,
    options: RegistryOptions,
}

impl DataRegistryBuilder {
    /// Transport used for every backend request. Without one the registry
    /// only works locally.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Initial configuration, applied as by [`DataRegistry::configure`].
    pub fn options(mut self, options: RegistryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> DataRegistry {
        let registry = DataRegistry {
            inner: Arc::new(RegistryInner {
                transport: self.transport,
                hooks: self.hooks.unwrap_or_else(|| Arc::new(NoHooks)),
                root_url: RwLock::new(None),
                schema: RwLock::new(IndexMap::new()),
                stores: RwLock::new(IndexMap::new()),
                cache: cache::QueryCache::default(),
                polls: Mutex::new(HashMap::new()),
                actions: DataActions::new(),
                action_subs: Mutex::new(Vec::new()),
                cancel: CancellationToken::new(),
            }),
        };
        registry.bind_actions();
        registry.configure(self.options);
        registry
    }
}

// ── DataRegistry ─────────────────────────────────────────────────────

/// Schema-driven registry of entity stores.
///
/// Cheaply cloneable via `Arc<RegistryInner>`.
#[derive(Clone)]
pub struct DataRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    transport: Option<Arc<dyn Transport>>,
    hooks: Arc<dyn Hooks>,
    root_url: RwLock<Option<String>>,
    schema: RwLock<IndexMap<String, TypeSchema>>,
    stores: RwLock<IndexMap<String, Arc<TypeStore>>>,
    cache: cache::QueryCache,
    polls: Mutex<HashMap<String, PollEntry>>,
    actions: DataActions,
    /// Registry listeners on `actions`, kept for the registry's lifetime.
    action_subs: Mutex<Vec<Subscription>>,
    cancel: CancellationToken,
}

impl DataRegistry {
    pub fn builder() -> DataRegistryBuilder {
        DataRegistryBuilder::default()
    }

    /// Registry with no backend, for purely local data.
    pub fn local() -> Self {
        Self::builder().build()
    }

    // ── Configuration ────────────────────────────────────────────────

    /// Merge schema definitions, set the API root and seed store data.
    ///
    /// Stores are created for every schema type; stores that already exist
    /// are reconfigured from the new schema.
    pub fn configure(&self, opts: RegistryOptions) {
        if let Some(root) = opts.root_url {
            info!(root_url = %root, "registry root URL set");
            *self.inner.root_url.write() = Some(root);
        }

        for (type_name, mut schema) in opts.schema {
            schema.normalize();
            let store_opts = StoreOptions::from_schema(&schema);
            self.inner.schema.write().insert(type_name.clone(), schema);

            let existing = self.inner.stores.read().get(&type_name).cloned();
            match existing {
                Some(store) => store.configure(store_opts),
                None => {
                    let store = Arc::new(TypeStore::with_options(type_name.as_str(), store_opts));
                    self.inner.stores.write().insert(type_name, store);
                }
            }
        }

        for (type_name, data) in opts.data {
            self.store(&type_name).update(items_from_value(data));
        }
    }

    pub fn root_url(&self) -> Option<String> {
        self.inner.root_url.read().clone()
    }

    /// Whether saves and removes go to a backend.
    pub fn has_backend(&self) -> bool {
        self.inner.transport.is_some() && self.inner.root_url.read().is_some()
    }

    pub fn schema(&self, type_name: &str) -> Option<TypeSchema> {
        self.inner.schema.read().get(type_name).cloned()
    }

    pub fn type_names(&self) -> Vec<String> {
        self.inner.schema.read().keys().cloned().collect()
    }

    /// Primary-key value of `item` under its type's schema.
    pub fn id(&self, type_name: &str, item: &Item) -> Option<Value> {
        let schema = self.inner.schema.read();
        let key = schema.get(type_name)?.key.as_deref()?;
        item.get(key).filter(|v| !v.is_null()).cloned()
    }

    // ── Stores ───────────────────────────────────────────────────────

    /// The store for `type_name`, created on first use.
    pub fn store(&self, type_name: &str) -> Arc<TypeStore> {
        if let Some(store) = self.inner.stores.read().get(type_name) {
            return Arc::clone(store);
        }

        let opts = self
            .inner
            .schema
            .read()
            .get(type_name)
            .map(StoreOptions::from_schema)
            .unwrap_or_default();
        let mut stores = self.inner.stores.write();
        Arc::clone(
            stores
                .entry(type_name.to_owned())
                .or_insert_with(|| Arc::new(TypeStore::with_options(type_name, opts))),
        )
    }

    /// The store for `type_name` if one exists already.
    pub fn existing_store(&self, type_name: &str) -> Option<Arc<TypeStore>> {
        self.inner.stores.read().get(type_name).cloned()
    }

    /// Upsert directly into the store, bypassing the backend.
    pub fn update(&self, type_name: &str, items: Vec<Item>) -> usize {
        self.store(type_name).update(items)
    }

    /// Listen for changes of one type's store.
    pub fn listen(
        &self,
        type_name: &str,
        callback: impl Fn(&String) + Send + Sync + 'static,
    ) -> Subscription {
        self.store(type_name).listen(callback)
    }

    pub fn actions(&self) -> &DataActions {
        &self.inner.actions
    }

    // ── Items ────────────────────────────────────────────────────────

    /// A new item carrying schema defaults.
    ///
    /// Required non-nullable foreign keys named in `requireds` are filled
    /// with the id of the first record of the foreign store.
    pub fn blank(&self, type_name: &str, requireds: &[&str]) -> Result<Item, DataError> {
        let schema = self.schema(type_name).ok_or_else(|| DataError::UnknownType {
            type_name: type_name.to_owned(),
        })?;

        let mut item = Item::new();
        for (name, field) in &schema.fields {
            if field.is_virtual || schema.key.as_deref() == Some(name.as_str()) {
                continue;
            }
            let value = match (&field.default, &field.kind) {
                (Some(default), _) => default.clone(),
                (None, Some(FieldKind::Number)) => Value::from(0),
                (None, Some(FieldKind::Date)) => {
                    Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
                }
                (None, _) if field.fk.is_some() => Value::Null,
                (None, _) => Value::from(""),
            };
            item.insert(name.clone(), value);
        }

        for name in requireds {
            let Some(field) = schema.fields.get(*name) else {
                continue;
            };
            let Some(fk) = field.fk.as_deref() else {
                continue;
            };
            if !field.required || field.nullable {
                continue;
            }
            let first = self
                .existing_store(fk)
                .and_then(|store| store.raw().list().into_iter().next())
                .and_then(|foreign| self.id(fk, &foreign));
            item.insert((*name).to_owned(), first.unwrap_or(Value::Null));
        }

        self.inner.hooks.on_blank(type_name, &mut item);
        Ok(item)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Empty the query cache.
    pub fn cache_clear(&self) {
        self.inner.cache.clear();
        debug!("query cache cleared");
    }

    /// Cancel every poll entry. In-flight requests still complete.
    pub fn shutdown(&self) {
        let entries: Vec<(String, PollEntry)> = self.inner.polls.lock().drain().collect();
        for (url, entry) in entries {
            entry.cancel();
            debug!(url = %url, "poll cancelled on shutdown");
        }
        self.inner.cancel.cancel();
        info!("registry shut down");
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn downgrade(&self) -> Weak<RegistryInner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<RegistryInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Listen to the action topics for the registry's lifetime. The
    /// listeners hold a weak handle so the registry can still be dropped.
    fn bind_actions(&self) {
        let weak = self.downgrade();
        let update = self.inner.actions.on_update(move |action| {
            if let Some(registry) = Self::upgrade(&weak) {
                registry.update(&action.type_name, action.items.clone());
            }
        });

        let mut subs = vec![update];
        for kind in [BatchKind::Save, BatchKind::Remove] {
            let weak = self.downgrade();
            subs.push(self.inner.actions.on_batch(kind, move |action| {
                if let Some(registry) = Self::upgrade(&weak) {
                    registry.spawn_batch(action, kind);
                }
            }));
        }

        self.inner.action_subs.lock().extend(subs);
    }

    fn spawn_batch(&self, action: &BatchAction, kind: BatchKind) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                type_name = %action.type_name,
                "no Tokio runtime, {kind:?} action dropped"
            );
            return;
        };

        let registry = self.clone();
        let action = action.clone();
        handle.spawn(async move {
            let outcome = match kind {
                BatchKind::Save => registry.save(&action.type_name, action.items).await,
                BatchKind::Remove => registry.remove(&action.type_name, action.items).await,
            };
            if let Some(on_done) = action.on_done {
                on_done(outcome);
            }
        });
    }
}

impl fmt::Debug for DataRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRegistry")
            .field("root_url", &*self.inner.root_url.read())
            .field("types", &self.inner.schema.read().len())
            .field("polls", &self.inner.polls.lock().len())
            .finish_non_exhaustive()
    }
}
