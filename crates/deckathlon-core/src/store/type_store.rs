// ── Per-type reactive store ──
//
// One entity type's in-memory collection: an insertion-ordered key map
// (authoritative), a derived sorted list, and a watch channel carrying
// the visible snapshot. Every mutation holds the write lock for its whole
// duration; transform hooks run before it is taken and listeners after it
// is released, so both may read the store.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::filter::Filter;
use super::order::Order;
use crate::model::{FieldSpec, Item, TypeSchema, key_of, merge_into};
use crate::pubsub::{Listenable, Topic};
use crate::stream::StoreStream;

/// Visible, ordered store content as broadcast to subscribers.
pub type Snapshot = Arc<Vec<Arc<Item>>>;

/// Hook applied to every item on write.
pub type Transform = Arc<dyn Fn(Item) -> Item + Send + Sync>;

/// Store settings. `None` leaves the current setting unchanged.
#[derive(Clone, Default)]
pub struct StoreOptions {
    pub key: Option<String>,
    pub autofilter: Option<Filter>,
    pub order: Option<Order>,
    pub single: Option<bool>,
    pub transform: Option<Transform>,
    pub fields: Option<IndexMap<String, FieldSpec>>,
}

impl StoreOptions {
    /// Options derived from a type schema: key, order, singleton flag and
    /// field specs.
    pub fn from_schema(schema: &TypeSchema) -> Self {
        Self {
            key: schema.key.clone(),
            order: schema.order.as_ref().map(Order::from),
            single: Some(schema.single),
            fields: Some(schema.fields.clone()),
            ..Self::default()
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn autofilter(mut self, filter: Filter) -> Self {
        self.autofilter = Some(filter);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn single(mut self, single: bool) -> Self {
        self.single = Some(single);
        self
    }

    pub fn transform(mut self, f: impl Fn(Item) -> Item + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("key", &self.key)
            .field("autofilter", &self.autofilter)
            .field("order", &self.order)
            .field("single", &self.single)
            .field("transform", &self.transform.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct State {
    key: Option<String>,
    single: bool,
    autofilter: Option<Filter>,
    order: Option<Order>,
    transform: Option<Transform>,
    drop_fields: Vec<String>,
    /// Authoritative items by normalized primary key.
    map: IndexMap<String, Arc<Item>>,
    /// The object of a singleton store.
    object: Item,
    /// `map` values in configured order, autofilter not applied.
    list: Vec<Arc<Item>>,
}

impl State {
    fn visible(&self, item: &Item) -> bool {
        self.autofilter.as_ref().is_none_or(|f| f.matches(item))
    }

    fn visible_items(&self) -> impl Iterator<Item = &Arc<Item>> {
        self.list.iter().filter(|item| self.visible(item))
    }

    fn resort(&mut self) {
        let mut list: Vec<Arc<Item>> = self.map.values().cloned().collect();
        if let Some(order) = &self.order {
            order.sort(&mut list);
        }
        self.list = list;
    }

    fn snapshot(&self) -> Snapshot {
        if self.single {
            let object = (!self.object.is_empty() && self.visible(&self.object))
                .then(|| Arc::new(self.object.clone()));
            return Arc::new(object.into_iter().collect());
        }
        Arc::new(self.visible_items().cloned().collect())
    }

    /// Strip `drop` fields from an already transformed item.
    fn prepare(&self, mut item: Item) -> Item {
        for field in &self.drop_fields {
            item.remove(field);
        }
        item
    }

    /// Merge one prepared item. Returns whether stored content changed.
    fn merge(&mut self, type_name: &str, item: Item) -> bool {
        if self.single {
            let before = self.object.clone();
            merge_into(&mut self.object, item);
            return self.object != before;
        }

        let Some(key) = self
            .key
            .as_deref()
            .and_then(|k| item.get(k))
            .and_then(key_of)
        else {
            warn!(
                store = type_name,
                key = self.key.as_deref().unwrap_or_default(),
                "no primary key on item, skipping"
            );
            return false;
        };

        match self.map.get_mut(&key) {
            Some(existing) => {
                let mut merged = Item::clone(existing);
                merge_into(&mut merged, item);
                if merged == **existing {
                    false
                } else {
                    *existing = Arc::new(merged);
                    true
                }
            }
            None => {
                self.map.insert(key, Arc::new(item));
                true
            }
        }
    }

    fn key_for(&self, value: &Value) -> Option<String> {
        match (value, self.key.as_deref()) {
            (Value::Object(item), Some(key)) => item.get(key).and_then(key_of),
            (Value::Object(_), None) => None,
            (other, _) => key_of(other),
        }
    }
}

/// Reactive store for one entity type.
pub struct TypeStore {
    type_name: String,
    state: RwLock<State>,
    snapshot: watch::Sender<Snapshot>,
    topic: Topic<String>,
}

impl TypeStore {
    pub fn new(type_name: impl Into<String>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            type_name: type_name.into(),
            state: RwLock::new(State::default()),
            snapshot,
            topic: Topic::new(),
        }
    }

    pub fn with_options(type_name: impl Into<String>, opts: StoreOptions) -> Self {
        let store = Self::new(type_name);
        store.configure(opts);
        store
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    // ── Configuration ────────────────────────────────────────────────

    /// Apply the given settings; unset options keep their current value.
    ///
    /// Re-derives ordering and the published snapshot but does not notify
    /// listeners, since no item changed.
    pub fn configure(&self, opts: StoreOptions) {
        let mut state = self.state.write();
        if let Some(key) = opts.key {
            state.key = Some(key);
        }
        if let Some(filter) = opts.autofilter {
            state.autofilter = Some(filter);
        }
        if let Some(order) = opts.order {
            state.order = Some(order);
        }
        if let Some(single) = opts.single {
            state.single = single;
        }
        if let Some(transform) = opts.transform {
            state.transform = Some(transform);
        }
        if let Some(fields) = opts.fields {
            state.drop_fields = fields
                .into_iter()
                .filter(|(_, spec)| spec.drop)
                .map(|(name, _)| name)
                .collect();
        }
        state.resort();
        self.snapshot.send_replace(state.snapshot());
    }

    pub fn key_field(&self) -> Option<String> {
        self.state.read().key.clone()
    }

    pub fn is_single(&self) -> bool {
        self.state.read().single
    }

    // ── Cloned accessors ─────────────────────────────────────────────

    /// Item with the given primary key, if present and visible.
    pub fn get(&self, key: impl Into<Value>) -> Option<Item> {
        self.raw().get(key).map(|item| Item::clone(&item))
    }

    /// Visible items matching `filter`, keyed by primary key.
    pub fn find(&self, filter: &Filter) -> IndexMap<String, Item> {
        let state = self.state.read();
        state
            .map
            .iter()
            .filter(|(_, item)| state.visible(item) && filter.matches(item))
            .map(|(key, item)| (key.clone(), Item::clone(item)))
            .collect()
    }

    /// All visible items keyed by primary key, in insertion order.
    pub fn map(&self) -> IndexMap<String, Item> {
        self.find(&Filter::fields())
    }

    /// The object of a singleton store, if it is visible.
    pub fn object(&self) -> Option<Item> {
        self.raw().object().map(|item| Item::clone(&item))
    }

    /// All visible items in configured order.
    pub fn list(&self) -> Vec<Item> {
        self.raw().list().iter().map(|i| Item::clone(i)).collect()
    }

    /// Visible items matching `filter`, in configured order.
    pub fn filter(&self, filter: &Filter) -> Vec<Item> {
        self.raw()
            .filter(filter)
            .iter()
            .map(|i| Item::clone(i))
            .collect()
    }

    /// First visible item in configured order matching `filter`.
    pub fn next(&self, filter: &Filter) -> Option<Item> {
        self.raw().next(filter).map(|item| Item::clone(&item))
    }

    /// Visible primary keys in configured order. Field names for a
    /// singleton store.
    pub fn keys(&self) -> Vec<String> {
        let state = self.state.read();
        if state.single {
            return state.object.keys().cloned().collect();
        }
        let Some(key_field) = state.key.as_deref() else {
            return Vec::new();
        };
        state
            .visible_items()
            .filter_map(|item| item.get(key_field).and_then(key_of))
            .collect()
    }

    /// Whether a visible item with this key exists.
    pub fn has(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        let state = self.state.read();
        if state.single {
            return key_of(&key).is_some_and(|k| state.object.contains_key(&k))
                && state.visible(&state.object);
        }
        key_of(&key)
            .and_then(|k| state.map.get(&k))
            .is_some_and(|item| state.visible(item))
    }

    /// Whether any visible item matches `filter`.
    pub fn has_match(&self, filter: &Filter) -> bool {
        self.state
            .read()
            .visible_items()
            .any(|item| filter.matches(item))
    }

    pub fn len(&self) -> usize {
        self.state.read().visible_items().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Uncloned accessors sharing the stored items.
    pub fn raw(&self) -> RawView<'_> {
        RawView { store: self }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Merge items into the store. Items without a primary key are
    /// skipped. Notifies once if anything changed; returns the number of
    /// changed items.
    pub fn update(&self, items: impl IntoIterator<Item = Item>) -> usize {
        let items = self.transformed(items);
        let changed = {
            let mut state = self.state.write();
            let mut changed = 0;
            for item in items {
                let item = state.prepare(item);
                if state.merge(&self.type_name, item) {
                    changed += 1;
                }
            }
            if changed > 0 {
                self.commit(&mut state);
            }
            changed
        };
        if changed > 0 {
            debug!(store = %self.type_name, changed, "store updated");
            self.notify();
        }
        changed
    }

    /// Remove items by key. Each value is an item (its key field is used)
    /// or a raw key. Notifies if anything was removed.
    pub fn remove(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let removed = {
            let mut state = self.state.write();
            let mut removed = 0;
            for value in values {
                let Some(key) = state.key_for(&value) else {
                    continue;
                };
                let existed = if state.single {
                    state.object.shift_remove(&key).is_some()
                } else {
                    state.map.shift_remove(&key).is_some()
                };
                if existed {
                    removed += 1;
                }
            }
            if removed > 0 {
                self.commit(&mut state);
            }
            removed
        };
        if removed > 0 {
            debug!(store = %self.type_name, removed, "items removed");
            self.notify();
        }
        removed
    }

    /// Replace the whole content. Notifies if either the previous or the
    /// new content is non-empty.
    pub fn replace(&self, items: impl IntoIterator<Item = Item>) -> bool {
        let items = self.transformed(items);
        let changed = {
            let mut state = self.state.write();
            let mut changed = if state.single {
                !state.object.is_empty()
            } else {
                !state.map.is_empty()
            };
            state.map.clear();
            state.object.clear();
            for item in items {
                changed = true;
                let item = state.prepare(item);
                state.merge(&self.type_name, item);
            }
            if changed {
                self.commit(&mut state);
            }
            changed
        };
        if changed {
            self.notify();
        }
        changed
    }

    /// Re-run the transform hook over every stored item, with the same
    /// change contract as [`update`](Self::update).
    pub fn retransform(&self) -> usize {
        let (transform, items) = {
            let state = self.state.read();
            let Some(transform) = state.transform.clone() else {
                return 0;
            };
            let items: Vec<Item> = if state.single {
                vec![state.object.clone()]
            } else {
                state.list.iter().map(|i| Item::clone(i)).collect()
            };
            (transform, items)
        };
        let items: Vec<Item> = items.into_iter().map(transform.as_ref()).collect();

        let changed = {
            let mut state = self.state.write();
            let mut changed = 0;
            for item in items {
                let item = state.prepare(item);
                if state.merge(&self.type_name, item) {
                    changed += 1;
                }
            }
            if changed > 0 {
                self.commit(&mut state);
            }
            changed
        };
        if changed > 0 {
            self.notify();
        }
        changed
    }

    // ── Subscription ─────────────────────────────────────────────────

    /// Stream of visible snapshots, one per change.
    pub fn subscribe(&self) -> StoreStream {
        StoreStream::new(self.snapshot.subscribe())
    }

    /// Current visible snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Apply the transform hook with no lock held.
    fn transformed(&self, items: impl IntoIterator<Item = Item>) -> Vec<Item> {
        let transform = self.state.read().transform.clone();
        match transform {
            Some(f) => items.into_iter().map(f.as_ref()).collect(),
            None => items.into_iter().collect(),
        }
    }

    fn commit(&self, state: &mut State) {
        if !state.single {
            state.resort();
        }
        self.snapshot.send_replace(state.snapshot());
    }

    fn notify(&self) {
        self.topic.trigger(&self.type_name);
    }
}

impl Listenable<String> for TypeStore {
    fn topic(&self) -> &Topic<String> {
        &self.topic
    }
}

impl fmt::Debug for TypeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("TypeStore")
            .field("type_name", &self.type_name)
            .field("key", &state.key)
            .field("single", &state.single)
            .field("items", &state.map.len())
            .finish_non_exhaustive()
    }
}

// ── Raw accessors ────────────────────────────────────────────────────

/// Accessors returning shared items. Do not mutate through interior
/// clones; use the store's mutation methods.
pub struct RawView<'a> {
    store: &'a TypeStore,
}

impl RawView<'_> {
    pub fn get(&self, key: impl Into<Value>) -> Option<Arc<Item>> {
        let key = key_of(&key.into())?;
        let state = self.store.state.read();
        if state.single {
            return None;
        }
        state
            .map
            .get(&key)
            .filter(|item| state.visible(item))
            .cloned()
    }

    pub fn object(&self) -> Option<Arc<Item>> {
        let state = self.store.state.read();
        (state.single && !state.object.is_empty() && state.visible(&state.object))
            .then(|| Arc::new(state.object.clone()))
    }

    pub fn list(&self) -> Vec<Arc<Item>> {
        self.store.state.read().visible_items().cloned().collect()
    }

    pub fn filter(&self, filter: &Filter) -> Vec<Arc<Item>> {
        self.store
            .state
            .read()
            .visible_items()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect()
    }

    pub fn next(&self, filter: &Filter) -> Option<Arc<Item>> {
        self.store
            .state
            .read()
            .visible_items()
            .find(|item| filter.matches(item))
            .cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::items_from_value;

    fn store(opts: StoreOptions) -> TypeStore {
        TypeStore::with_options("tables", opts)
    }

    fn counter(store: &TypeStore) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = store.listen(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        hits
    }

    fn as_values(items: Vec<Item>) -> Vec<Value> {
        items.into_iter().map(Value::Object).collect()
    }

    #[test]
    fn update_sorts_by_configured_order() {
        let s = store(StoreOptions::default().key("id").order(Order::by("name")));
        s.update(items_from_value(json!([{"id": 2, "name": "B"}, {"id": 1, "name": "A"}])));

        assert_eq!(
            as_values(s.list()),
            vec![json!({"id": 1, "name": "A"}), json!({"id": 2, "name": "B"})]
        );
        assert_eq!(s.keys(), vec!["1", "2"]);
    }

    #[test]
    fn update_merges_fields_and_notifies_only_on_change() {
        let s = store(StoreOptions::default().key("id"));
        let hits = counter(&s);

        assert_eq!(s.update(items_from_value(json!({"id": 1, "a": 1}))), 1);
        assert_eq!(s.update(items_from_value(json!({"id": 1, "a": 1}))), 0);
        assert_eq!(s.update(items_from_value(json!({"id": 1, "b": 2}))), 1);

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(Value::Object(s.get(1).unwrap()), json!({"id": 1, "a": 1, "b": 2}));
    }

    #[test]
    fn key_order_does_not_count_as_change() {
        let s = store(StoreOptions::default().key("id"));
        s.update(items_from_value(json!({"id": 1, "a": 1, "b": 2})));
        let hits = counter(&s);

        let mut reordered = Item::new();
        reordered.insert("b".into(), json!(2));
        reordered.insert("a".into(), json!(1));
        reordered.insert("id".into(), json!(1));
        assert_eq!(s.update([reordered]), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn item_without_key_is_skipped() {
        let s = store(StoreOptions::default().key("id"));
        let hits = counter(&s);
        assert_eq!(s.update(items_from_value(json!([{"name": "x"}, {"id": 3}]))), 1);
        assert_eq!(s.keys(), vec!["3"]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn numeric_and_string_keys_address_same_item() {
        let s = store(StoreOptions::default().key("id"));
        s.update(items_from_value(json!({"id": 7, "a": 1})));
        assert!(s.has("7"));
        assert!(s.get(7).is_some());
        assert_eq!(s.remove([json!("7")]), 1);
        assert!(s.is_empty());
    }

    #[test]
    fn remove_accepts_items_and_notifies_only_when_present() {
        let s = store(StoreOptions::default().key("id"));
        s.update(items_from_value(json!([{"id": 1}, {"id": 2}])));
        let hits = counter(&s);

        assert_eq!(s.remove([json!({"id": 9})]), 0);
        assert_eq!(s.remove([json!({"id": 1}), json!(2)]), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn replace_notify_rules() {
        let s = store(StoreOptions::default().key("id"));
        let hits = counter(&s);

        assert!(!s.replace(Vec::new()));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert!(s.replace(items_from_value(json!([{"id": 1}]))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(s.replace(items_from_value(json!([{"id": 1}]))));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(s.replace(Vec::new()));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(s.is_empty());
    }

    #[test]
    fn autofilter_hides_items_from_every_read() {
        let s = store(
            StoreOptions::default()
                .key("id")
                .autofilter(Filter::eq("visible", true)),
        );
        s.update(items_from_value(json!([
            {"id": 1, "visible": true},
            {"id": 2, "visible": false},
        ])));

        assert_eq!(s.keys(), vec!["1"]);
        assert!(s.get(2).is_none());
        assert!(!s.has(2));
        assert_eq!(s.map().len(), 1);
        assert_eq!(s.list().len(), 1);
        assert!(s.next(&Filter::eq("id", 2)).is_none());
        assert_eq!(s.snapshot().len(), 1);
    }

    #[test]
    fn transform_and_drop_apply_on_write() {
        let mut fields = IndexMap::new();
        fields.insert("secret".to_string(), FieldSpec::new("secret").dropped());
        let opts = StoreOptions {
            fields: Some(fields),
            ..StoreOptions::default()
                .key("id")
                .transform(|mut item| {
                    let n = item.get("n").and_then(Value::as_i64).unwrap_or_default();
                    item.insert("double".into(), json!(n * 2));
                    item
                })
        };
        let s = store(opts);
        s.update(items_from_value(json!({"id": 1, "n": 4, "secret": "x"})));

        assert_eq!(
            Value::Object(s.get(1).unwrap()),
            json!({"id": 1, "n": 4, "double": 8})
        );
    }

    #[test]
    fn retransform_reapplies_hook() {
        let factor = Arc::new(AtomicUsize::new(1));
        let f = Arc::clone(&factor);
        let s = store(StoreOptions::default().key("id").transform(move |mut item| {
            item.insert("factor".into(), json!(f.load(Ordering::SeqCst)));
            item
        }));
        s.update(items_from_value(json!([{"id": 1}, {"id": 2}])));
        let hits = counter(&s);

        assert_eq!(s.retransform(), 0);
        factor.store(3, Ordering::SeqCst);
        assert_eq!(s.retransform(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(s.get(2).unwrap()["factor"], json!(3));
    }

    #[test]
    fn retransform_updates_singleton_object() {
        let round = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&round);
        let s = store(StoreOptions::default().single(true).transform(move |mut item| {
            item.insert("round".into(), json!(r.load(Ordering::SeqCst)));
            item
        }));
        s.update(items_from_value(json!({"lang": "en"})));
        let hits = counter(&s);

        assert_eq!(s.retransform(), 0);
        round.store(2, Ordering::SeqCst);
        assert_eq!(s.retransform(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            Value::Object(s.object().unwrap()),
            json!({"lang": "en", "round": 2})
        );
    }

    #[test]
    fn transform_may_read_its_own_store() {
        let s = Arc::new(store(StoreOptions::default().key("id")));
        let weak = Arc::downgrade(&s);
        s.configure(StoreOptions::default().transform(move |mut item| {
            let rank = weak.upgrade().map_or(0, |own| own.len());
            item.insert("rank".into(), json!(rank));
            item
        }));

        s.update(items_from_value(json!({"id": 1})));
        s.update(items_from_value(json!({"id": 2})));
        assert_eq!(s.get(1).unwrap()["rank"], json!(0));
        assert_eq!(s.get(2).unwrap()["rank"], json!(1));

        assert_eq!(s.retransform(), 2);
        assert_eq!(s.get(1).unwrap()["rank"], json!(2));
        assert_eq!(s.get(2).unwrap()["rank"], json!(2));
    }

    #[test]
    fn singleton_store_merges_into_one_object() {
        let s = store(StoreOptions::default().single(true));
        s.update(items_from_value(json!({"name": "x"})));
        s.update(items_from_value(json!({"lang": "en"})));

        assert_eq!(
            Value::Object(s.object().unwrap()),
            json!({"name": "x", "lang": "en"})
        );
        assert_eq!(s.keys(), vec!["name", "lang"]);
        assert!(s.has("lang"));
        assert_eq!(s.remove([json!("lang")]), 1);
        assert!(!s.has("lang"));
    }

    #[test]
    fn raw_view_shares_items() {
        let s = store(StoreOptions::default().key("id"));
        s.update(items_from_value(json!({"id": 1})));
        let a = s.raw().get(1).unwrap();
        let b = s.raw().list().pop().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn find_returns_keyed_matches() {
        let s = store(StoreOptions::default().key("id"));
        s.update(items_from_value(json!([{"id": 1, "g": "a"}, {"id": 2, "g": "b"}])));
        let found = s.find(&Filter::eq("g", "b"));
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["2"]);
        assert!(s.has_match(&Filter::eq("g", "a")));
    }
}
