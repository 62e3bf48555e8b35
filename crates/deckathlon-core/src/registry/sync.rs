// ── Backend synchronization ──
//
// save / remove / reload against the REST convention
// `{root}{schema.url || type}[/{id}]`. Batches are not atomic: every item
// gets its own request, and once the last one settles the successes are
// committed to the store in one go.

use deckathlon_api::Method;
use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use super::DataRegistry;
use crate::actions::BatchOutcome;
use crate::error::DataError;
use crate::model::{Item, TypeSchema, display_text, items_from_value, merge_into};

impl DataRegistry {
    /// Create or update items.
    ///
    /// Static types, or a registry without backend, upsert locally. Otherwise
    /// items without a primary key are POSTed and the rest PUT; the
    /// server's reply is merged into each item (or, for a create answered
    /// with a bare id, becomes its key) before the batch is committed.
    pub async fn save(&self, type_name: &str, items: Vec<Item>) -> BatchOutcome {
        let store = self.store(type_name);
        if items.is_empty() {
            tokio::task::yield_now().await;
            return BatchOutcome::default();
        }

        let schema = self.schema(type_name).unwrap_or_default();
        if schema.is_static || !self.has_backend() {
            store.update(items.clone());
            tokio::task::yield_now().await;
            return BatchOutcome::ok(items);
        }

        let mut items = items;
        for item in &mut items {
            self.inner.hooks.on_before_save(type_name, item);
        }

        let key = schema.key.clone();
        self.inner.hooks.on_query_start();
        let requests = items.into_iter().map(|item| {
            let id = key
                .as_deref()
                .and_then(|k| item.get(k))
                .filter(|v| !v.is_null())
                .cloned();
            let is_new = id.is_none();
            let method = if is_new { Method::Post } else { Method::Put };
            let url = item_url(&schema, type_name, id.as_ref());
            async move {
                let result = self
                    .query(url)
                    .method(method)
                    .data(Value::Object(item.clone()))
                    .send()
                    .await;
                (item, is_new, result)
            }
        });
        let results = join_all(requests).await;
        self.inner.hooks.on_query_complete();

        let mut committed = Vec::new();
        let mut errors = Vec::new();
        for (mut item, is_new, result) in results {
            match result {
                Ok(Value::Object(reply)) => merge_into(&mut item, reply),
                Ok(id @ (Value::Number(_) | Value::String(_))) if is_new => {
                    if let Some(key) = &key {
                        item.insert(key.clone(), id);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(type_name, error = %err, "save failed");
                    errors.push(err);
                    continue;
                }
            }
            committed.push(item);
        }

        if !committed.is_empty() {
            store.update(committed.clone());
        }
        debug!(type_name, saved = committed.len(), failed = errors.len(), "save batch done");
        BatchOutcome {
            items: committed,
            error: DataError::batch(errors),
        }
    }

    /// Delete items.
    ///
    /// If any item is still referenced from another type the whole batch
    /// fails before anything is touched. Otherwise static types, or a
    /// registry without backend, remove locally; else each item gets a
    /// DELETE and the successfully deleted ones are removed from the store.
    pub async fn remove(&self, type_name: &str, items: Vec<Item>) -> BatchOutcome {
        if items.is_empty() {
            tokio::task::yield_now().await;
            return BatchOutcome::default();
        }

        let blocked: Vec<String> = items
            .iter()
            .filter(|item| self.has_relations(type_name, item))
            .map(|item| self.id(type_name, item).map(|id| display_text(&id)).unwrap_or_default())
            .collect();
        if !blocked.is_empty() {
            tokio::task::yield_now().await;
            return BatchOutcome::failed(DataError::Integrity {
                type_name: type_name.to_owned(),
                ids: blocked,
            });
        }

        let store = self.store(type_name);
        let schema = self.schema(type_name).unwrap_or_default();
        if schema.is_static || !self.has_backend() {
            store.remove(items.iter().cloned().map(Value::Object));
            tokio::task::yield_now().await;
            return BatchOutcome::ok(items);
        }

        self.inner.hooks.on_query_start();
        let requests = items.into_iter().map(|item| {
            let id = self.id(type_name, &item);
            let url = item_url(&schema, type_name, id.as_ref());
            async move {
                let result = self.query(url).method(Method::Delete).send().await;
                (item, result)
            }
        });
        let results = join_all(requests).await;
        self.inner.hooks.on_query_complete();

        let mut removed = Vec::new();
        let mut errors = Vec::new();
        for (item, result) in results {
            match result {
                Ok(_) => removed.push(item),
                Err(err) => {
                    warn!(type_name, error = %err, "remove failed");
                    errors.push(err);
                }
            }
        }

        if !removed.is_empty() {
            store.remove(removed.iter().cloned().map(Value::Object));
        }
        BatchOutcome {
            items: removed,
            error: DataError::batch(errors),
        }
    }

    /// Fetch the type's whole collection and replace its store content.
    /// Returns the number of items loaded.
    pub async fn reload(&self, type_name: &str) -> Result<usize, DataError> {
        let Some(store) = self.existing_store(type_name) else {
            warn!(type_name, "reload of unknown type");
            return Err(DataError::UnknownType {
                type_name: type_name.to_owned(),
            });
        };

        let schema = self.schema(type_name).unwrap_or_default();
        let data = self
            .query(schema.endpoint(type_name))
            .method(Method::Get)
            .send()
            .await?;
        let items = items_from_value(data);
        let count = items.len();
        store.replace(items);
        debug!(type_name, count, "store reloaded");
        Ok(count)
    }
}

/// Collection endpoint, plus `/{id}` when there is an id and the type's
/// item URLs carry one.
fn item_url(schema: &TypeSchema, type_name: &str, id: Option<&Value>) -> String {
    let mut url = schema.endpoint(type_name).to_owned();
    if let Some(id) = id.filter(|_| !schema.urlstatic) {
        url.push('/');
        url.push_str(&display_text(id));
    }
    url
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn item_urls_follow_schema() {
        let mut schema = TypeSchema::with_key("id");
        assert_eq!(item_url(&schema, "tables", None), "tables");
        assert_eq!(item_url(&schema, "tables", Some(&json!(7))), "tables/7");

        schema.url = Some("games/tables".into());
        assert_eq!(item_url(&schema, "tables", Some(&json!("a"))), "games/tables/a");

        schema.urlstatic = true;
        assert_eq!(item_url(&schema, "tables", Some(&json!(7))), "games/tables");
    }
}
