// ── Foreign-key relations ──
//
// Lookups across stores driven by schema `fk` fields: whether an item is
// still referenced, the related record of another type (possibly several
// hops away), and display labels for foreign keys.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value;

use super::DataRegistry;
use crate::model::{Item, TypeSchema, display_text};
use crate::store::{FieldMatcher, Filter};

impl DataRegistry {
    /// Whether any other type has a non-`fkignore` field pointing at this
    /// item's type and a row referencing this item's id.
    pub fn has_relations(&self, type_name: &str, item: &Item) -> bool {
        let Some(id) = self.id(type_name, item) else {
            return false;
        };

        let referencing: Vec<(String, String)> = self
            .inner
            .schema
            .read()
            .iter()
            .flat_map(|(other, schema)| {
                schema
                    .fields
                    .iter()
                    .filter(|(_, f)| f.fk.as_deref() == Some(type_name) && !f.fkignore)
                    .map(move |(name, _)| (other.clone(), name.clone()))
            })
            .collect();

        referencing.into_iter().any(|(other, field)| {
            self.existing_store(&other)
                .is_some_and(|store| store.has_match(&Filter::eq(field, id.clone())))
        })
    }

    /// Record of `target` related to `item` of `type_name`.
    ///
    /// Tries a direct reverse reference first (a `target` row whose foreign
    /// key points at the item), then walks the item's own foreign keys,
    /// descending through intermediate types. Each foreign type is entered
    /// at most once, so cyclic schemas terminate.
    pub fn get_relation(&self, type_name: &str, item: &Item, target: &str) -> Option<Item> {
        let schemas = self.inner.schema.read().clone();

        if let (Some(id), Some(target_schema)) = (self.id(type_name, item), schemas.get(target)) {
            let reverse = target_schema
                .fields
                .iter()
                .filter(|(_, f)| f.fk.as_deref() == Some(type_name))
                .find_map(|(name, _)| {
                    self.existing_store(target)?
                        .next(&Filter::eq(name.as_str(), id.clone()))
                });
            if reverse.is_some() {
                return reverse;
            }
        }

        let mut reached = HashSet::new();
        self.walk_relation(&schemas, type_name, item, target, &mut reached)
    }

    fn walk_relation(
        &self,
        schemas: &IndexMap<String, TypeSchema>,
        type_name: &str,
        item: &Item,
        target: &str,
        reached: &mut HashSet<String>,
    ) -> Option<Item> {
        let schema = schemas.get(type_name)?;

        // foreign type -> referencing field names set on this item
        let mut foreigns: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for (name, field) in &schema.fields {
            let Some(fk) = field.fk.as_deref() else {
                continue;
            };
            if reached.contains(fk) || !item.get(name).is_some_and(is_set) {
                continue;
            }
            foreigns.entry(fk).or_default().push(name.as_str());
        }

        if let Some(names) = foreigns.get(target) {
            return names.iter().find_map(|name| {
                item.get(*name)
                    .and_then(|keys| self.by_key(schemas, target, keys))
            });
        }

        for (foreign, names) in foreigns {
            for name in names {
                reached.insert(foreign.to_owned());
                let found = item
                    .get(name)
                    .and_then(|keys| self.by_key(schemas, foreign, keys))
                    .and_then(|next| self.walk_relation(schemas, foreign, &next, target, reached));
                if found.is_some() {
                    return found;
                }
            }
        }
        None
    }

    /// Item of `type_name` by scalar key, or the first matching any key
    /// of an array.
    fn by_key(
        &self,
        schemas: &IndexMap<String, TypeSchema>,
        type_name: &str,
        keys: &Value,
    ) -> Option<Item> {
        let store = self.existing_store(type_name)?;
        match keys {
            Value::Array(values) => {
                let key = schemas.get(type_name)?.key.clone()?;
                store.next(&Filter::fields().with(key, FieldMatcher::OneOf(values.clone())))
            }
            scalar => store.get(scalar.clone()),
        }
    }

    /// Display label for a foreign-key value of `type_name.field`.
    ///
    /// Uses the field's `fklabel`/`fkformat`, else the foreign type's
    /// defaults. Falls back to the raw value when the field is not a
    /// foreign key, the foreign item is not loaded or no label is defined.
    pub fn fk_label(&self, type_name: &str, field: &str, value: &Value) -> String {
        let schemas = self.inner.schema.read();
        let Some(spec) = schemas.get(type_name).and_then(|s| s.fields.get(field)) else {
            return display_text(value);
        };
        let Some(fk) = spec.fk.as_deref() else {
            return display_text(value);
        };
        let foreign_schema = schemas.get(fk);

        let labels = spec
            .fklabel
            .as_ref()
            .or_else(|| foreign_schema.and_then(|s| s.fklabel.as_ref()));
        let format = spec
            .fkformat
            .as_deref()
            .or_else(|| foreign_schema.and_then(|s| s.fkformat.as_deref()));
        let (Some(labels), Some(foreign)) = (
            labels,
            self.existing_store(fk).and_then(|s| s.get(value.clone())),
        ) else {
            return display_text(value);
        };

        let parts: Vec<String> = labels
            .names()
            .into_iter()
            .map(|name| foreign.get(name).map(display_text).unwrap_or_default())
            .collect();

        match format {
            Some(format) => parts
                .iter()
                .enumerate()
                .fold(format.to_owned(), |text, (i, part)| {
                    text.replace(&format!("{{{i}}}"), part)
                }),
            None => parts.join(" "),
        }
    }
}

/// Whether a foreign-key value points anywhere: not null, not an empty
/// array.
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(values) => !values.is_empty(),
        _ => true,
    }
}
