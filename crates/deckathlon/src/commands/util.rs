//! Shared helpers for command handlers.

use std::io::Read;

use serde_json::Value;
use tracing::warn;

use deckathlon_core::{DataRegistry, Filter, Item};

use crate::error::CliError;

/// Fail unless the schema defines `type_name`.
pub fn ensure_type(registry: &DataRegistry, type_name: &str) -> Result<(), CliError> {
    if registry.schema(type_name).is_some() {
        return Ok(());
    }
    Err(CliError::UnknownType {
        type_name: type_name.into(),
        available: registry.type_names().join(", "),
    })
}

/// Fetch a type's collection unless it is static, local-only was asked
/// for, or there is no backend.
pub async fn load(registry: &DataRegistry, type_name: &str, local: bool) -> Result<(), CliError> {
    let is_static = registry.schema(type_name).is_some_and(|s| s.is_static);
    if local || is_static || !registry.has_backend() {
        return Ok(());
    }
    registry.reload(type_name).await?;
    Ok(())
}

/// Best-effort load of several types; failures are logged, not fatal.
pub async fn load_all(registry: &DataRegistry, type_names: impl IntoIterator<Item = String>) {
    for type_name in type_names {
        if let Err(err) = load(registry, &type_name, false).await {
            warn!(type_name = %type_name, error = %err, "could not load related type");
        }
    }
}

/// Types with a foreign key pointing at `type_name`.
pub fn referencing_types(registry: &DataRegistry, type_name: &str) -> Vec<String> {
    registry
        .type_names()
        .into_iter()
        .filter(|other| {
            registry.schema(other).is_some_and(|schema| {
                schema
                    .fields
                    .values()
                    .any(|f| f.fk.as_deref() == Some(type_name) && !f.fkignore)
            })
        })
        .collect()
}

/// A command-line scalar: JSON when it parses, a plain string otherwise.
pub fn parse_scalar(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

/// JSON from an argument, or from stdin when the argument is `-`.
pub fn read_json(arg: &str) -> Result<Value, CliError> {
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(serde_json::from_str(&buf)?);
    }
    Ok(serde_json::from_str(arg)?)
}

/// `FIELD=VALUE` pairs into a field filter.
pub fn parse_filter(pairs: &[String]) -> Result<Filter, CliError> {
    pairs.iter().try_fold(Filter::fields(), |filter, pair| {
        let (field, value) = pair.split_once('=').ok_or_else(|| CliError::Validation {
            field: "--where".into(),
            reason: format!("expected FIELD=VALUE, got '{pair}'"),
        })?;
        Ok(filter.with(field.trim(), parse_scalar(value.trim())))
    })
}

/// The stored item with this key, else a stub carrying only the key.
pub fn item_or_stub(registry: &DataRegistry, type_name: &str, id: &str) -> Item {
    let key = parse_scalar(id);
    if let Some(item) = registry.store(type_name).get(key.clone()) {
        return item;
    }
    let mut stub = Item::new();
    if let Some(field) = registry.schema(type_name).and_then(|s| s.key) {
        stub.insert(field, key);
    }
    stub
}
