//! Store-backed commands: types, list, get, blank, save, remove.

use serde_json::Value;

use deckathlon_core::model::items_from_value;
use deckathlon_core::{BatchOutcome, DataRegistry, Order, SortKey};

use super::util;
use crate::Session;
use crate::cli::{BlankArgs, GetArgs, GlobalOpts, ListArgs, RemoveArgs, SaveArgs};
use crate::error::CliError;
use crate::output;

pub fn types(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let names: Vec<Value> = session
        .registry
        .type_names()
        .into_iter()
        .map(Value::String)
        .collect();
    let out = output::render_value(global.output, &Value::Array(names));
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn list(session: &Session, args: ListArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = &session.registry;
    util::ensure_type(registry, &args.type_name)?;
    util::load(registry, &args.type_name, args.local).await?;

    let store = registry.store(&args.type_name);
    let mut items = if args.filters.is_empty() {
        store.list()
    } else {
        store.filter(&util::parse_filter(&args.filters)?)
    };
    if let Some(field) = args.sort {
        let key = if args.desc {
            SortKey::desc(field)
        } else {
            SortKey::asc(field)
        };
        Order::Fields(vec![key]).sort(&mut items);
    }

    let key = store.key_field();
    let out = output::render_items(global.output, &items, key.as_deref());
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn get(session: &Session, args: GetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = &session.registry;
    util::ensure_type(registry, &args.type_name)?;
    util::load(registry, &args.type_name, args.local).await?;

    let not_found = || CliError::NotFound {
        type_name: args.type_name.clone(),
        id: args.id.clone(),
    };
    let item = registry
        .store(&args.type_name)
        .get(util::parse_scalar(&args.id))
        .ok_or_else(not_found)?;

    let item = match args.related {
        Some(ref target) => {
            util::ensure_type(registry, target)?;
            if !args.local {
                let others = registry
                    .type_names()
                    .into_iter()
                    .filter(|t| *t != args.type_name);
                util::load_all(registry, others).await;
            }
            registry
                .get_relation(&args.type_name, &item, target)
                .ok_or_else(|| CliError::NotFound {
                    type_name: target.clone(),
                    id: format!("related to {} #{}", args.type_name, args.id),
                })?
        }
        None => item,
    };

    let out = output::render_value(global.output, &Value::Object(item));
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn blank(session: &Session, args: BlankArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = &session.registry;
    util::ensure_type(registry, &args.type_name)?;

    let foreign: Vec<String> = registry
        .schema(&args.type_name)
        .map(|schema| {
            args.requireds
                .iter()
                .filter_map(|name| schema.fields.get(name.as_str())?.fk.clone())
                .collect()
        })
        .unwrap_or_default();
    util::load_all(registry, foreign).await;

    let requireds: Vec<&str> = args.requireds.iter().map(String::as_str).collect();
    let item = registry.blank(&args.type_name, &requireds)?;

    let out = output::render_value(global.output, &Value::Object(item));
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn save(session: &Session, args: SaveArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = &session.registry;
    util::ensure_type(registry, &args.type_name)?;

    let items = items_from_value(util::read_json(&args.data)?);
    if items.is_empty() {
        return Err(CliError::Validation {
            field: "data".into(),
            reason: "expected a JSON object or an array of objects".into(),
        });
    }

    let outcome = registry.save(&args.type_name, items).await;
    report(registry, &args.type_name, outcome, global)
}

pub async fn remove(
    session: &Session,
    args: RemoveArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let registry = &session.registry;
    util::ensure_type(registry, &args.type_name)?;
    util::load(registry, &args.type_name, false).await?;
    util::load_all(registry, util::referencing_types(registry, &args.type_name)).await;

    let items = args
        .ids
        .iter()
        .map(|id| util::item_or_stub(registry, &args.type_name, id))
        .collect();

    let outcome = registry.remove(&args.type_name, items).await;
    report(registry, &args.type_name, outcome, global)
}

/// Print what a batch committed, then fail with whatever did not.
fn report(
    registry: &DataRegistry,
    type_name: &str,
    outcome: BatchOutcome,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let key = registry.schema(type_name).and_then(|s| s.key);
    if !outcome.items.is_empty() {
        let out = output::render_items(global.output, &outcome.items, key.as_deref());
        output::print_output(&out, global.quiet);
    }
    match outcome.error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
