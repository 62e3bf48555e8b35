//! Follow a poll URL and print every store change it causes.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::info;

use deckathlon_core::{DataRegistry, PollData, Subscription};

use super::util;
use crate::Session;
use crate::cli::{GlobalOpts, OutputFormat, PollArgs};
use crate::error::CliError;
use crate::output;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
const CHECK_EVERY: Duration = Duration::from_millis(50);

pub async fn handle(session: &Session, args: PollArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = &session.registry;
    if !registry.has_backend() {
        return Err(CliError::Validation {
            field: "--root-url".into(),
            reason: "polling needs a backend".into(),
        });
    }

    let (profile_url, profile_interval) = session.poll.clone().unzip();
    let url = args.url.or(profile_url).ok_or_else(|| CliError::Validation {
        field: "url".into(),
        reason: "no poll URL given and none in the profile".into(),
    })?;
    let interval = args
        .interval
        .map(Duration::from_millis)
        .or(profile_interval)
        .unwrap_or(DEFAULT_INTERVAL);
    let data = match args.data {
        Some(ref raw) => PollData::Fixed(util::read_json(raw)?),
        None => PollData::None,
    };

    let subs = watch_stores(registry, global);
    info!(url = %url, interval_ms = interval.as_millis(), "polling");
    registry.poll(url.as_str(), interval, data);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = tokio::time::sleep(CHECK_EVERY) => {
                let done = registry
                    .poll_state(&url)
                    .is_none_or(|s| args.ticks.is_some_and(|n| s.ticks + s.failures >= n));
                if done {
                    break;
                }
            }
        }
    }

    registry.cancel_poll(&url);
    for sub in subs {
        sub.unsubscribe();
    }
    Ok(())
}

/// One listener per schema type printing the store after each change.
fn watch_stores(registry: &DataRegistry, global: &GlobalOpts) -> Vec<Subscription> {
    let format = global.output;
    let quiet = global.quiet;
    registry
        .type_names()
        .into_iter()
        .map(|type_name| {
            let store = registry.store(&type_name);
            registry.listen(&type_name, move |name| {
                let line = match format {
                    OutputFormat::Plain => format!("{name}\t{}", store.len()),
                    OutputFormat::Json | OutputFormat::JsonCompact => {
                        let items: Vec<Value> =
                            store.list().into_iter().map(Value::Object).collect();
                        json!({"type": name, "count": items.len(), "items": items}).to_string()
                    }
                };
                output::print_output(&line, quiet);
            })
        })
        .collect()
}
