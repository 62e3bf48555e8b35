// ── Poll loop ──
//
// Per-URL self-rescheduling timers. Each entry lives in a registry-owned
// map and is advanced by one tick function: query with the current
// arguments, apply the payload, schedule the next tick so the
// start-to-start period stays near the interval. A generation number
// tells a tick whether its entry was replaced while it was in flight.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::DataRegistry;
use crate::model::items_from_value;

static GENERATION: AtomicU64 = AtomicU64::new(1);

/// Payload key listing deleted ids per type.
const DELETED_KEY: &str = "__deleted__";

type Cursor = Arc<dyn Fn(Option<&Value>) -> Option<Value> + Send + Sync>;

/// Arguments sent with each poll request.
#[derive(Clone, Default)]
pub enum PollData {
    #[default]
    None,
    /// The same arguments every tick.
    Fixed(Value),
    /// Called with `None` for the first tick, then with the previous
    /// tick's arguments after every successful tick. Runs with no
    /// registry lock held.
    Cursor(Cursor),
}

impl PollData {
    pub fn cursor(f: impl Fn(Option<&Value>) -> Option<Value> + Send + Sync + 'static) -> Self {
        Self::Cursor(Arc::new(f))
    }

    fn first(&self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Fixed(value) => Some(value.clone()),
            Self::Cursor(f) => f(None),
        }
    }

    fn after(&self, previous: Option<&Value>) -> Option<Value> {
        match self {
            Self::Cursor(f) => f(previous),
            _ => previous.cloned(),
        }
    }
}

impl fmt::Debug for PollData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Self::Cursor(_) => f.write_str("Cursor(..)"),
        }
    }
}

/// Where a poll entry is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Scheduled,
    InFlight,
}

/// Inspectable state of one poll entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    pub url: String,
    pub interval: Duration,
    /// Arguments the next tick will send.
    pub next_args: Option<Value>,
    pub generation: u64,
    pub phase: PollPhase,
    pub ticks: u64,
    pub failures: u64,
}

pub(crate) struct PollEntry {
    state: PollState,
    data: PollData,
    timer: CancellationToken,
}

impl PollEntry {
    pub(crate) fn cancel(&self) {
        self.timer.cancel();
    }
}

impl DataRegistry {
    /// Start, reconfigure or (with a zero interval) stop polling `url`.
    ///
    /// The first tick fires immediately. A tick that is in flight when the
    /// entry is replaced or stopped still completes and its payload is
    /// applied, but it does not schedule another tick.
    pub fn poll(&self, url: impl Into<String>, interval: Duration, data: PollData) {
        let url = url.into();
        if let Some(old) = self.inner.polls.lock().remove(&url) {
            old.cancel();
            debug!(url = %url, "poll entry cleared");
        }
        if interval.is_zero() {
            info!(url = %url, "polling stopped");
            return;
        }
        if self.inner.cancel.is_cancelled() {
            warn!(url = %url, "registry shut down, polling not started");
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(url = %url, "no Tokio runtime, polling not started");
            return;
        }

        let next_args = data.first();
        let generation = GENERATION.fetch_add(1, Ordering::Relaxed);
        let timer = self.inner.cancel.child_token();
        let state = PollState {
            url: url.clone(),
            interval,
            next_args,
            generation,
            phase: PollPhase::Scheduled,
            ticks: 0,
            failures: 0,
        };
        let replaced = self.inner.polls.lock().insert(
            url.clone(),
            PollEntry {
                state,
                data,
                timer: timer.clone(),
            },
        );
        // A concurrent `poll` for the same URL lost the race.
        if let Some(old) = replaced {
            old.cancel();
        }

        info!(url = %url, interval_ms = interval.as_millis(), "polling started");
        self.schedule_tick(url, generation, Duration::ZERO, timer);
    }

    /// Stop polling `url`.
    pub fn cancel_poll(&self, url: &str) {
        self.poll(url, Duration::ZERO, PollData::None);
    }

    /// State of the poll entry for `url`, if one is active.
    pub fn poll_state(&self, url: &str) -> Option<PollState> {
        self.inner.polls.lock().get(url).map(|e| e.state.clone())
    }

    fn schedule_tick(&self, url: String, generation: u64, delay: Duration, timer: CancellationToken) {
        let registry = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = timer.cancelled() => {}
                () = tokio::time::sleep(delay) => registry.tick(url, generation).await,
            }
        });
    }

    async fn tick(&self, url: String, generation: u64) {
        let (args, interval, data) = {
            let mut polls = self.inner.polls.lock();
            let Some(entry) = polls
                .get_mut(&url)
                .filter(|e| e.state.generation == generation)
            else {
                return;
            };
            entry.state.phase = PollPhase::InFlight;
            (
                entry.state.next_args.clone(),
                entry.state.interval,
                entry.data.clone(),
            )
        };

        let started = Instant::now();
        let result = self.query(url.as_str()).maybe_data(args.clone()).send().await;
        let succeeded = match result {
            Ok(payload) => {
                self.apply_poll_payload(payload);
                true
            }
            Err(err) => {
                warn!(url = %url, error = %err, "poll tick failed");
                false
            }
        };
        let delay = interval.saturating_sub(started.elapsed());
        let next_args = succeeded.then(|| data.after(args.as_ref()));

        let timer = {
            let mut polls = self.inner.polls.lock();
            let Some(entry) = polls
                .get_mut(&url)
                .filter(|e| e.state.generation == generation)
            else {
                debug!(url = %url, "poll entry superseded, not rescheduling");
                return;
            };
            match next_args {
                Some(next_args) => {
                    entry.state.next_args = next_args;
                    entry.state.ticks += 1;
                }
                None => entry.state.failures += 1,
            }
            entry.state.phase = PollPhase::Scheduled;
            entry.timer.clone()
        };
        self.schedule_tick(url, generation, delay, timer);
    }

    /// Apply `{type: [items..], __deleted__: {type: [ids..]}}`: upserts go
    /// out as `update` actions, deletions hit existing stores directly.
    fn apply_poll_payload(&self, payload: Value) {
        let Value::Object(mut payload) = payload else {
            return;
        };
        let deleted = payload.shift_remove(DELETED_KEY);

        for (type_name, data) in payload {
            self.inner.actions.update(type_name, items_from_value(data));
        }

        if let Some(Value::Object(deleted)) = deleted {
            for (type_name, ids) in deleted {
                let Some(store) = self.existing_store(&type_name) else {
                    continue;
                };
                let ids = match ids {
                    Value::Array(ids) => ids,
                    single => vec![single],
                };
                store.remove(ids);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::RegistryOptions;

    #[test]
    fn poll_data_argument_progression() {
        let fixed = PollData::Fixed(json!({"a": 1}));
        assert_eq!(fixed.first(), Some(json!({"a": 1})));
        assert_eq!(fixed.after(Some(&json!({"a": 1}))), Some(json!({"a": 1})));

        let cursor = PollData::cursor(|prev| {
            let n = prev.and_then(|p| p["n"].as_i64()).unwrap_or(0);
            Some(json!({"n": n + 1}))
        });
        assert_eq!(cursor.first(), Some(json!({"n": 1})));
        assert_eq!(cursor.after(Some(&json!({"n": 1}))), Some(json!({"n": 2})));

        assert_eq!(PollData::None.first(), None);
    }

    #[test]
    fn payload_upserts_and_deletes() {
        let registry = DataRegistry::builder()
            .options(
                serde_json::from_value::<RegistryOptions>(json!({
                    "schema": {"tables": {"key": "id"}, "users": {"key": "id"}},
                    "data": {"tables": [{"id": 1}, {"id": 2}]}
                }))
                .unwrap(),
            )
            .build();

        registry.apply_poll_payload(json!({
            "users": [{"id": 5, "username": "bo"}],
            "__deleted__": {"tables": [1], "ghosts": [3]}
        }));

        assert!(registry.store("users").has(5));
        assert_eq!(registry.store("tables").keys(), vec!["2"]);
        assert!(registry.existing_store("ghosts").is_none());
    }

    #[test]
    fn zero_interval_without_entry_is_noop() {
        let registry = DataRegistry::local();
        registry.poll("poll", Duration::ZERO, PollData::None);
        assert!(registry.poll_state("poll").is_none());
    }
}
