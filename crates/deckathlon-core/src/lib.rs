//! Schema-driven reactive data layer for the Deckathlon client.
//!
//! The crate keeps local, observable mirrors of the server's entity
//! collections and synchronizes them with the JSON API:
//!
//! - **[`DataRegistry`]** is the facade. It owns the schema and one
//!   [`TypeStore`] per type, and provides backend
//!   [`save`](DataRegistry::save) / [`remove`](DataRegistry::remove) /
//!   [`reload`](DataRegistry::reload), cached [`query`](DataRegistry::query)
//!   calls with re-authentication, per-URL [`poll`](DataRegistry::poll)
//!   loops and foreign-key relation lookups.
//!
//! - **[`TypeStore`]** holds one type's items keyed by primary key (or a
//!   single object for singleton types), applies the type's transform,
//!   autofilter and order, and notifies listeners once per changing
//!   mutation. [`StoreStream`] exposes its snapshots for async consumers.
//!
//! - **[`DataActions`]** is the dispatcher surface: `save`, `remove` and
//!   `update` requests any component can fire without holding the
//!   registry.
//!
//! - **[`Topic`] / [`PubSub`]** are the listener primitives everything
//!   above is built on.

pub mod actions;
pub mod config;
pub mod error;
pub mod hooks;
pub mod model;
pub mod pubsub;
pub mod registry;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use actions::{BatchAction, BatchKind, BatchOutcome, DataActions, OutcomeCallback, UpdateAction};
pub use config::RegistryOptions;
pub use error::DataError;
pub use hooks::{Hooks, NoHooks};
pub use pubsub::{Listenable, PubSub, Subscription, Topic};
pub use registry::{
    CachePolicy, DataRegistry, DataRegistryBuilder, PollData, PollPhase, PollState, Query,
    QueryOptions, RetryHandle,
};
pub use store::{FieldMatcher, Filter, Order, SortKey, StoreOptions, TypeStore};
pub use stream::{StoreStream, StoreWatchStream};

pub use model::{FieldKind, FieldSpec, Item, OrderSpec, TypeSchema};
