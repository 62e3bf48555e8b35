// ── Registry hooks ──
//
// Callbacks the embedding application plugs into the registry. All have
// no-op defaults, so an implementation overrides only what it needs.

use crate::model::Item;
use crate::registry::RetryHandle;

/// Application callbacks invoked by [`DataRegistry`](crate::DataRegistry).
pub trait Hooks: Send + Sync {
    /// Called for every item of a backend save, before its request.
    fn on_before_save(&self, _type_name: &str, _item: &mut Item) {}

    /// Post-processes an item built by `blank()`.
    fn on_blank(&self, _type_name: &str, _item: &mut Item) {}

    /// A backend save or remove batch is starting.
    fn on_query_start(&self) {}

    /// A backend save or remove batch has finished.
    fn on_query_complete(&self) {}

    /// A query got HTTP 401. The pending query resolves with whatever
    /// [`RetryHandle::retry`] produces; dropping the handle fails it as
    /// unauthorized.
    fn on_unauthorized(&self, retry: RetryHandle) {
        drop(retry);
    }
}

/// Hook set that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl Hooks for NoHooks {}
