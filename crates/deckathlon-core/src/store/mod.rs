// ── Entity stores ──
//
// `TypeStore` plus the filter and ordering vocabulary its reads and
// configuration are expressed in.

mod filter;
mod order;
mod type_store;

pub use filter::{FieldMatcher, Filter};
pub use order::{Order, SortKey};
pub use type_store::{RawView, Snapshot, StoreOptions, Transform, TypeStore};
