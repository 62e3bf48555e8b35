// ── Item ordering ──

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::model::{Item, OrderSpec, compare_values};

type Comparator = Arc<dyn Fn(&Item, &Item) -> Ordering + Send + Sync>;

/// One sort field and its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// Ordering of a store's derived list.
#[derive(Clone)]
pub enum Order {
    Fields(Vec<SortKey>),
    Custom(Comparator),
}

impl Order {
    pub fn by(field: impl Into<String>) -> Self {
        Self::Fields(vec![SortKey::asc(field)])
    }

    pub fn custom(f: impl Fn(&Item, &Item) -> Ordering + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn compare(&self, a: &Item, b: &Item) -> Ordering {
        match self {
            Self::Custom(f) => f(a, b),
            Self::Fields(keys) => keys
                .iter()
                .map(|key| {
                    let ord = compare_values(a.get(&key.field), b.get(&key.field));
                    if key.ascending { ord } else { ord.reverse() }
                })
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal),
        }
    }

    /// Stable in-place sort, so ties keep insertion order.
    pub fn sort<T: Borrow<Item>>(&self, items: &mut [T]) {
        items.sort_by(|a, b| self.compare(a.borrow(), b.borrow()));
    }
}

impl From<&OrderSpec> for Order {
    fn from(spec: &OrderSpec) -> Self {
        Self::Fields(
            spec.sort_keys()
                .into_iter()
                .map(|(field, ascending)| SortKey { field, ascending })
                .collect(),
        )
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fields(keys) => f.debug_tuple("Fields").field(keys).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
