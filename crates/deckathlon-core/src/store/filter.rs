// ── Item filters ──
//
// A filter is either a predicate over the whole item or a map of
// per-field matchers, all of which must match.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::model::{Item, contains_value, is_truthy, key_of, values_equal};

type ItemPredicate = Arc<dyn Fn(&Item) -> bool + Send + Sync>;
type FieldPredicate = Arc<dyn Fn(Option<&Value>, &str, &Item) -> bool + Send + Sync>;

/// How one field is matched.
///
/// Which array rule applies to `OneOf` and `Equals` depends on whether the
/// item's field value is itself an array, decided when the filter runs.
#[derive(Clone)]
pub enum FieldMatcher {
    /// Called with (field value, field name, item).
    Custom(FieldPredicate),
    /// Matches if the field value, as a key, maps to a truthy entry.
    TruthyKeys(serde_json::Map<String, Value>),
    /// Scalar field: the value is one of these. Array field: every element
    /// of the field is one of these.
    OneOf(Vec<Value>),
    /// Scalar field: equal. Array field: the field contains this value.
    Equals(Value),
}

impl FieldMatcher {
    pub fn custom(f: impl Fn(Option<&Value>, &str, &Item) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn matches(&self, field: &str, item: &Item) -> bool {
        let value = item.get(field);
        match self {
            Self::Custom(f) => f(value, field, item),
            Self::TruthyKeys(keys) => value
                .and_then(key_of)
                .and_then(|k| keys.get(&k))
                .is_some_and(is_truthy),
            Self::OneOf(set) => match value {
                Some(Value::Array(values)) => {
                    set.iter().filter(|v| contains_value(values, v)).count() == values.len()
                }
                other => contains_value(set, other.unwrap_or(&Value::Null)),
            },
            Self::Equals(expected) => match value {
                Some(Value::Array(values)) => contains_value(values, expected),
                other => values_equal(other.unwrap_or(&Value::Null), expected),
            },
        }
    }
}

impl From<Value> for FieldMatcher {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::TruthyKeys(map),
            Value::Array(values) => Self::OneOf(values),
            scalar => Self::Equals(scalar),
        }
    }
}

impl fmt::Debug for FieldMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::TruthyKeys(keys) => f.debug_tuple("TruthyKeys").field(keys).finish(),
            Self::OneOf(values) => f.debug_tuple("OneOf").field(values).finish(),
            Self::Equals(value) => f.debug_tuple("Equals").field(value).finish(),
        }
    }
}

/// Item filter used by store reads and autofilters.
#[derive(Clone)]
pub enum Filter {
    Predicate(ItemPredicate),
    Fields(Vec<(String, FieldMatcher)>),
}

impl Filter {
    pub fn predicate(f: impl Fn(&Item) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// Empty field filter, which matches everything.
    pub fn fields() -> Self {
        Self::Fields(Vec::new())
    }

    /// Add a field matcher. On a predicate filter both must match.
    pub fn with(self, field: impl Into<String>, matcher: impl Into<FieldMatcher>) -> Self {
        let field = field.into();
        let matcher = matcher.into();
        match self {
            Self::Fields(mut fields) => {
                fields.push((field, matcher));
                Self::Fields(fields)
            }
            Self::Predicate(p) => {
                Self::predicate(move |item| p(item) && matcher.matches(&field, item))
            }
        }
    }

    /// Shorthand for a single `field == value` match.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::fields().with(field, FieldMatcher::Equals(value.into()))
    }

    /// Build a field filter from a JSON object of `field: matcher value`.
    /// Anything other than an object yields `None`.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::Fields(
                map.into_iter()
                    .map(|(field, v)| (field, FieldMatcher::from(v)))
                    .collect(),
            )),
            _ => None,
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Self::Predicate(f) => f(item),
            Self::Fields(fields) => fields.iter().all(|(field, m)| m.matches(field, item)),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
        }
    }
}
