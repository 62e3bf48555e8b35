// ── Data model ──
//
// Items are untyped JSON records; schemas describe how to key, default,
// order and relate them.

pub mod schema;
pub mod value;

pub use schema::{FieldKind, FieldNames, FieldSpec, OrderSpec, TypeSchema};
pub use value::{
    Item, compare_values, contains_value, display_text, is_truthy, items_from_value, key_of,
    merge_into, natural_cmp, values_equal,
};
