// ── Entity schema ──
//
// Typed form of the schema document the site ships alongside its data:
// per-type primary key, field specs, ordering and sync flags.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Declared type of a field, used for blank-item defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Number,
    Date,
    String,
    Boolean,
    #[serde(other)]
    Other,
}

/// One field name or several, as `fklabel` accepts both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldNames {
    One(String),
    Many(Vec<String>),
}

impl FieldNames {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::One(name) => vec![name.as_str()],
            Self::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// Specification of a single field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name, stamped from the schema map key on configure.
    #[serde(default)]
    pub name: String,

    /// Default value on `blank()`. An explicit `null` is kept as
    /// `Some(Value::Null)`, distinct from no default at all.
    #[serde(
        default,
        deserialize_with = "explicit_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Whether the field is user-editable.
    #[serde(default)]
    pub edit: bool,

    /// Foreign type this field references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fk: Option<String>,

    /// Fields of the foreign item used for its label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fklabel: Option<FieldNames>,

    /// Label template with `{0}`, `{1}`.. placeholders for `fklabel` values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fkformat: Option<String>,

    /// Referential integrity is not enforced on delete.
    #[serde(default)]
    pub fkignore: bool,

    /// Nullable unless explicitly `false`.
    #[serde(default = "default_true", rename = "null")]
    pub nullable: bool,

    #[serde(default)]
    pub required: bool,

    /// Stripped from every item written to the store.
    #[serde(default)]
    pub drop: bool,

    /// Not a stored column; skipped by `blank()`.
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: true,
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn references(mut self, fk: impl Into<String>) -> Self {
        self.fk = Some(fk.into());
        self
    }

    pub fn fk_ignored(mut self) -> Self {
        self.fkignore = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.nullable = false;
        self
    }

    pub fn dropped(mut self) -> Self {
        self.drop = true;
        self
    }

    pub fn virtual_field(mut self) -> Self {
        self.is_virtual = true;
        self
    }
}

fn default_true() -> bool {
    true
}

fn explicit_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Declared default ordering, in any of the accepted JSON shapes:
/// `"field"`, `["f1", "f2"]` or `[["f1", "f2"], [true, false]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderSpec {
    Field(String),
    Fields(Vec<String>),
    FieldsWithDirections(Vec<String>, Vec<bool>),
}

impl OrderSpec {
    /// Expand into `(field, ascending)` pairs, padding directions with
    /// ascending.
    pub fn sort_keys(&self) -> Vec<(String, bool)> {
        match self {
            Self::Field(field) => vec![(field.clone(), true)],
            Self::Fields(fields) => fields.iter().map(|f| (f.clone(), true)).collect(),
            Self::FieldsWithDirections(fields, directions) => fields
                .iter()
                .enumerate()
                .map(|(i, f)| (f.clone(), directions.get(i).copied().unwrap_or(true)))
                .collect(),
        }
    }
}

/// Schema of one entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeSchema {
    /// Primary key field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default)]
    pub fields: IndexMap<String, FieldSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderSpec>,

    /// Default label fields when other types reference this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fklabel: Option<FieldNames>,

    /// Default label template when other types reference this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fkformat: Option<String>,

    /// Single-object store.
    #[serde(default)]
    pub single: bool,

    /// Store updated only locally, no backend actions.
    #[serde(default, rename = "static")]
    pub is_static: bool,

    /// Endpoint path, if not the type name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Item URL does not include the item id.
    #[serde(default)]
    pub urlstatic: bool,
}

impl TypeSchema {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.insert(spec.name.clone(), spec);
        self
    }

    /// Stamp every field spec with its own map key.
    pub fn normalize(&mut self) {
        for (name, spec) in &mut self.fields {
            spec.name.clone_from(name);
        }
    }

    /// Collection endpoint path relative to the root URL.
    pub fn endpoint<'a>(&'a self, type_name: &'a str) -> &'a str {
        self.url.as_deref().unwrap_or(type_name)
    }
}
