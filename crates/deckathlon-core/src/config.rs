// ── Registry configuration ──
//
// What a registry is configured with at startup: the API root, the
// schema document and any data the page was rendered with. Core never
// reads files; deckathlon-config builds these from a profile.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::TypeSchema;

/// Options for [`DataRegistry::configure`](crate::DataRegistry::configure).
///
/// Every part is merged into the registry's current state; an empty
/// options value changes nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryOptions {
    /// Backend API root, e.g. `https://example.com/api/`. Without one the
    /// registry works purely locally.
    #[serde(default, rename = "rootURL", alias = "root_url", skip_serializing_if = "Option::is_none")]
    pub root_url: Option<String>,

    /// Type schemas by type name.
    #[serde(default)]
    pub schema: IndexMap<String, TypeSchema>,

    /// Initial store content by type name: one item or a list.
    #[serde(default)]
    pub data: IndexMap<String, Value>,
}

impl RegistryOptions {
    pub fn with_root_url(mut self, url: impl Into<String>) -> Self {
        self.root_url = Some(url.into());
        self
    }

    pub fn with_schema(mut self, type_name: impl Into<String>, schema: TypeSchema) -> Self {
        self.schema.insert(type_name.into(), schema);
        self
    }

    pub fn with_data(mut self, type_name: impl Into<String>, data: Value) -> Self {
        self.data.insert(type_name.into(), data);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_page_configuration_object() {
        let opts: RegistryOptions = serde_json::from_value(json!({
            "rootURL": "/api/",
            "schema": {"tables": {"key": "id", "fields": {"id": {}}}},
            "data": {"settings": {"lang": "en"}}
        }))
        .unwrap();

        assert_eq!(opts.root_url.as_deref(), Some("/api/"));
        assert_eq!(opts.schema["tables"].key.as_deref(), Some("id"));
        assert_eq!(opts.data["settings"], json!({"lang": "en"}));
    }
}
