//! Output formatting: JSON, compact JSON, plain.
//!
//! Structured formats go through serde_json; plain emits one primary key
//! (or scalar) per line for scripting.

use std::io::{self, Write};

use serde_json::Value;

use deckathlon_core::Item;
use deckathlon_core::model::display_text;

use crate::cli::OutputFormat;

/// Render a list of items. `key` is the type's primary-key field, used by
/// the plain format.
pub fn render_items(format: OutputFormat, items: &[Item], key: Option<&str>) -> String {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => {
            let list = Value::Array(items.iter().cloned().map(Value::Object).collect());
            render_json(format, &list)
        }
        OutputFormat::Plain => items
            .iter()
            .map(|item| {
                key.and_then(|k| item.get(k))
                    .map_or_else(|| Value::Object(item.clone()).to_string(), display_text)
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Render any JSON value.
pub fn render_value(format: OutputFormat, value: &Value) -> String {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => render_json(format, value),
        OutputFormat::Plain => match value {
            Value::Array(values) => values
                .iter()
                .map(display_text)
                .collect::<Vec<_>>()
                .join("\n"),
            other => display_text(other),
        },
    }
}

fn render_json(format: OutputFormat, value: &Value) -> String {
    let rendered = if matches!(format, OutputFormat::JsonCompact) {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    rendered.unwrap_or_else(|_| value.to_string())
}

/// Write rendered output to stdout unless quiet.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn items() -> Vec<Item> {
        vec![
            json!({"id": 1, "name": "A"}).as_object().cloned().unwrap(),
            json!({"id": "x", "name": "B"}).as_object().cloned().unwrap(),
        ]
    }

    #[test]
    fn plain_prints_keys() {
        assert_eq!(render_items(OutputFormat::Plain, &items(), Some("id")), "1\nx");
    }

    #[test]
    fn compact_json_is_one_line() {
        let out = render_items(OutputFormat::JsonCompact, &items(), None);
        assert_eq!(out, r#"[{"id":1,"name":"A"},{"id":"x","name":"B"}]"#);
    }

    #[test]
    fn plain_scalars_and_arrays() {
        assert_eq!(render_value(OutputFormat::Plain, &json!("ok")), "ok");
        assert_eq!(render_value(OutputFormat::Plain, &json!([1, "two"])), "1\ntwo");
    }
}
