//! Field-expansion encoding.
//!
//! Turns nested parameter values into the `fields` mini-grammar:
//!
//! - a scalar is its string form
//! - a list joins its encoded elements with `,`
//! - a map joins one segment per key with `.`:
//!   - a map whose values are all presence markers (`1` or `true`) is a
//!     field set, `key(a,b)`
//!   - any other map chains, `key.` followed by its encoding
//!   - everything else is a modifier, `key(value)`
//!
//! So `{friends: {id: 1, name: 1}}` becomes `friends(id,name)`,
//! `{friends: {fields: [id, name]}}` becomes `friends.fields(id,name)` and
//! `{albums: {fields: "name", limit: 5}}` becomes `albums.fields(name).limit(5)`.
//!
//! Files have no place in the grammar and encode to nothing.

use crate::params::ParamValue;

/// Encode a value in the field-expansion grammar. Keys are visited in sorted
/// order, so the output is deterministic.
pub fn encode_fields(value: &ParamValue) -> String {
    match value {
        ParamValue::List(items) => items.iter().map(encode_fields).collect::<Vec<_>>().join(","),
        ParamValue::Map(map) => map
            .iter()
            .map(|(key, value)| encode_segment(key, value))
            .collect::<Vec<_>>()
            .join("."),
        ParamValue::File(_) => String::new(),
        scalar => scalar.scalar_text().unwrap_or_default(),
    }
}

fn encode_segment(key: &str, value: &ParamValue) -> String {
    match value {
        ParamValue::Map(inner) if inner.values().all(is_presence_marker) => {
            let names: Vec<&str> = inner.keys().map(String::as_str).collect();
            format!("{key}({})", names.join(","))
        }
        ParamValue::Map(_) => format!("{key}.{}", encode_fields(value)),
        other => format!("{key}({})", encode_fields(other)),
    }
}

fn is_presence_marker(value: &ParamValue) -> bool {
    matches!(value, ParamValue::Int(1) | ParamValue::Bool(true))
}
