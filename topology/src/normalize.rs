//! Field normalization shared by the assembler and the publisher.
use chrono::DateTime;
use serde_json::{Map, Value};

/// Separator between the segments of a composite unique id.
pub const ID_SEPARATOR: &str = "_";

/// Derives the opco code from a deployment name such as `apigw-nl`: the two
/// characters after the last `-`, uppercased.
pub fn derive_opco_code(deployment_name: &str) -> Option<String> {
    let (_, suffix) = deployment_name.rsplit_once('-')?;
    let code: String = suffix.chars().take(2).collect();
    if code.chars().count() < 2 {
        return None;
    }
    Some(code.to_uppercase())
}

/// Lifts a `properties.property` list of `{name, value}` pairs into
/// top-level attributes and removes `properties`. Later duplicates win.
pub fn expand_properties(doc: &mut Map<String, Value>) {
    let Some(list) = doc
        .get("properties")
        .and_then(|p| p.get("property"))
        .and_then(Value::as_array)
        .cloned()
    else {
        return;
    };

    for prop in list {
        let Some(name) = prop.get("name").and_then(Value::as_str) else {
            continue;
        };
        let value = prop.get("value").cloned().unwrap_or(Value::Null);
        doc.insert(name.to_string(), value);
    }
    doc.remove("properties");
}

/// Renders epoch milliseconds as `dd.mm.yyyy, HH:MM:SS` (UTC).
pub fn format_timestamp(epoch_millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(epoch_millis)
        .map(|dt| dt.format("%d.%m.%Y, %H:%M:%S").to_string())
}

/// Replaces numeric `createdAt`/`lastModifiedAt` attributes with their display
/// form. Missing or non-numeric values are left as they are.
pub fn format_timestamps(attributes: &mut Map<String, Value>) {
    for field in ["createdAt", "lastModifiedAt"] {
        let Some(millis) = attributes.get(field).and_then(epoch_millis) else {
            continue;
        };
        if let Some(formatted) = format_timestamp(millis) {
            attributes.insert(field.to_string(), Value::String(formatted));
        }
    }
}

fn epoch_millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
}

pub fn build_unique_id<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(ID_SEPARATOR)
}

/// Reads an attribute as a string, accepting JSON strings and numbers.
pub fn attribute_str(attributes: &Map<String, Value>, field: &str) -> Option<String> {
    match attributes.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
