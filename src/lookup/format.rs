//! Lookup API response interpretation
//!
//! The API answers either with a JSON list of records, with a
//! `{"status": "success", "data": ...}` envelope, or with plain text.

use super::LookupOutcome;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Separator placed between formatted records
pub const RECORD_SEPARATOR: &str = "──────────────────────────────";

/// Token the API uses inside addresses where a comma belongs
const ADDRESS_SEPARATOR_TOKEN: &str = "!!";

/// Shortest plain-text body accepted as a result
const MIN_TEXT_LEN: usize = 10;

const MISSING: &str = "N/A";

/// One record returned by the lookup API
///
/// Numbers are accepted where strings are expected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRecord {
    #[serde(default, deserialize_with = "loose_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub mobile: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub father_name: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub alt_mobile: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub circle: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub id_number: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub email: Option<String>,
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn or_missing(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(MISSING)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl LookupRecord {
    fn write_to(&self, index: usize, out: &mut String) {
        let address = or_missing(&self.address).replace(ADDRESS_SEPARATOR_TOKEN, ", ");

        out.push_str(&format!("Record {}:\n", index));
        out.push_str(&format!("Name: {}\n", or_missing(&self.name)));
        out.push_str(&format!("Mobile: {}\n", or_missing(&self.mobile)));
        out.push_str(&format!("Father's Name: {}\n", or_missing(&self.father_name)));
        out.push_str(&format!("Address: {}\n", address));
        if let Some(alt) = non_empty(&self.alt_mobile) {
            out.push_str(&format!("Alt Mobile: {}\n", alt));
        }
        out.push_str(&format!("Circle: {}\n", or_missing(&self.circle)));
        out.push_str(&format!("ID Number: {}\n", or_missing(&self.id_number)));
        if let Some(email) = non_empty(&self.email) {
            out.push_str(&format!("Email: {}\n", email));
        }
    }
}

/// Render records as one reply
pub fn format_records(records: &[LookupRecord]) -> String {
    let mut out = String::from("Mobile Number Search Results\n");
    out.push_str(&format!("Found {} record(s)\n\n", records.len()));

    for (i, record) in records.iter().enumerate() {
        record.write_to(i + 1, &mut out);
        if i + 1 < records.len() {
            out.push('\n');
            out.push_str(RECORD_SEPARATOR);
            out.push_str("\n\n");
        }
    }

    out
}

/// Pull records out of a parsed body
///
/// Entries that are not JSON objects are skipped.
pub fn extract_records(json: &Value) -> Vec<LookupRecord> {
    let items: Vec<&Value> = match json {
        Value::Array(items) => items.iter().collect(),
        Value::Object(envelope)
            if envelope.get("status").and_then(Value::as_str) == Some("success") =>
        {
            match envelope.get("data") {
                Some(Value::Array(items)) => items.iter().collect(),
                Some(item @ Value::Object(fields)) if !fields.is_empty() => vec![item],
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter(|item| item.is_object())
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

/// Interpret a successful (HTTP 200) response body
///
/// JSON with records becomes [`LookupOutcome::Found`]; JSON without records
/// is [`LookupOutcome::NoData`]. A non-JSON body longer than a few characters
/// is passed through as [`LookupOutcome::Text`].
pub fn interpret_body(body: &str) -> LookupOutcome {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => {
            let records = extract_records(&json);
            if records.is_empty() {
                LookupOutcome::NoData
            } else {
                LookupOutcome::Found {
                    text: format_records(&records),
                    records: records.len(),
                }
            }
        }
        Err(_) => {
            let text = body.trim();
            if text.chars().count() > MIN_TEXT_LEN {
                LookupOutcome::Text(text.to_string())
            } else {
                LookupOutcome::NoData
            }
        }
    }
}
