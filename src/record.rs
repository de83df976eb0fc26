//! Decoder output: an ordered bag of named fields, serializable by any sink.

use serde::{Deserialize, Serialize};

/// One value a decoder can attach to a field. Kept small and concrete
/// (rather than a generic `serde_json::Value`) so sinks can match on it
/// without round-tripping through JSON first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    /// Raw bytes a decoder chose not to interpret further (e.g. an
    /// `unknown_N` field), surfaced as hex.
    HexBytes(Vec<u8>),
    /// A nested record, for decoders that report structured sub-fields
    /// (e.g. a TPMS decoder's per-wheel pressure/temperature group).
    Nested(Record),
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}
impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}
impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}
impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}
impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// An ordered set of (field name, value) pairs. Order is preserved because
/// sinks that flatten to CSV or a fixed-column table rely on it; lookup by
/// name is still available but is not the primary access pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FieldValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_preserve_insertion_order() {
        let mut r = Record::new();
        r.push("model", "bresser-7in1").push("id", 42i64).push("battery_ok", true);
        let names: Vec<&str> = r.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["model", "id", "battery_ok"]);
    }

    #[test]
    fn get_finds_by_name() {
        let mut r = Record::new();
        r.push("temperature_C", 21.5f64);
        assert_eq!(r.get("temperature_C"), Some(&FieldValue::Double(21.5)));
        assert_eq!(r.get("missing"), None);
    }

    #[test]
    fn nested_record_round_trips_through_from_impls() {
        let mut inner = Record::new();
        inner.push("wheel", "FL");
        let mut outer = Record::new();
        outer.push("tpms", FieldValue::Nested(inner.clone()));
        assert_eq!(outer.get("tpms"), Some(&FieldValue::Nested(inner)));
    }
}
