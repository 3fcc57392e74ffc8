//! Word records and their ordering.
//!
//! A record is the remote document id plus the document's field map,
//! serialized flat as `{ "id": ..., ...fields }`. Fields are opaque to the
//! store apart from the time-stamp field used to order a full load.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collection::Document;
use crate::error::RecordError;

/// JSON object holding a document's field data.
pub type Fields = Map<String, Value>;

/// Key reserved for the remote-assigned identifier.
pub const ID_FIELD: &str = "id";

/// Default field used to order a full load.
pub const TIME_STAMP_FIELD: &str = "timeStamp";

/// Identifier assigned by the remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordId(String);

impl WordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for WordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for WordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A word payload that has not been stored yet (no `id`).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct WordDraft {
    fields: Fields,
}

impl WordDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a draft from a field map. An `id` key is rejected.
    pub fn from_fields(fields: Fields) -> Result<Self, RecordError> {
        if fields.contains_key(ID_FIELD) {
            return Err(RecordError::IdNotAllowed);
        }
        Ok(Self { fields })
    }

    /// Build a draft from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Object(fields) => Self::from_fields(fields),
            other => Err(RecordError::NotAnObject(json_kind(&other))),
        }
    }

    /// Builder-style field insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self, RecordError> {
        let key = key.into();
        if key == ID_FIELD {
            return Err(RecordError::IdNotAllowed);
        }
        self.fields.insert(key, value.into());
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }
}

/// A stored word: remote id plus its field data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRecord {
    id: WordId,
    #[serde(flatten)]
    fields: Fields,
}

impl WordRecord {
    /// The document id is authoritative; an `id` entry in `fields` is dropped.
    pub fn new(id: impl Into<WordId>, mut fields: Fields) -> Self {
        fields.remove(ID_FIELD);
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn id(&self) -> &WordId {
        &self.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field, keeping the id. Setting `id` itself is rejected.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), RecordError> {
        let key = key.into();
        if key == ID_FIELD {
            return Err(RecordError::IdNotAllowed);
        }
        self.fields.insert(key, value.into());
        Ok(())
    }

    /// Same id, new field data.
    pub fn with_fields(&self, fields: Fields) -> Self {
        Self::new(self.id.clone(), fields)
    }

    /// Value of the default `timeStamp` field.
    pub fn time_stamp(&self) -> Option<&Value> {
        self.fields.get(TIME_STAMP_FIELD)
    }

    pub fn into_parts(self) -> (WordId, Fields) {
        (self.id, self.fields)
    }
}

impl From<Document> for WordRecord {
    fn from(document: Document) -> Self {
        Self::new(document.id, document.fields)
    }
}

/// How a full load orders the records it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadOrder {
    /// Oldest time stamp first.
    #[default]
    Ascending,
    /// Newest time stamp first.
    Descending,
    /// Keep the order the collection listed the documents in.
    Remote,
}

/// Sort records by the given time-stamp field. The sort is stable, so
/// records with equal (or missing) time stamps keep their listing order.
pub fn sort_records(records: &mut [WordRecord], order: LoadOrder, field: &str) {
    match order {
        LoadOrder::Ascending => {
            records.sort_by(|a, b| compare_values(a.get(field), b.get(field)));
        }
        LoadOrder::Descending => {
            records.sort_by(|a, b| compare_values(b.get(field), a.get(field)));
        }
        LoadOrder::Remote => {}
    }
}

/// Total order over optional JSON values.
///
/// Values of different kinds order as
/// missing/null < bool < number < string < array < object.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => compare_numbers(x, y),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare_values(Some(l), Some(r)))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

fn compare_numbers(x: &serde_json::Number, y: &serde_json::Number) -> Ordering {
    if let (Some(l), Some(r)) = (x.as_i64(), y.as_i64()) {
        return l.cmp(&r);
    }
    if let (Some(l), Some(r)) = (x.as_u64(), y.as_u64()) {
        return l.cmp(&r);
    }
    let l = x.as_f64().unwrap_or(f64::NAN);
    let r = y.as_f64().unwrap_or(f64::NAN);
    l.total_cmp(&r)
}

fn kind_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, value: Value) -> WordRecord {
        let Value::Object(fields) = value else {
            panic!("test fixture must be an object");
        };
        WordRecord::new(id, fields)
    }

    #[test]
    fn test_draft_rejects_id() {
        let fields = json!({ "id": "x", "word": "apple" });
        let Value::Object(fields) = fields else { unreachable!() };
        assert_eq!(WordDraft::from_fields(fields), Err(RecordError::IdNotAllowed));
        assert_eq!(WordDraft::new().with("id", "x"), Err(RecordError::IdNotAllowed));
    }

    #[test]
    fn test_draft_from_non_object() {
        let err = WordDraft::from_value(json!(["apple"])).unwrap_err();
        assert_eq!(err, RecordError::NotAnObject("an array"));
    }

    #[test]
    fn test_record_serializes_flat() {
        let word = record("w1", json!({ "word": "apple", "timeStamp": 3 }));
        let value = serde_json::to_value(&word).unwrap();
        assert_eq!(value, json!({ "id": "w1", "word": "apple", "timeStamp": 3 }));

        let back: WordRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, word);
        assert!(!back.fields().contains_key(ID_FIELD));
    }

    #[test]
    fn test_record_drops_stored_id_field() {
        let word = record("real", json!({ "id": "stale", "word": "pear" }));
        assert_eq!(word.id().as_str(), "real");
        assert!(word.get("id").is_none());
    }

    #[test]
    fn test_sort_ascending_by_time_stamp() {
        let mut words = vec![
            record("c", json!({ "timeStamp": 30 })),
            record("a", json!({ "timeStamp": 10 })),
            record("b", json!({ "timeStamp": 20 })),
        ];
        sort_records(&mut words, LoadOrder::Ascending, TIME_STAMP_FIELD);
        let ids: Vec<&str> = words.iter().map(|w| w.id().as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_sort_descending_and_remote() {
        let original = vec![
            record("a", json!({ "timeStamp": 1 })),
            record("b", json!({ "timeStamp": 2 })),
        ];

        let mut words = original.clone();
        sort_records(&mut words, LoadOrder::Descending, TIME_STAMP_FIELD);
        assert_eq!(words[0].id().as_str(), "b");

        let mut words = original.clone();
        sort_records(&mut words, LoadOrder::Remote, TIME_STAMP_FIELD);
        assert_eq!(words, original);
    }

    #[test]
    fn test_sort_is_stable_for_missing_time_stamps() {
        let mut words = vec![
            record("x", json!({ "word": "no stamp" })),
            record("y", json!({ "timeStamp": 5 })),
            record("z", json!({ "word": "also no stamp" })),
        ];
        sort_records(&mut words, LoadOrder::Ascending, TIME_STAMP_FIELD);
        let ids: Vec<&str> = words.iter().map(|w| w.id().as_str()).collect();
        assert_eq!(ids, ["x", "z", "y"]);
    }

    #[test]
    fn test_compare_values_mixed_kinds() {
        assert_eq!(compare_values(None, Some(&json!(false))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(1.5)), Some(&json!(2))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(-3)), Some(&json!(u64::MAX))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(99)), Some(&json!("1"))), Ordering::Less);
        assert_eq!(
            compare_values(Some(&json!("2024-01-02")), Some(&json!("2024-01-01"))),
            Ordering::Greater
        );
        assert_eq!(compare_values(Some(&json!([1, 2])), Some(&json!([1, 2, 0]))), Ordering::Less);
    }
}
