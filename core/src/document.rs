//! Document model shared by every store backend.
//!
//! A document is a JSON object addressed by a [`DocumentPath`]. Writes are
//! expressed as [`Fields`]: a map from field name to [`FieldValue`], where a
//! value is either a literal or one of the store-resolved sentinels
//! ([`FieldValue::Increment`], [`FieldValue::ServerTimestamp`]). Sentinels are
//! resolved at commit time against the latest committed document, which is
//! what makes increments commutative across concurrent transactions.
//!
//! Typed entities cross this boundary only through [`Document::decode`] and
//! [`Fields::from_serializable`], so a malformed record fails fast with
//! [`StoreError::Decode`] instead of leaking half-populated values upward.

use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Raw document contents.
pub type DocumentData = Map<String, Value>;

/// Address of a document: a collection path plus a document id.
///
/// Collections may be nested (`businesses/b1/codeReservations`), which lets a
/// backend scope access rules to one business namespace.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentPath {
    collection: String,
    id: String,
}

impl DocumentPath {
    /// Create a path from a collection and a document id.
    #[must_use]
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Collection path.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Document id within the collection.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document snapshot as read from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// Where the document lives.
    pub path: DocumentPath,
    /// Its contents at read time.
    pub data: DocumentData,
}

impl Document {
    /// Create a snapshot.
    #[must_use]
    pub const fn new(path: DocumentPath, data: DocumentData) -> Self {
        Self { path, data }
    }

    /// Decode the document into a typed record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the contents do not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|e| StoreError::Decode {
            path: self.path.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Value of one field in a write.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// Store this literal.
    Value(Value),
    /// Add this amount to the current integer value (missing counts as zero).
    Increment(i64),
    /// Replace with the commit time.
    ServerTimestamp,
    /// Remove the field.
    Delete,
}

/// A set of field writes, applied in field-name order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    /// An empty write.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a full-document write from a serializable record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] if `record` does not serialize to a JSON object.
    pub fn from_serializable<T: Serialize>(record: &T) -> Result<Self> {
        match serde_json::to_value(record)? {
            Value::Object(map) => Ok(Self(
                map.into_iter().map(|(k, v)| (k, FieldValue::Value(v))).collect(),
            )),
            other => Err(StoreError::Internal(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Set a literal value.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), FieldValue::Value(value.into()));
        self
    }

    /// Atomically add `by` to an integer field.
    #[must_use]
    pub fn increment(mut self, field: impl Into<String>, by: i64) -> Self {
        self.0.insert(field.into(), FieldValue::Increment(by));
        self
    }

    /// Set a field to the commit time.
    #[must_use]
    pub fn server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), FieldValue::ServerTimestamp);
        self
    }

    /// Remove a field.
    #[must_use]
    pub fn remove(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), FieldValue::Delete);
        self
    }

    /// Whether there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the field writes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Resolve the writes against `data` in place.
    ///
    /// Shared by every backend so sentinel semantics cannot drift between them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FailedPrecondition`] if an increment targets a
    /// non-integer field or overflows.
    pub fn apply_to(&self, data: &mut DocumentData, now: DateTime<Utc>) -> Result<()> {
        for (field, value) in &self.0 {
            match value {
                FieldValue::Value(v) => {
                    data.insert(field.clone(), v.clone());
                },
                FieldValue::Increment(by) => {
                    let current = match data.get(field) {
                        None | Some(Value::Null) => 0,
                        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
                            StoreError::FailedPrecondition(format!(
                                "field `{field}` is not an integer"
                            ))
                        })?,
                        Some(_) => {
                            return Err(StoreError::FailedPrecondition(format!(
                                "field `{field}` is not numeric"
                            )));
                        },
                    };
                    let next = current.checked_add(*by).ok_or_else(|| {
                        StoreError::FailedPrecondition(format!("field `{field}` overflowed"))
                    })?;
                    data.insert(field.clone(), Value::from(next));
                },
                FieldValue::ServerTimestamp => {
                    data.insert(field.clone(), serde_json::to_value(now)?);
                },
                FieldValue::Delete => {
                    data.remove(field);
                },
            }
        }
        Ok(())
    }
}

/// Equality filter on a top-level field.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    /// Field name.
    pub field: String,
    /// Value the field must equal.
    pub value: Value,
}

impl Filter {
    /// Whether `data` satisfies the filter.
    #[must_use]
    pub fn matches(&self, data: &DocumentData) -> bool {
        data.get(&self.field) == Some(&self.value)
    }
}

/// A collection query with equality filters (logical AND).
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    /// Collection to scan.
    pub collection: String,
    /// Filters every returned document satisfies.
    pub filters: Vec<Filter>,
}

impl Query {
    /// Query every document of a collection.
    #[must_use]
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
        }
    }

    /// Add an equality filter.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Whether `data` satisfies every filter.
    #[must_use]
    pub fn matches(&self, data: &DocumentData) -> bool {
        self.filters.iter().all(|f| f.matches(data))
    }

    /// The filters as a JSON object (for containment queries).
    #[must_use]
    pub fn filter_object(&self) -> Value {
        Value::Object(
            self.filters
                .iter()
                .map(|f| (f.field.clone(), f.value.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Counter {
        owner_id: String,
        count: i64,
    }

    #[test]
    fn increment_treats_missing_field_as_zero() {
        let mut data = DocumentData::new();
        Fields::new().increment("count", 3).apply_to(&mut data, now()).unwrap();
        Fields::new().increment("count", 2).apply_to(&mut data, now()).unwrap();
        assert_eq!(data.get("count"), Some(&json!(5)));
    }

    #[test]
    fn increment_rejects_non_numeric_fields() {
        let mut data = DocumentData::new();
        data.insert("count".into(), json!("three"));
        let err = Fields::new()
            .increment("count", 1)
            .apply_to(&mut data, now())
            .unwrap_err();
        assert!(matches!(err, StoreError::FailedPrecondition(_)));
    }

    #[test]
    fn server_timestamp_resolves_to_commit_time() {
        let mut data = DocumentData::new();
        Fields::new()
            .server_timestamp("at")
            .remove("gone")
            .apply_to(&mut data, now())
            .unwrap();
        let at: DateTime<Utc> = serde_json::from_value(data["at"].clone()).unwrap();
        assert_eq!(at, now());
        assert!(!data.contains_key("gone"));
    }

    #[test]
    fn decode_round_trips_through_fields() {
        let record = Counter {
            owner_id: "u1".into(),
            count: 4,
        };
        let mut data = DocumentData::new();
        Fields::from_serializable(&record)
            .unwrap()
            .apply_to(&mut data, now())
            .unwrap();
        let doc = Document::new(DocumentPath::new("counters", "c1"), data);
        assert_eq!(doc.decode::<Counter>().unwrap(), record);
    }

    #[test]
    fn decode_fails_fast_on_malformed_documents() {
        let mut data = DocumentData::new();
        data.insert("ownerId".into(), json!("u1"));
        let doc = Document::new(DocumentPath::new("counters", "c1"), data);
        let err = doc.decode::<Counter>().unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref path, .. } if path == "counters/c1"));
    }

    #[test]
    fn query_matches_all_filters() {
        let query = Query::collection("cards")
            .where_eq("customerId", "u1")
            .where_eq("rewardClaimed", false);
        let mut data = DocumentData::new();
        data.insert("customerId".into(), json!("u1"));
        data.insert("rewardClaimed".into(), json!(false));
        assert!(query.matches(&data));
        data.insert("rewardClaimed".into(), json!(true));
        assert!(!query.matches(&data));
        assert_eq!(
            query.filter_object(),
            json!({"customerId": "u1", "rewardClaimed": false})
        );
    }

    proptest::proptest! {
        #[test]
        fn increments_commute(mut deltas in proptest::collection::vec(-1000i64..1000, 0..20)) {
            let mut forward = DocumentData::new();
            for d in &deltas {
                Fields::new().increment("n", *d).apply_to(&mut forward, now()).unwrap();
            }
            deltas.reverse();
            let mut backward = DocumentData::new();
            for d in &deltas {
                Fields::new().increment("n", *d).apply_to(&mut backward, now()).unwrap();
            }
            let expected: i64 = deltas.iter().sum();
            proptest::prop_assert_eq!(forward.get("n").and_then(Value::as_i64).unwrap_or(0), expected);
            proptest::prop_assert_eq!(forward, backward);
        }
    }
}
