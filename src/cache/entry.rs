//! Serialized query results.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{CacheError, CacheResult};

/// One cached query result: column names plus row values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl CacheEntry {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Single-column result holding one value per row.
    pub fn scalar_rows(column: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            columns: vec![column.into()],
            rows: values.into_iter().map(|value| vec![value]).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_bytes(&self) -> CacheResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(CacheError::serialization)
    }

    /// Decode a stored payload; partial or foreign payloads are rejected whole.
    pub fn from_bytes(raw: &[u8]) -> CacheResult<Self> {
        serde_json::from_slice(raw).map_err(CacheError::serialization)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_entry_is_distinct_from_missing() {
        let entry = CacheEntry::default();
        let decoded = CacheEntry::from_bytes(&entry.to_bytes().expect("encode")).expect("decode");
        assert!(decoded.is_empty());
        assert!(decoded.columns.is_empty());
    }

    #[test]
    fn scalar_rows_wraps_each_value() {
        let entry = CacheEntry::scalar_rows("row", [json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(entry.columns, vec!["row".to_string()]);
        assert_eq!(entry.rows.len(), 2);
        assert_eq!(entry.rows[1][0], json!({"id": 2}));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let entry = CacheEntry::scalar_rows("row", [json!("ticket")]);
        let bytes = entry.to_bytes().expect("encode");
        let err = CacheEntry::from_bytes(&bytes[..bytes.len() - 3]).expect_err("truncated");
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[test]
    fn foreign_payload_is_rejected() {
        let err = CacheEntry::from_bytes(b"{\"unexpected\":true}").expect_err("foreign");
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
