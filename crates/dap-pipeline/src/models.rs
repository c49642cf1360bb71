//! Record and batch types
//!
//! Field maps keep their source ordering (serde_json is built with
//! preserve_order), so serialized batches read the way the table does.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Ordered field name -> value mapping
pub type FieldMap = Map<String, Value>;

/// One row fetched from the source table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputRecord {
    pub fields: FieldMap,
}

impl InputRecord {
    pub fn new(fields: FieldMap) -> Self {
        Self { fields }
    }

    /// Value of the identifier field, if the record carries one.
    ///
    /// Null and empty-string values count as missing.
    pub fn identifier(&self, field: &str) -> Option<&Value> {
        match self.fields.get(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(value) => Some(value),
        }
    }
}

/// One normalized record ready for the sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputRecord {
    pub fields: FieldMap,
}

impl OutputRecord {
    pub fn new(fields: FieldMap) -> Self {
        Self { fields }
    }
}

/// A contiguous slice of deduplicated records
#[derive(Debug, Clone)]
pub struct Batch {
    /// 1-based position in the run
    pub index: usize,
    /// Total number of batches in the run
    pub total: usize,
    pub records: Vec<InputRecord>,
}

/// Drop records without an identifier and collapse duplicates.
///
/// The first occurrence of each identifier wins and input order is kept.
/// A missing identifier is logged; later duplicates are skipped quietly.
pub fn dedup_records(records: Vec<InputRecord>, identifier_field: &str) -> Vec<InputRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::with_capacity(records.len());

    for (position, record) in records.into_iter().enumerate() {
        let Some(id) = record.identifier(identifier_field) else {
            warn!(
                position = position,
                field = %identifier_field,
                "Record has no identifier, dropping"
            );
            continue;
        };

        // JSON text of the value, so number 5 and string "5" stay distinct
        let key = id.to_string();
        if seen.insert(key) {
            unique.push(record);
        } else {
            debug!(position = position, id = %id, "Skipping duplicate record");
        }
    }

    unique
}

/// Partition records into contiguous batches of at most `batch_size`.
///
/// Every record lands in exactly one batch and order is preserved; the last
/// batch may be short. `batch_size` must be at least 1 (validated at
/// configuration time).
pub fn partition_batches(records: Vec<InputRecord>, batch_size: usize) -> Vec<Batch> {
    if records.is_empty() {
        return Vec::new();
    }

    let total = records.len().div_ceil(batch_size);

    records
        .chunks(batch_size)
        .enumerate()
        .map(|(i, chunk)| Batch {
            index: i + 1,
            total,
            records: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> InputRecord {
        let mut fields = FieldMap::new();
        for (k, v) in pairs {
            fields.insert(k.to_string(), v.clone());
        }
        InputRecord::new(fields)
    }

    #[test]
    fn test_identifier_missing_and_empty() {
        let r = record(&[("round5", json!("text"))]);
        assert!(r.identifier("编号").is_none());

        let r = record(&[("编号", Value::Null)]);
        assert!(r.identifier("编号").is_none());

        let r = record(&[("编号", json!("  "))]);
        assert!(r.identifier("编号").is_none());

        let r = record(&[("编号", json!(0))]);
        assert_eq!(r.identifier("编号"), Some(&json!(0)));
    }

    #[test]
    fn test_dedup_first_occurrence_wins() {
        let records = vec![
            record(&[("编号", json!(1)), ("round5", json!("a"))]),
            record(&[("编号", json!(2)), ("round5", json!("b"))]),
            record(&[("编号", json!(1)), ("round5", json!("changed"))]),
            record(&[("编号", json!(3)), ("round5", json!("c"))]),
        ];

        let unique = dedup_records(records, "编号");
        assert_eq!(unique.len(), 3);
        assert_eq!(unique[0].fields["round5"], json!("a"));
        assert_eq!(unique[1].fields["编号"], json!(2));
        assert_eq!(unique[2].fields["编号"], json!(3));
    }

    #[test]
    fn test_dedup_drops_missing_identifier() {
        let records = vec![
            record(&[("round5", json!("no id"))]),
            record(&[("编号", json!(7))]),
        ];

        let unique = dedup_records(records, "编号");
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].fields["编号"], json!(7));
    }

    #[test]
    fn test_dedup_number_and_string_ids_are_distinct() {
        let records = vec![
            record(&[("编号", json!(5))]),
            record(&[("编号", json!("5"))]),
        ];

        let unique = dedup_records(records, "编号");
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn test_partition_exact_cover() {
        let records: Vec<InputRecord> =
            (1..=5).map(|i| record(&[("编号", json!(i))])).collect();

        let batches = partition_batches(records, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].index, 1);
        assert_eq!(batches[0].total, 3);
        assert_eq!(batches[0].records.len(), 2);
        assert_eq!(batches[1].records.len(), 2);
        assert_eq!(batches[2].records.len(), 1);

        // Order preserved end to end
        let flattened: Vec<i64> = batches
            .iter()
            .flat_map(|b| b.records.iter())
            .map(|r| r.fields["编号"].as_i64().unwrap())
            .collect();
        assert_eq!(flattened, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_partition_single_batch() {
        let records: Vec<InputRecord> =
            (1..=2).map(|i| record(&[("编号", json!(i))])).collect();

        let batches = partition_batches(records, 10);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].index, 1);
        assert_eq!(batches[0].total, 1);
        assert_eq!(batches[0].records.len(), 2);
    }

    #[test]
    fn test_partition_empty() {
        assert!(partition_batches(Vec::new(), 2).is_empty());
    }
}
