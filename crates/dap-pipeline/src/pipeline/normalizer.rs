//! Post-analysis record normalization.
//!
//! Model output arrives as loosely typed JSON. Designated fields are coerced
//! to integers where the value converts losslessly; everything else is kept
//! exactly as the model produced it. Coercion failures are never fatal.

use serde_json::Value;
use tracing::warn;

use crate::analyzer::{AnalysisFailure, AnalysisOutcome};
use crate::models::{FieldMap, OutputRecord};

/// Converts an analysis outcome into writable records.
///
/// `AnalysisError` is the only failing case. An empty result yields an
/// empty record set, which downstream stages treat as trivially written.
pub fn normalize(
    outcome: AnalysisOutcome,
    integer_fields: &[String],
) -> Result<Vec<OutputRecord>, AnalysisFailure> {
    match outcome {
        AnalysisOutcome::AnalysisError(failure) => Err(failure),
        AnalysisOutcome::EmptyResult => Ok(Vec::new()),
        AnalysisOutcome::SingleRecord(fields) => {
            Ok(vec![normalize_fields(fields, integer_fields)])
        }
        AnalysisOutcome::RecordList(items) => {
            let mut records = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Object(fields) => {
                        records.push(normalize_fields(fields, integer_fields));
                    }
                    other => warn!(item = %other, "Dropping non-object analysis item"),
                }
            }
            Ok(records)
        }
    }
}

fn normalize_fields(mut fields: FieldMap, integer_fields: &[String]) -> OutputRecord {
    for name in integer_fields {
        if let Some(value) = fields.get_mut(name) {
            match coerce_integer(value) {
                Some(coerced) => *value = coerced,
                None => warn!(
                    field = %name,
                    value = %value,
                    "Field did not coerce to an integer, keeping original value"
                ),
            }
        }
    }
    OutputRecord { fields }
}

/// Lossless integer conversion. Floats convert only when they carry no
/// fractional part; strings are trimmed and parsed as plain integers.
fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Some(value.clone())
            } else {
                n.as_f64().and_then(|f| {
                    if f.is_finite()
                        && f.fract() == 0.0
                        && f >= i64::MIN as f64
                        && f <= i64::MAX as f64
                    {
                        Some(Value::from(f as i64))
                    } else {
                        None
                    }
                })
            }
        }
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}
