//! JSON-in-text column codec.
//!
//! Some columns (the field tick map, survey configs) hold JSON serialized
//! into a text column. Writing is strict; reading has a lenient variant
//! that treats unreadable text as "no data".

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes `value` as compact JSON text.
///
/// Map keys come out in the iteration order of the source type, so callers
/// that need stable bytes should serialize a `BTreeMap`.
pub fn to_json_text<T: Serialize + ?Sized>(value: &T) -> CodecResult<String> {
    serde_json::to_string(value).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Parses JSON text into `T`.
///
/// # Errors
///
/// Returns `DecodingFailed` for malformed JSON and `InvalidStructure` when
/// the JSON is well formed but does not match `T`.
pub fn from_json_text<T: DeserializeOwned>(text: &str) -> CodecResult<T> {
    serde_json::from_str(text).map_err(|e| {
        if e.is_data() {
            CodecError::invalid_structure(e.to_string())
        } else {
            CodecError::decoding_failed(e.to_string())
        }
    })
}

/// Parses an optional JSON text column, falling back to `T::default()`.
///
/// Missing, empty and malformed columns all yield the default. Malformed
/// text is logged but never returned as an error.
pub fn parse_json_column<T: DeserializeOwned + Default>(column: &str, text: Option<&str>) -> T {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return T::default();
    };

    match from_json_text(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(column, error = %e, "unreadable JSON column, using empty value");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn btree_map_serializes_sorted() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), 2u64);
        map.insert("a".to_string(), 1u64);
        assert_eq!(to_json_text(&map).unwrap(), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn from_json_text_classifies_errors() {
        let malformed = from_json_text::<BTreeMap<String, u64>>("{not json");
        assert!(matches!(malformed, Err(CodecError::DecodingFailed { .. })));

        let wrong_shape = from_json_text::<BTreeMap<String, u64>>("[1,2]");
        assert!(matches!(wrong_shape, Err(CodecError::InvalidStructure { .. })));
    }

    #[test]
    fn parse_json_column_falls_back_to_default() {
        let empty: BTreeMap<String, u64> = parse_json_column("updatedAtByField", None);
        assert!(empty.is_empty());

        let blank: BTreeMap<String, u64> = parse_json_column("updatedAtByField", Some("  "));
        assert!(blank.is_empty());

        let broken: BTreeMap<String, u64> = parse_json_column("updatedAtByField", Some("{\"a\":"));
        assert!(broken.is_empty());

        let parsed: BTreeMap<String, u64> =
            parse_json_column("updatedAtByField", Some(r#"{"a":5}"#));
        assert_eq!(parsed.get("a"), Some(&5));
    }
}
