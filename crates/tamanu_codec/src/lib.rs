//! # Tamanu Codec
//!
//! Column values and JSON text encoding for Tamanu sync metadata.
//!
//! This crate provides:
//! - [`Value`], the dynamic type every row column holds
//! - JSON-in-text helpers for columns that store serialized JSON
//!
//! ## Usage
//!
//! ```
//! use tamanu_codec::{parse_json_column, to_json_text, Value};
//! use std::collections::BTreeMap;
//!
//! let mut ticks = BTreeMap::new();
//! ticks.insert("reasonForEncounter".to_string(), 7u64);
//! let text = to_json_text(&ticks).unwrap();
//!
//! let back: BTreeMap<String, u64> = parse_json_column("updatedAtByField", Some(&text));
//! assert_eq!(back, ticks);
//!
//! // Unreadable text degrades to an empty map instead of failing.
//! let broken: BTreeMap<String, u64> = parse_json_column("updatedAtByField", Some("{"));
//! assert!(broken.is_empty());
//!
//! assert_eq!(Value::from("E1").as_text(), Some("E1"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod json;
mod value;

pub use error::{CodecError, CodecResult};
pub use json::{from_json_text, parse_json_column, to_json_text};
pub use value::Value;
