//! Canonical JSON rendering and SHA-256 digests for evidence artifacts.
//!
//! Byte-identical inputs must give byte-identical outputs, so every object is
//! re-keyed in sorted order regardless of how `serde_json` stores maps.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Converts any serializable value into a JSON tree with sorted object keys.
///
/// # Errors
/// Returns an error if the value cannot be represented as JSON.
pub fn canonical_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    Ok(sort_keys(serde_json::to_value(value)?))
}

/// Compact canonical JSON, used as hashing input.
///
/// # Errors
/// Returns an error if the value cannot be represented as JSON.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(&canonical_value(value)?)?)
}

/// Pretty canonical JSON with a trailing newline, used for evidence files.
///
/// # Errors
/// Returns an error if the value cannot be represented as JSON.
pub fn canonical_json_pretty<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut rendered = serde_json::to_string_pretty(&canonical_value(value)?)?;
    rendered.push('\n');
    Ok(rendered)
}

/// Lowercase hex SHA-256 of raw bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 of the compact canonical JSON form of `value`.
///
/// # Errors
/// Returns an error if the value cannot be represented as JSON.
pub fn digest_of<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(sha256_hex(canonical_json(value)?.as_bytes()))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Unsorted {
        zeta: u32,
        alpha: Vec<Inner>,
    }

    #[derive(Serialize)]
    struct Inner {
        y: bool,
        b: &'static str,
    }

    #[test]
    fn keys_are_sorted_at_every_depth() {
        let value = Unsorted {
            zeta: 1,
            alpha: vec![Inner { y: true, b: "x" }],
        };
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"alpha":[{"b":"x","y":true}],"zeta":1}"#
        );
    }

    #[test]
    fn pretty_form_ends_with_newline() {
        let rendered = canonical_json_pretty(&vec![1, 2]).unwrap();
        assert!(rendered.ends_with("]\n"));
    }

    #[test]
    fn sha256_of_known_input() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_is_stable_for_equal_values() {
        let a = digest_of(&Unsorted { zeta: 3, alpha: vec![] }).unwrap();
        let b = digest_of(&Unsorted { zeta: 3, alpha: vec![] }).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
