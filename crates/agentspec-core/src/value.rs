// SPDX-License-Identifier: MIT OR Apache-2.0
//! The tagged attribute value union and its canonical, content-addressable encoding.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A dynamically-typed attribute value.
///
/// Every domain struct (`Resource`, `RuntimeConfig`, expression environments)
/// converts to and from `Value` rather than modeling attributes as raw
/// `serde_json::Value`, so the canonical encoder has exactly one input shape
/// to dispatch on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// The nullary value. Distinct from an absent key.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// An ordered list; input order is preserved.
    List(Vec<Value>),
    /// A mapping. Insertion order is irrelevant — canonical encoding always
    /// sorts keys lexicographically, so a `BTreeMap` is the right shape here.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns `true` if this value is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow this value as a mapping, if it is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Mutably borrow this value as a mapping, if it is one.
    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow this value as a list, if it is one.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Borrow this value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// A short type tag used in `TypeMismatch` diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(a) => Value::List(a.iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect())
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from(&v)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(l) => serde_json::Value::Array(l.iter().map(serde_json::Value::from).collect()),
            Value::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), serde_json::Value::from(v))).collect(),
            ),
        }
    }
}

/// Encode a [`Value`] into its canonical byte form.
///
/// Rules:
/// - mapping keys are emitted in lexicographic (byte-wise) order;
/// - lists preserve input order;
/// - integers are written without a fractional part, floats use the
///   shortest round-trip decimal form;
/// - no incidental whitespace is ever emitted.
///
/// This is a hand-written recursive writer rather than a pass through
/// `serde_json::to_string`, so that ordering and number formatting are
/// properties of the type, not an accident of `serde_json::Map`'s storage.
#[must_use]
pub fn canonical(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Value::Float(f) => out.extend_from_slice(format_float(*f).as_bytes()),
        Value::String(s) => write_json_string(s, out),
        Value::List(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Map(map) => {
            out.push(b'{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_json_string(k, out);
                out.push(b':');
                write_canonical(v, out);
            }
            out.push(b'}');
        }
    }
}

/// Shortest round-trip decimal form for a float, matching IEEE-754 display
/// semantics used by `ryu`-style formatters: Rust's `f64::to_string` already
/// produces the shortest string that round-trips, so we only need to ensure
/// a fractional part is always present (canonical form distinguishes floats
/// from integers even at whole-number values, e.g. `1.0` not `1`).
fn format_float(f: f64) -> String {
    if f.is_nan() || f.is_infinite() {
        return "null".to_string();
    }
    let s = f.to_string();
    if s.contains('.') || s.contains('e') || s.contains('E') {
        s
    } else {
        format!("{s}.0")
    }
}

fn write_json_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

/// Compute the hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Compute a resource's content hash: `"sha256:" + hex(SHA-256(canonical(attrs)))`.
#[must_use]
pub fn hash_attributes(attrs: &Value) -> String {
    format!("sha256:{}", sha256_hex(&canonical(attrs)))
}

/// Render a value for human/string contexts: a bare string passes through
/// unquoted (so `respond "hi"` produces `hi`, not `"hi"`), everything else
/// falls back to its canonical JSON form.
#[must_use]
pub fn canonical_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => String::from_utf8(canonical(other)).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn canonical_sorts_keys_regardless_of_insertion_order() {
        let a = map(vec![("b", Value::Int(2)), ("a", Value::Int(1))]);
        let b = map(vec![("a", Value::Int(1)), ("b", Value::Int(2))]);
        assert_eq!(canonical(&a), canonical(&b));
        assert_eq!(canonical(&a), b"{\"a\":1,\"b\":2}");
    }

    #[test]
    fn canonical_preserves_list_order() {
        let v = Value::List(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(canonical(&v), b"[3,1,2]");
    }

    #[test]
    fn integers_have_no_fractional_part() {
        assert_eq!(canonical(&Value::Int(42)), b"42");
    }

    #[test]
    fn floats_always_show_a_fractional_part() {
        assert_eq!(canonical(&Value::Float(1.0)), b"1.0");
        assert_eq!(canonical(&Value::Float(1.5)), b"1.5");
    }

    #[test]
    fn null_and_booleans_are_nullary() {
        assert_eq!(canonical(&Value::Null), b"null");
        assert_eq!(canonical(&Value::Bool(true)), b"true");
        assert_eq!(canonical(&Value::Bool(false)), b"false");
    }

    #[test]
    fn strings_use_standard_json_escaping() {
        let v = Value::String("a\"b\\c\n".to_string());
        assert_eq!(canonical(&v), b"\"a\\\"b\\\\c\\n\"");
    }

    #[test]
    fn hash_is_pure_function_of_attributes() {
        let a = map(vec![("x", Value::Int(1))]);
        let b = map(vec![("x", Value::Int(1))]);
        assert_eq!(hash_attributes(&a), hash_attributes(&b));
        assert!(hash_attributes(&a).starts_with("sha256:"));
    }

    proptest::proptest! {
        #[test]
        fn canonical_is_insertion_order_invariant(
            keys in proptest::collection::vec("[a-z]{1,6}", 1..8)
        ) {
            use std::collections::BTreeSet;
            let unique: BTreeSet<_> = keys.into_iter().collect();
            let forward: BTreeMap<String, Value> =
                unique.iter().enumerate().map(|(i, k)| (k.clone(), Value::Int(i as i64))).collect();
            let mut reversed: BTreeMap<String, Value> = BTreeMap::new();
            for (k, v) in forward.iter().rev() {
                reversed.insert(k.clone(), v.clone());
            }
            prop_assert_eq!(canonical(&Value::Map(forward)), canonical(&Value::Map(reversed)));
        }
    }
}
