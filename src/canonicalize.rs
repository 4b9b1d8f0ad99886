//! JSON Canonicalization Scheme (JCS)
//!
//! RFC 8785 canonical form for certificate bodies: object members sorted by
//! UTF-16 code units, no insignificant whitespace, ECMAScript number
//! formatting. The same logical JSON always yields the same bytes, so the
//! digest over it is stable across runs and platforms.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

use crate::errors::{GateError, GateResult};

/// Canonicalize a JSON value according to RFC 8785
pub fn canonicalize_json(value: &Value) -> GateResult<String> {
    let mut output = String::new();
    serialize_value(value, &mut output)?;
    Ok(output)
}

/// Serialize `value` to JSON and canonicalize it
pub fn canonicalize<T: Serialize>(value: &T) -> GateResult<String> {
    let value = serde_json::to_value(value)
        .map_err(|e| GateError::serialization("canonical JSON encoding", e))?;
    canonicalize_json(&value)
}

/// Lowercase hex SHA-256 of arbitrary bytes
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("{:x}", Sha256::digest(bytes.as_ref()))
}

/// SHA-256 over the canonical form of `value`
pub fn canonical_digest<T: Serialize>(value: &T) -> GateResult<String> {
    Ok(sha256_hex(canonicalize(value)?))
}

fn serialize_value(value: &Value, output: &mut String) -> GateResult<()> {
    match value {
        Value::Object(map) => serialize_object(map, output)?,
        Value::Array(arr) => {
            output.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    output.push(',');
                }
                serialize_value(item, output)?;
            }
            output.push(']');
        }
        Value::String(s) => serialize_string(s, output),
        Value::Number(n) => serialize_number(n, output)?,
        Value::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
        Value::Null => output.push_str("null"),
    }
    Ok(())
}

fn serialize_object(map: &serde_json::Map<String, Value>, output: &mut String) -> GateResult<()> {
    output.push('{');

    // RFC 8785 orders members by UTF-16 code units, not by UTF-8 bytes.
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            output.push(',');
        }
        serialize_string(key, output);
        output.push(':');
        serialize_value(&map[*key], output)?;
    }

    output.push('}');
    Ok(())
}

fn serialize_string(s: &str, output: &mut String) {
    output.push('"');
    for ch in s.chars() {
        match ch {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\u{08}' => output.push_str("\\b"),
            '\u{0C}' => output.push_str("\\f"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            ch if (ch as u32) < 0x20 => {
                let _ = write!(output, "\\u{:04x}", ch as u32);
            }
            ch => output.push(ch),
        }
    }
    output.push('"');
}

/// ECMAScript `Number.prototype.toString()` formatting
fn serialize_number(num: &serde_json::Number, output: &mut String) -> GateResult<()> {
    if let Some(i) = num.as_i64() {
        let _ = write!(output, "{i}");
        return Ok(());
    }
    if let Some(u) = num.as_u64() {
        let _ = write!(output, "{u}");
        return Ok(());
    }
    let f = num
        .as_f64()
        .ok_or_else(|| GateError::metric("number is not representable as f64"))?;
    if !f.is_finite() {
        return Err(GateError::metric(format!("{f} cannot be canonicalized")));
    }

    if f == 0.0 {
        output.push('0');
    } else if (1e-6..1e21).contains(&f.abs()) {
        // Rust's shortest round-trip Display matches ECMAScript in this range.
        let _ = write!(output, "{f}");
    } else {
        let formatted = format!("{f:e}");
        match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => {
                let _ = write!(output, "{mantissa}e+{exp}");
            }
            _ => output.push_str(&formatted),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_key_sorting() {
        let input = json!({ "z": 1, "a": 2, "m": 3 });
        assert_eq!(canonicalize_json(&input).unwrap(), r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_nested_objects() {
        let input = json!({
            "outer": { "z": 1, "a": { "c": 3, "b": 2 } },
            "first": 1
        });
        assert_eq!(
            canonicalize_json(&input).unwrap(),
            r#"{"first":1,"outer":{"a":{"b":2,"c":3},"z":1}}"#
        );
    }

    #[test]
    fn test_arrays_preserve_order() {
        let input = json!({ "array": [3, 1, 2], "another": ["z", "a", "m"] });
        assert_eq!(
            canonicalize_json(&input).unwrap(),
            r#"{"another":["z","a","m"],"array":[3,1,2]}"#
        );
    }

    #[test]
    fn test_number_canonicalization() {
        let input = json!({
            "int": 42,
            "float": 2.866,
            "zero": 0.0,
            "whole": 5.0,
            "tiny": 1e-9,
            "huge": 1e21
        });
        assert_eq!(
            canonicalize_json(&input).unwrap(),
            r#"{"float":2.866,"huge":1e+21,"int":42,"tiny":1e-9,"whole":5,"zero":0}"#
        );
    }

    #[test]
    fn test_utf16_key_order() {
        // U+1D11E is a surrogate pair in UTF-16, so it sorts before U+FB01.
        let input = json!({ "\u{1D11E}": 1, "\u{FB01}": 2 });
        assert_eq!(
            canonicalize_json(&input).unwrap(),
            "{\"\u{1D11E}\":1,\"\u{FB01}\":2}"
        );
    }

    #[test]
    fn test_string_escaping() {
        let input = json!({
            "quotes": "He said \"Hello\"",
            "newline": "line1\nline2",
            "bell": "\u{7}"
        });
        assert_eq!(
            canonicalize_json(&input).unwrap(),
            r#"{"bell":"\u0007","newline":"line1\nline2","quotes":"He said \"Hello\""}"#
        );
    }

    #[test]
    fn test_digest_is_key_order_independent() {
        let a = json!({ "model": "gpt-4.1-mini", "h_star": 0.05 });
        let b = json!({ "h_star": 0.05, "model": "gpt-4.1-mini" });
        assert_eq!(canonical_digest(&a).unwrap(), canonical_digest(&b).unwrap());
        assert_eq!(canonical_digest(&a).unwrap().len(), 64);
    }
}
