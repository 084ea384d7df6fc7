// SPDX-License-Identifier: MIT OR Apache-2.0

//! Legacy canonical JSON encoding.
//!
//! Classic feeds are signed over the output of a particular legacy
//! serializer: the message value pretty-printed with two-space indentation
//! in preserved key order. Message ids are then computed over the legacy
//! runtime's *internal* string representation of that output rather than
//! its UTF-8 bytes. Both transforms have to be byte-exact or signatures
//! and ids of existing feeds stop validating.

use serde_json::Value;
use thiserror::Error;

/// Pretty-print raw JSON bytes in preserved key order with two-space
/// indentation, byte-compatible with the legacy serializer.
pub fn encode_preserve_order(raw: &[u8]) -> Result<Vec<u8>, CanonicalError> {
    let value: Value = serde_json::from_slice(raw)?;
    let mut out = Vec::with_capacity(raw.len() + raw.len() / 2);
    write_value(&mut out, &value, 0);
    Ok(out)
}

/// Pretty-print an already-parsed JSON value, as [`encode_preserve_order`]
/// does for raw bytes.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value, 0);
    out
}

/// The low byte of every UTF-16 code unit of `input`.
///
/// This is the internal one-byte string form the legacy runtime feeds into
/// SHA-256 when computing message ids.
pub fn internal_v8_bytes(input: &str) -> Vec<u8> {
    input.encode_utf16().map(|unit| (unit & 0xff) as u8).collect()
}

fn write_value(out: &mut Vec<u8>, value: &Value, depth: usize) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(number) => out.extend_from_slice(number.to_string().as_bytes()),
        Value::String(string) => write_string(out, string),
        Value::Array(items) => {
            if items.is_empty() {
                out.extend_from_slice(b"[]");
                return;
            }
            out.extend_from_slice(b"[\n");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.extend_from_slice(b",\n");
                }
                write_indent(out, depth + 1);
                write_value(out, item, depth + 1);
            }
            out.push(b'\n');
            write_indent(out, depth);
            out.push(b']');
        }
        Value::Object(members) => {
            if members.is_empty() {
                out.extend_from_slice(b"{}");
                return;
            }
            out.extend_from_slice(b"{\n");
            for (i, (key, member)) in members.iter().enumerate() {
                if i > 0 {
                    out.extend_from_slice(b",\n");
                }
                write_indent(out, depth + 1);
                write_string(out, key);
                out.extend_from_slice(b": ");
                write_value(out, member, depth + 1);
            }
            out.push(b'\n');
            write_indent(out, depth);
            out.push(b'}');
        }
    }
}

fn write_indent(out: &mut Vec<u8>, depth: usize) {
    for _ in 0..depth {
        out.extend_from_slice(b"  ");
    }
}

// String escaping rules of the legacy serializer: the two JSON structural
// escapes, the five short control escapes, and lowercase \u00xx for the
// remaining control characters. Everything else passes through as UTF-8.
fn write_string(out: &mut Vec<u8>, string: &str) {
    out.push(b'"');
    for ch in string.chars() {
        match ch {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{08}' => out.extend_from_slice(b"\\b"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\u{0c}' => out.extend_from_slice(b"\\f"),
            '\r' => out.extend_from_slice(b"\\r"),
            ch if (ch as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", ch as u32).as_bytes());
            }
            ch => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

#[derive(Error, Debug)]
pub enum CanonicalError {
    #[error("input is not well-formed JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
