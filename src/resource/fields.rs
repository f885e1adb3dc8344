//! Field extraction helpers
//!
//! Map CLI JSON payloads onto flat string columns. Missing values become
//! [`NOT_AVAILABLE`], nested values JSON text (see [`json_text`]), booleans
//! `True`/`False`.

use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use std::io;

/// Placeholder for values the source did not provide
pub const NOT_AVAILABLE: &str = "N/A";

/// Follow a dot-notation path (`a.b.0.c`); `None` for missing or null values
pub fn lookup<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = item;
    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(idx) if current.is_array() => current.get(idx)?,
            _ => current.get(part)?,
        };
    }
    (!current.is_null()).then_some(current)
}

/// Items of a list response (`[]` when the call produced nothing)
pub fn items(response: &Value) -> &[Value] {
    response.as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// Render a scalar for a CSV cell
pub fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => bool_label(*b).to_string(),
        Value::Null => NOT_AVAILABLE.to_string(),
        other => other.to_string(),
    }
}

/// Value at `path`, or `N/A`
pub fn text(item: &Value, path: &str) -> String {
    text_or(item, path, NOT_AVAILABLE)
}

pub fn text_or(item: &Value, path: &str, default: &str) -> String {
    lookup(item, path)
        .map(scalar)
        .unwrap_or_else(|| default.to_string())
}

/// Last URL segment of the string at `path`, or `N/A`
pub fn short_text(item: &Value, path: &str) -> String {
    lookup(item, path)
        .and_then(Value::as_str)
        .map(|s| short_name(s).to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// String field that must be present for the resource to be usable
pub fn required_str<'a>(item: &'a Value, path: &str) -> Result<&'a str> {
    lookup(item, path)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing field '{}'", path))
}

/// Extract short name from GCP resource URL
/// e.g., "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a" -> "us-central1-a"
pub fn short_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Segment `from_end` positions before the last one (0 = last)
///
/// `url_segment(".../zones/us-central1-a/disks/boot", 2)` is `us-central1-a`.
pub fn url_segment(url: &str, from_end: usize) -> Option<&str> {
    url.rsplit('/').nth(from_end).filter(|s| !s.is_empty())
}

pub fn bool_label(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Boolean at `path` as `True`/`False`; missing is `False`
pub fn flag(item: &Value, path: &str) -> String {
    let value = lookup(item, path).and_then(Value::as_bool).unwrap_or(false);
    bool_label(value).to_string()
}

/// JSON writer for cell text: `", "` and `": "` separators, non-ASCII
/// characters as lowercase `\uXXXX` escapes
struct CellFormatter;

impl Formatter for CellFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        if fragment.bytes().all(|b| b.is_ascii() && b != 0x7f) {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() && c != '\x7f' {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// JSON text of a value, keys in source order
pub fn json_text(value: &Value) -> String {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, CellFormatter);
    if value.serialize(&mut serializer).is_err() {
        return value.to_string();
    }
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// JSON text of the value at `path`, or `default` when absent
pub fn json_or(item: &Value, path: &str, default: &str) -> String {
    lookup(item, path)
        .map(json_text)
        .unwrap_or_else(|| default.to_string())
}

pub fn json_array(item: &Value, path: &str) -> String {
    json_or(item, path, "[]")
}

pub fn json_object(item: &Value, path: &str) -> String {
    json_or(item, path, "{}")
}

/// Length of the list at `path` (0 when absent)
pub fn count(item: &Value, path: &str) -> usize {
    lookup(item, path)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

/// Integer at `path`, accepting JSON numbers and numeric strings
/// (the APIs return int64 fields such as `sizeGb` as strings)
pub fn integer(item: &Value, path: &str) -> Option<i64> {
    match lookup(item, path)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Float rendering that always keeps a fractional part: `4.0`, `3.75`
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// Number rendering without a trailing `.0` for whole values: `8`, `7.5`
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_paths() {
        let item = json!({
            "networkInterfaces": [{"networkIP": "10.0.0.2", "accessConfigs": [{"natIP": "34.1.2.3"}]}],
            "description": null
        });
        assert_eq!(text(&item, "networkInterfaces.0.networkIP"), "10.0.0.2");
        assert_eq!(
            text(&item, "networkInterfaces.0.accessConfigs.0.natIP"),
            "34.1.2.3"
        );
        assert_eq!(text(&item, "networkInterfaces.1.networkIP"), "N/A");
        assert_eq!(text(&item, "description"), "N/A");
    }

    #[test]
    fn test_scalar_rendering() {
        let item = json!({"mtu": 1460, "auto": true, "name": "default"});
        assert_eq!(text(&item, "mtu"), "1460");
        assert_eq!(text(&item, "auto"), "True");
        assert_eq!(text(&item, "name"), "default");
    }

    #[test]
    fn test_short_name_and_segments() {
        let url = "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/disks/boot-1";
        assert_eq!(short_name(url), "boot-1");
        assert_eq!(url_segment(url, 2), Some("us-central1-a"));
        assert_eq!(url_segment("disk", 2), None);
        assert_eq!(short_name("plain"), "plain");
    }

    #[test]
    fn test_flag_and_json_defaults() {
        let item = json!({"versioning": {"enabled": true}, "labels": {"env": "prod"}});
        assert_eq!(flag(&item, "versioning.enabled"), "True");
        assert_eq!(flag(&item, "uniformBucketLevelAccess.enabled"), "False");
        assert_eq!(json_object(&item, "labels"), r#"{"env": "prod"}"#);
        assert_eq!(json_object(&item, "website"), "{}");
        assert_eq!(json_array(&item, "sourceRanges"), "[]");
    }

    #[test]
    fn test_json_text_layout() {
        let value = json!({"zone": "us-east1-b", "env": "prod", "ports": ["22", "443"], "nested": {}});
        assert_eq!(
            json_text(&value),
            r#"{"zone": "us-east1-b", "env": "prod", "ports": ["22", "443"], "nested": {}}"#
        );
        assert_eq!(json_text(&json!([])), "[]");
        assert_eq!(json_text(&json!(["caf\u{e9}", "\u{1f680}", "a\"b"])), r#"["caf\u00e9", "\ud83d\ude80", "a\"b"]"#);
        assert_eq!(json_text(&json!({"n": 1.0, "m": 2})), r#"{"n": 1.0, "m": 2}"#);
    }

    #[test]
    fn test_required_str() {
        let item = json!({"name": "vm-1"});
        assert_eq!(required_str(&item, "name").unwrap(), "vm-1");
        assert!(required_str(&item, "zone").is_err());
    }

    #[test]
    fn test_integer_accepts_numeric_strings() {
        let item = json!({"sizeGb": "100", "guestCpus": 4, "bad": "x"});
        assert_eq!(integer(&item, "sizeGb"), Some(100));
        assert_eq!(integer(&item, "guestCpus"), Some(4));
        assert_eq!(integer(&item, "bad"), None);
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_float(round_to(4096.0 / 1024.0, 2)), "4.0");
        assert_eq!(format_float(round_to(3840.0 / 1024.0, 2)), "3.75");
        assert_eq!(format_number(8.0), "8");
        assert_eq!(format_number(7.5), "7.5");
        assert_eq!(format_number(0.0), "0");
    }
}
