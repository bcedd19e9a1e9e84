//! Chat list loading
//!
//! Two formats are accepted, chosen by file extension:
//! - `.json`: an array of integers, or of objects whose `id` is an integer or
//!   a single-field wrapper around a decimal string (database exports write
//!   64-bit IDs as `{"$numberLong": "-1001551..."}`)
//! - `.txt`: one decimal integer per line, blank lines ignored

use crate::error::{Error, Result};
use crate::status::ChatId;

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum IdNode {
    Plain(ChatId),
    Record { id: IdValue },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdValue {
    Plain(ChatId),
    Wrapped(BTreeMap<String, String>),
}

/// Load chat IDs from `path`, in file order
pub fn load_chat_ids(path: impl AsRef<Path>) -> Result<Vec<ChatId>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let parse: fn(&str) -> std::result::Result<Vec<ChatId>, String> = match extension.as_deref() {
        Some("json") => parse_json,
        Some("txt") => parse_text,
        _ => {
            return Err(Error::input(
                path,
                "unsupported file type, expected .json or .txt",
            ))
        }
    };

    let data = std::fs::read_to_string(path).map_err(|e| Error::input(path, e.to_string()))?;
    parse(&data).map_err(|reason| Error::input(path, reason))
}

/// Parse a JSON array of IDs
pub fn parse_json(data: &str) -> std::result::Result<Vec<ChatId>, String> {
    let nodes: Vec<Value> =
        serde_json::from_str(strip_bom(data)).map_err(|e| format!("expected a JSON array: {}", e))?;

    nodes
        .into_iter()
        .enumerate()
        .map(|(index, node)| {
            let shown = node.to_string();
            let node: IdNode = serde_json::from_value(node)
                .map_err(|_| format!("element {} is not a chat ID: {}", index, shown))?;
            match node {
                IdNode::Plain(id) | IdNode::Record { id: IdValue::Plain(id) } => Ok(id),
                IdNode::Record {
                    id: IdValue::Wrapped(fields),
                } => unwrap_big_number(&fields)
                    .ok_or_else(|| format!("element {} has a malformed id: {}", index, shown)),
            }
        })
        .collect()
}

/// Drop a leading UTF-8 byte order mark
fn strip_bom(data: &str) -> &str {
    data.strip_prefix('\u{feff}').unwrap_or(data)
}

fn unwrap_big_number(fields: &BTreeMap<String, String>) -> Option<ChatId> {
    if fields.len() != 1 {
        return None;
    }
    fields.values().next()?.trim().parse().ok()
}

/// Parse newline-separated IDs
pub fn parse_text(data: &str) -> std::result::Result<Vec<ChatId>, String> {
    strip_bom(data)
        .lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(line_no, line)| {
            line.parse::<ChatId>()
                .map_err(|e| format!("line {}: {:?} is not a chat ID ({})", line_no, line, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_json_mixed_shapes() {
        let data = r#"[
            1,
            -1001551234567890,
            {"id": 42, "name": "ignored"},
            {"id": {"$numberLong": "-1001551234567891"}}
        ]"#;

        assert_eq!(
            parse_json(data).unwrap(),
            vec![1, -1001551234567890, 42, -1001551234567891]
        );
    }

    #[test]
    fn test_json_rejects_malformed() {
        assert!(parse_json(r#"{"id": 1}"#).is_err());
        assert!(parse_json(r#"["12"]"#).unwrap_err().contains("element 0"));
        assert!(parse_json(r#"[1, {"id": {"$numberLong": "abc"}}]"#)
            .unwrap_err()
            .contains("element 1"));
        assert!(parse_json(r#"[{"id": {"a": "1", "b": "2"}}]"#).is_err());
        assert!(parse_json(r#"[{"chat": 1}]"#).is_err());
    }

    #[test]
    fn test_text_skips_blank_lines() {
        let data = "1\n\n  -100123 \r\n\n3\n";
        assert_eq!(parse_text(data).unwrap(), vec![1, -100123, 3]);
    }

    #[test]
    fn test_leading_byte_order_mark_is_ignored() {
        assert_eq!(parse_text("\u{feff}123\n456\n").unwrap(), vec![123, 456]);
        assert_eq!(parse_json("\u{feff}[7, 8]").unwrap(), vec![7, 8]);

        let txt = write_temp(".txt", "\u{feff}-100200\r\n300\r\n");
        assert_eq!(load_chat_ids(txt.path()).unwrap(), vec![-100200, 300]);
    }

    #[test]
    fn test_text_reports_line_number() {
        let err = parse_text("1\n2\nthree\n").unwrap_err();
        assert!(err.starts_with("line 3:"), "{}", err);
    }

    #[test]
    fn test_load_by_extension() {
        let json = write_temp(".json", r#"[{"id": 5}, 6]"#);
        assert_eq!(load_chat_ids(json.path()).unwrap(), vec![5, 6]);

        let txt = write_temp(".TXT", "7\n8\n");
        assert_eq!(load_chat_ids(txt.path()).unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_load_rejects_unknown_extension_and_missing_file() {
        let csv = write_temp(".csv", "1,2,3");
        assert!(matches!(load_chat_ids(csv.path()), Err(Error::Input { .. })));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_chat_ids(dir.path().join("missing.txt")),
            Err(Error::Input { .. })
        ));
    }
}
