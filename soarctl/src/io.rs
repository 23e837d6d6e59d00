//! Input and output plumbing for the CLI.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;

/// Reads assets from `source` (`-` for stdin).
pub fn read_inputs(source: &str) -> Result<Vec<Value>> {
    let raw = if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read inputs from stdin")?;
        buf
    } else {
        fs::read_to_string(source).with_context(|| format!("failed to read inputs from {source}"))?
    };
    parse_inputs(&raw).with_context(|| format!("invalid inputs in {source}"))
}

/// A single JSON array, or a stream of JSON values (one per line or simply
/// concatenated).
pub fn parse_inputs(raw: &str) -> Result<Vec<Value>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return match serde_json::from_str::<Value>(trimmed)? {
            Value::Array(items) => Ok(items),
            other => bail!("expected a JSON array, found {other}"),
        };
    }
    serde_json::Deserializer::from_str(trimmed)
        .into_iter::<Value>()
        .map(|item| item.context("malformed JSON value"))
        .collect()
}

/// Pretty JSON to `path`, or stdout when `None`.
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: Option<&Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => fs::write(path, rendered + "\n")
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{rendered}")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arrays_and_json_lines_are_accepted() {
        let array = parse_inputs(r#"[{"a": 1}, {"b": 2}]"#).unwrap();
        let lines = parse_inputs("{\"a\": 1}\n\n{\"b\": 2}\n").unwrap();
        assert_eq!(array, vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(array, lines);
        assert!(parse_inputs("   ").unwrap().is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_inputs("{\"a\": ").is_err());
        assert!(parse_inputs("[1, 2").is_err());
    }
}
