//! The append-only approval log: one JSON object per line.
//!
//! Appends are serialized with `fs2` advisory locking around an
//! append-mode file handle. Records are never rewritten or compacted in
//! place.

use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::ClassificationResult;

/// One append-only log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub tool: String,
    pub rule: String,
    pub base_command: String,
    pub indirection_chain: String,
    /// Literal `"true"`/`"false"`, not a JSON bool.
    pub is_safe: String,
    pub cwd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_rule: Option<String>,
}

impl LogRecord {
    /// Build a record from a classification outcome plus the invocation
    /// context that doesn't belong to the classifier.
    pub fn new(
        timestamp: String,
        tool: &str,
        result: &ClassificationResult,
        cwd: &str,
        session_id: Option<String>,
        exact_rule: Option<String>,
    ) -> Self {
        LogRecord {
            timestamp,
            tool: tool.to_string(),
            rule: result.rule.to_string(),
            base_command: result.base_command.clone(),
            indirection_chain: result.chain.join(" "),
            is_safe: if result.is_safe { "true" } else { "false" }.to_string(),
            cwd: cwd.to_string(),
            session_id,
            exact_rule,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("log I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Resolve the log path: `$CLAUDE_PERMISSION_LOG` if set, else
/// `<home>/.claude/permission-approvals.jsonl`.
pub fn default_log_path() -> PathBuf {
    if let Ok(path) = std::env::var("CLAUDE_PERMISSION_LOG") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("permission-approvals.jsonl")
}

/// Append one record as a single `\n`-terminated JSON line.
///
/// Records are designed to stay well under a kilobyte so the single
/// `write_all` call lands inside the platform's atomic-write window even
/// when another process is appending concurrently; the exclusive lock is
/// an extra guarantee, not the only one.
pub fn append(path: &Path, record: &LogRecord) -> Result<(), LogError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;
    let result = (&file).write_all(line.as_bytes());
    let _ = file.unlock();
    result?;
    Ok(())
}

/// True if the log at `path` contains a prior record whose `rule` field
/// equals `rule`, compared structurally (parsed JSON, not substring
/// search). Structurally invalid lines are skipped silently; a missing
/// file is treated as "no match" rather than an error.
pub fn contains_rule(path: &Path, rule: &str) -> bool {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    if file.lock_shared().is_err() {
        return false;
    }
    let reader = BufReader::new(&file);
    let found = reader.lines().map_while(Result::ok).any(|line| {
        serde_json::from_str::<serde_json::Value>(&line)
            .ok()
            .and_then(|v| v.get("rule").and_then(|r| r.as_str()).map(|s| s == rule))
            .unwrap_or(false)
    });
    let _ = file.unlock();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify, Rule};
    use tempfile::TempDir;

    fn sample_record(rule: &str) -> LogRecord {
        LogRecord {
            timestamp: "2026-07-27T00:00:00Z".to_string(),
            tool: "Bash".to_string(),
            rule: rule.to_string(),
            base_command: "git status".to_string(),
            indirection_chain: String::new(),
            is_safe: "true".to_string(),
            cwd: "/tmp".to_string(),
            session_id: None,
            exact_rule: None,
        }
    }

    #[test]
    fn append_then_contains_rule_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        append(&path, &sample_record("Bash(git status *)")).unwrap();
        append(&path, &sample_record("Bash(git log *)")).unwrap();

        assert!(contains_rule(&path, "Bash(git status *)"));
        assert!(contains_rule(&path, "Bash(git log *)"));
        assert!(!contains_rule(&path, "Bash(git push *)"));
    }

    #[test]
    fn missing_log_file_is_no_match_not_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.jsonl");
        assert!(!contains_rule(&path, "Bash(git status *)"));
    }

    #[test]
    fn structurally_invalid_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(&path, "not json\n{\"rule\":\"Bash(git status *)\"}\n").unwrap();
        assert!(contains_rule(&path, "Bash(git status *)"));
    }

    #[test]
    fn record_serializes_is_safe_as_string_not_bool() {
        let record = sample_record("Bash(git status *)");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"is_safe\":\"true\""));
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let record = sample_record("Bash(git status *)");
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("session_id"));
        assert!(!json.contains("exact_rule"));
    }

    #[test]
    fn new_from_classification_result_uses_chain_string() {
        let result = classify("Bash", &serde_json::json!({ "command": "sudo git push" }));
        assert_eq!(result.rule, Rule::BashBinary { binary: "git".to_string() });
        let record = LogRecord::new(
            "2026-07-27T00:00:00Z".to_string(),
            "Bash",
            &result,
            "/tmp",
            None,
            Some("sudo git push".to_string()),
        );
        assert_eq!(record.indirection_chain, "sudo");
        assert_eq!(record.exact_rule.as_deref(), Some("sudo git push"));
    }
}
