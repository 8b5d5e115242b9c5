//! The settings-file JSON model and its atomic-write discipline.
//!
//! The sync and worktree-aggregate engines both mutate exactly one field,
//! `permissions.allow`, in an otherwise-preserved JSON document. Writes go
//! through a temp-file-validate-rename sequence with a `.bak` snapshot of
//! the previous contents.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("refusing to write invalid settings JSON")]
    Invalid,
}

/// Read a settings document, or an empty object if the file does not
/// exist yet.
pub fn read_or_default(path: &Path) -> Result<Value, SettingsError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Value::Object(Map::new())),
        Err(e) => Err(e.into()),
    }
}

/// Extract `permissions.allow` as a `Vec<String>`, or an empty vec if
/// absent or malformed.
pub fn get_allow(doc: &Value) -> Vec<String> {
    doc.get("permissions")
        .and_then(|p| p.get("allow"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Sort and deduplicate a rule collection. Byte-exact: no case-folding,
/// no whitespace normalization.
pub fn canonicalize_allow<I: IntoIterator<Item = String>>(rules: I) -> Vec<String> {
    rules.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Replace `permissions.allow` in `doc` with a canonicalized copy of
/// `rules`, creating the `permissions` object if absent. Every other key
/// in `doc` — including `hooks.PermissionRequest` — is left untouched.
pub fn set_allow(doc: &mut Value, rules: Vec<String>) {
    let canonical = canonicalize_allow(rules);
    let array = Value::Array(canonical.into_iter().map(Value::String).collect());

    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    let obj = doc.as_object_mut().expect("just ensured object");
    let permissions = obj
        .entry("permissions".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !permissions.is_object() {
        *permissions = Value::Object(Map::new());
    }
    permissions
        .as_object_mut()
        .expect("just ensured object")
        .insert("allow".to_string(), array);
}

/// A default `hooks.PermissionRequest` matcher block, for constructing a
/// fresh settings document when none exists yet.
pub fn default_permission_request_hook(command: &str) -> Value {
    serde_json::json!([
        {
            "matcher": "*",
            "hooks": [
                { "type": "command", "command": command }
            ]
        }
    ])
}

/// Write `doc` to `path` atomically: serialize canonically, write to a
/// sibling temp file, validate by re-parsing, back up any existing
/// contents to `<path>.bak`, then rename the temp file over the target.
/// On validation failure the target is left untouched and the temp file
/// is removed.
pub fn atomic_write(path: &Path, doc: &Value) -> Result<(), SettingsError> {
    let serialized = serde_json::to_string_pretty(doc)?;

    if serde_json::from_str::<Value>(&serialized).is_err() {
        return Err(SettingsError::Invalid);
    }

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let temp_path = temp_path_for(path);

    let write_result = std::fs::write(&temp_path, &serialized);
    if write_result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
        return Err(write_result.unwrap_err().into());
    }

    if serde_json::from_str::<Value>(&std::fs::read_to_string(&temp_path)?).is_err() {
        let _ = std::fs::remove_file(&temp_path);
        return Err(SettingsError::Invalid);
    }

    if path.exists() {
        let backup_path = backup_path_for(path);
        std::fs::copy(path, backup_path)?;
    }

    std::fs::rename(&temp_path, path)?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}
