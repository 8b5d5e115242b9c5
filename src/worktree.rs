//! Worktree discovery and sibling rule-set reading.
//!
//! Shells out to `git worktree list --porcelain` and parses the resulting
//! blank-line-delimited record listing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use once_cell::sync::OnceCell;

/// One discovered worktree: its path, plus its `permissions.allow` rule
/// set loaded lazily and only once.
pub struct WorktreeInfo {
    pub path: PathBuf,
    allow: OnceCell<Vec<String>>,
}

impl WorktreeInfo {
    fn new(path: PathBuf) -> Self {
        WorktreeInfo {
            path,
            allow: OnceCell::new(),
        }
    }

    /// This worktree's `permissions.allow` array, read from
    /// `<path>/.claude/settings.local.json`. Missing or malformed
    /// settings files yield an empty set rather than an error: an
    /// unreadable sibling is skipped silently.
    pub fn allow_rules(&self) -> &[String] {
        self.allow.get_or_init(|| read_allow_rules(&self.path))
    }
}

fn read_allow_rules(worktree_path: &Path) -> Vec<String> {
    let settings_path = worktree_path.join(".claude").join("settings.local.json");
    let contents = match std::fs::read_to_string(&settings_path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    let value: serde_json::Value = match serde_json::from_str(&contents) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    value
        .get("permissions")
        .and_then(|p| p.get("allow"))
        .and_then(|a| a.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Run a git subcommand in `cwd` and return trimmed stdout, or `None` on
/// any failure (not a git repo, git not on PATH, non-zero exit).
fn run_git(cwd: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).current_dir(cwd).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

/// Fast guard: true iff there is at least one sibling worktree, without
/// paying for a full `git worktree list --porcelain` parse. Compares
/// git-dir and git-common-dir; if they differ, or if they're equal but a
/// non-empty `worktrees/` subdirectory exists under the common dir, there
/// may be siblings and the caller should do the full listing.
pub fn has_sibling_worktrees(cwd: &Path) -> bool {
    let git_dir = match run_git(cwd, &["rev-parse", "--git-dir"]) {
        Some(d) => d,
        None => return false,
    };
    let common_dir = match run_git(cwd, &["rev-parse", "--git-common-dir"]) {
        Some(d) => d,
        None => return false,
    };

    let git_dir_path = resolve_relative(cwd, &git_dir);
    let common_dir_path = resolve_relative(cwd, &common_dir);

    if git_dir_path == common_dir_path {
        let worktrees_dir = common_dir_path.join("worktrees");
        match std::fs::read_dir(&worktrees_dir) {
            Ok(mut entries) => entries.next().is_some(),
            Err(_) => false,
        }
    } else {
        true
    }
}

fn resolve_relative(cwd: &Path, maybe_relative: &str) -> PathBuf {
    let p = Path::new(maybe_relative);
    let joined = if p.is_absolute() {
        p.to_path_buf()
    } else {
        cwd.join(p)
    };
    joined.canonicalize().unwrap_or(joined)
}

/// List worktrees via `git worktree list --porcelain`, filtering out bare
/// repositories and paths that no longer exist on disk.
pub fn list_worktrees(cwd: &Path) -> Vec<WorktreeInfo> {
    let output = match run_git(cwd, &["worktree", "list", "--porcelain"]) {
        Some(o) => o,
        None => return Vec::new(),
    };

    parse_porcelain(&output)
        .into_iter()
        .filter(|(path, is_bare)| !is_bare && path.exists())
        .map(|(path, _)| WorktreeInfo::new(path))
        .collect()
}

/// Parse `git worktree list --porcelain` output into `(path, is_bare)`
/// pairs. Records are separated by blank lines; within a record, a
/// `worktree <path>` line starts it and a bare `bare` line flags it.
fn parse_porcelain(output: &str) -> Vec<(PathBuf, bool)> {
    let mut records = Vec::new();
    let mut current: Option<(PathBuf, bool)> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(rec) = current.take() {
                records.push(rec);
            }
            current = Some((PathBuf::from(path), false));
        } else if line == "bare" {
            if let Some((_, bare)) = current.as_mut() {
                *bare = true;
            }
        } else if line.trim().is_empty() {
            if let Some(rec) = current.take() {
                records.push(rec);
            }
        }
    }
    if let Some(rec) = current.take() {
        records.push(rec);
    }
    records
}

/// The union of `permissions.allow` across every sibling worktree,
/// deduplicated.
pub fn sibling_allow_union(cwd: &Path) -> HashSet<String> {
    list_worktrees(cwd)
        .iter()
        .flat_map(|w| w.allow_rules().to_vec())
        .collect()
}
