//! Rule harvesting and refinement, shared by the sync and worktree-
//! aggregate engines.

use std::collections::BTreeSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{is_blocklisted_binary, ALT_RULE_PREFIXES, SAFE_SUBCOMMANDS};

static BASH_RULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Bash\(([^ )]+)(?: ([^)]+))? \*\)$").expect("valid bash-rule regex"));

/// True if `rule` matches the canonical rule shape grammar: `Bash(...)`
/// or bare `Bash`, bare `Read`/`Write`/`Edit`/`MultiEdit`, `WebFetch`
/// optionally parenthesized, or any `mcp__*` tool name.
pub fn matches_rule_shape(rule: &str) -> bool {
    if rule == "Bash" || BASH_RULE_RE.is_match(rule) {
        return true;
    }
    if matches!(rule, "Read" | "Write" | "Edit" | "MultiEdit") {
        return true;
    }
    if rule == "WebFetch" || (rule.starts_with("WebFetch(") && rule.ends_with(')')) {
        return true;
    }
    rule.starts_with("mcp__")
}

/// True if `rule` is a `Bash(<binary> ...)` rule whose binary is
/// blocklisted.
fn bash_rule_binary_blocklisted(rule: &str) -> bool {
    BASH_RULE_RE
        .captures(rule)
        .and_then(|caps| caps.get(1))
        .is_some_and(|b| is_blocklisted_binary(b.as_str()))
}

/// One harvested `(rule, cwd)` pair read from a log line.
pub struct HarvestedRecord {
    pub rule: String,
    pub cwd: String,
}

/// Parse every structurally valid line in `contents` into its `rule` and
/// `cwd` fields. Malformed lines and records missing `rule` are skipped
/// silently, tolerating a partially-written last line.
pub fn parse_log_records(contents: &str) -> Vec<HarvestedRecord> {
    contents
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .filter_map(|v| {
            let rule = v.get("rule")?.as_str()?.to_string();
            let cwd = v.get("cwd").and_then(|c| c.as_str()).unwrap_or("").to_string();
            Some(HarvestedRecord { rule, cwd })
        })
        .collect()
}

/// Harvest rules from a JSONL log file: extract `rule` from every record,
/// filter to the shape grammar, reject `Bash(<binary> ...)` rules whose
/// binary is blocklisted, and deduplicate. A missing or unreadable log
/// file yields an empty set rather than an error.
pub fn harvest_from_log(path: &Path, cwd_prefix: Option<&Path>) -> BTreeSet<String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return BTreeSet::new(),
    };
    parse_log_records(&contents)
        .into_iter()
        .filter(|r| match cwd_prefix {
            Some(prefix) => Path::new(&r.cwd).starts_with(prefix),
            None => true,
        })
        .map(|r| r.rule)
        .filter(|rule| matches_rule_shape(rule) && !bash_rule_binary_blocklisted(rule))
        .collect()
}

/// Union several `permissions.allow` arrays (from sibling settings files)
/// into one deduplicated set.
pub fn union_rule_sets<I: IntoIterator<Item = Vec<String>>>(sets: I) -> BTreeSet<String> {
    sets.into_iter().flatten().collect()
}

/// If `rule` is exactly `Bash(<binary> *)` with no subcommand, return
/// `<binary>`.
fn bare_binary_rule(rule: &str) -> Option<&str> {
    let inner = rule.strip_prefix("Bash(")?.strip_suffix(" *)")?;
    if inner.contains(' ') {
        None
    } else {
        Some(inner)
    }
}

/// Replace each broad `Bash(<binary> *)` in `rules` — where `<binary>` has
/// a curated safe-subcommand list — with `Bash(<binary> <sub> *)` for
/// every safe `<sub>`, plus `Bash(<binary> <prefix> * <sub> *)` for every
/// `alt_rule_prefixes` entry. Rules that aren't a bare tracked-binary form
/// (including anything already subcommand-scoped, or carrying an
/// indirection chain) pass through unchanged — those require human
/// opt-in.
pub fn refine(rules: &BTreeSet<String>) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for rule in rules {
        match bare_binary_rule(rule).and_then(|b| SAFE_SUBCOMMANDS.get(b).map(|s| (b, s))) {
            Some((binary, safe_subs)) => {
                for sub in safe_subs {
                    out.insert(format!("Bash({} {} *)", binary, sub));
                    if let Some(prefixes) = ALT_RULE_PREFIXES.get(binary) {
                        for prefix in prefixes {
                            out.insert(format!("Bash({} {} * {} *)", binary, prefix, sub));
                        }
                    }
                }
            }
            None => {
                out.insert(rule.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_rule_shape_covers_all_forms() {
        assert!(matches_rule_shape("Bash"));
        assert!(matches_rule_shape("Bash(git status *)"));
        assert!(matches_rule_shape("Bash(git *)"));
        assert!(matches_rule_shape("Read"));
        assert!(matches_rule_shape("WebFetch"));
        assert!(matches_rule_shape("WebFetch(domain:example.com)"));
        assert!(matches_rule_shape("mcp__github__search"));
        assert!(!matches_rule_shape("bogus"));
        assert!(!matches_rule_shape(""));
    }

    #[test]
    fn bash_rule_binary_blocklisted_rejects_blocklisted() {
        assert!(bash_rule_binary_blocklisted("Bash(bash *)"));
        assert!(bash_rule_binary_blocklisted("Bash(python3 -c *)"));
        assert!(!bash_rule_binary_blocklisted("Bash(git status *)"));
    }

    #[test]
    fn harvest_from_log_filters_shape_and_blocklist_and_dedups() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(
            &path,
            concat!(
                "{\"rule\":\"Bash(git status *)\",\"cwd\":\"/a\"}\n",
                "{\"rule\":\"Bash(git status *)\",\"cwd\":\"/a\"}\n",
                "{\"rule\":\"Bash(bash *)\",\"cwd\":\"/a\"}\n",
                "{\"rule\":\"bogus\",\"cwd\":\"/a\"}\n",
                "not json\n",
            ),
        )
        .unwrap();

        let harvested = harvest_from_log(&path, None);
        assert_eq!(harvested.len(), 1);
        assert!(harvested.contains("Bash(git status *)"));
    }

    #[test]
    fn harvest_from_log_filters_by_cwd_prefix() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(
            &path,
            concat!(
                "{\"rule\":\"Bash(git status *)\",\"cwd\":\"/repo/a\"}\n",
                "{\"rule\":\"Bash(git log *)\",\"cwd\":\"/repo/b\"}\n",
            ),
        )
        .unwrap();

        let harvested = harvest_from_log(&path, Some(Path::new("/repo/a")));
        assert_eq!(harvested.len(), 1);
        assert!(harvested.contains("Bash(git status *)"));
    }

    #[test]
    fn missing_log_file_harvests_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing.jsonl");
        assert!(harvest_from_log(&path, None).is_empty());
    }

    #[test]
    fn refine_expands_broad_git_rule_and_drops_it() {
        let mut rules = BTreeSet::new();
        rules.insert("Bash(git *)".to_string());
        let refined = refine(&rules);

        assert!(!refined.contains("Bash(git *)"));
        assert!(refined.contains("Bash(git status *)"));
        assert!(refined.contains("Bash(git log *)"));
        assert!(refined.contains("Bash(git diff *)"));
        assert!(refined.contains("Bash(git -C * status *)"));
    }

    #[test]
    fn refine_leaves_untracked_and_scoped_rules_unchanged() {
        let mut rules = BTreeSet::new();
        rules.insert("Bash(curl *)".to_string());
        rules.insert("Bash(git status *)".to_string());
        rules.insert("Read".to_string());
        let refined = refine(&rules);

        assert!(refined.contains("Bash(curl *)"));
        assert!(refined.contains("Bash(git status *)"));
        assert!(refined.contains("Read"));
    }

    #[test]
    fn union_rule_sets_dedups_across_sets() {
        let a = vec!["Bash(git status *)".to_string(), "Read".to_string()];
        let b = vec!["Read".to_string(), "Bash(git log *)".to_string()];
        let union = union_rule_sets([a, b]);
        assert_eq!(union.len(), 3);
    }
}
