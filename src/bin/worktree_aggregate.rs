//! `worktree-aggregate` — merges permission rules across sibling git
//! worktrees of one repository.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use permission_hook::log;
use permission_hook::rules;
use permission_hook::settings::{self, SettingsError};
use permission_hook::worktree::{self, WorktreeInfo};

#[derive(Parser)]
#[command(name = "worktree-aggregate")]
#[command(about = "Merge permission rules across sibling git worktrees")]
#[command(version)]
struct Cli {
    /// Show the merged rule set without writing anywhere (default).
    #[arg(long)]
    preview: bool,

    /// Write the merged rule set into the current worktree's settings.
    #[arg(long)]
    apply: bool,

    /// Write the merged rule set into every worktree's settings.
    #[arg(long)]
    apply_all: bool,

    /// Print one line per worktree with its own rule count.
    #[arg(long)]
    report: bool,

    /// Show rules that would be added to, or are missing from, the current worktree's own set.
    #[arg(long)]
    diff: bool,

    /// Replace broad `Bash(<binary> *)` rules with safe-subcommand expansions before merging.
    #[arg(long)]
    refine: bool,

    /// Also harvest rules from the approval log, filtered to each worktree's own cwd.
    #[arg(long)]
    from_log: bool,

    /// Directory to resolve worktrees from (defaults to the current directory).
    #[arg(long)]
    cwd: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let cwd = cli
        .cwd
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let worktrees = worktree::list_worktrees(&cwd);
    if worktrees.is_empty() {
        eprintln!("worktree-aggregate: no worktrees found at {}", cwd.display());
        return ExitCode::FAILURE;
    }

    let mut merged: BTreeSet<String> = worktrees
        .iter()
        .flat_map(|w| w.allow_rules().to_vec())
        .collect();

    if cli.from_log {
        let log_path = log::default_log_path();
        for w in &worktrees {
            merged.extend(rules::harvest_from_log(&log_path, Some(&w.path)));
        }
    }

    if cli.refine {
        merged = rules::refine(&merged);
    }

    if cli.report {
        for w in &worktrees {
            println!("{}\t{} rules", w.path.display(), w.allow_rules().len());
        }
        return ExitCode::SUCCESS;
    }

    if cli.diff {
        let current = current_worktree_rules(&worktrees, &cwd);
        for rule in merged.difference(&current) {
            println!("+{}", rule);
        }
        for rule in current.difference(&merged) {
            println!("-{}", rule);
        }
        return ExitCode::SUCCESS;
    }

    if cli.apply_all {
        for w in &worktrees {
            if let Err(e) = write_worktree_settings(&w.path, &merged) {
                eprintln!("worktree-aggregate: failed to write {}: {}", w.path.display(), e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    if cli.apply {
        let target = current_worktree_path(&worktrees, &cwd);
        if let Err(e) = write_worktree_settings(&target, &merged) {
            eprintln!("worktree-aggregate: failed to write {}: {}", target.display(), e);
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    // --preview, the default action.
    for rule in &merged {
        println!("{}", rule);
    }
    ExitCode::SUCCESS
}

fn current_worktree_path(worktrees: &[WorktreeInfo], cwd: &PathBuf) -> PathBuf {
    let canonical_cwd = cwd.canonicalize().unwrap_or_else(|_| cwd.clone());
    worktrees
        .iter()
        .find(|w| w.path.canonicalize().unwrap_or_else(|_| w.path.clone()) == canonical_cwd)
        .map(|w| w.path.clone())
        .unwrap_or_else(|| cwd.clone())
}

fn current_worktree_rules(worktrees: &[WorktreeInfo], cwd: &PathBuf) -> BTreeSet<String> {
    let canonical_cwd = cwd.canonicalize().unwrap_or_else(|_| cwd.clone());
    worktrees
        .iter()
        .find(|w| w.path.canonicalize().unwrap_or_else(|_| w.path.clone()) == canonical_cwd)
        .map(|w| w.allow_rules().iter().cloned().collect())
        .unwrap_or_default()
}

fn write_worktree_settings(worktree_path: &PathBuf, rules: &BTreeSet<String>) -> Result<(), SettingsError> {
    let settings_path = worktree_path.join(".claude").join("settings.local.json");
    let mut doc = settings::read_or_default(&settings_path)?;
    settings::set_allow(&mut doc, rules.iter().cloned().collect());
    settings::atomic_write(&settings_path, &doc)
}
