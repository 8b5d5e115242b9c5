//! `permission-sync` — harvests approved rules from the append-only
//! approval log and syncs them into the user-global settings file.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use permission_hook::log;
use permission_hook::rules;
use permission_hook::settings;

#[derive(Parser)]
#[command(name = "permission-sync")]
#[command(about = "Sync approved permission rules from the approval log into the global settings file")]
#[command(version)]
struct Cli {
    /// Show the rule set that would be written, without touching the target (default).
    #[arg(long)]
    preview: bool,

    /// Write the harvested rule set into the target settings file.
    #[arg(long)]
    apply: bool,

    /// Print the rules harvested from the log, one per line, without reading or writing the target.
    #[arg(long)]
    print: bool,

    /// Show rules that would be added to, or are already present in, the target's allow list.
    #[arg(long)]
    diff: bool,

    /// Replace broad `Bash(<binary> *)` rules with safe-subcommand expansions before merging.
    #[arg(long)]
    refine: bool,

    /// Override the approval log path (defaults to `$CLAUDE_PERMISSION_LOG`).
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Override the target settings file path (defaults to `<home>/.claude/settings.json`).
    #[arg(long)]
    settings_path: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_path = cli.log_path.clone().unwrap_or_else(log::default_log_path);

    let harvested = rules::harvest_from_log(&log_path, None);

    if cli.print {
        let printed = if cli.refine {
            rules::refine(&harvested)
        } else {
            harvested
        };
        for rule in &printed {
            println!("{}", rule);
        }
        return ExitCode::SUCCESS;
    }

    let settings_path = cli
        .settings_path
        .clone()
        .unwrap_or_else(default_settings_path);

    let doc = match settings::read_or_default(&settings_path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("permission-sync: failed to read {}: {}", settings_path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let current: BTreeSet<String> = settings::get_allow(&doc).into_iter().collect();
    let mut merged: BTreeSet<String> = current.union(&harvested).cloned().collect();
    if cli.refine {
        merged = rules::refine(&merged);
    }

    if cli.diff {
        print_diff(&current, &merged);
        return ExitCode::SUCCESS;
    }

    if cli.apply {
        let mut doc = doc;
        settings::set_allow(&mut doc, merged.into_iter().collect());
        match settings::atomic_write(&settings_path, &doc) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("permission-sync: {}", e);
                ExitCode::FAILURE
            }
        }
    } else {
        // --preview, the default action.
        for rule in &merged {
            println!("{}", rule);
        }
        ExitCode::SUCCESS
    }
}

fn default_settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("settings.json")
}

fn print_diff(current: &BTreeSet<String>, merged: &BTreeSet<String>) {
    for rule in merged.difference(current) {
        println!("+{}", rule);
    }
    for rule in current.difference(merged) {
        println!("-{}", rule);
    }
}
