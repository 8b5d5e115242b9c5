//! `permission-hook` — the stdin→stdout filter invoked on every tool
//! request.
//!
//! Reads one JSON envelope from stdin, classifies it, appends a log
//! record, runs the decision cascade, and writes either the fixed allow
//! envelope or nothing to stdout. Never exits non-zero on the normal
//! decision path.

use std::io::{self, Read, Write};

use chrono::Utc;

use permission_hook::classify::ToolInvocation;
use permission_hook::decision::{self, Decision, DecisionContext};
use permission_hook::log;

fn main() {
    let mut input = String::new();
    if io::stdin().read_to_string(&mut input).is_err() {
        // Can't even read stdin; fall through rather than error out.
        return;
    }

    let invocation: ToolInvocation = match serde_json::from_str(&input) {
        Ok(inv) => inv,
        Err(_) => return, // Malformed input: fall through silently, no log write.
    };

    if invocation.tool_name.is_empty() {
        return; // Step 1 of the cascade: empty tool name, no log write.
    }

    let auto_mode = env_flag("CLAUDE_PERMISSION_AUTO");
    let worktree_mode = env_flag("CLAUDE_PERMISSION_WORKTREE");
    let log_path = log::default_log_path();
    let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let ctx = DecisionContext {
        log_path: &log_path,
        auto_mode,
        worktree_mode,
        cwd: &invocation.cwd,
        now,
    };

    match decision::decide(&invocation, &ctx) {
        Decision::Allow => {
            let envelope = decision::allow_envelope();
            let _ = writeln!(io::stdout(), "{}", envelope);
        }
        Decision::FallThrough => {}
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}
