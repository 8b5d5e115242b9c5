//! The decision engine: classify, log, then apply the allow cascade.

use std::path::Path;

use serde_json::Value;

use crate::classify::{self, ClassificationResult, ToolInvocation};
use crate::log::{self, LogRecord};
use crate::worktree;

/// What the hook should do with an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Emit the allow envelope.
    Allow,
    /// Emit nothing; let the host agent fall through to an interactive
    /// prompt.
    FallThrough,
}

/// Runtime flags and context the decision engine needs beyond the
/// invocation itself.
pub struct DecisionContext<'a> {
    pub log_path: &'a Path,
    pub auto_mode: bool,
    pub worktree_mode: bool,
    pub cwd: &'a str,
    pub now: String,
}

/// Run the five-step allow cascade for one invocation.
///
/// Step 1 (empty tool name → fall through, no log write) is the caller's
/// responsibility via [`ToolInvocation`] validation upstream; this
/// function assumes `invocation.tool_name` is non-empty.
pub fn decide(invocation: &ToolInvocation, ctx: &DecisionContext) -> Decision {
    let result = classify::classify(&invocation.tool_name, &invocation.tool_input);

    // Captured before this invocation's own record is appended: the
    // auto-mode check below must only match a *prior* record, never the
    // one this call is about to write.
    let prior_match = log::contains_rule(ctx.log_path, &result.rule.to_string());

    let exact_rule = exact_rule_for(&invocation.tool_name, &invocation.tool_input);
    let record = LogRecord::new(
        ctx.now.clone(),
        &invocation.tool_name,
        &result,
        ctx.cwd,
        invocation.session_id.clone(),
        exact_rule,
    );
    // A filesystem error here degrades to "skip the log-history path for
    // this invocation" rather than failing the hook.
    let _ = log::append(ctx.log_path, &record);

    if result.is_safe {
        return Decision::Allow;
    }

    if ctx.worktree_mode && worktree_match(ctx.cwd, &result) {
        return Decision::Allow;
    }

    if ctx.auto_mode && prior_match {
        return Decision::Allow;
    }

    Decision::FallThrough
}

fn worktree_match(cwd: &str, result: &ClassificationResult) -> bool {
    let cwd_path = Path::new(cwd);
    if !worktree::has_sibling_worktrees(cwd_path) {
        return false;
    }
    let rule_string = result.rule.to_string();
    worktree::sibling_allow_union(cwd_path).contains(&rule_string)
}

/// The full command verbatim, for `LogRecord::exact_rule`, when the tool
/// is `Bash` and a command string is present.
fn exact_rule_for(tool_name: &str, tool_input: &Value) -> Option<String> {
    if tool_name != "Bash" {
        return None;
    }
    tool_input
        .get("command")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The fixed allow-envelope JSON shape the hook emits on stdout.
pub fn allow_envelope() -> Value {
    serde_json::json!({
        "hookSpecificOutput": {
            "hookEventName": "PermissionRequest",
            "decision": { "behavior": "allow" }
        }
    })
}
