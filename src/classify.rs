//! Rule synthesizer & classifier.
//!
//! Turns a raw tool invocation into a canonical permission [`Rule`] string,
//! a base command, the indirection chain that produced it, and an
//! `is_safe` verdict. Owns the Bash security guards (chaining, command
//! substitution, redirection, backgrounding, multiline).

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{is_blocklisted_binary, PRE_SUBCOMMAND_FLAGS, SAFE_SUBCOMMANDS, SHELL_KEYWORDS};
use crate::peel::{peel, EffectiveCommand};

/// The parsed stdin envelope for one hook invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolInvocation {
    #[serde(default)]
    pub tool_name: String,
    #[serde(default = "default_tool_input")]
    pub tool_input: Value,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_tool_input() -> Value {
    Value::Object(serde_json::Map::new())
}

/// The canonical permission-rule string, as a tagged union rather than a
/// loose `String` so that callers cannot construct a malformed shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rule {
    /// `Bash(<binary> <subcommand> *)`
    BashSubcommand { binary: String, subcommand: String },
    /// `Bash(<binary> *)`
    BashBinary { binary: String },
    /// Bare `Bash`, for unparseable/blocklisted/keyword cases.
    Bash,
    /// The tool name verbatim: file tools, `mcp__*` tools, and any other
    /// tool not given a bespoke shape.
    Tool(String),
    /// `WebFetch(domain:<host>)`
    WebFetchDomain(String),
    /// Bare `WebFetch`.
    WebFetch,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::BashSubcommand { binary, subcommand } => {
                write!(f, "Bash({} {} *)", binary, subcommand)
            }
            Rule::BashBinary { binary } => write!(f, "Bash({} *)", binary),
            Rule::Bash => write!(f, "Bash"),
            Rule::Tool(name) => write!(f, "{}", name),
            Rule::WebFetchDomain(host) => write!(f, "WebFetch(domain:{})", host),
            Rule::WebFetch => write!(f, "WebFetch"),
        }
    }
}

/// What [`classify`] returns for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub rule: Rule,
    pub base_command: String,
    pub chain: Vec<String>,
    pub is_safe: bool,
}

static BINARY_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.~/-]+$").expect("valid binary-token regex"));

/// Classify one tool invocation into a [`ClassificationResult`].
///
/// Never fails: malformed or absent fields collapse to the bare tool-name
/// rule with `is_safe = false`.
pub fn classify(tool_name: &str, tool_input: &Value) -> ClassificationResult {
    match tool_name {
        "Bash" => {
            let command = tool_input
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or("");
            if command.is_empty() {
                ClassificationResult {
                    rule: Rule::Bash,
                    base_command: String::new(),
                    chain: Vec::new(),
                    is_safe: false,
                }
            } else {
                classify_bash_command(command)
            }
        }
        "Read" | "Write" | "Edit" | "MultiEdit" => ClassificationResult {
            rule: Rule::Tool(tool_name.to_string()),
            base_command: String::new(),
            chain: Vec::new(),
            is_safe: false,
        },
        "WebFetch" => {
            let url = tool_input.get("url").and_then(Value::as_str);
            match url {
                Some(u) if !u.is_empty() => ClassificationResult {
                    rule: Rule::WebFetchDomain(extract_domain(u)),
                    base_command: String::new(),
                    chain: Vec::new(),
                    is_safe: false,
                },
                _ => ClassificationResult {
                    rule: Rule::WebFetch,
                    base_command: String::new(),
                    chain: Vec::new(),
                    is_safe: false,
                },
            }
        }
        other => ClassificationResult {
            rule: Rule::Tool(other.to_string()),
            base_command: String::new(),
            chain: Vec::new(),
            is_safe: false,
        },
    }
}

/// Run the Bash classification pipeline on a non-empty command string.
fn classify_bash_command(command: &str) -> ClassificationResult {
    let is_multiline = command.contains('\n');
    let first_line = command.split('\n').next().unwrap_or("");

    let guard_fired = security_guard_fired(first_line, is_multiline);

    let effective: EffectiveCommand = peel(first_line);
    let tokens: Vec<&str> = effective.residual.split_whitespace().collect();

    let mut binary = tokens.first().copied().unwrap_or("").to_string();
    if !binary.is_empty() && !is_plausible_binary(&binary) {
        binary = String::new();
    }

    let mut idx = 1;
    if !binary.is_empty() {
        if let Some(pre_flags) = PRE_SUBCOMMAND_FLAGS.get(binary.as_str()) {
            while idx < tokens.len() {
                let tok = tokens[idx];
                if pre_flags.contains(tok) {
                    idx += 1;
                    if idx < tokens.len() {
                        idx += 1;
                    }
                } else if tok.contains('=')
                    && pre_flags.iter().any(|f| tok.starts_with(&format!("{}=", f)))
                {
                    idx += 1;
                } else {
                    break;
                }
            }
        }
    }

    let subcommand = tokens.get(idx).copied().unwrap_or("").to_string();

    if !binary.is_empty() && SAFE_SUBCOMMANDS.contains_key(binary.as_str()) && !subcommand.is_empty()
    {
        let is_safe = !guard_fired
            && !is_multiline
            && SAFE_SUBCOMMANDS[binary.as_str()].contains(subcommand.as_str());
        ClassificationResult {
            rule: Rule::BashSubcommand {
                binary: binary.clone(),
                subcommand: subcommand.clone(),
            },
            base_command: format!("{} {}", binary, subcommand),
            chain: effective.chain,
            is_safe,
        }
    } else if !binary.is_empty() {
        ClassificationResult {
            rule: Rule::BashBinary {
                binary: binary.clone(),
            },
            base_command: binary,
            chain: effective.chain,
            is_safe: false,
        }
    } else {
        ClassificationResult {
            rule: Rule::Bash,
            base_command: String::new(),
            chain: effective.chain,
            is_safe: false,
        }
    }
}

/// A token is a plausible binary iff it matches the token-shape regex, is
/// not a shell keyword, and is not blocklisted (bare or by path basename).
fn is_plausible_binary(token: &str) -> bool {
    BINARY_TOKEN_RE.is_match(token)
        && !SHELL_KEYWORDS.contains(token)
        && !is_blocklisted_binary(token)
}

/// Evaluate the chaining/substitution/redirection/background/multiline
/// security guards against the first physical line of a command, given
/// whether the original spanned more than one line.
fn security_guard_fired(first_line: &str, is_multiline: bool) -> bool {
    let chaining = ["&&", "||", "|", ";"].iter().any(|p| first_line.contains(p));
    let substitution = ["`", "$(", ">(", "<("].iter().any(|p| first_line.contains(p));
    let multi_char_redirect = [">>", "&>", "<<<", "2>"]
        .iter()
        .any(|p| first_line.contains(p));
    let standalone_redirect = has_standalone_redirect(first_line);
    let without_and = first_line.replace("&&", "");
    let background = without_and.contains('&');

    chaining
        || substitution
        || multi_char_redirect
        || standalone_redirect
        || background
        || is_multiline
}

/// True if `s` contains a `>` or `<` that is not part of one of the
/// multi-character redirection operators or process-substitution forms
/// already enumerated (`>>`, `&>`, `<<<`, `2>`, `>(`, `<(`).
fn has_standalone_redirect(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut consumed = vec![false; bytes.len()];

    for pattern in [">>", "&>", "<<<", "2>", ">(", "<("] {
        mark_consumed(s, pattern, &mut consumed);
    }

    bytes
        .iter()
        .enumerate()
        .any(|(i, &b)| (b == b'>' || b == b'<') && !consumed[i])
}

fn mark_consumed(s: &str, pattern: &str, consumed: &mut [bool]) {
    let plen = pattern.len();
    if plen == 0 || s.len() < plen {
        return;
    }
    let mut i = 0;
    while i + plen <= s.len() {
        if &s[i..i + plen] == pattern {
            for slot in consumed.iter_mut().take(i + plen).skip(i) {
                *slot = true;
            }
            i += plen;
        } else {
            i += 1;
        }
    }
}

/// Extract the host from a URL: the substring between the first `://`
/// and the next `/` (or the end of the string).
fn extract_domain(url: &str) -> String {
    let after_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    match after_scheme.find('/') {
        Some(idx) => after_scheme[..idx].to_string(),
        None => after_scheme.to_string(),
    }
}
