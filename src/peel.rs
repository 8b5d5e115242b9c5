//! Indirection peeler.
//!
//! Strips wrapper programs (`sudo`, `env`, `xargs`, `bash -c`, …) from the
//! front of a command string, producing the residual "effective" command
//! and the ordered chain of wrappers that were seen.

use crate::config::{IndirectionKind, FLAGS_WITH_ARGS, INDIRECTION_TABLE};
use serde::{Deserialize, Serialize};

/// Result of peeling: the residual command and the wrapper chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveCommand {
    /// The command string left after all wrappers were stripped.
    pub residual: String,
    /// Wrappers seen, in the order they were stripped.
    pub chain: Vec<String>,
}

impl EffectiveCommand {
    /// Space-joined wrapper names, as stored in `LogRecord::indirection_chain`.
    pub fn chain_string(&self) -> String {
        self.chain.join(" ")
    }
}

const MAX_ITERATIONS: usize = 10;

/// Peel indirection wrappers from `command`.
///
/// Iterates at most [`MAX_ITERATIONS`] times. A command with no leading
/// indirection token returns unchanged with an empty chain.
pub fn peel(command: &str) -> EffectiveCommand {
    let mut residual = command.to_string();
    let mut chain: Vec<String> = Vec::new();

    for _ in 0..MAX_ITERATIONS {
        residual = residual.trim_start().to_string();

        if !residual.contains(char::is_whitespace) {
            break;
        }

        let head_end = residual.find(char::is_whitespace).unwrap();
        let head = residual[..head_end].to_string();

        let kind = match INDIRECTION_TABLE.get(head.as_str()) {
            Some(k) => *k,
            None => break,
        };

        match kind {
            IndirectionKind::ShellC => {
                let after_head = residual[head_end..].trim_start();
                if !after_head.starts_with("-c") {
                    // Not indirection after all; leave residual and chain untouched.
                    break;
                }
                let after_flag = after_head["-c".len()..].trim_start();
                let inner = extract_quoted_or_token(after_flag);
                chain.push(head);
                residual = inner;
            }
            IndirectionKind::PrefixFlags | IndirectionKind::PrefixKV | IndirectionKind::Xargs => {
                let flags_with_args = FLAGS_WITH_ARGS.get(head.as_str());
                let after_head = residual[head_end..].trim_start();
                let rest_tokens: Vec<&str> = after_head.split_whitespace().collect();

                let mut i = 0;
                while i < rest_tokens.len() {
                    let tok = rest_tokens[i];

                    if kind == IndirectionKind::PrefixKV && !tok.starts_with('-') && tok.contains('=') {
                        i += 1;
                        continue;
                    }

                    if tok == "--" {
                        i += 1;
                        break;
                    }

                    if tok.starts_with('-') {
                        if tok.contains('=') {
                            i += 1;
                        } else if flags_with_args.is_some_and(|set| set.contains(tok))
                            && i + 1 < rest_tokens.len()
                        {
                            i += 2;
                        } else {
                            i += 1;
                        }
                        continue;
                    }

                    break;
                }

                residual = rest_tokens[i..].join(" ");
                chain.push(head);
            }
        }
    }

    EffectiveCommand { residual, chain }
}

/// Extract the next "run" of text after a `-c` flag: a matching-quote
/// delimited span with the quotes stripped, or else a single whitespace-
/// delimited token.
fn extract_quoted_or_token(s: &str) -> String {
    let s = s.trim_start();
    if let Some(quote) = s.chars().next().filter(|c| *c == '\'' || *c == '"') {
        if let Some(end) = s[1..].find(quote) {
            return s[1..1 + end].to_string();
        }
        return s[1..].to_string();
    }

    match s.find(char::is_whitespace) {
        Some(idx) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_indirection_single_token() {
        let result = peel("git");
        assert_eq!(result.residual, "git");
        assert!(result.chain.is_empty());
    }

    #[test]
    fn no_indirection_unknown_head() {
        let result = peel("git status");
        assert_eq!(result.residual, "git status");
        assert!(result.chain.is_empty());
    }

    #[test]
    fn sudo_with_user_flag() {
        let result = peel("sudo -u root git push origin main");
        assert_eq!(result.residual, "git push origin main");
        assert_eq!(result.chain, vec!["sudo"]);
    }

    #[test]
    fn env_with_kv_pairs() {
        let result = peel("env A=1 B=2 git status");
        assert_eq!(result.residual, "git status");
        assert_eq!(result.chain, vec!["env"]);
    }

    #[test]
    fn sudo_env_chain() {
        let result = peel("sudo env FOO=bar git push");
        assert_eq!(result.residual, "git push");
        assert_eq!(result.chain, vec!["sudo", "env"]);
    }

    #[test]
    fn bash_dash_c_single_quoted() {
        let result = peel("bash -c 'git diff'");
        assert_eq!(result.residual, "git diff");
        assert_eq!(result.chain, vec!["bash"]);
    }

    #[test]
    fn bash_dash_c_double_quoted() {
        let result = peel("bash -c \"git log\"");
        assert_eq!(result.residual, "git log");
        assert_eq!(result.chain, vec!["bash"]);
    }

    #[test]
    fn bash_script_is_not_indirection() {
        let result = peel("bash script.sh");
        assert_eq!(result.residual, "bash script.sh");
        assert!(result.chain.is_empty());
    }

    #[test]
    fn terminates_within_iteration_cap() {
        let chained = "sudo ".repeat(20) + "git status";
        let result = peel(&chained);
        assert!(result.chain.len() <= 10);
    }

    #[test]
    fn double_dash_stops_flag_consumption() {
        let result = peel("sudo -- -weird-binary arg");
        assert_eq!(result.residual, "-weird-binary arg");
        assert_eq!(result.chain, vec!["sudo"]);
    }

    #[test]
    fn xargs_with_replacement_flag() {
        let result = peel("xargs -I {} git status {}");
        assert_eq!(result.residual, "git status {}");
        assert_eq!(result.chain, vec!["xargs"]);
    }
}
