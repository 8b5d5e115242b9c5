//! Static configuration tables for the permission filter.
//!
//! Every table here is process-wide, immutable, and built once on first use
//! via `once_cell::sync::Lazy`. Nothing in this module has logic beyond
//! lookup; callers (the peeler, the classifier, the sync engine) own all
//! decision-making.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// The kind of indirection a wrapper word introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndirectionKind {
    /// `sudo`, `nice`, `nohup`, `time`, `command`: consume leading flags.
    PrefixFlags,
    /// `env`: like `PrefixFlags`, but also consumes `KEY=VAL` tokens.
    PrefixKV,
    /// `bash`/`sh`/`zsh`/`dash` invoked as `<shell> -c '<command>'`.
    ShellC,
    /// `xargs`: like `PrefixFlags`, using xargs' own flag table.
    Xargs,
}

/// The curated safe-subcommand list per tracked binary.
///
/// A subcommand is "safe" iff it cannot, by documented behavior of that
/// binary, execute arbitrary code, modify the filesystem beyond its
/// documented read-only scope, or alter configuration that affects future
/// invocations. This is deliberately a minimal, tightened list.
pub static SAFE_SUBCOMMANDS: Lazy<HashMap<&'static str, HashSet<&'static str>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "git",
        set(&[
            "status",
            "log",
            "diff",
            "show",
            "branch",
            "tag",
            "describe",
            "rev-parse",
            "remote",
            "ls-files",
            "ls-tree",
            "cat-file",
            "shortlog",
            "reflog",
            "blame",
            "version",
            "help",
        ]),
    );
    m.insert(
        "cargo",
        set(&[
            "check",
            "clippy",
            "fmt",
            "metadata",
            "tree",
            "read-manifest",
            "pkgid",
            "verify-project",
            "version",
        ]),
    );
    m.insert(
        "npm",
        set(&[
            "ls", "list", "outdated", "view", "info", "pack", "config", "prefix", "root",
        ]),
    );
    m.insert("nix", set(&["log", "show-derivation", "path-info", "store"]));
    m.insert(
        "docker",
        set(&[
            "ps", "images", "inspect", "logs", "stats", "top", "version", "info", "events",
            "history", "port",
        ]),
    );
    m.insert(
        "kubectl",
        set(&[
            "get",
            "describe",
            "logs",
            "top",
            "version",
            "cluster-info",
            "api-resources",
            "api-versions",
            "explain",
        ]),
    );
    m.insert("pip", set(&["list", "show", "freeze", "check"]));
    m.insert(
        "brew",
        set(&["list", "info", "search", "outdated", "deps", "leaves", "config"]),
    );
    m
});

/// Wrapper words that introduce indirection, and what kind each one is.
pub static INDIRECTION_TABLE: Lazy<HashMap<&'static str, IndirectionKind>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for word in ["sudo", "nice", "nohup", "time", "command"] {
        m.insert(word, IndirectionKind::PrefixFlags);
    }
    m.insert("env", IndirectionKind::PrefixKV);
    m.insert("xargs", IndirectionKind::Xargs);
    for word in ["bash", "sh", "zsh", "dash"] {
        m.insert(word, IndirectionKind::ShellC);
    }
    m
});

/// For each wrapper, the flags that consume a separate following token.
pub static FLAGS_WITH_ARGS: Lazy<HashMap<&'static str, HashSet<&'static str>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("sudo", set(&["-u", "-g", "-p", "-h", "-C"]));
    m.insert("nice", set(&["-n"]));
    m.insert("nohup", set(&[]));
    m.insert("time", set(&["-o", "-f"]));
    m.insert("command", set(&[]));
    m.insert("env", set(&["-C", "-u", "-S", "-P"]));
    m.insert("xargs", set(&["-I", "-L", "-P", "-n", "-d", "-a", "-s", "-E"]));
    m
});

/// Shell keywords: never a plausible binary name, even if they pass the
/// token-shape check.
pub static SHELL_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    set(&[
        "for", "if", "then", "else", "elif", "fi", "while", "until", "do", "done", "case", "esac",
        "select", "in", "function", "time", "coproc", "{", "}", "!", "[[", "]]",
    ])
});

/// Binaries that are never trusted, matched on bare name and on the
/// basename of an absolute path.
pub static BLOCKLISTED_BINARIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    set(&[
        "bash", "sh", "zsh", "dash", "ksh", "csh", "tcsh", "fish", "python", "python2", "python3",
        "ruby", "perl", "node", "eval", "exec", "source",
    ])
});

/// Flags with arguments inserted between the binary and its subcommand.
pub static PRE_SUBCOMMAND_FLAGS: Lazy<HashMap<&'static str, HashSet<&'static str>>> =
    Lazy::new(|| {
        let mut m = HashMap::new();
        m.insert("git", set(&["-C", "--git-dir", "-c", "--work-tree"]));
        m
    });

/// Flag prefixes that imply an alternate rule form, per binary.
pub static ALT_RULE_PREFIXES: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("git", vec!["-C"]);
    m
});

fn set(items: &[&'static str]) -> HashSet<&'static str> {
    items.iter().copied().collect()
}

/// True if `binary` (bare name, or basename of a path) is blocklisted.
pub fn is_blocklisted_binary(binary: &str) -> bool {
    if BLOCKLISTED_BINARIES.contains(binary) {
        return true;
    }
    if let Some(base) = binary.rsplit('/').next() {
        if base != binary && BLOCKLISTED_BINARIES.contains(base) {
            return true;
        }
    }
    false
}
