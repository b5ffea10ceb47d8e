//! Input Validator
//!
//! First gate of the pipeline. Rejects dangerous input before anything else
//! looks at it:
//! - shell metacharacters and command substitution in free text
//! - SQL injection shapes
//! - path traversal
//! - package names outside a strict charset
//! - argv lists that leave the allowed binary set or carry destructive args
//!
//! Pure: no I/O, no logging side effects beyond tracing.

use crate::config::default_allowed_programs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

/// What kind of input is being validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Free natural-language text
    Nlp,
    /// A single package attribute name
    Package,
    /// A filesystem path
    Path,
    /// A fully formed command line
    Command,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Nlp => "nlp",
            InputKind::Package => "package",
            InputKind::Path => "path",
            InputKind::Command => "command",
        }
    }

    /// Maximum accepted length after sanitization
    pub fn max_len(&self) -> usize {
        match self {
            InputKind::Nlp => 1000,
            InputKind::Package => 100,
            InputKind::Path => 255,
            InputKind::Command => 500,
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown kind names are a programmer error, not user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownInputKind(pub String);

impl fmt::Display for UnknownInputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown input kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownInputKind {}

impl FromStr for InputKind {
    type Err = UnknownInputKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nlp" | "general" | "text" => Ok(InputKind::Nlp),
            "package" => Ok(InputKind::Package),
            "path" | "file_path" => Ok(InputKind::Path),
            "command" => Ok(InputKind::Command),
            other => Err(UnknownInputKind(other.to_string())),
        }
    }
}

/// Result of validating one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub sanitized: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationOutcome {
    fn accept(sanitized: String) -> Self {
        Self {
            valid: true,
            sanitized,
            reason: None,
        }
    }

    fn reject(sanitized: String, reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            sanitized,
            reason: Some(reason.into()),
        }
    }
}

/// Chaining and piping tokens; only dangerous outside quoted literals
const CHAINING_TOKENS: &[(&str, &str)] = &[
    ("&&", "command chaining (&&)"),
    ("||", "command chaining (||)"),
    (";", "command separator (;)"),
    ("|", "pipe (|)"),
];

/// Substitution tokens; shells expand these inside double quotes too
const SUBSTITUTION_TOKENS: &[(&str, &str)] = &[
    ("`", "backtick command substitution"),
    ("$(", "command substitution $(...)"),
    ("${", "variable expansion ${...}"),
];

static SQL_INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\bunion\s+(all\s+)?select\b").unwrap(),
        Regex::new(r"(?i)\bdrop\s+(table|database)\b").unwrap(),
        Regex::new(r"(?i)'\s*(or|and)\s+'?\w+'?\s*=\s*'?\w+").unwrap(),
        Regex::new(r"(?i)'\s*;?\s*--").unwrap(),
        Regex::new(r"(?i)\b(insert\s+into|delete\s+from)\b").unwrap(),
        Regex::new(r"/\*.*\*/").unwrap(),
    ]
});

static PATH_TRAVERSAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[/\\\s])\.\.([/\\]|$)").unwrap());

static PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

/// Destructive argv shapes, checked against the joined command line
static DANGEROUS_COMMAND_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"\brm\s+(-[a-zA-Z]*[rf][a-zA-Z]*\s+)+").unwrap(),
            "recursive or forced delete",
        ),
        (Regex::new(r"\bdd\s+.*\bif=").unwrap(), "raw disk copy (dd)"),
        (Regex::new(r"\bmkfs(\.\w+)?\b").unwrap(), "filesystem format"),
        (
            Regex::new(r"(curl|wget|fetch)\b.*\|\s*(sh|bash|zsh|fish)\b").unwrap(),
            "download piped to shell",
        ),
        (
            Regex::new(r"\|\s*(sudo\s+)?(sh|bash|zsh|fish)\b").unwrap(),
            "pipe to shell",
        ),
        (Regex::new(r":\(\)\s*\{.*\}").unwrap(), "fork bomb"),
        (Regex::new(r">\s*/dev/(sd[a-z]|nvme\d|hd[a-z])").unwrap(), "raw device write"),
        (Regex::new(r"\bchmod\s+(-R\s+)?777\b").unwrap(), "world-writable permissions"),
    ]
});

/// Names that must never be treated as a package
const RESERVED_PACKAGE_NAMES: &[&str] = &[
    "rm", "dd", "mkfs", "sudo", "su", "shutdown", "reboot", "halt", "poweroff", "kill",
    "killall", "chmod", "chown", "eval", "exec",
];

/// Absolute paths outside these prefixes are rejected (home is added at runtime)
const ALLOWED_PATH_PREFIXES: &[&str] = &["/nix/store", "/etc/nixos", "/tmp"];

const SENSITIVE_PATHS: &[&str] = &["/etc/shadow", "/etc/passwd", "/etc/sudoers", "/root"];

/// Validates raw input per kind
pub struct InputValidator {
    allowed_programs: HashSet<String>,
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl InputValidator {
    pub fn new() -> Self {
        Self::with_allowed_programs(default_allowed_programs())
    }

    pub fn with_allowed_programs<I, S>(programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_programs: programs.into_iter().map(Into::into).collect(),
        }
    }

    /// Validate `raw` as input of the given kind
    pub fn validate(&self, raw: &str, kind: InputKind) -> ValidationOutcome {
        let sanitized = sanitize(raw);

        if sanitized.len() > kind.max_len() {
            return ValidationOutcome::reject(
                sanitized,
                format!(
                    "Input is too long for {} input (max {} characters)",
                    kind,
                    kind.max_len()
                ),
            );
        }

        let outcome = match kind {
            InputKind::Nlp => self.validate_text(sanitized),
            InputKind::Package => self.validate_package(sanitized),
            InputKind::Path => self.validate_path(sanitized),
            InputKind::Command => {
                let argv: Vec<String> =
                    sanitized.split_whitespace().map(str::to_string).collect();
                let mut outcome = self.validate_argv(&argv);
                outcome.sanitized = sanitized;
                outcome
            }
        };

        if let Some(reason) = &outcome.reason {
            debug!("Rejected {} input: {}", kind, reason);
        }
        outcome
    }

    /// Validate a parsed command line (program followed by its arguments)
    pub fn validate_argv(&self, argv: &[String]) -> ValidationOutcome {
        let joined = argv.join(" ");
        let Some(program) = argv.first() else {
            return ValidationOutcome::reject(joined, "Empty command");
        };

        // A bare name only; "./nix" or "/tmp/nix" could be anything
        if program.contains('/') || !self.allowed_programs.contains(program.as_str()) {
            return ValidationOutcome::reject(
                joined,
                format!("'{}' is not an allowed program", program),
            );
        }

        for arg in argv {
            if let Some(reason) = find_shell_token(arg, false) {
                return ValidationOutcome::reject(
                    joined,
                    format!("Argument '{}' contains {}", arg, reason),
                );
            }
            if PATH_TRAVERSAL.is_match(arg) {
                return ValidationOutcome::reject(
                    joined,
                    format!("Argument '{}' traverses directories", arg),
                );
            }
        }

        if let Some(reason) = dangerous_command_reason(&joined) {
            return ValidationOutcome::reject(joined, format!("Blocked: {}", reason));
        }

        ValidationOutcome::accept(joined)
    }

    fn validate_text(&self, text: String) -> ValidationOutcome {
        if let Some(reason) = find_shell_token(&text, true) {
            return ValidationOutcome::reject(
                text,
                format!(
                    "Input contains {}. Try rephrasing without special shell characters",
                    reason
                ),
            );
        }

        if PATH_TRAVERSAL.is_match(&text) {
            return ValidationOutcome::reject(
                text,
                "Input contains a path traversal sequence (../)",
            );
        }

        if SQL_INJECTION_PATTERNS.iter().any(|re| re.is_match(&text)) {
            return ValidationOutcome::reject(text, "Input looks like an injection attempt");
        }

        if let Some(reason) = dangerous_command_reason(&text) {
            return ValidationOutcome::reject(
                text,
                format!("Input contains a destructive command ({})", reason),
            );
        }

        ValidationOutcome::accept(text)
    }

    fn validate_package(&self, name: String) -> ValidationOutcome {
        if name.is_empty() {
            return ValidationOutcome::reject(name, "Package name is empty");
        }

        if !PACKAGE_NAME.is_match(&name) {
            return ValidationOutcome::reject(
                name,
                "Package names may only contain letters, digits, '-', '.' and '_'",
            );
        }

        if name.contains("..") {
            return ValidationOutcome::reject(name, "Package name contains '..'");
        }

        if RESERVED_PACKAGE_NAMES.contains(&name.to_lowercase().as_str()) {
            return ValidationOutcome::reject(
                name.clone(),
                format!("'{}' is a reserved name, not a package", name),
            );
        }

        ValidationOutcome::accept(name)
    }

    fn validate_path(&self, path: String) -> ValidationOutcome {
        if path.is_empty() {
            return ValidationOutcome::reject(path, "Path is empty");
        }

        if PATH_TRAVERSAL.is_match(&path) {
            return ValidationOutcome::reject(path, "Path traversal is not allowed");
        }

        if find_shell_token(&path, false).is_some() {
            return ValidationOutcome::reject(path, "Path contains shell metacharacters");
        }

        if SENSITIVE_PATHS
            .iter()
            .any(|s| path == *s || path.starts_with(&format!("{}/", s)))
        {
            return ValidationOutcome::reject(path, "Path points at a sensitive system file");
        }

        if path.starts_with('/') {
            let home = dirs::home_dir().map(|h| h.display().to_string());
            let allowed = ALLOWED_PATH_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .chain(home)
                .any(|prefix| path == prefix || path.starts_with(&format!("{}/", prefix)));
            if !allowed {
                return ValidationOutcome::reject(
                    path,
                    "Use paths within your home, /nix/store, /etc/nixos or /tmp",
                );
            }
        }

        ValidationOutcome::accept(path)
    }
}

/// Strip NUL and control characters (tab and newline survive), trim
fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() || *c == '\t' || *c == '\n')
        .collect::<String>()
        .trim()
        .to_string()
}

fn dangerous_command_reason(text: &str) -> Option<&'static str> {
    DANGEROUS_COMMAND_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, reason)| *reason)
}

/// Find the first shell metacharacter in `text`.
///
/// With `honor_quotes`, chaining tokens inside a closed quoted literal are
/// ignored. A quote only opens a literal at a word start so contractions
/// like "don't" do not hide what follows. Substitution tokens are reported
/// regardless of quoting.
fn find_shell_token(text: &str, honor_quotes: bool) -> Option<&'static str> {
    for (token, reason) in SUBSTITUTION_TOKENS {
        if text.contains(token) {
            return Some(reason);
        }
    }

    let unquoted = if honor_quotes {
        strip_quoted_literals(text)
    } else {
        text.to_string()
    };

    CHAINING_TOKENS
        .iter()
        .find(|(token, _)| unquoted.contains(token))
        .map(|(_, reason)| *reason)
}

fn strip_quoted_literals(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let at_word_start = i == 0 || !chars[i - 1].is_alphanumeric();
        if (c == '"' || c == '\'') && at_word_start {
            if let Some(offset) = chars[i + 1..].iter().position(|&q| q == c) {
                // Keep a placeholder so words on either side stay apart
                out.push(' ');
                i += offset + 2;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }

    out
}
