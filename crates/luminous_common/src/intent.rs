//! Intent recognition - free text to a typed request.
//!
//! Ordered pattern table, one regex per phrasing. Every pattern that matches
//! is a candidate; the most specific candidate wins:
//! 1. more literal characters matched outside entity captures
//! 2. more entities extracted
//! 3. earlier position in the table
//!
//! Deterministic and side-effect free.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

/// Closed set of things a user can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Install,
    Remove,
    Search,
    Update,
    Rollback,
    Explain,
    Help,
    ListGenerations,
    ListInstalled,
    GarbageCollect,
    /// A configuration.nix snippet; nothing runs
    GenerateConfig,
    Unknown,
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl IntentKind {
    pub const ALL: [IntentKind; 12] = [
        Self::Install,
        Self::Remove,
        Self::Search,
        Self::Update,
        Self::Rollback,
        Self::Explain,
        Self::Help,
        Self::ListGenerations,
        Self::ListInstalled,
        Self::GarbageCollect,
        Self::GenerateConfig,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Search => "search",
            Self::Update => "update",
            Self::Rollback => "rollback",
            Self::Explain => "explain",
            Self::Help => "help",
            Self::ListGenerations => "list_generations",
            Self::ListInstalled => "list_installed",
            Self::GarbageCollect => "garbage_collect",
            Self::GenerateConfig => "generate_config",
            Self::Unknown => "unknown",
        }
    }

    /// Parse from string (for corpus tests and stored records)
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s.to_lowercase().as_str())
    }

    /// Changes system or profile state
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Install | Self::Remove | Self::Update | Self::Rollback | Self::GarbageCollect
        )
    }
}

/// A recognized request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub entities: BTreeMap<String, String>,
    /// 0.0 - 1.0
    pub confidence: f32,
    pub raw_text: String,
}

impl Intent {
    pub fn unknown(raw_text: &str, confidence: f32) -> Self {
        Self {
            kind: IntentKind::Unknown,
            entities: BTreeMap::new(),
            confidence,
            raw_text: raw_text.to_string(),
        }
    }

    pub fn entity(&self, name: &str) -> Option<&str> {
        self.entities.get(name).map(String::as_str)
    }

    /// Every package named, in order. Falls back to the single `package`.
    pub fn packages(&self) -> Vec<&str> {
        match self.entity("packages") {
            Some(list) => list.split_whitespace().collect(),
            None => self.entity("package").into_iter().collect(),
        }
    }

    /// The entity a command would act on (package, query or topic)
    pub fn target(&self) -> Option<&str> {
        self.entity("package")
            .or_else(|| self.entity("query"))
            .or_else(|| self.entity("topic"))
    }
}

/// Same alphabet the validator accepts for package names
const PKG: &str = r"(?P<package>[a-z0-9][a-z0-9._-]*)";

static PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").unwrap());

struct IntentPattern {
    kind: IntentKind,
    regex: Regex,
    confidence: f32,
}

fn pattern(kind: IntentKind, re: &str, confidence: f32) -> IntentPattern {
    IntentPattern {
        kind,
        regex: Regex::new(&re.replace("{pkg}", PKG)).unwrap(),
        confidence,
    }
}

static PATTERNS: LazyLock<Vec<IntentPattern>> = LazyLock::new(|| {
    use IntentKind::*;
    vec![
        // Help
        pattern(Help, r"^(?:help|\?)$", 0.95),
        pattern(Help, r"\bwhat can (?:you do|i (?:say|ask))\b", 0.9),
        pattern(Help, r"\bhow do i use (?:this|you)\b", 0.9),
        pattern(Help, r"^(?:show|list)(?: me)?(?: the)? commands$", 0.9),
        // Install
        pattern(Install, r"\b(?:install|add|get|set up|setup)\s+{pkg}", 0.9),
        pattern(Install, r"\b(?:i need|i want|i would like)\s+{pkg}", 0.8),
        // Remove
        pattern(Remove, r"\b(?:remove|uninstall|delete)\s+{pkg}", 0.9),
        pattern(Remove, r"\bget rid of\s+{pkg}", 0.9),
        pattern(Remove, r"\bi don'?t (?:want|need)\s+{pkg}(?:\s+anymore)?", 0.85),
        // Search
        pattern(
            Search,
            r"\b(?:search|find|look)(?:\s+for)?(?:\s+(?:a|an|some))?\s+(?P<query>.+?)(?:\s+packages?)?$",
            0.85,
        ),
        pattern(
            Search,
            r"\bis there (?:a |an |any )?(?P<query>.+?)(?: packages?)?$",
            0.8,
        ),
        // Update
        pattern(
            Update,
            r"\b(?:update|upgrade|refresh)\s+(?:my\s+|the\s+)?(?:system|nixos|everything|all)\b",
            0.9,
        ),
        pattern(Update, r"\b(?:system|nixos)\s+(?:update|upgrade)\b", 0.9),
        pattern(Update, r"^(?:update|upgrade)$", 0.8),
        // Rollback
        pattern(Rollback, r"\b(?:rollback|roll back|revert)\b", 0.9),
        pattern(Rollback, r"\bundo (?:the |my )?(?:last )?(?:update|upgrade|changes)\b", 0.9),
        pattern(
            Rollback,
            r"\bgo back to (?:the )?(?:previous|last) (?:generation|version)\b",
            0.9,
        ),
        // Explain
        pattern(
            Explain,
            r"^(?:what is|what are|what's|explain|tell me about)\s+(?:a\s+|an\s+|the\s+)?(?P<topic>.+?)\??$",
            0.8,
        ),
        pattern(Explain, r"^how (?:does|do) (?P<topic>.+?) work\??$", 0.8),
        // ListGenerations
        pattern(
            ListGenerations,
            r"\b(?:list|show|view)(?: me)?(?: my)?(?: system)? generations?\b",
            0.9,
        ),
        pattern(
            ListGenerations,
            r"\bwhat generations (?:do i have|are available)\b",
            0.9,
        ),
        // ListInstalled
        pattern(
            ListInstalled,
            r"\b(?:what|which) packages (?:are|do i have) installed\b",
            0.9,
        ),
        pattern(ListInstalled, r"\bwhat(?:'s| is| do i have) installed\b", 0.9),
        pattern(
            ListInstalled,
            r"\b(?:list|show)(?: me)?(?: my)?(?: installed)? packages\b",
            0.85,
        ),
        pattern(ListInstalled, r"\binstalled packages\b", 0.8),
        // GarbageCollect
        pattern(
            GarbageCollect,
            r"\b(?:garbage collect|collect garbage|clean up|cleanup|free (?:up )?(?:disk )?space)\b",
            0.9,
        ),
        pattern(
            GarbageCollect,
            r"\b(?:delete|remove) old (?:packages?|generations?)\b",
            0.9,
        ),
        pattern(GarbageCollect, r"^gc$", 0.9),
        // GenerateConfig
        pattern(
            GenerateConfig,
            r"^(?:please\s+)?(?:generate|create|make|write)\s+(?:me\s+)?(?:a\s+|my\s+|the\s+)?(?:nixos\s+|system\s+)?(?:config|configuration)(?:\.nix)?(?:\s+(?:with|for|including|containing)\s+(?P<packages>[a-z0-9][a-z0-9._,&\s-]*))?$",
            0.9,
        ),
    ]
});

/// Common nicknames resolved to nixpkgs attribute names
const PACKAGE_ALIASES: &[(&str, &str)] = &[
    ("chrome", "google-chrome"),
    ("code", "vscode"),
    ("vs-code", "vscode"),
    ("nvim", "neovim"),
    ("node", "nodejs"),
    ("npm", "nodejs"),
    ("python", "python3"),
    ("golang", "go"),
    ("java", "openjdk"),
    ("jdk", "openjdk"),
    ("rust", "rustc"),
    ("postgres", "postgresql"),
    ("docker-compose", "docker-compose"),
];

/// Words that say "a package" without naming one
const VAGUE_PACKAGE_WORDS: &[&str] = &["something", "stuff", "it", "anything", "this", "that"];

/// Captures that are grammar, not entities
const STOP_WORDS: &[&str] = &["to", "a", "an", "the", "some", "me", "my", "for", "of", "rid"];

/// Words joining package names in a list
const LIST_SEPARATORS: &[&str] = &[",", "and", "&", "plus"];

/// Words that end a package list
const LIST_ENDINGS: &[&str] = &["then", "also", "please", "too", "now"];

/// Confidence for text that matched nothing
const UNMATCHED_CONFIDENCE: f32 = 0.1;

/// Lower-case, collapse whitespace, strip trailing punctuation
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim_end_matches(['.', ',', '!', '?', ';', ':'])
        .trim()
        .to_string()
}

/// Resolve a nickname to its nixpkgs attribute name
pub fn resolve_package_alias(name: &str) -> &str {
    PACKAGE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, real)| *real)
        .unwrap_or(name)
}

struct Candidate {
    order: usize,
    literal_len: usize,
    /// Text after the `package` capture
    rest: String,
    entities: BTreeMap<String, String>,
    kind: IntentKind,
    confidence: f32,
}

impl Candidate {
    fn rank(&self) -> (usize, usize, std::cmp::Reverse<usize>) {
        (
            self.literal_len,
            self.entities.len(),
            std::cmp::Reverse(self.order),
        )
    }
}

/// Pattern-based recognizer
#[derive(Debug, Default, Clone, Copy)]
pub struct IntentRecognizer;

impl IntentRecognizer {
    pub fn new() -> Self {
        Self
    }

    pub fn recognize(&self, text: &str) -> Intent {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Intent::unknown(text, 0.0);
        }

        let best = PATTERNS
            .iter()
            .enumerate()
            .filter_map(|(order, p)| match_pattern(order, p, &normalized))
            .max_by_key(Candidate::rank);

        let Some(best) = best else {
            debug!("No intent pattern matched '{}'", normalized);
            return Intent::unknown(text, UNMATCHED_CONFIDENCE);
        };

        let mut entities = best.entities;
        let mut confidence = best.confidence;

        match best.kind {
            IntentKind::Install | IntentKind::Remove => {
                if let Some(first) = entities.get("package").cloned() {
                    let mut all = vec![resolve_package_alias(&first).to_string()];
                    for name in package_list(&best.rest, true) {
                        if !all.contains(&name) {
                            all.push(name);
                        }
                    }
                    if all.len() > 1 {
                        entities.insert("packages".to_string(), all.join(" "));
                    }
                }
            }
            IntentKind::GenerateConfig => {
                if let Some(raw) = entities.remove("packages") {
                    let names = package_list(&raw, false);
                    if !names.is_empty() {
                        entities.insert("packages".to_string(), names.join(" "));
                    }
                }
            }
            _ => {}
        }

        if let Some(package) = entities.get("package").cloned() {
            if VAGUE_PACKAGE_WORDS.contains(&package.as_str()) {
                confidence = confidence.min(0.6);
            } else if package.chars().count() == 1 {
                confidence = confidence.min(0.5);
            }
            let resolved = resolve_package_alias(&package);
            if resolved != package {
                entities.insert("requested".to_string(), package.clone());
                entities.insert("package".to_string(), resolved.to_string());
            }
        }

        debug!(
            "Recognized '{}' as {} ({:.2})",
            normalized, best.kind, confidence
        );

        Intent {
            kind: best.kind,
            entities,
            confidence,
            raw_text: text.to_string(),
        }
    }
}

fn match_pattern(order: usize, p: &IntentPattern, text: &str) -> Option<Candidate> {
    let caps = p.regex.captures(text)?;
    let whole = caps.get(0)?;

    let mut entities = BTreeMap::new();
    let mut captured_len = 0;
    let mut rest = String::new();
    for name in p.regex.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            let value = m.as_str().trim();
            if value.is_empty() || STOP_WORDS.contains(&value) {
                return None;
            }
            if name == "package" {
                // "c++" must not become "c"
                let after = &text[m.end()..];
                if !after.is_empty() && !after.starts_with([' ', ',']) {
                    return None;
                }
                rest = after.to_string();
            }
            captured_len += m.as_str().len();
            entities.insert(name.to_string(), value.to_string());
        }
    }

    Some(Candidate {
        order,
        literal_len: whole.as_str().len() - captured_len,
        rest,
        entities,
        kind: p.kind,
        confidence: p.confidence,
    })
}

/// Package names from "firefox, vim and git". With `after_first` the text
/// continues a list, so every name needs a separator before it.
/// Collection stops at the first word that is neither.
fn package_list(text: &str, after_first: bool) -> Vec<String> {
    let spaced = text.replace(',', " , ");
    let mut names = Vec::new();
    let mut separated = !after_first;
    for word in spaced.split_whitespace() {
        if LIST_SEPARATORS.contains(&word) {
            separated = true;
            continue;
        }
        if !separated
            || LIST_ENDINGS.contains(&word)
            || STOP_WORDS.contains(&word)
            || !PACKAGE_NAME.is_match(word)
        {
            break;
        }
        let name = resolve_package_alias(word).to_string();
        if !names.contains(&name) {
            names.push(name);
        }
        separated = !after_first;
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(text: &str) -> IntentKind {
        IntentRecognizer::new().recognize(text).kind
    }

    #[test]
    fn test_install_extracts_package() {
        let intent = IntentRecognizer::new().recognize("Install Firefox!");
        assert_eq!(intent.kind, IntentKind::Install);
        assert_eq!(intent.entity("package"), Some("firefox"));
        assert_eq!(intent.raw_text, "Install Firefox!");
        assert!(intent.confidence >= 0.8);
    }

    #[test]
    fn test_empty_is_unknown_with_zero_confidence() {
        let intent = IntentRecognizer::new().recognize("   ");
        assert_eq!(intent.kind, IntentKind::Unknown);
        assert_eq!(intent.confidence, 0.0);
    }

    #[test]
    fn test_unmatched_is_low_confidence_unknown() {
        let intent = IntentRecognizer::new().recognize("the weather is nice");
        assert_eq!(intent.kind, IntentKind::Unknown);
        assert!(intent.confidence > 0.0 && intent.confidence < 0.3);
    }

    #[test]
    fn test_more_specific_pattern_wins() {
        // "remove firefox" shape also matches, but the longer literal wins
        assert_eq!(kind_of("remove old generations"), IntentKind::GarbageCollect);
        // "get" install shape loses to "get rid of"
        let intent = IntentRecognizer::new().recognize("get rid of vim");
        assert_eq!(intent.kind, IntentKind::Remove);
        assert_eq!(intent.entity("package"), Some("vim"));
        assert_eq!(kind_of("what is installed"), IntentKind::ListInstalled);
    }

    #[test]
    fn test_stop_words_are_not_packages() {
        let intent = IntentRecognizer::new().recognize("i want to install htop");
        assert_eq!(intent.kind, IntentKind::Install);
        assert_eq!(intent.entity("package"), Some("htop"));
    }

    #[test]
    fn test_package_alias_resolved() {
        let intent = IntentRecognizer::new().recognize("install code");
        assert_eq!(intent.entity("package"), Some("vscode"));
        assert_eq!(intent.entity("requested"), Some("code"));
    }

    #[test]
    fn test_vague_package_lowers_confidence() {
        let intent = IntentRecognizer::new().recognize("install something");
        assert_eq!(intent.kind, IntentKind::Install);
        assert!(intent.confidence <= 0.6);
    }

    #[test]
    fn test_other_kinds() {
        assert_eq!(kind_of("search for a text editor"), IntentKind::Search);
        assert_eq!(kind_of("update my system"), IntentKind::Update);
        assert_eq!(kind_of("roll back"), IntentKind::Rollback);
        assert_eq!(kind_of("what is a flake?"), IntentKind::Explain);
        assert_eq!(kind_of("help"), IntentKind::Help);
        assert_eq!(kind_of("show my generations"), IntentKind::ListGenerations);
        assert_eq!(kind_of("clean up"), IntentKind::GarbageCollect);
        assert_eq!(kind_of("I don't want vim anymore"), IntentKind::Remove);
    }

    #[test]
    fn test_every_listed_package_kept() {
        let intent = IntentRecognizer::new().recognize("install firefox and vim");
        assert_eq!(intent.kind, IntentKind::Install);
        assert_eq!(intent.entity("package"), Some("firefox"));
        assert_eq!(intent.packages(), vec!["firefox", "vim"]);

        let intent = IntentRecognizer::new().recognize("remove firefox, code and git please");
        assert_eq!(intent.packages(), vec!["firefox", "vscode", "git"]);

        // Trailing words that are not a list leave a single package
        let intent = IntentRecognizer::new().recognize("i don't want vim anymore");
        assert_eq!(intent.packages(), vec!["vim"]);
        assert_eq!(intent.entity("packages"), None);
    }

    #[test]
    fn test_package_must_end_at_a_word_boundary() {
        let intent = IntentRecognizer::new().recognize("install c++");
        assert_eq!(intent.kind, IntentKind::Unknown);
        assert_eq!(intent.entity("package"), None);
    }

    #[test]
    fn test_generate_config_lists_packages() {
        let intent = IntentRecognizer::new().recognize("Generate a config with firefox and vim");
        assert_eq!(intent.kind, IntentKind::GenerateConfig);
        assert_eq!(intent.packages(), vec!["firefox", "vim"]);
        assert!(!intent.kind.is_mutating());

        let bare = IntentRecognizer::new().recognize("create my nixos configuration");
        assert_eq!(bare.kind, IntentKind::GenerateConfig);
        assert!(bare.packages().is_empty());
    }

    #[test]
    fn test_search_query_entity() {
        let intent = IntentRecognizer::new().recognize("search for a text editor");
        assert_eq!(intent.entity("query"), Some("text editor"));
    }

    #[test]
    fn test_deterministic() {
        let r = IntentRecognizer::new();
        assert_eq!(r.recognize("install firefox"), r.recognize("install firefox"));
    }

    #[test]
    fn test_mutating_kinds() {
        for kind in IntentKind::ALL {
            let expected = matches!(
                kind,
                IntentKind::Install
                    | IntentKind::Remove
                    | IntentKind::Update
                    | IntentKind::Rollback
                    | IntentKind::GarbageCollect
            );
            assert_eq!(kind.is_mutating(), expected, "{}", kind);
            assert_eq!(IntentKind::parse(kind.as_str()), Some(kind));
        }
    }
}
