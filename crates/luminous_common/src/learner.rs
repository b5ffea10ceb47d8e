//! Preference learning from observed commands.
//!
//! Learns three things, each only after repeated evidence:
//! - aliases: a failed query followed by a successful one that differs in
//!   exactly one word ("grab firefox" -> "install firefox" teaches grab=install)
//! - sequences: successful command A followed by successful command B
//! - error recoveries: the command that succeeded right after an error
//!
//! Verbosity drops from detailed to concise as the user gains experience.
//!
//! State is one JSON record per user, rewritten on every observation. The
//! last few observations are part of the record so adjacency survives
//! across separate CLI runs.

use crate::clock::{Clock, SystemClock};
use crate::config::LearningConfig;
use crate::error::{LuminousError, Result};
use crate::paths;
use chrono::{DateTime, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Observations kept for adjacency checks
const RECENT_LIMIT: usize = 10;

/// Error messages are matched on this many leading characters
const ERROR_KEY_CHARS: usize = 50;

/// Shortest text a partial error match may rest on
const MIN_PARTIAL_ERROR_CHARS: usize = 12;

/// Words that never form an alias on their own
const ARTICLES: &[&str] = &["the", "a", "an"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Detailed,
    Normal,
    Concise,
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detailed => "detailed",
            Self::Normal => "normal",
            Self::Concise => "concise",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub text: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Everything learned about one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: String,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// (trigger, next)
    #[serde(default)]
    pub command_sequences: Vec<(String, String)>,
    #[serde(default)]
    pub verbosity: Verbosity,
    /// Corroboration counts, keyed "alias:<from>-><to>" and "sequence:<a> -> <b>"
    #[serde(default)]
    pub observation_counts: BTreeMap<String, u32>,
    #[serde(default)]
    pub command_frequency: BTreeMap<String, u64>,
    /// Error prefix -> commands that fixed it, oldest first
    #[serde(default)]
    pub error_solutions: BTreeMap<String, Vec<String>>,
    /// Local hours (0-23) the user has been active in
    #[serde(default)]
    pub active_hours: BTreeSet<u32>,
    #[serde(default)]
    pub recent: VecDeque<Observation>,
    #[serde(default)]
    pub total_observations: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserPreference {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            aliases: BTreeMap::new(),
            command_sequences: Vec::new(),
            verbosity: Verbosity::Detailed,
            observation_counts: BTreeMap::new(),
            command_frequency: BTreeMap::new(),
            error_solutions: BTreeMap::new(),
            active_hours: BTreeSet::new(),
            recent: VecDeque::new(),
            total_observations: 0,
            updated_at: None,
        }
    }
}

/// What a single observation taught
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearnOutcome {
    pub learned_alias: Option<(String, String)>,
    pub learned_sequence: Option<(String, String)>,
    pub learned_error_fix: Option<String>,
}

impl LearnOutcome {
    pub fn learned_anything(&self) -> bool {
        self.learned_alias.is_some()
            || self.learned_sequence.is_some()
            || self.learned_error_fix.is_some()
    }
}

/// Transparent view of what has been learned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningSummary {
    pub user_id: String,
    pub total_observations: u64,
    pub verbosity: Verbosity,
    pub aliases: BTreeMap<String, String>,
    pub command_sequences: Vec<(String, String)>,
    /// Most used commands, most frequent first
    pub top_commands: Vec<(String, u64)>,
    pub errors_learned: usize,
    pub active_hours: String,
}

// ============================================================================
// Preference Store
// ============================================================================

/// One JSON file per user id
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    dir: PathBuf,
}

impl PreferenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn open_default() -> Self {
        Self::new(paths::preferences_dir())
    }

    pub fn path_for(&self, user_id: &str) -> PathBuf {
        let safe: String = user_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let safe = safe.trim_start_matches('.');
        let name = if safe.is_empty() { "default" } else { safe };
        self.dir.join(format!("{}.json", name))
    }

    /// Missing record -> fresh preferences. Unreadable record is set aside.
    pub fn load(&self, user_id: &str) -> Result<UserPreference> {
        let path = self.path_for(user_id);
        if !path.exists() {
            return Ok(UserPreference::new(user_id));
        }
        let content = fs::read_to_string(&path)?;
        match serde_json::from_str::<UserPreference>(&content) {
            Ok(prefs) => Ok(prefs),
            Err(e) => {
                let aside = path.with_extension("json.corrupt");
                warn!(
                    "Preference record {} is unreadable ({}), moving it to {}",
                    path.display(),
                    e,
                    aside.display()
                );
                fs::rename(&path, &aside)?;
                Ok(UserPreference::new(user_id))
            }
        }
    }

    /// Atomic write (temp file + rename); concurrent writers: last one wins
    pub fn save(&self, prefs: &UserPreference) -> Result<()> {
        let path = self.path_for(&prefs.user_id);
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension(format!("json.tmp.{}", std::process::id()));
        fs::write(&tmp, serde_json::to_vec_pretty(prefs)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn delete(&self, user_id: &str) -> Result<bool> {
        let path = self.path_for(user_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LuminousError::Io(e)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

// ============================================================================
// Preference Learner
// ============================================================================

pub struct PreferenceLearner {
    config: LearningConfig,
    store: PreferenceStore,
    prefs: UserPreference,
    clock: Arc<dyn Clock>,
}

impl PreferenceLearner {
    /// Load the configured user's preferences from `store`
    pub fn load(config: LearningConfig, store: PreferenceStore) -> Result<Self> {
        let prefs = store.load(&config.user_id)?;
        Ok(Self {
            config,
            store,
            prefs,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn preferences(&self) -> &UserPreference {
        &self.prefs
    }

    /// Record one completed command. Must be called in completion order.
    pub fn observe_command(
        &mut self,
        raw_text: &str,
        success: bool,
        error: Option<&str>,
    ) -> Result<LearnOutcome> {
        if !self.config.enabled {
            return Ok(LearnOutcome::default());
        }

        let text = normalize(raw_text);
        if text.is_empty() {
            return Ok(LearnOutcome::default());
        }

        let now = self.clock.now();
        let mut outcome = LearnOutcome::default();

        self.prefs.total_observations += 1;
        *self.prefs.command_frequency.entry(text.clone()).or_default() += 1;
        self.prefs
            .active_hours
            .insert(now.with_timezone(&Local).hour());

        let previous = self.prefs.recent.back().cloned();
        if let Some(prev) = &previous {
            if success && !prev.success {
                outcome.learned_alias = self.learn_correction(&prev.text, &text);
            }
            if success && prev.success && prev.text != text {
                outcome.learned_sequence = self.learn_sequence(&prev.text, &text);
            }
        }

        // Error recovery: the first success after a failure with an error
        if success {
            if let Some(prev_error) = self.pending_error() {
                let key = error_key(&prev_error);
                let fixes = self.prefs.error_solutions.entry(key.clone()).or_default();
                if fixes.last() != Some(&text) {
                    fixes.push(text.clone());
                }
                info!("Learned error recovery: {} -> {}", key, text);
                outcome.learned_error_fix = Some(text.clone());
            }
        }

        self.prefs.recent.push_back(Observation {
            text,
            success,
            error: error.map(str::to_string),
            at: now,
        });
        while self.prefs.recent.len() > RECENT_LIMIT {
            self.prefs.recent.pop_front();
        }

        self.prefs.verbosity = self.verbosity_for(self.prefs.total_observations);
        self.prefs.updated_at = Some(now);
        self.store.save(&self.prefs)?;

        Ok(outcome)
    }

    /// Error of the most recent observation, if it failed with one
    fn pending_error(&self) -> Option<String> {
        self.prefs
            .recent
            .back()
            .filter(|o| !o.success)
            .and_then(|o| o.error.clone())
            .filter(|e| !e.trim().is_empty())
    }

    fn learn_correction(&mut self, failed: &str, succeeded: &str) -> Option<(String, String)> {
        let failed_words: Vec<&str> = failed.split(' ').collect();
        let succeeded_words: Vec<&str> = succeeded.split(' ').collect();
        if failed_words.len() != succeeded_words.len() {
            return None;
        }

        let mut differences = failed_words
            .iter()
            .zip(&succeeded_words)
            .filter(|(f, s)| f != s);
        let (from, to) = differences.next()?;
        if differences.next().is_some() || ARTICLES.contains(from) || ARTICLES.contains(to) {
            return None;
        }

        let count = self
            .prefs
            .observation_counts
            .entry(format!("alias:{}->{}", from, to))
            .or_default();
        *count += 1;
        debug!("Alias candidate {} -> {} seen {} time(s)", from, to, count);

        if *count >= self.config.effective_alias_threshold()
            && self.prefs.aliases.get(*from).map(String::as_str) != Some(*to)
        {
            info!("Learned alias: '{}' means '{}'", from, to);
            self.prefs.aliases.insert(from.to_string(), to.to_string());
            return Some((from.to_string(), to.to_string()));
        }
        None
    }

    fn learn_sequence(&mut self, first: &str, next: &str) -> Option<(String, String)> {
        let count = self
            .prefs
            .observation_counts
            .entry(format!("sequence:{} -> {}", first, next))
            .or_default();
        *count += 1;

        let pair = (first.to_string(), next.to_string());
        if *count >= self.config.effective_sequence_threshold()
            && !self.prefs.command_sequences.contains(&pair)
        {
            info!("Learned command sequence: {} -> {}", first, next);
            self.prefs.command_sequences.push(pair.clone());
            return Some(pair);
        }
        None
    }

    /// Rewrite `text` with learned aliases, or None when nothing applies
    pub fn suggest_alias(&self, text: &str) -> Option<String> {
        let normalized = normalize(text);
        let mut changed = false;
        let rewritten: Vec<&str> = normalized
            .split(' ')
            .map(|word| match self.prefs.aliases.get(word) {
                Some(real) => {
                    changed = true;
                    real.as_str()
                }
                None => word,
            })
            .collect();
        changed.then(|| rewritten.join(" "))
    }

    /// The command that usually follows `text`
    pub fn suggest_next_command(&self, text: &str) -> Option<String> {
        let normalized = normalize(text);
        self.prefs
            .command_sequences
            .iter()
            .find(|(trigger, _)| *trigger == normalized)
            .map(|(_, next)| next.clone())
    }

    /// A command that fixed a similar error before
    pub fn suggest_error_fix(&self, error: &str) -> Option<String> {
        let needle = error.trim();
        if needle.is_empty() {
            return None;
        }
        let key = error_key(needle);
        if let Some(fix) = self.prefs.error_solutions.get(&key).and_then(|f| f.last()) {
            return Some(fix.clone());
        }
        let partial = |short: &str, long: &str| {
            short.chars().count() >= MIN_PARTIAL_ERROR_CHARS && long.contains(short)
        };
        self.prefs
            .error_solutions
            .iter()
            .find(|(k, _)| partial(k.as_str(), needle) || partial(needle, k.as_str()))
            .and_then(|(_, fixes)| fixes.last().cloned())
    }

    pub fn get_verbosity_preference(&self) -> Verbosity {
        self.verbosity_for(self.prefs.total_observations)
    }

    fn verbosity_for(&self, total: u64) -> Verbosity {
        if total < self.config.verbosity_normal_after {
            Verbosity::Detailed
        } else if total < self.config.verbosity_concise_after {
            Verbosity::Normal
        } else {
            Verbosity::Concise
        }
    }

    pub fn summary(&self) -> LearningSummary {
        let mut top: Vec<(String, u64)> = self
            .prefs
            .command_frequency
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(5);

        LearningSummary {
            user_id: self.prefs.user_id.clone(),
            total_observations: self.prefs.total_observations,
            verbosity: self.get_verbosity_preference(),
            aliases: self.prefs.aliases.clone(),
            command_sequences: self.prefs.command_sequences.clone(),
            top_commands: top,
            errors_learned: self.prefs.error_solutions.len(),
            active_hours: describe_hours(&self.prefs.active_hours),
        }
    }

    /// Forget everything about this user, on disk too
    pub fn reset(&mut self) -> Result<()> {
        self.store.delete(&self.prefs.user_id)?;
        self.prefs = UserPreference::new(&self.config.user_id);
        info!("Cleared learned preferences for {}", self.config.user_id);
        Ok(())
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn error_key(error: &str) -> String {
    error.trim().chars().take(ERROR_KEY_CHARS).collect()
}

fn describe_hours(hours: &BTreeSet<u32>) -> String {
    if hours.is_empty() {
        return "no activity yet".to_string();
    }
    let bucket = |h: &u32| match h {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=21 => "evening",
        _ => "night",
    };
    let mut parts: Vec<&str> = Vec::new();
    for h in hours {
        let name = bucket(h);
        if !parts.contains(&name) {
            parts.push(name);
        }
    }
    parts.join(", ")
}
