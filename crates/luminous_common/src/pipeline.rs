//! Request pipeline
//!
//! raw text -> validate -> recognize -> cache -> knowledge -> build
//! -> execute | explain -> response, with the learner observing every
//! outcome in completion order.
//!
//! The pipeline owns every component. The CLI constructs one per process
//! and calls `ask` once; tests construct it from parts with a fake runner.

use crate::cache::{should_cache, CacheContext, ResponseCache};
use crate::command::{build_for_intent, Command};
use crate::config::LuminousConfig;
use crate::error::Result;
use crate::error_translator::{ErrorTranslator, TranslatedError};
use crate::executor::{
    ExecutionMode, ExecutionResult, ExecutionStatus, ProcessRunner, SafeExecutor,
};
use crate::input_validator::{InputKind, InputValidator};
use crate::intent::{Intent, IntentKind, IntentRecognizer};
use crate::knowledge::{KnowledgeBase, PackageInfo, Solution};
use crate::learner::{PreferenceLearner, PreferenceStore, Verbosity};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a request ended, and therefore the exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    /// Input or command rejected before anything ran
    ValidationFailed,
    /// Intent could not be determined with enough confidence
    NotUnderstood,
    /// The command ran and failed
    ExecutionFailed,
    /// The command ran past its timeout
    TimedOut,
}

impl ResponseStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::ValidationFailed | Self::NotUnderstood => 1,
            Self::ExecutionFailed | Self::TimedOut => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::ValidationFailed => "validation_failed",
            Self::NotUnderstood => "not_understood",
            Self::ExecutionFailed => "execution_failed",
            Self::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    /// Learned rewrite of the query
    Alias,
    /// What usually comes next
    NextCommand,
    /// What fixed this error before
    ErrorFix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub text: String,
}

/// Everything the presentation layer needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub query: String,
    pub status: ResponseStatus,
    /// One-line summary for people
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<Solution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<PackageInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_help: Option<TranslatedError>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    pub verbosity: Verbosity,
    pub from_cache: bool,
    pub duration_ms: f64,
}

impl Response {
    fn new(query: &str, status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            query: query.to_string(),
            status,
            message: message.into(),
            intent: None,
            solution: None,
            command: None,
            execution: None,
            packages: None,
            error_help: None,
            suggestions: Vec::new(),
            verbosity: Verbosity::default(),
            from_cache: false,
            duration_ms: 0.0,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

/// The cached part of a response
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedAnswer {
    message: String,
    solution: Option<Solution>,
    command: Option<Command>,
    execution: Option<ExecutionResult>,
    packages: Option<Vec<PackageInfo>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AskOptions {
    pub mode: ExecutionMode,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Explain,
        }
    }
}

pub struct Pipeline {
    config: LuminousConfig,
    validator: InputValidator,
    recognizer: IntentRecognizer,
    knowledge: KnowledgeBase,
    executor: SafeExecutor,
    cache: ResponseCache,
    learner: PreferenceLearner,
    translator: ErrorTranslator,
}

impl Pipeline {
    /// Open every store at its default location and run real processes
    pub fn open(config: LuminousConfig) -> Result<Self> {
        let knowledge = KnowledgeBase::open_default()?;
        let cache = ResponseCache::open_default(config.cache.clone());
        let learner = PreferenceLearner::load(config.learning.clone(), PreferenceStore::open_default())?;
        let executor = SafeExecutor::new(config.executor.clone());
        Ok(Self::from_parts(config, knowledge, cache, learner, executor))
    }

    pub fn from_parts(
        config: LuminousConfig,
        knowledge: KnowledgeBase,
        cache: ResponseCache,
        learner: PreferenceLearner,
        executor: SafeExecutor,
    ) -> Self {
        Self {
            validator: InputValidator::with_allowed_programs(
                config.executor.allowed_programs.clone(),
            ),
            recognizer: IntentRecognizer::new(),
            translator: ErrorTranslator::new(),
            config,
            knowledge,
            executor,
            cache,
            learner,
        }
    }

    /// Swap the process runner (tests)
    pub fn with_runner(mut self, runner: Box<dyn ProcessRunner>) -> Self {
        self.executor = SafeExecutor::with_runner(self.config.executor.clone(), runner);
        self
    }

    pub fn config(&self) -> &LuminousConfig {
        &self.config
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn learner(&self) -> &PreferenceLearner {
        &self.learner
    }

    pub fn learner_mut(&mut self) -> &mut PreferenceLearner {
        &mut self.learner
    }

    /// Answer one query. Err only for internal failures.
    pub async fn ask(&mut self, query: &str, options: AskOptions) -> Result<Response> {
        let start = Instant::now();
        let mut response = self.answer(query, options).await?;
        response.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        response.verbosity = self.learner.get_verbosity_preference();
        Ok(response)
    }

    async fn answer(&mut self, query: &str, options: AskOptions) -> Result<Response> {
        let validation = self.validator.validate(query, InputKind::Nlp);
        if !validation.valid {
            let reason = validation
                .reason
                .unwrap_or_else(|| "Input was rejected".to_string());
            info!("Rejected input: {}", reason);
            // Rejected input is not a correction attempt; the learner never sees it
            return Ok(Response::new(query, ResponseStatus::ValidationFailed, reason));
        }
        let text = validation.sanitized;

        let intent = self.recognizer.recognize(&text);
        if intent.kind == IntentKind::Unknown
            || intent.confidence < self.config.recognizer.min_confidence
        {
            return self.not_understood(&text, intent);
        }

        let dry_run = options.mode == ExecutionMode::Explain;
        let context = CacheContext::new(intent.kind.as_str(), dry_run);
        if should_cache(intent.kind.as_str()) {
            if let Some(value) = self.cache.get(&text, &context) {
                match serde_json::from_value::<CachedAnswer>(value) {
                    Ok(cached) => {
                        debug!("Answered '{}' from cache", text);
                        let mut response = Response::new(&text, ResponseStatus::Ok, cached.message);
                        response.solution = cached.solution;
                        response.command = cached.command;
                        response.execution = cached.execution;
                        response.packages = cached.packages;
                        // Results stored by a later --execute search outrank the snapshot
                        if dry_run && intent.kind == IntentKind::Search {
                            if let Some(term) = intent.entity("query") {
                                if let Some(fresh) = self.knowledge.search_cache(term)? {
                                    response.packages = Some(fresh);
                                }
                            }
                        }
                        response.intent = Some(intent);
                        response.from_cache = true;
                        self.learner.observe_command(&text, true, None)?;
                        self.add_next_command(&mut response);
                        return Ok(response);
                    }
                    Err(e) => warn!("Ignoring cached answer of the wrong shape: {}", e),
                }
            }
        }

        let solution = self.knowledge.get_solution(&intent)?;
        let mut response = Response::new(&text, ResponseStatus::Ok, solution.solution.clone());
        response.intent = Some(intent.clone());

        match build_for_intent(&intent) {
            Some(command) => {
                self.run_command(&mut response, &intent, command, options.mode)
                    .await?;
            }
            None if !solution.found => {
                response.status = ResponseStatus::NotUnderstood;
            }
            None => {}
        }
        response.solution = Some(solution);

        // The cache refuses mutating kinds itself and counts the refusal
        if response.is_success() {
            let cached = CachedAnswer {
                message: response.message.clone(),
                solution: response.solution.clone(),
                command: response.command.clone(),
                execution: response.execution.clone(),
                packages: response.packages.clone(),
            };
            self.cache
                .set(&text, &context, serde_json::to_value(&cached)?);
        }

        let error = response
            .execution
            .as_ref()
            .and_then(|e| e.error.clone())
            .or_else(|| (!response.is_success()).then(|| response.message.clone()));
        self.learner
            .observe_command(&text, response.is_success(), error.as_deref())?;

        if response.is_success() {
            self.add_next_command(&mut response);
        }
        Ok(response)
    }

    fn not_understood(&mut self, text: &str, intent: Intent) -> Result<Response> {
        let mut response = Response::new(
            text,
            ResponseStatus::NotUnderstood,
            "I'm not sure what you want to do. Try 'install firefox', 'search for an editor' or 'help'",
        );
        if let Some(rewritten) = self.learner.suggest_alias(text) {
            response.suggestions.push(Suggestion {
                kind: SuggestionKind::Alias,
                text: rewritten,
            });
        }
        response.intent = Some(intent);
        // Failures feed alias learning when the next query succeeds
        self.learner.observe_command(text, false, None)?;
        Ok(response)
    }

    async fn run_command(
        &mut self,
        response: &mut Response,
        intent: &Intent,
        command: Command,
        mode: ExecutionMode,
    ) -> Result<()> {
        if !command.safe {
            response.status = ResponseStatus::ValidationFailed;
            response.message = command
                .unsafe_reason
                .clone()
                .unwrap_or_else(|| "That command is not safe to run".to_string());
            response.command = Some(command);
            return Ok(());
        }

        let search_term = (intent.kind == IntentKind::Search)
            .then(|| intent.entity("query").map(str::to_string))
            .flatten();

        if mode == ExecutionMode::Explain {
            if let Some(term) = &search_term {
                response.packages = self.knowledge.search_cache(term)?;
            }
        }

        let execution = self.executor.execute(&command, mode).await;
        response.status = match execution.status {
            ExecutionStatus::Success | ExecutionStatus::Explained => ResponseStatus::Ok,
            ExecutionStatus::Rejected => ResponseStatus::ValidationFailed,
            ExecutionStatus::NonZeroExit | ExecutionStatus::SpawnFailed => {
                ResponseStatus::ExecutionFailed
            }
            ExecutionStatus::Timeout => ResponseStatus::TimedOut,
        };

        match response.status {
            ResponseStatus::Ok if execution.status == ExecutionStatus::Success => {
                if let Some(term) = &search_term {
                    match PackageInfo::from_search_json(&execution.output) {
                        Ok(packages) => {
                            self.knowledge.cache_search(term, &packages)?;
                            response.message = format!("Found {} package(s)", packages.len());
                            response.packages = Some(packages);
                        }
                        Err(e) => warn!("Could not parse search output: {}", e),
                    }
                } else {
                    response.message = format!("Done: {}", command.description);
                }
            }
            ResponseStatus::Ok => {}
            _ => {
                let error = execution.error.clone().unwrap_or_default();
                let failed = response.status == ResponseStatus::ExecutionFailed;
                response.message = if failed {
                    format!("The command failed: {}", first_line(&error))
                } else {
                    error.clone()
                };
                if failed && execution.would_execute && !error.is_empty() {
                    let mut help = self.translator.translate(&error);
                    if let Some(problem) = self.knowledge.get_problem_solution(&error)? {
                        debug!("Known problem '{}' in command output", problem.symptom);
                        if !help.suggested_fixes.contains(&problem.solution) {
                            help.suggested_fixes.push(problem.solution);
                        }
                    }
                    response.error_help = Some(help);
                    if let Some(fix) = self.learner.suggest_error_fix(&error) {
                        response.suggestions.push(Suggestion {
                            kind: SuggestionKind::ErrorFix,
                            text: fix,
                        });
                    }
                }
            }
        }

        response.command = Some(command);
        response.execution = Some(execution);
        Ok(())
    }

    fn add_next_command(&self, response: &mut Response) {
        if let Some(next) = self.learner.suggest_next_command(&response.query) {
            response.suggestions.push(Suggestion {
                kind: SuggestionKind::NextCommand,
                text: next,
            });
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}
