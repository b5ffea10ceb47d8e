//! Luminous Common - the ask-nix engine
//!
//! Natural-language NixOS requests in, safe explanations or executions out.
//! Nothing here runs a command that was not built from a recognized intent
//! and checked against the allow-list.

pub mod cache;
pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod error_translator;
pub mod executor;
pub mod input_validator;
pub mod intent;
pub mod knowledge;
pub mod learner;
pub mod paths;
pub mod pipeline;

pub use cache::{should_cache, CacheContext, CacheStats, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{build_command, build_for_intent, Command};
pub use config::LuminousConfig;
pub use error::{LuminousError, Result};
pub use error_translator::{ErrorTranslator, NixErrorKind, TranslatedError};
pub use executor::{
    ExecutionMode, ExecutionResult, ExecutionStatus, FakeProcessRunner, ProcessRunner,
    SafeExecutor, TokioProcessRunner,
};
pub use input_validator::{InputKind, InputValidator, ValidationOutcome};
pub use intent::{Intent, IntentKind, IntentRecognizer};
pub use knowledge::KnowledgeBase;
pub use learner::{PreferenceLearner, PreferenceStore, Verbosity};
pub use pipeline::{AskOptions, Pipeline, Response, ResponseStatus, Suggestion, SuggestionKind};
