//! Command Builder
//!
//! Maps an intent kind and its target to a fixed argv. No shell is ever
//! involved: each package (or the search term) is its own argument, never
//! spliced into a string that something else parses. Targets that fail
//! validation still produce a Command, but one marked `safe = false` that
//! the executor refuses.

use crate::input_validator::{InputKind, InputValidator};
use crate::intent::{Intent, IntentKind};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SYSTEM_PROFILE: &str = "/nix/var/nix/profiles/system";

/// A concrete external command. Never mutated after it is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    pub safe: bool,
    pub requires_privilege: bool,
    pub description: String,
    /// The request this command answers
    pub intent: IntentKind,
    /// Why the command is unsafe, when it is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsafe_reason: Option<String>,
}

impl Command {
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for Command {
    /// Shell-like rendering for people; never executed as a string
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.argv().iter().map(|a| display_quote(a)).collect();
        f.write_str(&rendered.join(" "))
    }
}

fn display_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./#=:+@".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Build the command for an intent. None when the intent has no command
/// (Explain, Help, GenerateConfig, Unknown) or needs a target it does not
/// have. Install and Remove take one or more whitespace-separated packages.
pub fn build_command(kind: IntentKind, target: Option<&str>) -> Option<Command> {
    let validator = InputValidator::new();

    let (program, args, requires_privilege, description, checked): (
        &str,
        Vec<String>,
        bool,
        String,
        Vec<(InputKind, &str)>,
    ) = match kind {
        IntentKind::Install => {
            let pkgs = package_targets(target?)?;
            let mut args = vec!["profile".to_string(), "install".to_string()];
            args.extend(pkgs.iter().map(|p| format!("nixpkgs#{}", p)));
            (
                "nix",
                args,
                false,
                format!("Install {} into your user profile", pkgs.join(", ")),
                pkgs.iter().map(|p| (InputKind::Package, *p)).collect(),
            )
        }
        IntentKind::Remove => {
            let pkgs = package_targets(target?)?;
            let mut args = vec!["profile".to_string(), "remove".to_string()];
            args.extend(pkgs.iter().map(|p| p.to_string()));
            (
                "nix",
                args,
                false,
                format!("Remove {} from your user profile", pkgs.join(", ")),
                pkgs.iter().map(|p| (InputKind::Package, *p)).collect(),
            )
        }
        IntentKind::Search => {
            let term = target?;
            (
                "nix",
                vec![
                    "search".into(),
                    "nixpkgs".into(),
                    term.to_string(),
                    "--json".into(),
                ],
                false,
                format!("Search nixpkgs for '{}'", term),
                vec![(InputKind::Nlp, term)],
            )
        }
        IntentKind::Update => (
            "nixos-rebuild",
            vec!["switch".into(), "--upgrade".into()],
            true,
            "Update channels and rebuild the system".to_string(),
            Vec::new(),
        ),
        IntentKind::Rollback => (
            "nixos-rebuild",
            vec!["switch".into(), "--rollback".into()],
            true,
            "Switch back to the previous system generation".to_string(),
            Vec::new(),
        ),
        IntentKind::ListGenerations => (
            "nix-env",
            vec![
                "--list-generations".into(),
                "-p".into(),
                SYSTEM_PROFILE.into(),
            ],
            false,
            "List system generations".to_string(),
            Vec::new(),
        ),
        IntentKind::ListInstalled => (
            "nix",
            vec!["profile".into(), "list".into()],
            false,
            "List packages in your user profile".to_string(),
            Vec::new(),
        ),
        IntentKind::GarbageCollect => (
            "nix-collect-garbage",
            vec!["-d".into()],
            true,
            "Delete old generations and unused store paths".to_string(),
            Vec::new(),
        ),
        IntentKind::Explain
        | IntentKind::Help
        | IntentKind::GenerateConfig
        | IntentKind::Unknown => return None,
    };

    let unsafe_reason = checked.into_iter().find_map(|(input_kind, value)| {
        if value.starts_with('-') {
            return Some(format!("'{}' would be read as an option", value));
        }
        let outcome = validator.validate(value, input_kind);
        if outcome.valid && outcome.sanitized == value {
            None
        } else {
            Some(
                outcome
                    .reason
                    .unwrap_or_else(|| format!("'{}' contains characters that were stripped", value)),
            )
        }
    });

    Some(Command {
        program: program.to_string(),
        args,
        safe: unsafe_reason.is_none(),
        requires_privilege,
        description,
        intent: kind,
        unsafe_reason,
    })
}

fn package_targets(target: &str) -> Option<Vec<&str>> {
    let pkgs: Vec<&str> = target.split_whitespace().collect();
    (!pkgs.is_empty()).then_some(pkgs)
}

/// Build the command for a recognized intent
pub fn build_for_intent(intent: &Intent) -> Option<Command> {
    let target = intent.entity("packages").or_else(|| intent.target());
    build_command(intent.kind, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_argv() {
        let cmd = build_command(IntentKind::Install, Some("firefox")).unwrap();
        assert!(cmd.safe);
        assert!(!cmd.requires_privilege);
        assert_eq!(cmd.argv(), vec!["nix", "profile", "install", "nixpkgs#firefox"]);
        assert_eq!(cmd.to_string(), "nix profile install nixpkgs#firefox");
    }

    #[test]
    fn test_several_packages_one_argument_each() {
        let intent = crate::intent::IntentRecognizer::new().recognize("install firefox and vim");
        let cmd = build_for_intent(&intent).unwrap();
        assert!(cmd.safe);
        assert_eq!(
            cmd.argv(),
            vec!["nix", "profile", "install", "nixpkgs#firefox", "nixpkgs#vim"]
        );
        assert_eq!(cmd.description, "Install firefox, vim into your user profile");

        // One bad name poisons the whole command
        let cmd = build_command(IntentKind::Remove, Some("vim ../etc")).unwrap();
        assert!(!cmd.safe);
    }

    #[test]
    fn test_no_command_for_informational_kinds() {
        assert!(build_command(IntentKind::GenerateConfig, Some("firefox")).is_none());
        assert!(build_command(IntentKind::Explain, Some("flake")).is_none());
        assert!(build_command(IntentKind::Help, None).is_none());
        assert!(build_command(IntentKind::Unknown, None).is_none());
        // A target is required for package operations
        assert!(build_command(IntentKind::Install, None).is_none());
    }

    #[test]
    fn test_bad_target_marks_unsafe() {
        let cmd = build_command(IntentKind::Install, Some("firefox;rm")).unwrap();
        assert!(!cmd.safe);
        assert!(cmd.unsafe_reason.is_some());

        let cmd = build_command(IntentKind::Remove, Some("rm")).unwrap();
        assert!(!cmd.safe);

        let cmd = build_command(IntentKind::Search, Some("--option")).unwrap();
        assert!(!cmd.safe);
    }

    #[test]
    fn test_privileged_kinds() {
        for kind in [
            IntentKind::Update,
            IntentKind::Rollback,
            IntentKind::GarbageCollect,
        ] {
            let cmd = build_command(kind, None).unwrap();
            assert!(cmd.requires_privilege, "{}", kind);
            assert!(cmd.safe);
        }
    }

    #[test]
    fn test_search_term_is_one_argument() {
        let cmd = build_command(IntentKind::Search, Some("text editor")).unwrap();
        assert!(cmd.safe);
        assert_eq!(cmd.args[2], "text editor");
        assert_eq!(cmd.to_string(), "nix search nixpkgs 'text editor' --json");
    }
}
