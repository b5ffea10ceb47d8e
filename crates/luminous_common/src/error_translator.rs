//! Nix error translation.
//!
//! Turns raw stderr from a failed Nix command into a plain-language
//! explanation plus concrete next steps. First matching pattern wins;
//! unrecognized errors get a generic translation, never nothing.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NixErrorKind {
    MissingAttribute,
    PackageNotFound,
    Collision,
    UndefinedVariable,
    SyntaxError,
    BuildFailure,
    PermissionDenied,
    HashMismatch,
    DiskFull,
    ExperimentalFeature,
    ReadOnlyFileSystem,
    NetworkError,
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedError {
    pub kind: NixErrorKind,
    pub explanation: String,
    pub suggested_fixes: Vec<String>,
}

type Handler = fn(&Captures<'_>) -> TranslatedError;

static PATTERNS: LazyLock<Vec<(Regex, Handler)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)attribute '([^']+)' missing").unwrap(),
            missing_attribute as Handler,
        ),
        (
            Regex::new(r"(?i)(?:package|flake output) '([^']+)' (?:not found|does not provide)").unwrap(),
            package_not_found as Handler,
        ),
        (
            Regex::new(r"(?i)collision between '?([^'\s]+)'? and '?([^'\s]+)'?").unwrap(),
            collision as Handler,
        ),
        (
            Regex::new(r"(?i)undefined variable '([^']+)'").unwrap(),
            undefined_variable as Handler,
        ),
        (
            Regex::new(r"(?i)syntax error, unexpected ([^,\n]+)").unwrap(),
            syntax_error as Handler,
        ),
        (
            Regex::new(r"(?i)builder for '([^']+)' failed").unwrap(),
            build_failure as Handler,
        ),
        (
            Regex::new(r"(?i)hash mismatch").unwrap(),
            hash_mismatch as Handler,
        ),
        (
            Regex::new(r"(?i)experimental nix feature '([^']+)' is disabled").unwrap(),
            experimental_feature as Handler,
        ),
        (
            Regex::new(r"(?i)no space left on device").unwrap(),
            disk_full as Handler,
        ),
        (
            Regex::new(r"(?i)read-only file system").unwrap(),
            read_only as Handler,
        ),
        (
            Regex::new(r"(?i)permission denied|must be run as root|are you root").unwrap(),
            permission_denied as Handler,
        ),
        (
            Regex::new(r"(?i)unable to download|could not resolve host|network is unreachable").unwrap(),
            network_error as Handler,
        ),
    ]
});

#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorTranslator;

impl ErrorTranslator {
    pub fn new() -> Self {
        Self
    }

    pub fn translate(&self, stderr: &str) -> TranslatedError {
        PATTERNS
            .iter()
            .find_map(|(re, handler)| re.captures(stderr).map(|caps| handler(&caps)))
            .unwrap_or_else(unrecognized)
    }
}

fn fixes(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn group<'a>(caps: &'a Captures<'_>, i: usize) -> &'a str {
    caps.get(i).map(|m| m.as_str().trim()).unwrap_or("")
}

fn missing_attribute(caps: &Captures<'_>) -> TranslatedError {
    let name = group(caps, 1);
    TranslatedError {
        kind: NixErrorKind::MissingAttribute,
        explanation: format!("There is no package or option called '{}' in nixpkgs", name),
        suggested_fixes: vec![
            format!("Search for the right name: ask-nix \"search {}\"", name),
            "Check the spelling and capitalization".to_string(),
        ],
    }
}

fn package_not_found(caps: &Captures<'_>) -> TranslatedError {
    let name = group(caps, 1);
    TranslatedError {
        kind: NixErrorKind::PackageNotFound,
        explanation: format!("Nix could not find a package named '{}'", name),
        suggested_fixes: vec![
            format!("Search for similar packages: ask-nix \"search {}\"", name),
            "Update your channels; newer packages may be missing from old ones".to_string(),
        ],
    }
}

fn collision(caps: &Captures<'_>) -> TranslatedError {
    TranslatedError {
        kind: NixErrorKind::Collision,
        explanation: format!(
            "Two packages provide the same file: {} and {}",
            group(caps, 1),
            group(caps, 2)
        ),
        suggested_fixes: fixes(&[
            "Remove one of the two packages",
            "Give one of them a priority with lib.hiPrio",
        ]),
    }
}

fn undefined_variable(caps: &Captures<'_>) -> TranslatedError {
    let name = group(caps, 1);
    TranslatedError {
        kind: NixErrorKind::UndefinedVariable,
        explanation: format!("The configuration uses '{}' but it is not defined", name),
        suggested_fixes: vec![
            format!("Check the spelling of '{}'", name),
            "Make sure the file's argument list includes it, e.g. { config, pkgs, ... }"
                .to_string(),
        ],
    }
}

fn syntax_error(caps: &Captures<'_>) -> TranslatedError {
    TranslatedError {
        kind: NixErrorKind::SyntaxError,
        explanation: format!(
            "The Nix file has a syntax error near {}",
            group(caps, 1)
        ),
        suggested_fixes: fixes(&[
            "Look for a missing semicolon at the end of the previous line",
            "Check that every { [ ( has a matching } ] )",
        ]),
    }
}

fn build_failure(caps: &Captures<'_>) -> TranslatedError {
    TranslatedError {
        kind: NixErrorKind::BuildFailure,
        explanation: format!("Building {} failed", group(caps, 1)),
        suggested_fixes: fixes(&[
            "Read the build log with nix log <derivation>",
            "Try again after updating channels; the failure may already be fixed",
        ]),
    }
}

fn hash_mismatch(_: &Captures<'_>) -> TranslatedError {
    TranslatedError {
        kind: NixErrorKind::HashMismatch,
        explanation: "A downloaded file does not match the hash Nix expected".to_string(),
        suggested_fixes: fixes(&[
            "Update the hash in your expression to the one Nix reports as 'got'",
            "If you did not change anything, the upstream file changed; update channels",
        ]),
    }
}

fn experimental_feature(caps: &Captures<'_>) -> TranslatedError {
    let feature = group(caps, 1);
    TranslatedError {
        kind: NixErrorKind::ExperimentalFeature,
        explanation: format!("The Nix feature '{}' is not enabled", feature),
        suggested_fixes: vec![
            "Add nix.settings.experimental-features = [ \"nix-command\" \"flakes\" ]; to configuration.nix".to_string(),
            format!("Or pass --extra-experimental-features {} once", feature),
        ],
    }
}

fn disk_full(_: &Captures<'_>) -> TranslatedError {
    TranslatedError {
        kind: NixErrorKind::DiskFull,
        explanation: "The disk is full".to_string(),
        suggested_fixes: fixes(&[
            "Free space: ask-nix \"clean up\"",
            "Delete old generations you no longer need",
        ]),
    }
}

fn read_only(_: &Captures<'_>) -> TranslatedError {
    TranslatedError {
        kind: NixErrorKind::ReadOnlyFileSystem,
        explanation: "That location is managed by NixOS and cannot be edited directly".to_string(),
        suggested_fixes: fixes(&[
            "Make the change in /etc/nixos/configuration.nix and rebuild",
        ]),
    }
}

fn permission_denied(_: &Captures<'_>) -> TranslatedError {
    TranslatedError {
        kind: NixErrorKind::PermissionDenied,
        explanation: "The command needs administrator rights".to_string(),
        suggested_fixes: fixes(&[
            "Run it again with --execute from an account that can use sudo",
            "Install into your user profile instead, which needs no root",
        ]),
    }
}

fn network_error(_: &Captures<'_>) -> TranslatedError {
    TranslatedError {
        kind: NixErrorKind::NetworkError,
        explanation: "Nix could not reach the network".to_string(),
        suggested_fixes: fixes(&[
            "Check your internet connection",
            "Try again later; the binary cache may be unavailable",
        ]),
    }
}

fn unrecognized() -> TranslatedError {
    TranslatedError {
        kind: NixErrorKind::Unrecognized,
        explanation: "The command failed with an error I don't recognize yet".to_string(),
        suggested_fixes: fixes(&[
            "Read the error output above for the first line starting with 'error:'",
            "Search the NixOS Discourse for the exact message",
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(stderr: &str) -> NixErrorKind {
        ErrorTranslator::new().translate(stderr).kind
    }

    #[test]
    fn test_known_errors() {
        assert_eq!(
            kind("error: attribute 'fierfox' missing\n at «string»:1:1"),
            NixErrorKind::MissingAttribute
        );
        assert_eq!(
            kind("error: collision between '/nix/store/a-vim/bin/vim' and '/nix/store/b-neovim/bin/vim'"),
            NixErrorKind::Collision
        );
        assert_eq!(
            kind("error: experimental Nix feature 'flakes' is disabled"),
            NixErrorKind::ExperimentalFeature
        );
        assert_eq!(kind("cp: No space left on device"), NixErrorKind::DiskFull);
        assert_eq!(kind("error: builder for '/nix/store/x.drv' failed with exit code 1"), NixErrorKind::BuildFailure);
    }

    #[test]
    fn test_entity_in_explanation() {
        let t = ErrorTranslator::new().translate("error: undefined variable 'pkgz'");
        assert_eq!(t.kind, NixErrorKind::UndefinedVariable);
        assert!(t.explanation.contains("pkgz"));
        assert!(!t.suggested_fixes.is_empty());
    }

    #[test]
    fn test_unrecognized_still_helps() {
        let t = ErrorTranslator::new().translate("segfault in the matrix");
        assert_eq!(t.kind, NixErrorKind::Unrecognized);
        assert!(!t.suggested_fixes.is_empty());
    }
}
