//! Knowledge records and the seed data every fresh store starts with.

use serde::{Deserialize, Serialize};

/// Search results older than this are ignored at read time
pub const SEARCH_CACHE_HOURS: i64 = 24;

/// Placeholder replaced by the intent's target in stored examples
pub const TARGET_PLACEHOLDER: &str = "<package>";

/// Answer for a recognized intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub found: bool,
    pub solution: String,
    pub example: String,
    pub explanation: String,
    #[serde(default)]
    pub methods: Vec<InstallMethod>,
    #[serde(default)]
    pub related: Vec<String>,
}

impl Solution {
    pub fn not_found(suggestion: impl Into<String>) -> Self {
        Self {
            found: false,
            solution: suggestion.into(),
            example: String::new(),
            explanation: String::new(),
            methods: Vec::new(),
            related: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallMethodKind {
    Declarative,
    HomeManager,
    Imperative,
    Shell,
}

/// One way to get a package onto the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallMethod {
    pub kind: InstallMethodKind,
    pub name: String,
    pub description: String,
    /// What to run or edit
    pub command: String,
    pub example: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
}

/// One package from `nix search`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

impl PackageInfo {
    /// Parse `nix search <flake> <term> --json` output.
    ///
    /// Shape: { "<attr path>": { "pname", "version", "description" } }.
    /// Sorted by name; entries without a pname fall back to the last
    /// attribute path segment.
    pub fn from_search_json(json: &str) -> serde_json::Result<Vec<PackageInfo>> {
        #[derive(Deserialize)]
        struct Hit {
            #[serde(default)]
            pname: Option<String>,
            #[serde(default)]
            version: String,
            #[serde(default)]
            description: String,
        }

        if json.trim().is_empty() {
            return Ok(Vec::new());
        }
        let hits: std::collections::BTreeMap<String, Hit> = serde_json::from_str(json)?;
        let mut packages: Vec<PackageInfo> = hits
            .into_iter()
            .map(|(attr, hit)| PackageInfo {
                name: hit
                    .pname
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| attr.rsplit('.').next().unwrap_or(&attr).to_string()),
                version: hit.version,
                description: hit.description,
            })
            .collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(packages)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemSolution {
    pub symptom: String,
    pub cause: String,
    pub solution: String,
    pub prevention: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestPractice {
    pub topic: String,
    pub practice: String,
    pub reason: String,
    pub example: String,
}

/// Short explanation of a NixOS concept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub topic: String,
    pub summary: String,
    pub example: String,
}

/// A hit from `search_knowledge`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum KnowledgeHit {
    Solution { key: String, solution: String, example: String },
    Problem(ProblemSolution),
    Concept(Concept),
}

/// (key, category, solution, example, explanation, related)
pub(crate) const SEED_SOLUTIONS: &[(&str, &str, &str, &str, &str, &str)] = &[
    (
        "install",
        "package",
        "Install the package declaratively or into your profile",
        "nix profile install nixpkgs#<package>",
        "Declarative installation is preferred: it is reproducible and rolls back with the system",
        "search,remove",
    ),
    (
        "remove",
        "package",
        "Remove the package from your profile",
        "nix profile remove <package>",
        "If the package was installed declaratively, delete it from configuration.nix and rebuild instead",
        "install,list_installed",
    ),
    (
        "search",
        "package",
        "Search nixpkgs for matching packages",
        "nix search nixpkgs <package>",
        "search.nixos.org offers the same data in a browser",
        "install",
    ),
    (
        "update",
        "system",
        "Update channels and rebuild the system",
        "sudo nixos-rebuild switch --upgrade",
        "Every rebuild creates a new generation, so an update can always be rolled back",
        "rollback,list_generations",
    ),
    (
        "rollback",
        "system",
        "Switch back to the previous system generation",
        "sudo nixos-rebuild switch --rollback",
        "Older generations also stay selectable from the boot menu",
        "update,list_generations",
    ),
    (
        "list_generations",
        "system",
        "Show the system generations",
        "nix-env --list-generations -p /nix/var/nix/profiles/system",
        "Each generation is a complete snapshot of the system you can return to",
        "rollback,garbage_collect",
    ),
    (
        "list_installed",
        "package",
        "List packages installed in your profile",
        "nix profile list",
        "System packages live in configuration.nix under environment.systemPackages",
        "install,remove",
    ),
    (
        "garbage_collect",
        "system",
        "Free disk space by deleting old generations and unused store paths",
        "sudo nix-collect-garbage -d",
        "After collecting, you can no longer roll back to the deleted generations",
        "list_generations",
    ),
    (
        "explain",
        "learning",
        "Here is what that means on NixOS",
        "",
        "Ask 'what is a flake' or 'what is a generation' for more",
        "help",
    ),
    (
        "configure_service",
        "service",
        "Enable services in the services section of configuration.nix",
        "services.openssh.enable = true;",
        "Services are managed declaratively in NixOS",
        "update",
    ),
    (
        "edit_config",
        "configuration",
        "Edit the NixOS configuration",
        "sudoedit /etc/nixos/configuration.nix",
        "The main system configuration file. Keep it under version control",
        "update",
    ),
    (
        "fix_wifi",
        "network",
        "Enable NetworkManager",
        "networking.networkmanager.enable = true;",
        "Most WiFi issues are solved by enabling NetworkManager",
        "edit_config",
    ),
];

/// (symptom, cause, solution, prevention)
pub(crate) const SEED_PROBLEMS: &[(&str, &str, &str, &str)] = &[
    (
        "command not found",
        "The package is not in your PATH",
        "Install the package or try it with nix-shell -p <package>",
        "Use declarative installation when possible",
    ),
    (
        "read-only file system",
        "Files under /etc and /nix/store are managed by NixOS",
        "Edit configuration.nix instead and rebuild",
        "NixOS manages /etc through the configuration",
    ),
    (
        "infinite recursion",
        "A circular definition in the configuration",
        "Check for options that reference themselves",
        "Use mkForce or mkDefault for overrides",
    ),
    (
        "attribute missing",
        "The package or option name is wrong",
        "Check the exact attribute name",
        "Use nix search to find exact names",
    ),
    (
        "collision between",
        "Two packages provide the same file",
        "Remove one of them or set a priority",
        "Avoid installing the same tool from two sources",
    ),
];

/// (topic, practice, reason, example)
pub(crate) const SEED_PRACTICES: &[(&str, &str, &str, &str)] = &[
    (
        "package_installation",
        "Prefer declarative installation",
        "It is reproducible and rolls back cleanly",
        "Add to environment.systemPackages in configuration.nix",
    ),
    (
        "system_updates",
        "Test a configuration before switching to it",
        "A broken switch is harder to undo than a failed test",
        "Run nixos-rebuild test before nixos-rebuild switch",
    ),
    (
        "configuration_management",
        "Keep the configuration modular",
        "Small files are easier to maintain and share",
        "Split configuration.nix into imported modules",
    ),
    (
        "disk_space",
        "Collect garbage regularly but keep recent generations",
        "Old generations pin store paths on disk",
        "nix-collect-garbage --delete-older-than 30d",
    ),
];

/// (topic, summary, example)
pub(crate) const SEED_CONCEPTS: &[(&str, &str, &str)] = &[
    (
        "flake",
        "A flake is a Nix project with pinned inputs described in flake.nix, so builds are reproducible",
        "nix flake init",
    ),
    (
        "generation",
        "A generation is a numbered snapshot of your system or profile created by every rebuild or install",
        "nix-env --list-generations -p /nix/var/nix/profiles/system",
    ),
    (
        "channel",
        "A channel is a named, versioned source of the package collection your system builds from",
        "nix-channel --list",
    ),
    (
        "home-manager",
        "Home Manager manages per-user packages and dotfiles declaratively",
        "home.packages = with pkgs; [ ripgrep ];",
    ),
    (
        "nix-shell",
        "nix-shell opens a temporary shell with packages available, leaving the system untouched",
        "nix-shell -p python3",
    ),
    (
        "nix store",
        "The Nix store at /nix/store holds every package in an immutable, hash-named directory",
        "nix-store --query --requisites /run/current-system",
    ),
    (
        "garbage collection",
        "Garbage collection deletes store paths no generation or profile refers to anymore",
        "nix-collect-garbage -d",
    ),
    (
        "declarative",
        "Declarative configuration describes the whole system in files that NixOS builds from",
        "environment.systemPackages = with pkgs; [ firefox ];",
    ),
    (
        "rollback",
        "A rollback switches to the previous generation without rebuilding anything",
        "sudo nixos-rebuild switch --rollback",
    ),
];

pub const HELP_TEXT: &str = "I can help you manage NixOS in plain language. Try:
  install firefox          search for a text editor
  remove vim               update my system
  roll back                show my generations
  what is installed        clean up
  what is a flake          generate a config with firefox and vim";

/// `configuration.nix` module installing `packages` system-wide
pub fn config_snippet(packages: &[&str]) -> String {
    let mut out = String::from("{ config, pkgs, ... }:\n{\n  environment.systemPackages = with pkgs; [\n");
    if packages.is_empty() {
        out.push_str("    # package names go here, one per line\n");
    }
    for package in packages {
        out.push_str("    ");
        out.push_str(package);
        out.push('\n');
    }
    out.push_str("  ];\n}\n");
    out
}

/// The four installation strategies, always in this order
pub fn install_methods(package: &str) -> Vec<InstallMethod> {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    vec![
        InstallMethod {
            kind: InstallMethodKind::Declarative,
            name: "Declarative (recommended)".to_string(),
            description: "Add to your system configuration for a permanent installation".to_string(),
            command: "Edit /etc/nixos/configuration.nix, then run sudo nixos-rebuild switch"
                .to_string(),
            example: format!("environment.systemPackages = with pkgs; [ {} ];", package),
            pros: strings(&["Reproducible", "Rolls back with the system", "Available to all users"]),
            cons: strings(&["Needs a rebuild", "Needs root"]),
        },
        InstallMethod {
            kind: InstallMethodKind::HomeManager,
            name: "Home Manager".to_string(),
            description: "Declarative installation for your user only".to_string(),
            command: "Edit ~/.config/home-manager/home.nix, then run home-manager switch"
                .to_string(),
            example: format!("home.packages = with pkgs; [ {} ];", package),
            pros: strings(&["Reproducible", "No root needed"]),
            cons: strings(&["Requires Home Manager to be set up"]),
        },
        InstallMethod {
            kind: InstallMethodKind::Imperative,
            name: "Imperative (quick)".to_string(),
            description: "Install straight into your profile".to_string(),
            command: format!("nix profile install nixpkgs#{}", package),
            example: format!("nix profile install nixpkgs#{}", package),
            pros: strings(&["Immediate", "No configuration edits"]),
            cons: strings(&["Not recorded in your configuration"]),
        },
        InstallMethod {
            kind: InstallMethodKind::Shell,
            name: "Temporary shell".to_string(),
            description: "Try the package without installing it".to_string(),
            command: format!("nix-shell -p {}", package),
            example: format!("nix-shell -p {}", package),
            pros: strings(&["Leaves the system untouched"]),
            cons: strings(&["Gone when the shell exits"]),
        },
    ]
}
