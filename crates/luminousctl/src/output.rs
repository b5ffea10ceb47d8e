//! Output formatting - terminal rendering of pipeline responses
//!
//! Rendering is pure: every function builds a String so it can be tested,
//! and main decides where it goes. ASCII only. Color comes from a `Palette`
//! so piped output stays free of escape codes.

use crate::cli::Personality;
use luminous_common::knowledge::{InstallMethod, PackageInfo};
use luminous_common::learner::LearningSummary;
use luminous_common::{CacheStats, IntentKind, Response, ResponseStatus, SuggestionKind, Verbosity};
use owo_colors::{OwoColorize, Style};
use std::fmt::Write;
use std::io::IsTerminal;

pub const SEPARATOR: &str = "----------------------------------------";

/// How many search results are listed before "... and N more"
const MAX_PACKAGES_SHOWN: usize = 10;

/// Check if color output should be used: never with NO_COLOR, only on a TTY
pub fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stdout().is_terminal()
}

/// Applies styles, or nothing when color is off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    color: bool,
}

impl Palette {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Palette for stdout as it is right now
    pub fn detect() -> Self {
        Self::new(should_use_color())
    }

    pub fn plain() -> Self {
        Self::new(false)
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.color {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }

    fn red(&self, text: &str) -> String {
        self.paint(text, Style::new().red())
    }

    fn green(&self, text: &str) -> String {
        self.paint(text, Style::new().green())
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(text, Style::new().yellow())
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(text, Style::new().cyan())
    }

    fn bold(&self, text: &str) -> String {
        self.paint(text, Style::new().bold())
    }

    fn dimmed(&self, text: &str) -> String {
        self.paint(text, Style::new().dimmed())
    }
}

pub fn render_response(response: &Response, personality: Personality, palette: &Palette) -> String {
    let mut out = String::new();
    // Minimal always behaves as concise; the others follow what was learned
    let verbosity = match personality {
        Personality::Minimal => Verbosity::Concise,
        _ => response.verbosity,
    };

    match response.status {
        ResponseStatus::Ok => render_ok(&mut out, response, personality, verbosity, palette),
        ResponseStatus::ValidationFailed => {
            let _ = writeln!(out, "[REJECTED] {}", palette.red(&response.message));
        }
        ResponseStatus::NotUnderstood => {
            let _ = writeln!(out, "[?] {}", palette.yellow(&response.message));
            if let Some(solution) = &response.solution {
                if solution.solution != response.message {
                    let _ = writeln!(out, "{}", solution.solution);
                }
            }
        }
        ResponseStatus::ExecutionFailed | ResponseStatus::TimedOut => {
            render_failure(&mut out, response, palette)
        }
    }

    render_suggestions(&mut out, response, palette);

    if personality == Personality::Technical {
        render_technical(&mut out, response, palette);
    }
    if personality == Personality::Encouraging && response.is_success() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", palette.green("You're getting the hang of NixOS. Keep going!"));
    }
    out
}

fn render_ok(
    out: &mut String,
    response: &Response,
    personality: Personality,
    verbosity: Verbosity,
    palette: &Palette,
) {
    let command = response.command.as_ref();
    let execution = response.execution.as_ref();

    if personality == Personality::Friendly && verbosity != Verbosity::Concise {
        let _ = writeln!(out, "Sure! {}", response.message);
    } else {
        let _ = writeln!(out, "{}", response.message);
    }

    if let Some(cmd) = command {
        match execution {
            Some(exec) if exec.would_execute => {
                let _ = writeln!(out, "[OK] {}", palette.green(&cmd.to_string()));
                if !exec.output.trim().is_empty() && response.packages.is_none() {
                    let _ = writeln!(out);
                    let _ = writeln!(out, "{}", exec.output.trim_end());
                }
            }
            Some(exec) => {
                let _ = writeln!(out);
                let _ = writeln!(out, "{}", palette.cyan(exec.output.trim_end()));
            }
            None => {
                let _ = writeln!(out, "  $ {}", palette.cyan(&cmd.to_string()));
            }
        }
    }

    if let Some(packages) = &response.packages {
        render_packages(out, packages, palette);
    }

    let Some(solution) = &response.solution else {
        return;
    };
    // A generated configuration is the answer itself
    let is_config = response
        .intent
        .as_ref()
        .is_some_and(|i| i.kind == IntentKind::GenerateConfig);
    if verbosity == Verbosity::Concise && !is_config {
        return;
    }
    if command.is_none() && !solution.example.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Example:");
        for line in solution.example.lines() {
            let _ = writeln!(out, "  {}", line);
        }
    }
    if verbosity == Verbosity::Concise {
        return;
    }
    if verbosity == Verbosity::Detailed {
        if !solution.explanation.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", solution.explanation);
        }
        if !solution.methods.is_empty() {
            let _ = writeln!(out);
            out.push_str(&render_methods(&solution.methods, false, palette));
        }
        if !solution.related.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Related: {}", palette.dimmed(&solution.related.join(", ")));
        }
    }
}

fn render_failure(out: &mut String, response: &Response, palette: &Palette) {
    let label = if response.status == ResponseStatus::TimedOut {
        "[TIMEOUT]"
    } else {
        "[FAILED]"
    };
    let _ = writeln!(out, "{} {}", label, palette.red(&response.message));
    if let Some(cmd) = &response.command {
        let _ = writeln!(out, "  $ {}", cmd);
    }
    if let Some(help) = &response.error_help {
        let _ = writeln!(out);
        let _ = writeln!(out, "What happened: {}", help.explanation);
        if !help.suggested_fixes.is_empty() {
            let _ = writeln!(out, "Try:");
            for fix in &help.suggested_fixes {
                let _ = writeln!(out, "  * {}", fix);
            }
        }
    }
    if response.status == ResponseStatus::TimedOut {
        let _ = writeln!(
            out,
            "{}",
            palette.yellow("Retry it yourself, or raise [executor] timeout_secs in the config.")
        );
    }
}

fn render_suggestions(out: &mut String, response: &Response, palette: &Palette) {
    for suggestion in &response.suggestions {
        let line = match suggestion.kind {
            SuggestionKind::Alias => format!("Did you mean: {}", suggestion.text),
            SuggestionKind::NextCommand => format!("You often run next: {}", suggestion.text),
            SuggestionKind::ErrorFix => format!("Last time this was fixed by: {}", suggestion.text),
        };
        let _ = writeln!(out, "[TIP] {}", palette.cyan(&line));
    }
}

fn render_technical(out: &mut String, response: &Response, palette: &Palette) {
    let _ = writeln!(out, "{}", palette.dimmed(SEPARATOR));
    if let Some(intent) = &response.intent {
        let _ = writeln!(
            out,
            "intent: {} (confidence {:.2})",
            intent.kind, intent.confidence
        );
    }
    if let Some(cmd) = &response.command {
        let _ = writeln!(out, "argv: {:?}", cmd.argv());
        let _ = writeln!(out, "privileged: {}", cmd.requires_privilege);
    }
    if let Some(exec) = &response.execution {
        let _ = writeln!(out, "execution: {}", exec.status.as_str());
        if let Some(code) = exec.exit_code {
            let _ = writeln!(out, "exit code: {}", code);
        }
    }
    let _ = writeln!(
        out,
        "status: {}  cached: {}  {:.1} ms",
        response.status.as_str(),
        response.from_cache,
        response.duration_ms
    );
}

fn render_packages(out: &mut String, packages: &[PackageInfo], palette: &Palette) {
    if packages.is_empty() {
        let _ = writeln!(out, "No matching packages.");
        return;
    }
    let _ = writeln!(out);
    for pkg in packages.iter().take(MAX_PACKAGES_SHOWN) {
        let version = if pkg.version.is_empty() {
            String::new()
        } else {
            format!(" ({})", pkg.version)
        };
        let _ = writeln!(
            out,
            "  * {}{}  {}",
            palette.bold(&pkg.name),
            version,
            palette.dimmed(&pkg.description)
        );
    }
    if packages.len() > MAX_PACKAGES_SHOWN {
        let _ = writeln!(out, "  ... and {} more", packages.len() - MAX_PACKAGES_SHOWN);
    }
}

pub fn render_methods(methods: &[InstallMethod], with_tradeoffs: bool, palette: &Palette) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Ways to install:");
    for (i, method) in methods.iter().enumerate() {
        let _ = writeln!(out, "  {}. {} - {}", i + 1, palette.bold(&method.name), method.description);
        let _ = writeln!(out, "     {}", palette.cyan(&method.command));
        if method.example != method.command {
            let _ = writeln!(out, "     e.g. {}", method.example);
        }
        if with_tradeoffs {
            for pro in &method.pros {
                let _ = writeln!(out, "     + {}", pro);
            }
            for con in &method.cons {
                let _ = writeln!(out, "     - {}", con);
            }
        }
    }
    out
}

pub fn render_learning(summary: &LearningSummary, palette: &Palette) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Learning for {}", palette.bold(&summary.user_id));
    let _ = writeln!(out, "{}", palette.dimmed(SEPARATOR));
    let _ = writeln!(out, "Observations: {}", summary.total_observations);
    let _ = writeln!(out, "Verbosity:    {}", summary.verbosity.as_str());
    let _ = writeln!(out, "Active hours: {}", summary.active_hours);
    let _ = writeln!(out, "Error fixes:  {}", summary.errors_learned);

    if !summary.aliases.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Aliases:");
        for (from, to) in &summary.aliases {
            let _ = writeln!(out, "  {} -> {}", from, to);
        }
    }
    if !summary.command_sequences.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Usually followed by:");
        for (first, next) in &summary.command_sequences {
            let _ = writeln!(out, "  {} -> {}", first, next);
        }
    }
    if !summary.top_commands.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Most used:");
        for (cmd, count) in &summary.top_commands {
            let _ = writeln!(out, "  {:>4}  {}", count, cmd);
        }
    }
    out
}

pub fn render_cache_stats(stats: &CacheStats) -> String {
    format!(
        "hits: {}  misses: {}  writes: {}  refused: {}  evictions: {}\nentries: {} in memory, {} on disk\n",
        stats.hits,
        stats.misses,
        stats.writes,
        stats.refused,
        stats.evictions,
        stats.memory_entries,
        stats.disk_entries
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use luminous_common::command::build_command;
    use luminous_common::knowledge::{install_methods, Solution};
    use luminous_common::{Intent, Suggestion};
    use std::collections::BTreeMap;

    fn install_response() -> Response {
        let mut entities = BTreeMap::new();
        entities.insert("package".to_string(), "firefox".to_string());
        Response {
            query: "install firefox".into(),
            status: ResponseStatus::Ok,
            message: "Install firefox into your profile".into(),
            intent: Some(Intent {
                kind: IntentKind::Install,
                entities,
                confidence: 0.9,
                raw_text: "install firefox".into(),
            }),
            solution: Some(Solution {
                found: true,
                solution: "Install firefox into your profile".into(),
                example: "nix profile install nixpkgs#firefox".into(),
                explanation: "Profiles keep user packages separate".into(),
                methods: install_methods("firefox"),
                related: vec!["search".into()],
            }),
            command: build_command(IntentKind::Install, Some("firefox")),
            execution: None,
            packages: None,
            error_help: None,
            suggestions: Vec::new(),
            verbosity: Verbosity::Detailed,
            from_cache: false,
            duration_ms: 1.0,
        }
    }

    #[test]
    fn test_detailed_shows_methods() {
        let text = render_response(&install_response(), Personality::Friendly, &Palette::plain());
        assert!(text.starts_with("Sure!"));
        assert!(text.contains("nixpkgs#firefox"));
        assert!(text.contains("Ways to install"));
        assert!(text.contains("Profiles keep user packages separate"));
    }

    #[test]
    fn test_minimal_is_concise() {
        let text = render_response(&install_response(), Personality::Minimal, &Palette::plain());
        assert!(!text.contains("Sure!"));
        assert!(!text.contains("Ways to install"));
        assert!(text.contains("nixpkgs#firefox"));
    }

    #[test]
    fn test_technical_shows_argv() {
        let text = render_response(&install_response(), Personality::Technical, &Palette::plain());
        assert!(text.contains("argv:"));
        assert!(text.contains("intent: install"));
    }

    #[test]
    fn test_suggestions_rendered() {
        let mut response = install_response();
        response.status = ResponseStatus::NotUnderstood;
        response.message = "I'm not sure".into();
        response.suggestions.push(Suggestion {
            kind: SuggestionKind::Alias,
            text: "install chrome".into(),
        });
        let text = render_response(&response, Personality::Friendly, &Palette::plain());
        assert!(text.contains("Did you mean: install chrome"));
    }

    #[test]
    fn test_package_list_is_capped() {
        let packages: Vec<PackageInfo> = (0..15)
            .map(|i| PackageInfo {
                name: format!("pkg{}", i),
                version: "1.0".into(),
                description: String::new(),
            })
            .collect();
        let mut out = String::new();
        render_packages(&mut out, &packages, &Palette::plain());
        assert!(out.contains("... and 5 more"));
    }

    #[test]
    fn test_plain_palette_has_no_escape_codes() {
        let plain = render_response(&install_response(), Personality::Technical, &Palette::plain());
        assert!(!plain.contains("\x1b["));

        let colored = render_response(&install_response(), Personality::Technical, &Palette::new(true));
        assert!(colored.contains("\x1b["));
        assert!(colored.contains("nixpkgs#firefox"));
    }

    #[test]
    fn test_generated_config_shown_even_when_concise() {
        let mut response = install_response();
        let intent = response.intent.as_mut().unwrap();
        intent.kind = IntentKind::GenerateConfig;
        response.command = None;
        response.solution.as_mut().unwrap().example =
            luminous_common::knowledge::config_snippet(&["firefox", "vim"]);

        let text = render_response(&response, Personality::Minimal, &Palette::plain());
        assert!(text.contains("environment.systemPackages"));
        assert!(text.contains("    vim"));
        assert!(!text.contains("Ways to install"));
    }
}
