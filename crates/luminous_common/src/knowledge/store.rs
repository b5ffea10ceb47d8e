//! Knowledge base backed by SQLite.
//!
//! Location: ~/.local/share/luminous-nix/knowledge.db
//! Seed rows are inserted with INSERT OR IGNORE on every open, so an
//! existing database picks up new entries without losing cached searches.

use super::schema::*;
use crate::clock::{Clock, SystemClock};
use crate::error::{LuminousError, Result};
use crate::intent::{Intent, IntentKind};
use crate::paths;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

pub struct KnowledgeBase {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl KnowledgeBase {
    /// Open or create the knowledge base at the default location
    pub fn open_default() -> Result<Self> {
        Self::open(&paths::knowledge_db_path())
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, Some(path.to_path_buf()), Arc::new(SystemClock))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, None, Arc::new(SystemClock))
    }

    /// Replace the clock used for search cache expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn with_connection(
        conn: Connection,
        db_path: Option<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let kb = Self {
            conn: Mutex::new(conn),
            db_path,
            clock,
        };
        kb.init_schema()?;
        kb.seed()?;
        Ok(kb)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LuminousError::Internal("knowledge base lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS solutions (
                id INTEGER PRIMARY KEY,
                intent TEXT NOT NULL UNIQUE,
                category TEXT NOT NULL,
                solution TEXT NOT NULL,
                example TEXT,
                explanation TEXT,
                related TEXT
            );

            CREATE TABLE IF NOT EXISTS problems (
                id INTEGER PRIMARY KEY,
                symptom TEXT NOT NULL UNIQUE,
                cause TEXT NOT NULL,
                solution TEXT NOT NULL,
                prevention TEXT
            );

            CREATE TABLE IF NOT EXISTS best_practices (
                id INTEGER PRIMARY KEY,
                topic TEXT NOT NULL UNIQUE,
                practice TEXT NOT NULL,
                reason TEXT,
                example TEXT
            );

            CREATE TABLE IF NOT EXISTS concepts (
                id INTEGER PRIMARY KEY,
                topic TEXT NOT NULL UNIQUE,
                summary TEXT NOT NULL,
                example TEXT
            );

            CREATE TABLE IF NOT EXISTS package_cache (
                term TEXT PRIMARY KEY,
                results TEXT NOT NULL,
                cached_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn seed(&self) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for (intent, category, solution, example, explanation, related) in SEED_SOLUTIONS {
            tx.execute(
                "INSERT OR IGNORE INTO solutions (intent, category, solution, example, explanation, related)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![intent, category, solution, example, explanation, related],
            )?;
        }
        for (symptom, cause, solution, prevention) in SEED_PROBLEMS {
            tx.execute(
                "INSERT OR IGNORE INTO problems (symptom, cause, solution, prevention)
                 VALUES (?1, ?2, ?3, ?4)",
                params![symptom, cause, solution, prevention],
            )?;
        }
        for (topic, practice, reason, example) in SEED_PRACTICES {
            tx.execute(
                "INSERT OR IGNORE INTO best_practices (topic, practice, reason, example)
                 VALUES (?1, ?2, ?3, ?4)",
                params![topic, practice, reason, example],
            )?;
        }
        for (topic, summary, example) in SEED_CONCEPTS {
            tx.execute(
                "INSERT OR IGNORE INTO concepts (topic, summary, example) VALUES (?1, ?2, ?3)",
                params![topic, summary, example],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Answer for an intent. Never errors for missing data.
    pub fn get_solution(&self, intent: &Intent) -> Result<Solution> {
        let key = match intent.kind {
            IntentKind::Install => "install",
            IntentKind::Remove => "remove",
            IntentKind::Search => "search",
            IntentKind::Update => "update",
            IntentKind::Rollback => "rollback",
            IntentKind::ListGenerations => "list_generations",
            IntentKind::ListInstalled => "list_installed",
            IntentKind::GarbageCollect => "garbage_collect",
            IntentKind::Explain => return self.explain(intent.entity("topic").unwrap_or("")),
            IntentKind::GenerateConfig => return Ok(self.generate_config(&intent.packages())),
            IntentKind::Help => {
                return Ok(Solution {
                    found: true,
                    solution: HELP_TEXT.to_string(),
                    example: "ask-nix \"install firefox\"".to_string(),
                    explanation: "Nothing runs unless you pass --execute".to_string(),
                    methods: Vec::new(),
                    related: vec!["install".to_string(), "search".to_string()],
                })
            }
            IntentKind::Unknown => {
                return Ok(Solution::not_found(
                    "I don't understand that yet. Try 'install firefox', 'search for an editor' or 'help'",
                ))
            }
        };

        let Some(mut solution) = self.solution_row(key)? else {
            return Ok(Solution::not_found(format!(
                "I know about '{}' requests but have no details stored",
                key
            )));
        };

        if let Some(target) = intent.target() {
            solution.example = solution.example.replace(TARGET_PLACEHOLDER, target);
            if intent.kind == IntentKind::Install {
                solution.methods = install_methods(target);
            }
        }
        Ok(solution)
    }

    fn solution_row(&self, key: &str) -> Result<Option<Solution>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT solution, example, explanation, related FROM solutions WHERE intent = ?1",
                params![key],
                |row| {
                    let related: Option<String> = row.get(3)?;
                    Ok(Solution {
                        found: true,
                        solution: row.get(0)?,
                        example: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        explanation: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        methods: Vec::new(),
                        related: split_related(related.as_deref()),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn explain(&self, topic: &str) -> Result<Solution> {
        let Some(mut solution) = self.solution_row("explain")? else {
            return Ok(Solution::not_found("No explanations are stored"));
        };

        if let Some(concept) = self.get_concept(topic)? {
            solution.solution = concept.summary;
            solution.example = concept.example;
            return Ok(solution);
        }
        if let Some(practice) = self.get_best_practice(topic)? {
            solution.solution = format!("{}: {}", practice.practice, practice.reason);
            solution.example = practice.example;
            return Ok(solution);
        }
        if let Some(hit) = self.search_knowledge(topic)?.into_iter().next() {
            debug!("Explaining '{}' from a free-text match", topic);
            match hit {
                KnowledgeHit::Solution { key, solution: text, example } => {
                    solution.solution = text;
                    solution.example = example;
                    solution.related = vec![key];
                }
                KnowledgeHit::Problem(problem) => {
                    solution.solution = format!("{}. {}", problem.cause, problem.solution);
                    solution.example = problem.prevention;
                }
                KnowledgeHit::Concept(concept) => {
                    solution.solution = concept.summary;
                    solution.example = concept.example;
                }
            }
            return Ok(solution);
        }

        Ok(Solution::not_found(format!(
            "I don't have an explanation for '{}' yet. Try 'what is a flake' or 'what is a generation'",
            topic
        )))
    }

    /// Concept by topic; tolerates plurals and surrounding words
    pub fn get_concept(&self, topic: &str) -> Result<Option<Concept>> {
        let topic = topic.trim().to_lowercase();
        if topic.is_empty() {
            return Ok(None);
        }
        let singular = topic.strip_suffix('s').unwrap_or(&topic).to_string();
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT topic, summary, example FROM concepts
                 WHERE topic = ?1 OR topic = ?2 OR ?1 LIKE '%' || topic || '%'
                 ORDER BY length(topic) DESC LIMIT 1",
                params![topic, singular],
                |row| {
                    Ok(Concept {
                        topic: row.get(0)?,
                        summary: row.get(1)?,
                        example: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// A configuration.nix module for the named packages
    pub fn generate_config(&self, packages: &[&str]) -> Solution {
        let solution = match packages {
            [] => "Here is a starting configuration. Add the packages you want to the list".to_string(),
            _ => format!("Add {} to /etc/nixos/configuration.nix", packages.join(", ")),
        };
        Solution {
            found: true,
            solution,
            example: config_snippet(packages),
            explanation: "Merge this into /etc/nixos/configuration.nix, then run sudo nixos-rebuild switch. Nothing is written for you."
                .to_string(),
            methods: Vec::new(),
            related: vec!["install".to_string(), "update".to_string()],
        }
    }

    /// Always the same four strategies in the same order
    pub fn get_install_methods(&self, package: &str) -> Vec<InstallMethod> {
        install_methods(package)
    }

    /// First known problem whose symptom appears in (or contains) `symptom`
    pub fn get_problem_solution(&self, symptom: &str) -> Result<Option<ProblemSolution>> {
        let needle = symptom.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT symptom, cause, solution, prevention FROM problems
                 WHERE symptom LIKE '%' || ?1 || '%' OR ?1 LIKE '%' || symptom || '%'
                 ORDER BY id LIMIT 1",
                params![needle],
                problem_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_best_practice(&self, topic: &str) -> Result<Option<BestPractice>> {
        let topic = topic.trim().to_lowercase().replace(' ', "_");
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT topic, practice, reason, example FROM best_practices WHERE topic = ?1",
                params![topic],
                |row| {
                    Ok(BestPractice {
                        topic: row.get(0)?,
                        practice: row.get(1)?,
                        reason: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        example: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Free-text lookup across solutions, problems and concepts
    pub fn search_knowledge(&self, query: &str) -> Result<Vec<KnowledgeHit>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut hits = Vec::new();

        let mut stmt = conn.prepare(
            "SELECT intent, solution, example FROM solutions
             WHERE lower(solution) LIKE '%' || ?1 || '%' OR lower(explanation) LIKE '%' || ?1 || '%'
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![needle], |row| {
            Ok(KnowledgeHit::Solution {
                key: row.get(0)?,
                solution: row.get(1)?,
                example: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })?;
        for row in rows {
            hits.push(row?);
        }

        let mut stmt = conn.prepare(
            "SELECT symptom, cause, solution, prevention FROM problems
             WHERE lower(symptom) LIKE '%' || ?1 || '%' OR lower(cause) LIKE '%' || ?1 || '%'
             ORDER BY id",
        )?;
        for row in stmt.query_map(params![needle], problem_from_row)? {
            hits.push(KnowledgeHit::Problem(row?));
        }

        let mut stmt = conn.prepare(
            "SELECT topic, summary, example FROM concepts
             WHERE lower(topic) LIKE '%' || ?1 || '%' OR lower(summary) LIKE '%' || ?1 || '%'
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![needle], |row| {
            Ok(Concept {
                topic: row.get(0)?,
                summary: row.get(1)?,
                example: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })?;
        for row in rows {
            hits.push(KnowledgeHit::Concept(row?));
        }

        Ok(hits)
    }

    /// Cached search results, or None when absent or older than 24h
    pub fn search_cache(&self, term: &str) -> Result<Option<Vec<PackageInfo>>> {
        let term = normalize_term(term);
        let conn = self.conn()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT results, cached_at FROM package_cache WHERE term = ?1",
                params![term],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((results, cached_at)) = row else {
            return Ok(None);
        };

        let cached_at = match DateTime::parse_from_rfc3339(&cached_at) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                warn!("Dropping search cache row for '{}': bad timestamp ({})", term, e);
                return Ok(None);
            }
        };
        if self.clock.now() - cached_at > Duration::hours(SEARCH_CACHE_HOURS) {
            debug!("Search cache for '{}' expired", term);
            return Ok(None);
        }

        match serde_json::from_str(&results) {
            Ok(packages) => Ok(Some(packages)),
            Err(e) => {
                warn!("Dropping unreadable search cache row for '{}': {}", term, e);
                Ok(None)
            }
        }
    }

    pub fn cache_search(&self, term: &str, results: &[PackageInfo]) -> Result<()> {
        let term = normalize_term(term);
        let json = serde_json::to_string(results)?;
        let now = self.clock.now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO package_cache (term, results, cached_at) VALUES (?1, ?2, ?3)",
            params![term, json, now],
        )?;
        Ok(())
    }
}

fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn split_related(related: Option<&str>) -> Vec<String> {
    related
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn problem_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProblemSolution> {
    Ok(ProblemSolution {
        symptom: row.get(0)?,
        cause: row.get(1)?,
        solution: row.get(2)?,
        prevention: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::intent::IntentRecognizer;

    fn kb() -> KnowledgeBase {
        KnowledgeBase::open_in_memory().unwrap()
    }

    #[test]
    fn test_install_solution_has_methods() {
        let intent = IntentRecognizer::new().recognize("install firefox");
        let solution = kb().get_solution(&intent).unwrap();
        assert!(solution.found);
        assert_eq!(solution.methods.len(), 4);
        assert_eq!(solution.methods[0].kind, InstallMethodKind::Declarative);
        assert_eq!(solution.methods[3].kind, InstallMethodKind::Shell);
        assert!(solution.example.contains("firefox"));
        assert_eq!(solution.related, vec!["search", "remove"]);
    }

    #[test]
    fn test_unknown_is_not_found() {
        let intent = Intent::unknown("blorp", 0.1);
        let solution = kb().get_solution(&intent).unwrap();
        assert!(!solution.found);
        assert!(solution.solution.contains("don't understand"));
    }

    #[test]
    fn test_every_kind_answers() {
        let kb = kb();
        for kind in IntentKind::ALL {
            let mut intent = Intent::unknown("x", 0.9);
            intent.kind = kind;
            // Must not error for any kind, even without entities
            kb.get_solution(&intent).unwrap();
        }
    }

    #[test]
    fn test_generate_config_snippet() {
        let intent = IntentRecognizer::new().recognize("generate config with firefox and vim");
        let solution = kb().get_solution(&intent).unwrap();
        assert!(solution.found);
        assert!(solution.solution.contains("firefox, vim"));
        assert!(solution.example.contains("environment.systemPackages"));
        assert!(solution.example.contains("    vim\n"));
    }

    #[test]
    fn test_explain_uses_concepts() {
        let intent = IntentRecognizer::new().recognize("what are generations");
        let solution = kb().get_solution(&intent).unwrap();
        assert!(solution.found);
        assert!(solution.solution.contains("snapshot"));
    }

    #[test]
    fn test_explain_falls_back_to_free_text_search() {
        let intent = IntentRecognizer::new().recognize("tell me about infinite recursion");
        assert_eq!(intent.kind, IntentKind::Explain);
        let solution = kb().get_solution(&intent).unwrap();
        assert!(solution.found);
        assert!(solution.solution.contains("circular definition"));

        let intent = IntentRecognizer::new().recognize("what is a quasar");
        assert!(!kb().get_solution(&intent).unwrap().found);
    }

    #[test]
    fn test_problem_lookup_both_directions() {
        let kb = kb();
        let p = kb
            .get_problem_solution("error: attribute missing in pkgs")
            .unwrap()
            .unwrap();
        assert!(p.cause.contains("name is wrong"));
        assert!(kb.get_problem_solution("read-only").unwrap().is_some());
        assert!(kb.get_problem_solution("").unwrap().is_none());
    }

    #[test]
    fn test_best_practice_and_search_knowledge() {
        let kb = kb();
        let practice = kb.get_best_practice("package installation").unwrap().unwrap();
        assert!(practice.practice.contains("declarative"));

        let hits = kb.search_knowledge("generation").unwrap();
        assert!(hits
            .iter()
            .any(|h| matches!(h, KnowledgeHit::Concept(c) if c.topic == "generation")));
    }

    #[test]
    fn test_search_cache_expires_after_a_day() {
        let clock = Arc::new(ManualClock::default());
        let kb = kb().with_clock(clock.clone());
        let results = vec![PackageInfo {
            name: "firefox".into(),
            version: "120.0".into(),
            description: "Web browser".into(),
        }];

        assert!(kb.search_cache("firefox").unwrap().is_none());
        kb.cache_search("Firefox", &results).unwrap();
        assert_eq!(kb.search_cache("firefox").unwrap(), Some(results));

        clock.advance(Duration::hours(25));
        assert!(kb.search_cache("firefox").unwrap().is_none());
    }

    #[test]
    fn test_reopen_keeps_cache_and_does_not_duplicate_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.db");
        {
            let kb = KnowledgeBase::open(&path).unwrap();
            kb.cache_search("vim", &[]).unwrap();
        }
        let kb = KnowledgeBase::open(&path).unwrap();
        assert_eq!(kb.search_cache("vim").unwrap(), Some(vec![]));
        let count: i64 = kb
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM solutions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count as usize, SEED_SOLUTIONS.len());
    }
}
