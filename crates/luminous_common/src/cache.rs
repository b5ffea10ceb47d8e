//! Response cache - two tiers with per-kind TTL.
//!
//! Memory tier: LRU bounded by `memory_capacity`, lives for one process.
//! Disk tier: one JSON file per key under ~/.cache/luminous-nix/responses,
//! shared by every invocation. Keys hash the normalized query together with
//! the context that changes the answer (intent kind, dry-run flag, extras).
//!
//! Mutating kinds are refused at `set`, whatever the caller asks for.
//! Corrupted disk entries count as misses and are deleted.
//!
//! Hit/miss counters live next to the entries in `stats.json` so
//! `ask-nix cache stats` sees what earlier invocations did. Last writer wins.

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::paths;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Upper bound on any TTL (one year)
const MAX_TTL_SECS: u64 = 365 * 24 * 3600;

/// Kinds that are always cached
const CACHEABLE_KINDS: &[&str] = &[
    "search",
    "generate_config",
    "query",
    "translate_error",
    "explain",
    "help",
    "list_generations",
    "list_installed",
];

/// Kinds (and kind words) that are never cached
const MUTATING_KINDS: &[&str] = &[
    "install",
    "remove",
    "uninstall",
    "update",
    "upgrade",
    "rollback",
    "garbage_collect",
    "gc",
    "switch",
    "rebuild",
    "delete",
];

/// Prefixes that look read-only for kinds on neither list
const READ_ONLY_PREFIXES: &[&str] = &["list_", "show_", "get_", "search_", "query_", "explain_", "check_"];

/// Is a result for this kind allowed in the cache?
pub fn should_cache(kind: &str) -> bool {
    let kind = kind.trim().to_lowercase();
    if kind.is_empty() {
        return false;
    }
    if MUTATING_KINDS.contains(&kind.as_str())
        || kind.split('_').any(|word| MUTATING_KINDS.contains(&word))
    {
        return false;
    }
    if CACHEABLE_KINDS.contains(&kind.as_str()) {
        return true;
    }
    READ_ONLY_PREFIXES.iter().any(|p| kind.starts_with(p))
}

/// What, besides the query text, changes the answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheContext {
    /// Intent kind name, e.g. "search"
    pub intent: String,
    pub dry_run: bool,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl CacheContext {
    pub fn new(intent: impl Into<String>, dry_run: bool) -> Self {
        Self {
            intent: intent.into(),
            dry_run,
            extra: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// One cached value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub intent: String,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = Duration::seconds(self.ttl_secs.min(MAX_TTL_SECS) as i64);
        now - self.created_at >= ttl
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    /// `set` calls refused because the kind is not cacheable
    pub refused: u64,
    /// Memory entries pushed out by the LRU bound
    pub evictions: u64,
    pub memory_entries: usize,
    pub disk_entries: usize,
}

/// Counter file inside the disk tier
const STATS_FILE: &str = "stats.json";

#[derive(Debug, Clone, Copy)]
enum Counter {
    Hit,
    Miss,
    Write,
    Refused,
    Eviction,
}

/// On-disk form of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CounterSnapshot {
    #[serde(default)]
    hits: u64,
    #[serde(default)]
    misses: u64,
    #[serde(default)]
    writes: u64,
    #[serde(default)]
    refused: u64,
    #[serde(default)]
    evictions: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    refused: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn from_snapshot(s: CounterSnapshot) -> Self {
        Self {
            hits: AtomicU64::new(s.hits),
            misses: AtomicU64::new(s.misses),
            writes: AtomicU64::new(s.writes),
            refused: AtomicU64::new(s.refused),
            evictions: AtomicU64::new(s.evictions),
        }
    }

    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn bump(&self, counter: Counter) {
        let slot = match counter {
            Counter::Hit => &self.hits,
            Counter::Miss => &self.misses,
            Counter::Write => &self.writes,
            Counter::Refused => &self.refused,
            Counter::Eviction => &self.evictions,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct ResponseCache {
    config: CacheConfig,
    memory: Mutex<LruCache<String, CacheEntry>>,
    dir: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl ResponseCache {
    /// Cache with a disk tier at the default location
    pub fn open_default(config: CacheConfig) -> Self {
        Self::new(config, Some(paths::response_cache_dir()))
    }

    /// `dir = None` keeps everything in memory
    pub fn new(config: CacheConfig, dir: Option<PathBuf>) -> Self {
        let capacity = NonZeroUsize::new(config.memory_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        let counters = dir
            .as_ref()
            .and_then(|d| read_counters(&d.join(STATS_FILE)))
            .map(Counters::from_snapshot)
            .unwrap_or_default();
        Self {
            config,
            memory: Mutex::new(LruCache::new(capacity)),
            dir,
            clock: Arc::new(SystemClock),
            counters,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// TTL for a kind
    pub fn ttl_for(&self, kind: &str) -> u64 {
        match kind {
            "search" | "query" => self.config.search_ttl_secs,
            "generate_config" | "explain" | "help" | "translate_error" => {
                self.config.config_ttl_secs
            }
            k if k.starts_with("list_") => self.config.listing_ttl_secs,
            _ => self.config.default_ttl_secs,
        }
    }

    /// Stable key for a query in a context
    pub fn key_for(query: &str, context: &CacheContext) -> String {
        let normalized = query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update([0u8]);
        // BTreeMap keeps the serialized context stable
        hasher.update(serde_json::to_vec(context).unwrap_or_default());
        hex::encode(hasher.finalize())
    }

    fn memory(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn count(&self, counter: Counter) {
        self.counters.bump(counter);
        if let Err(e) = self.write_counters() {
            debug!("Failed to persist cache counters: {}", e);
        }
    }

    fn write_counters(&self) -> std::io::Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        fs::create_dir_all(dir)?;
        let path = dir.join(STATS_FILE);
        let tmp = path.with_extension(format!("json.tmp.{}", std::process::id()));
        let json = serde_json::to_vec_pretty(&self.counters.snapshot())?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{}.json", key)))
    }

    pub fn get(&self, query: &str, context: &CacheContext) -> Option<serde_json::Value> {
        if !self.config.enabled {
            return None;
        }
        let key = Self::key_for(query, context);
        let now = self.clock.now();

        let in_memory = self.memory().get(&key).cloned();
        if let Some(entry) = in_memory {
            if !entry.is_expired(now) {
                self.count(Counter::Hit);
                debug!("Cache hit (memory) for '{}'", query);
                return Some(entry.value);
            }
            self.memory().pop(&key);
            self.remove_file(&key);
            self.count(Counter::Miss);
            return None;
        }

        match self.read_disk(&key) {
            Some(entry) if !entry.is_expired(now) => {
                self.count(Counter::Hit);
                debug!("Cache hit (disk) for '{}'", query);
                let value = entry.value.clone();
                self.put_memory(key, entry);
                Some(value)
            }
            Some(_) => {
                self.remove_file(&key);
                self.count(Counter::Miss);
                None
            }
            None => {
                self.count(Counter::Miss);
                None
            }
        }
    }

    /// Store a value. Returns false when the kind may not be cached.
    pub fn set(&self, query: &str, context: &CacheContext, value: serde_json::Value) -> bool {
        if !self.config.enabled || !should_cache(&context.intent) {
            self.count(Counter::Refused);
            debug!("Not caching '{}' result for '{}'", context.intent, query);
            return false;
        }

        let key = Self::key_for(query, context);
        let entry = CacheEntry {
            key: key.clone(),
            value,
            created_at: self.clock.now(),
            ttl_secs: self.ttl_for(&context.intent),
            intent: context.intent.clone(),
        };

        if let Err(e) = self.write_disk(&entry) {
            // The memory tier still serves this process
            warn!("Failed to write cache entry to disk: {}", e);
        }
        self.put_memory(key, entry);
        self.count(Counter::Write);
        true
    }

    fn put_memory(&self, key: String, entry: CacheEntry) {
        if let Some((evicted, _)) = self.memory().push(key.clone(), entry) {
            if evicted != key {
                self.count(Counter::Eviction);
            }
        }
    }

    /// Drop every entry in both tiers. Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let mut removed: HashSet<String> = {
            let mut memory = self.memory();
            let keys = memory.iter().map(|(k, _)| k.clone()).collect();
            memory.clear();
            keys
        };
        for (key, path) in self.disk_entries() {
            if fs::remove_file(&path).is_ok() {
                removed.insert(key);
            }
        }
        removed.len()
    }

    /// Delete expired (and unreadable) entries. Returns how many went.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = HashSet::new();

        {
            let mut memory = self.memory();
            let expired: Vec<String> = memory
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                memory.pop(&key);
                removed.insert(key);
            }
        }

        for (key, path) in self.disk_entries() {
            let keep = read_entry(&path).is_some_and(|e| !e.is_expired(now));
            if !keep && fs::remove_file(&path).is_ok() {
                removed.insert(key);
            }
        }

        if !removed.is_empty() {
            debug!("Removed {} expired cache entries", removed.len());
        }
        removed.len()
    }

    pub fn stats(&self) -> CacheStats {
        let counters = self.counters.snapshot();
        CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            writes: counters.writes,
            refused: counters.refused,
            evictions: counters.evictions,
            memory_entries: self.memory().len(),
            disk_entries: self.disk_entries().len(),
        }
    }

    fn read_disk(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key)?;
        if !path.exists() {
            return None;
        }
        match read_entry(&path) {
            Some(entry) if entry.key == key => Some(entry),
            _ => {
                warn!("Deleting corrupted cache entry {}", path.display());
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Write to a temp file, then rename; readers never see half an entry
    fn write_disk(&self, entry: &CacheEntry) -> std::io::Result<()> {
        let Some(path) = self.entry_path(&entry.key) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension(format!("json.tmp.{}", std::process::id()));
        let json = serde_json::to_vec_pretty(entry)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)
    }

    fn remove_file(&self, key: &str) {
        if let Some(path) = self.entry_path(key) {
            let _ = fs::remove_file(path);
        }
    }

    fn disk_entries(&self) -> Vec<(String, PathBuf)> {
        let Some(dir) = &self.dir else {
            return Vec::new();
        };
        let Ok(read_dir) = fs::read_dir(dir) else {
            return Vec::new();
        };
        read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| {
                let key = p.file_stem()?.to_str()?.to_string();
                is_entry_key(&key).then_some((key, p))
            })
            .collect()
    }
}

/// Entry files are named by their SHA-256 key
fn is_entry_key(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

fn read_entry(path: &Path) -> Option<CacheEntry> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn read_counters(path: &Path) -> Option<CounterSnapshot> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!("Ignoring unreadable cache counters {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn memory_cache() -> ResponseCache {
        ResponseCache::new(CacheConfig::default(), None)
    }

    #[test]
    fn test_should_cache_lists() {
        for kind in ["search", "generate_config", "query", "translate_error", "list_installed"] {
            assert!(should_cache(kind), "{}", kind);
        }
        for kind in ["install", "remove", "update", "rollback", "garbage_collect"] {
            assert!(!should_cache(kind), "{}", kind);
        }
        // Ambiguous kinds: read-only looking ones are cached
        assert!(should_cache("show_config"));
        assert!(!should_cache("install_package"));
        assert!(!should_cache("frobnicate"));
    }

    #[test]
    fn test_key_depends_on_context() {
        let explain = CacheContext::new("search", true);
        let execute = CacheContext::new("search", false);
        assert_ne!(
            ResponseCache::key_for("firefox", &explain),
            ResponseCache::key_for("firefox", &execute)
        );
        assert_eq!(
            ResponseCache::key_for("  Firefox ", &explain),
            ResponseCache::key_for("firefox", &explain)
        );
    }

    #[test]
    fn test_set_get_and_refuse() {
        let cache = memory_cache();
        let ctx = CacheContext::new("search", true);
        assert!(cache.set("firefox", &ctx, json!({"n": 1})));
        assert_eq!(cache.get("firefox", &ctx), Some(json!({"n": 1})));

        let install = CacheContext::new("install", true);
        assert!(!cache.set("install firefox", &install, json!("x")));
        assert_eq!(cache.get("install firefox", &install), None);

        let stats = cache.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.refused, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_lru_eviction_counted() {
        let config = CacheConfig {
            memory_capacity: 1,
            ..CacheConfig::default()
        };
        let cache = ResponseCache::new(config, None);
        let ctx = CacheContext::new("search", true);
        cache.set("a", &ctx, json!(1));
        cache.set("b", &ctx, json!(2));
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.get("a", &ctx), None);
    }

    #[test]
    fn test_ttl_per_kind() {
        let cache = memory_cache();
        assert_eq!(cache.ttl_for("search"), 7200);
        assert_eq!(cache.ttl_for("generate_config"), 86400);
        assert_eq!(cache.ttl_for("list_generations"), 300);
        assert_eq!(cache.ttl_for("show_config"), 3600);
    }

    #[test]
    fn test_cleanup_expired_memory() {
        let clock = Arc::new(ManualClock::default());
        let cache = memory_cache().with_clock(clock.clone());
        let ctx = CacheContext::new("list_installed", false);
        cache.set("what is installed", &ctx, json!([]));
        assert_eq!(cache.cleanup_expired(), 0);
        clock.advance(Duration::seconds(301));
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.stats().memory_entries, 0);
    }
}
