//! Response cache across process lifetimes

use chrono::Duration;
use luminous_common::config::CacheConfig;
use luminous_common::{CacheContext, ManualClock, ResponseCache};
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_disk_entries_outlive_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CacheContext::new("search", true);

    let writer = ResponseCache::new(CacheConfig::default(), Some(dir.path().to_path_buf()));
    assert!(writer.set("search firefox", &ctx, json!({"packages": 2})));
    drop(writer);

    let reader = ResponseCache::new(CacheConfig::default(), Some(dir.path().to_path_buf()));
    assert_eq!(reader.get("Search  Firefox", &ctx), Some(json!({"packages": 2})));
    assert_eq!(reader.stats().hits, 1);
}

#[test]
fn test_context_separates_entries() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ResponseCache::new(CacheConfig::default(), Some(dir.path().to_path_buf()));
    let dry = CacheContext::new("search", true);
    let live = CacheContext::new("search", false);

    cache.set("search firefox", &dry, json!("dry"));
    assert_eq!(cache.get("search firefox", &live), None);
    assert_eq!(cache.get("search firefox", &dry), Some(json!("dry")));
}

#[test]
fn test_expired_entries_pruned_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();
    let config = CacheConfig::default();
    let listing_ttl = config.listing_ttl_secs as i64;
    let cache = ResponseCache::new(config, Some(dir.path().to_path_buf()))
        .with_clock(Arc::new(clock.clone()));

    cache.set("list generations", &CacheContext::new("list_generations", true), json!(1));
    cache.set("search vim", &CacheContext::new("search", true), json!(2));

    clock.advance(Duration::seconds(listing_ttl + 1));
    assert_eq!(cache.cleanup_expired(), 1);
    assert_eq!(
        cache.get("search vim", &CacheContext::new("search", true)),
        Some(json!(2))
    );
    assert_eq!(
        cache.get("list generations", &CacheContext::new("list_generations", true)),
        None
    );
}

#[test]
fn test_mutating_kinds_refused() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ResponseCache::new(CacheConfig::default(), Some(dir.path().to_path_buf()));
    for kind in ["install", "remove", "update", "rollback", "garbage_collect"] {
        assert!(!cache.set("anything", &CacheContext::new(kind, true), json!(true)));
    }
    assert_eq!(cache.stats().refused, 5);
    assert_eq!(cache.stats().disk_entries, 0);
}

#[test]
fn test_counters_seen_by_the_next_invocation() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CacheContext::new("search", true);

    let first = ResponseCache::new(CacheConfig::default(), Some(dir.path().to_path_buf()));
    first.set("search firefox", &ctx, json!(1));
    assert!(first.get("search firefox", &ctx).is_some());
    assert!(first.get("search vim", &ctx).is_none());
    first.set("install firefox", &CacheContext::new("install", true), json!(2));

    let second = ResponseCache::new(CacheConfig::default(), Some(dir.path().to_path_buf()));
    let stats = second.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.writes, 1);
    assert_eq!(stats.refused, 1);
    // The counter file is not an entry
    assert_eq!(stats.disk_entries, 1);
    assert_eq!(second.clear(), 1);
}

#[test]
fn test_corrupted_disk_entry_is_a_miss_and_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CacheContext::new("search", true);
    let key = ResponseCache::key_for("search firefox", &ctx);
    let path = dir.path().join(format!("{}.json", key));
    std::fs::write(&path, "{ not json").unwrap();

    let cache = ResponseCache::new(CacheConfig::default(), Some(dir.path().to_path_buf()));
    assert_eq!(cache.get("search firefox", &ctx), None);
    assert!(!path.exists());
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn test_memory_entry_expires_on_get() {
    let clock = ManualClock::default();
    let config = CacheConfig::default();
    let search_ttl = config.search_ttl_secs as i64;
    let cache = ResponseCache::new(config, None).with_clock(Arc::new(clock.clone()));
    let ctx = CacheContext::new("search", true);

    cache.set("search vim", &ctx, json!("vim"));
    clock.advance(Duration::seconds(search_ttl - 1));
    assert_eq!(cache.get("search vim", &ctx), Some(json!("vim")));

    clock.advance(Duration::seconds(2));
    assert_eq!(cache.get("search vim", &ctx), None);
    assert_eq!(cache.stats().memory_entries, 0);
}
