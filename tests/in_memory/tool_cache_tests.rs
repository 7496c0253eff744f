//! Tests for [`InMemoryToolCacheStore`].

use crate::in_memory::helpers::{alice, runtime};
use chrono::Utc;
use gropius::tool_registry::{
    adapters::memory::InMemoryToolCacheStore,
    domain::{CatalogTool, DEFAULT_TOOL_DELIMITER, ServerKey, ServerName, ToolDescriptor, UserId},
    ports::{CacheScope, CachedCatalog, ToolCacheStore},
};
use rstest::rstest;
use serde_json::json;
use std::io;
use tokio::runtime::Runtime;

fn catalog_with(tool: &str, server: &str) -> CachedCatalog {
    let descriptor =
        ToolDescriptor::new(tool, json!({"type": "object"}), Utc::now()).expect("valid tool");
    let entry = CatalogTool::new(
        ServerKey::global(ServerName::new(server).expect("valid server name")),
        descriptor,
        DEFAULT_TOOL_DELIMITER,
    );
    CachedCatalog::from([(entry.qualified_name().to_owned(), entry)])
}

#[rstest]
fn snapshots_are_kept_per_scope(runtime: io::Result<Runtime>, alice: UserId) {
    let rt = runtime.expect("runtime creation");
    let cache = InMemoryToolCacheStore::new();
    let global = catalog_with("forecast", "weather");
    let personal = catalog_with("search", "notes");

    rt.block_on(cache.set(&CacheScope::Global, &global))
        .expect("set global");
    rt.block_on(cache.set(&CacheScope::User(alice.clone()), &personal))
        .expect("set user");

    let read_global = rt.block_on(cache.get(&CacheScope::Global)).expect("get");
    let read_user = rt
        .block_on(cache.get(&CacheScope::User(alice)))
        .expect("get");
    assert_eq!(read_global, Some(global));
    assert_eq!(read_user, Some(personal));
    assert_eq!(cache.cached_partitions().expect("count"), 2);
}

#[rstest]
fn invalidation_drops_every_partition(runtime: io::Result<Runtime>, alice: UserId) {
    let rt = runtime.expect("runtime creation");
    let cache = InMemoryToolCacheStore::new();
    rt.block_on(cache.set(&CacheScope::Global, &catalog_with("forecast", "weather")))
        .expect("set global");
    rt.block_on(cache.set(&CacheScope::User(alice.clone()), &CachedCatalog::new()))
        .expect("set user");

    rt.block_on(cache.invalidate_all()).expect("invalidate");

    assert_eq!(cache.cached_partitions().expect("count"), 0);
    assert!(
        rt.block_on(cache.get(&CacheScope::User(alice)))
            .expect("get")
            .is_none()
    );
}
