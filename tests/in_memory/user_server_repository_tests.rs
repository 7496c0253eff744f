//! Contract tests for [`InMemoryUserServerRepository`].

use crate::in_memory::helpers::{alice, bob, clock, repo, runtime, stdio_config};
use chrono::Utc;
use gropius::tool_registry::{
    adapters::memory::InMemoryUserServerRepository,
    domain::{ServerStatus, ToolDescriptor, TransportKind, UserId, UserServerRecord},
    ports::{UserServerFilter, UserServerRepository, UserServerRepositoryError},
};
use mockable::DefaultClock;
use rstest::rstest;
use serde_json::json;
use std::io;
use tokio::runtime::Runtime;

#[rstest]
fn names_are_unique_per_owner_only(
    runtime: io::Result<Runtime>,
    repo: InMemoryUserServerRepository,
    clock: DefaultClock,
    alice: UserId,
    bob: UserId,
) {
    let rt = runtime.expect("runtime creation");
    let first = UserServerRecord::new(alice.clone(), stdio_config("notes"), &clock);
    let duplicate = UserServerRecord::new(alice.clone(), stdio_config("notes"), &clock);
    let other_owner = UserServerRecord::new(bob, stdio_config("notes"), &clock);

    rt.block_on(repo.create(&first)).expect("first create");
    let result = rt.block_on(repo.create(&duplicate));
    rt.block_on(repo.create(&other_owner))
        .expect("same name for another owner");

    assert!(
        matches!(
            result,
            Err(UserServerRepositoryError::DuplicateServerName { ref user_id, ref name })
                if user_id == &alice && name.as_str() == "notes"
        ),
        "second record with the same owner and name should be rejected"
    );
}

#[rstest]
fn records_are_hidden_from_other_owners(
    runtime: io::Result<Runtime>,
    repo: InMemoryUserServerRepository,
    clock: DefaultClock,
    alice: UserId,
    bob: UserId,
) {
    let rt = runtime.expect("runtime creation");
    let record = UserServerRecord::new(alice.clone(), stdio_config("notes"), &clock);
    rt.block_on(repo.create(&record)).expect("create");

    let as_owner = rt.block_on(repo.get(record.id(), &alice)).expect("get");
    let as_stranger = rt.block_on(repo.get(record.id(), &bob)).expect("get");
    let delete_as_stranger = rt.block_on(repo.delete(record.id(), &bob));

    assert_eq!(as_owner.as_ref(), Some(&record));
    assert!(as_stranger.is_none());
    assert!(matches!(
        delete_as_stranger,
        Err(UserServerRepositoryError::NotFound(id)) if id == record.id()
    ));
}

#[rstest]
fn renames_release_the_old_name(
    runtime: io::Result<Runtime>,
    repo: InMemoryUserServerRepository,
    clock: DefaultClock,
    alice: UserId,
) {
    let rt = runtime.expect("runtime creation");
    let mut record = UserServerRecord::new(alice.clone(), stdio_config("notes"), &clock);
    rt.block_on(repo.create(&record)).expect("create");

    record.replace_config(stdio_config("journal"), Utc::now());
    rt.block_on(repo.update(&record)).expect("rename");
    let reused = UserServerRecord::new(alice, stdio_config("notes"), &clock);

    rt.block_on(repo.create(&reused))
        .expect("old name should be free after the rename");
}

#[rstest]
fn renames_onto_a_taken_name_are_rejected(
    runtime: io::Result<Runtime>,
    repo: InMemoryUserServerRepository,
    clock: DefaultClock,
    alice: UserId,
) {
    let rt = runtime.expect("runtime creation");
    let notes = UserServerRecord::new(alice.clone(), stdio_config("notes"), &clock);
    let mut journal = UserServerRecord::new(alice, stdio_config("journal"), &clock);
    rt.block_on(repo.create(&notes)).expect("create notes");
    rt.block_on(repo.create(&journal)).expect("create journal");

    journal.replace_config(stdio_config("notes"), Utc::now());
    let result = rt.block_on(repo.update(&journal));

    assert!(matches!(
        result,
        Err(UserServerRepositoryError::DuplicateServerName { .. })
    ));
}

#[rstest]
fn listing_filters_and_orders_by_owner_then_name(
    runtime: io::Result<Runtime>,
    repo: InMemoryUserServerRepository,
    clock: DefaultClock,
    alice: UserId,
    bob: UserId,
) {
    let rt = runtime.expect("runtime creation");
    for (owner, name) in [(&bob, "alpha"), (&alice, "weather"), (&alice, "notes")] {
        let record = UserServerRecord::new(owner.clone(), stdio_config(name), &clock);
        rt.block_on(repo.create(&record)).expect("create");
    }
    let weather = rt
        .block_on(repo.list(&UserServerFilter::for_user(alice.clone())))
        .expect("list")
        .into_iter()
        .find(|record| record.config().name().as_str() == "weather")
        .expect("weather record");
    rt.block_on(repo.toggle_enabled(weather.id(), &alice, false, Utc::now()))
        .expect("disable");

    let all = rt.block_on(repo.list(&UserServerFilter::all())).expect("list");
    let enabled = rt
        .block_on(repo.list(&UserServerFilter::enabled()))
        .expect("list");
    let streamable_only = rt
        .block_on(repo.list(&UserServerFilter {
            transport: Some(TransportKind::StreamableHttp),
            ..UserServerFilter::default()
        }))
        .expect("list");

    let ordered: Vec<(&str, &str)> = all
        .iter()
        .map(|record| (record.user_id().as_str(), record.config().name().as_str()))
        .collect();
    assert_eq!(
        ordered,
        vec![("alice", "notes"), ("alice", "weather"), ("bob", "alpha")]
    );
    assert_eq!(enabled.len(), 2);
    assert!(streamable_only.is_empty());
}

#[rstest]
fn status_and_tools_are_recorded(
    runtime: io::Result<Runtime>,
    repo: InMemoryUserServerRepository,
    clock: DefaultClock,
    alice: UserId,
) {
    let rt = runtime.expect("runtime creation");
    let record = UserServerRecord::new(alice.clone(), stdio_config("notes"), &clock);
    rt.block_on(repo.create(&record)).expect("create");
    let tool = ToolDescriptor::new("search", json!({"type": "object"}), Utc::now())
        .expect("valid tool")
        .with_enabled(false);

    rt.block_on(repo.set_status(
        record.id(),
        ServerStatus::Error,
        Some("spawn failed"),
        Utc::now(),
    ))
    .expect("set status");
    rt.block_on(repo.set_tools(record.id(), std::slice::from_ref(&tool), Utc::now()))
        .expect("set tools");
    let stored = rt
        .block_on(repo.get(record.id(), &alice))
        .expect("get")
        .expect("record exists");
    let errored = rt
        .block_on(repo.list(&UserServerFilter {
            status: Some(ServerStatus::Error),
            ..UserServerFilter::default()
        }))
        .expect("list");

    assert_eq!(stored.status(), ServerStatus::Error);
    assert_eq!(stored.error_message(), Some("spawn failed"));
    assert_eq!(stored.tools(), &[tool]);
    assert_eq!(errored.len(), 1);
}
