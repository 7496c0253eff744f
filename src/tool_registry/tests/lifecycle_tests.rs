//! Lifecycle controller behaviour over the scripted connector.

use super::support::{Harness, harness, name, stdio, tools};
use crate::tool_registry::{
    adapters::memory::ServerScript,
    domain::{
        ConfigOrigin, ServerInstructions, ServerKey, ServerStatus, UserId, UserServerRecord,
    },
    ports::{UserServerFilter, UserServerRepository},
    services::{CatalogView, ToolRegistryError},
};
use chrono::Utc;
use futures_util::future::join_all;
use mockable::DefaultClock;
use rstest::rstest;
use serde_json::json;
use std::time::Duration;

fn global(server: &str) -> ServerKey {
    ServerKey::global(name(server))
}

fn catalog_names(view: &CatalogView, harness: &Harness) -> Vec<String> {
    harness
        .controller
        .catalog()
        .snapshot(view)
        .expect("snapshot")
        .into_keys()
        .collect()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn initialize_brings_a_stdio_server_online_with_qualified_tools() {
    let harness = harness(&["echo"]);
    harness.script("echo", tools(&["echo"]));

    let report = harness.controller.initialize().await.expect("initialize");

    assert_eq!(report.online(), 1);
    let server = harness
        .controller
        .server(&global("echo"))
        .expect("state readable")
        .expect("tracked");
    assert_eq!(server.state().status(), ServerStatus::Online);
    assert_eq!(catalog_names(&CatalogView::All, &harness), vec!["echo_mcp_echo"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn one_failing_server_does_not_stop_the_others() {
    let harness = harness(&["broken", "healthy"]);
    harness.script("broken", ServerScript::new().failing_connect("refused"));
    harness.script("healthy", tools(&["ping"]));

    let report = harness.controller.initialize().await.expect("initialize");

    assert_eq!(report.online(), 1);
    let failed = report.failed();
    assert_eq!(failed.len(), 1);
    let broken = failed.first().expect("one failure");
    assert_eq!(broken.key, global("broken"));
    assert!(broken.error.as_deref().is_some_and(|message| message.contains("refused")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn refreshing_one_server_leaves_the_other_untouched() {
    let harness = harness(&["A", "B"]);
    harness.script("A", tools(&["alpha"]));
    harness.script("B", tools(&["beta"]));
    harness.controller.initialize().await.expect("initialize");
    let before_b = harness
        .controller
        .catalog()
        .entries_for(&global("B"))
        .expect("entries");

    harness.script("A", tools(&["gamma"]));
    let outcome = harness
        .controller
        .refresh_server(&global("A"))
        .await
        .expect("refresh");

    assert!(outcome.is_online());
    assert_eq!(
        harness.controller.catalog().entries_for(&global("B")).expect("entries"),
        before_b
    );
    assert_eq!(
        catalog_names(&CatalogView::All, &harness),
        vec!["beta_mcp_B", "gamma_mcp_A"]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_reconnect_clears_tools_and_records_the_error() {
    let harness = harness(&["notes"]);
    harness.script("notes", tools(&["search"]));
    harness.controller.initialize().await.expect("initialize");

    harness.script("notes", ServerScript::new().failing_connect("connection refused"));
    let outcome = harness
        .controller
        .refresh_server(&global("notes"))
        .await
        .expect("refresh reports");

    assert_eq!(outcome.status, ServerStatus::Error);
    assert!(outcome.error.is_some());
    assert!(
        harness
            .controller
            .catalog()
            .entries_for(&global("notes"))
            .expect("entries")
            .is_empty()
    );
    assert!(
        harness
            .controller
            .registry()
            .get(&global("notes"))
            .expect("registry")
            .is_none()
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_servers_can_be_retried() {
    let harness = harness(&["notes"]);
    harness.script("notes", ServerScript::new().failing_connect("down"));
    harness.controller.initialize().await.expect("initialize");

    harness.script("notes", tools(&["search"]));
    let outcome = harness
        .controller
        .refresh_server(&global("notes"))
        .await
        .expect("refresh");

    assert!(outcome.is_online());
    assert_eq!(outcome.tool_count, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_refreshes_keep_one_connection_per_server() {
    let harness = harness(&["notes"]);
    harness.script("notes", tools(&["search"]));
    harness.controller.initialize().await.expect("initialize");
    let key = global("notes");

    let outcomes = join_all((0..5).map(|_| harness.controller.refresh_server(&key))).await;

    assert!(outcomes.iter().all(|outcome| outcome.as_ref().is_ok_and(|found| found.is_online())));
    assert_eq!(harness.controller.registry().len().expect("len"), 1);
    assert_eq!(harness.connector.live_connections(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn discovery_failures_leave_no_connection_behind() {
    let harness = harness(&["notes"]);
    harness.script("notes", ServerScript::new().failing_list("listing broke"));

    let report = harness.controller.initialize().await.expect("initialize");

    assert_eq!(report.failed().len(), 1);
    assert_eq!(harness.connector.live_connections(), 0);
    assert!(harness.controller.registry().keys().expect("keys").is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn teardown_empties_registry_and_catalog_despite_disconnect_errors() {
    let harness = harness(&["A", "B"]);
    harness.script("A", tools(&["alpha"]));
    harness.script("B", tools(&["beta"]));
    harness.controller.initialize().await.expect("initialize");
    harness.script(
        "A",
        tools(&["alpha"]).failing_disconnect("socket reset"),
    );

    let report = harness.controller.teardown().await.expect("teardown");

    assert_eq!(report.disconnected, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(harness.controller.registry().len().expect("len"), 0);
    assert_eq!(harness.controller.catalog().tool_count().expect("count"), 0);
    assert!(
        harness
            .controller
            .servers()
            .expect("servers")
            .iter()
            .all(|(_, server)| server.state().status() == ServerStatus::Offline)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn test_connection_has_no_side_effects() {
    let harness = harness(&["notes"]);
    harness.script("notes", tools(&["search"]));
    harness.script("scratch", tools(&["inspect", "query"]).with_instructions("be nice"));
    harness.controller.initialize().await.expect("initialize");
    let registry_before = harness.controller.registry().keys().expect("keys");
    let catalog_before = catalog_names(&CatalogView::All, &harness);

    let report = harness
        .controller
        .test_connection(&stdio("scratch"), None)
        .await
        .expect("dry run completes");

    assert!(report.success);
    assert_eq!(report.tools.len(), 2);
    assert_eq!(report.instructions.as_deref(), Some("be nice"));
    assert_eq!(harness.controller.registry().keys().expect("keys"), registry_before);
    assert_eq!(catalog_names(&CatalogView::All, &harness), catalog_before);
    assert_eq!(harness.connector.live_connections(), 1);
    assert!(harness.controller.server(&global("scratch")).expect("state").is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn test_connection_reports_failures_without_erroring() {
    let harness = harness(&[]);
    harness.script("scratch", ServerScript::new().failing_connect("nope"));

    let report = harness
        .controller
        .test_connection(&stdio("scratch"), None)
        .await
        .expect("dry run completes");

    assert!(!report.success);
    assert!(!report.oauth_required);
    assert!(report.error.is_some());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disabled_servers_stay_offline_without_connecting() {
    let harness = harness(&[]);
    harness.script("idle", tools(&["nap"]));

    let outcome = harness
        .controller
        .connect_server(global("idle"), stdio("idle").with_enabled(false), ConfigOrigin::File)
        .await
        .expect("tracked");

    assert_eq!(outcome.status, ServerStatus::Offline);
    assert_eq!(harness.connector.connect_attempts(&name("idle")).expect("attempts"), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disabled_tools_are_unpublished_and_rejected_on_call() {
    let harness = harness(&["notes"]);
    harness.script("notes", tools(&["search", "create"]));
    harness.controller.initialize().await.expect("initialize");

    harness
        .controller
        .toggle_tool(&global("notes"), "create", false)
        .await
        .expect("toggle");
    let result = harness
        .controller
        .call_tool(&CatalogView::All, "create_mcp_notes", json!({}))
        .await;
    harness
        .controller
        .refresh_server(&global("notes"))
        .await
        .expect("refresh");

    assert!(matches!(result, Err(ToolRegistryError::ToolDisabled(_))));
    assert_eq!(catalog_names(&CatalogView::All, &harness), vec!["search_mcp_notes"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tool_calls_route_to_the_owning_server() {
    let harness = harness(&["echo"]);
    harness.script("echo", tools(&["echo"]));
    harness.controller.initialize().await.expect("initialize");

    let result = harness
        .controller
        .call_tool(&CatalogView::All, "echo_mcp_echo", json!({ "text": "hi" }))
        .await
        .expect("call succeeds");
    let missing = harness
        .controller
        .call_tool(&CatalogView::All, "nope_mcp_echo", json!({}))
        .await;

    assert_eq!(result.structured_content, Some(json!({ "text": "hi" })));
    assert!(matches!(missing, Err(ToolRegistryError::ToolNotFound(_))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn refreshing_unknown_servers_is_not_found() {
    let harness = harness(&[]);

    let result = harness.controller.refresh_server(&global("ghost")).await;
    let report = harness.controller.refresh_all().await.expect("refresh all");

    assert!(matches!(result, Err(ToolRegistryError::ServerNotFound(_))));
    assert!(report.is_no_configs());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn refresh_all_reports_every_server() {
    let harness = harness(&["A", "B"]);
    harness.script("A", tools(&["alpha"]));
    harness.script("B", ServerScript::new().failing_connect("down"));
    harness.controller.initialize().await.expect("initialize");

    let report = harness.controller.refresh_all().await.expect("refresh all");

    assert_eq!(report.servers.len(), 2);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn refresh_tools_reuses_the_open_connection() {
    let harness = harness(&["notes"]);
    harness.script("notes", tools(&["search"]));
    harness.controller.initialize().await.expect("initialize");

    harness.script("notes", tools(&["search", "archive"]));
    let outcome = harness
        .controller
        .refresh_tools(&global("notes"))
        .await
        .expect("refresh tools");

    assert_eq!(outcome.tool_count, 2);
    assert_eq!(harness.connector.connect_attempts(&name("notes")).expect("attempts"), 1);
}

#[rstest]
#[case(ServerInstructions::Disabled, None)]
#[case(ServerInstructions::FromServer, Some("from server"))]
#[case(ServerInstructions::Custom(String::from("custom")), Some("custom"))]
#[tokio::test(flavor = "multi_thread")]
async fn instructions_follow_the_server_setting(
    #[case] setting: ServerInstructions,
    #[case] expected: Option<&str>,
) {
    let harness = harness(&[]);
    harness.script("notes", tools(&["search"]).with_instructions("from server"));

    harness
        .controller
        .connect_server(
            global("notes"),
            stdio("notes").with_server_instructions(setting),
            ConfigOrigin::File,
        )
        .await
        .expect("connect");

    let server = harness
        .controller
        .server(&global("notes"))
        .expect("state")
        .expect("tracked");
    assert_eq!(server.state().instructions(), expected);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn user_servers_connect_under_their_own_key_and_persist_status() {
    let harness = harness(&["notes"]);
    harness.script("notes", tools(&["search"]));
    let alice = UserId::new("alice").expect("valid user");
    let record = UserServerRecord::new(alice.clone(), stdio("notes"), &DefaultClock);
    harness.repository.create(&record).await.expect("stored");

    harness.controller.initialize().await.expect("initialize");

    let keys = harness.controller.registry().keys().expect("keys");
    assert_eq!(keys, vec![global("notes"), ServerKey::user(alice.clone(), name("notes"))]);
    let stored = harness
        .repository
        .list(&UserServerFilter::for_user(alice))
        .await
        .expect("list");
    let persisted = stored.first().expect("record");
    assert_eq!(persisted.status(), ServerStatus::Online);
    assert_eq!(persisted.tools().len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn override_mode_skips_user_servers() {
    let harness = harness(&["notes"]);
    harness.script("notes", tools(&["search"]));
    let alice = UserId::new("alice").expect("valid user");
    let record = UserServerRecord::new(alice, stdio("notes"), &DefaultClock);
    harness.repository.create(&record).await.expect("stored");
    harness.controller.set_override_mode(true);

    let report = harness.controller.initialize().await.expect("initialize");

    assert!(harness.controller.override_mode());
    assert_eq!(report.servers.len(), 1);
    assert_eq!(harness.controller.registry().keys().expect("keys"), vec![global("notes")]);
}

async fn store_journal_for_alice(harness: &Harness) -> (ServerKey, UserServerRecord) {
    harness.script("journal", tools(&["write"]));
    let alice = UserId::new("alice").expect("valid user");
    let record = UserServerRecord::new(alice.clone(), stdio("journal"), &DefaultClock);
    harness.repository.create(&record).await.expect("stored");
    (ServerKey::user(alice, name("journal")), record)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn enabling_override_mode_forgets_connected_user_servers() {
    let harness = harness(&["notes"]);
    harness.script("notes", tools(&["search"]));
    let (user_key, _) = store_journal_for_alice(&harness).await;
    harness.controller.initialize().await.expect("initialize");
    assert_eq!(harness.connector.live_connections(), 2);

    harness.controller.set_override_mode(true);
    harness.controller.initialize().await.expect("reinitialize");

    assert_eq!(harness.controller.registry().keys().expect("keys"), vec![global("notes")]);
    assert_eq!(harness.controller.server(&user_key).expect("state"), None);
    assert!(
        harness
            .controller
            .catalog()
            .entries_for(&user_key)
            .expect("entries")
            .is_empty()
    );
    assert_eq!(harness.connector.live_connections(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disabled_user_records_are_forgotten_on_reinitialize() {
    let harness = harness(&["notes"]);
    harness.script("notes", tools(&["search"]));
    let (user_key, record) = store_journal_for_alice(&harness).await;
    harness.controller.initialize().await.expect("initialize");

    harness
        .repository
        .toggle_enabled(record.id(), record.user_id(), false, Utc::now())
        .await
        .expect("toggled");
    harness.controller.initialize().await.expect("reinitialize");

    assert_eq!(harness.controller.server(&user_key).expect("state"), None);
    assert_eq!(
        catalog_names(&CatalogView::All, &harness),
        vec!["search_mcp_notes"]
    );
    assert_eq!(harness.connector.live_connections(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn override_mode_keeps_user_servers_from_reconnecting() {
    let harness = harness(&["notes"]);
    harness.script("notes", tools(&["search"]));
    let (user_key, _) = store_journal_for_alice(&harness).await;
    harness.controller.initialize().await.expect("initialize");
    harness.controller.set_override_mode(true);

    let report = harness.controller.refresh_all().await.expect("refresh all");
    let refreshed = harness
        .controller
        .refresh_server(&user_key)
        .await
        .expect("refresh user server");

    let keys: Vec<ServerKey> = report.servers.into_iter().map(|outcome| outcome.key).collect();
    assert_eq!(keys, vec![global("notes")]);
    assert_eq!(refreshed.status, ServerStatus::Offline);
    assert_eq!(
        harness.connector.connect_attempts(&name("journal")).expect("attempts"),
        1
    );
    assert_eq!(harness.controller.registry().keys().expect("keys"), vec![global("notes")]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn teardown_waits_for_an_in_flight_refresh() {
    let harness = harness(&["slow"]);
    harness.script("slow", tools(&["tick"]));
    harness.controller.initialize().await.expect("initialize");
    harness.script(
        "slow",
        tools(&["tick"]).with_connect_delay(Duration::from_millis(300)),
    );
    let key = global("slow");

    let (refreshed, torn_down) = tokio::join!(harness.controller.refresh_server(&key), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        harness.controller.teardown().await
    });

    let outcome = refreshed.expect("refresh completes");
    assert_eq!(outcome.status, ServerStatus::Online);
    let report = torn_down.expect("teardown");
    assert_eq!(report.disconnected, 1);
    assert_eq!(harness.controller.registry().len().expect("len"), 0);
    assert_eq!(harness.controller.catalog().tool_count().expect("count"), 0);
    assert_eq!(harness.connector.live_connections(), 0);
    let server = harness
        .controller
        .server(&key)
        .expect("state")
        .expect("tracked");
    assert_eq!(server.state().status(), ServerStatus::Offline);
}
