//! Shared wiring for controller and service tests.

use crate::tool_registry::{
    adapters::memory::{
        InMemoryToolCacheStore, InMemoryUserServerRepository, ScriptedConnector, ServerScript,
        remote_tool,
    },
    domain::{McpSettings, McpTransport, ServerConfig, ServerName},
    ports::{FileConfig, FileServerMap, MockAuthorizationBroker},
    services::LifecycleController,
};
use mockable::DefaultClock;
use std::sync::Arc;

pub(super) type TestController = LifecycleController<
    InMemoryUserServerRepository,
    InMemoryToolCacheStore,
    MockAuthorizationBroker,
    DefaultClock,
>;

pub(super) struct Harness {
    pub(super) connector: ScriptedConnector,
    pub(super) repository: Arc<InMemoryUserServerRepository>,
    pub(super) controller: Arc<TestController>,
}

pub(super) fn name(value: &str) -> ServerName {
    ServerName::new(value).expect("valid server name")
}

pub(super) fn stdio(server: &str) -> ServerConfig {
    ServerConfig::new(
        name(server),
        McpTransport::stdio(format!("{server}-mcp")).expect("valid transport"),
    )
}

pub(super) fn tools(names: &[&str]) -> ServerScript {
    ServerScript::new().with_tools(
        names
            .iter()
            .map(|tool| remote_tool(*tool, format!("{tool} tool"))),
    )
}

pub(super) fn harness_with(
    servers: &[&str],
    settings: McpSettings,
    broker: MockAuthorizationBroker,
) -> Harness {
    let connector = ScriptedConnector::new();
    let repository = Arc::new(InMemoryUserServerRepository::new());
    let file: FileServerMap = servers
        .iter()
        .map(|server| (name(server), stdio(server)))
        .collect();
    let controller = LifecycleController::new(
        FileConfig {
            settings,
            servers: file,
        },
        Arc::new(connector.clone()),
        Arc::clone(&repository),
        Arc::new(InMemoryToolCacheStore::new()),
        Arc::new(broker),
        Arc::new(DefaultClock),
    );
    Harness {
        connector,
        repository,
        controller: Arc::new(controller),
    }
}

pub(super) fn harness(servers: &[&str]) -> Harness {
    harness_with(servers, McpSettings::default(), MockAuthorizationBroker::new())
}

impl Harness {
    pub(super) fn script(&self, server: &str, script: ServerScript) {
        self.connector
            .script(&name(server), script)
            .expect("script installs");
    }
}
