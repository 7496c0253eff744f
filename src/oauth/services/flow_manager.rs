//! OAuth flow manager: initiation, completion, callback handling and waiting.

use crate::oauth::{
    domain::{
        FlowId, FlowMetadata, FlowStatus, OAuthConfig, OAuthDomainError, OAuthFlowState,
        OAuthTokens, PkcePair, TokenKey, build_authorization_url,
    },
    ports::{
        CodeExchangeRequest, FlowStateStore, FlowStoreError, TokenExchangeError, TokenExchanger,
        TokenStore, TokenStoreError,
    },
};
use mockable::Clock;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Default lifetime of a flow record in the flow-state store.
pub const DEFAULT_FLOW_TTL: Duration = Duration::from_secs(600);

/// Upper bound between flow-state polls while waiting, covering completions
/// recorded by another process sharing the store.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors returned by [`OAuthFlowManager`].
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Domain validation or transition failed.
    #[error(transparent)]
    Domain(#[from] OAuthDomainError),

    /// No flow exists for the identifier, or it expired.
    #[error("OAuth flow {0} not found")]
    FlowNotFound(FlowId),

    /// The flow is still pending.
    #[error("OAuth flow {0} has not completed")]
    FlowNotCompleted(FlowId),

    /// The flow ended in failure.
    #[error("OAuth flow {flow_id} failed: {reason}")]
    FlowFailed {
        /// Flow identifier.
        flow_id: FlowId,
        /// Recorded failure reason.
        reason: String,
    },

    /// A field required by the operation is missing from the flow record.
    #[error("OAuth flow {flow_id} has no {field}")]
    MissingFlowData {
        /// Flow identifier.
        flow_id: FlowId,
        /// Missing field name.
        field: &'static str,
    },

    /// Waiting for the flow exceeded the caller's deadline.
    #[error("timed out waiting for OAuth flow {0}")]
    Timeout(FlowId),

    /// Flow-state store failure.
    #[error(transparent)]
    FlowStore(#[from] FlowStoreError),

    /// Token store failure.
    #[error(transparent)]
    TokenStore(#[from] TokenStoreError),

    /// Code exchange failure.
    #[error(transparent)]
    TokenExchange(#[from] TokenExchangeError),
}

/// Result type for flow manager operations.
pub type OAuthResult<T> = Result<T, OAuthError>;

/// Outcome of starting an authorization flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedFlow {
    /// Identifier the callback carries back as `state`.
    pub flow_id: FlowId,
    /// URL the user must visit.
    pub authorization_url: Url,
}

/// Tracks multi-step OAuth handshakes keyed by flow id.
///
/// Two kinds of flow exist. An *authorization* flow carries the OAuth client
/// settings and PKCE verifier and is completed by the browser callback. A
/// *tool* flow is what a blocked connection attempt waits on; an
/// authorization flow whose metadata names a `tool_flow_id` completes (or
/// fails) that tool flow together with itself.
pub struct OAuthFlowManager<F, T, X, C>
where
    F: FlowStateStore,
    T: TokenStore,
    X: TokenExchanger,
    C: Clock + Send + Sync,
{
    flows: Arc<F>,
    tokens: Arc<T>,
    exchanger: Arc<X>,
    clock: Arc<C>,
    flow_ttl: Duration,
    waiters: Mutex<HashMap<FlowId, Arc<Notify>>>,
}

impl<F, T, X, C> OAuthFlowManager<F, T, X, C>
where
    F: FlowStateStore,
    T: TokenStore,
    X: TokenExchanger,
    C: Clock + Send + Sync,
{
    /// Creates a flow manager.
    #[must_use]
    pub fn new(flows: Arc<F>, tokens: Arc<T>, exchanger: Arc<X>, clock: Arc<C>) -> Self {
        Self {
            flows,
            tokens,
            exchanger,
            clock,
            flow_ttl: DEFAULT_FLOW_TTL,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the flow record lifetime.
    #[must_use]
    pub const fn with_flow_ttl(mut self, flow_ttl: Duration) -> Self {
        self.flow_ttl = flow_ttl;
        self
    }

    /// Starts an authorization flow for `server_name` on behalf of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Domain`] when the OAuth settings are invalid and
    /// store errors when the flow cannot be recorded.
    pub async fn initiate(
        &self,
        server_name: &str,
        server_url: Option<&str>,
        user_id: &str,
        oauth: &OAuthConfig,
    ) -> OAuthResult<InitiatedFlow> {
        self.start_authorization(server_name, server_url, user_id, oauth, None)
            .await
    }

    /// Starts an authorization flow whose completion also completes
    /// `tool_flow_id`.
    ///
    /// # Errors
    ///
    /// See [`Self::initiate`].
    pub async fn initiate_chained(
        &self,
        server_name: &str,
        server_url: Option<&str>,
        user_id: &str,
        oauth: &OAuthConfig,
        tool_flow_id: FlowId,
    ) -> OAuthResult<InitiatedFlow> {
        self.start_authorization(server_name, server_url, user_id, oauth, Some(tool_flow_id))
            .await
    }

    /// Records a pending tool flow that a connection attempt can wait on.
    ///
    /// # Errors
    ///
    /// Returns store errors when the flow cannot be recorded.
    pub async fn begin_tool_flow(&self, server_name: &str, user_id: &str) -> OAuthResult<FlowId> {
        let flow_id = FlowId::generate(user_id, server_name);
        let state = OAuthFlowState::pending(
            flow_id.clone(),
            FlowMetadata::new(server_name, user_id),
            self.clock.utc(),
        );
        self.flows.put(&state, self.flow_ttl).await?;
        debug!(flow_id = %flow_id, server = server_name, "recorded pending tool flow");
        Ok(flow_id)
    }

    /// Returns the current state of a flow, if it exists.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub async fn get_flow_state(&self, flow_id: &FlowId) -> OAuthResult<Option<OAuthFlowState>> {
        Ok(self.flows.get(flow_id).await?)
    }

    /// Marks a flow completed with `tokens`, cascading to its linked tool
    /// flow.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::FlowNotFound`] for unknown flows and
    /// [`OAuthError::Domain`] when the flow is no longer pending.
    pub async fn complete_flow(&self, flow_id: &FlowId, tokens: OAuthTokens) -> OAuthResult<()> {
        let mut state = self.require_flow(flow_id).await?;
        state.complete(tokens.clone(), self.clock.utc())?;
        self.flows.put(&state, self.flow_ttl).await?;
        self.wake(flow_id);
        info!(flow_id = %flow_id, server = %state.metadata().server_name, "OAuth flow completed");

        if let Some(tool_flow_id) = state.metadata().tool_flow_id.as_ref() {
            self.settle_linked(tool_flow_id, Settlement::Completed(tokens))
                .await?;
        }
        Ok(())
    }

    /// Marks a flow failed, cascading to its linked tool flow.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::FlowNotFound`] for unknown flows and
    /// [`OAuthError::Domain`] when the flow is no longer pending.
    pub async fn fail_flow(&self, flow_id: &FlowId, reason: &str) -> OAuthResult<()> {
        let mut state = self.require_flow(flow_id).await?;
        state.fail(reason, self.clock.utc())?;
        self.flows.put(&state, self.flow_ttl).await?;
        self.wake(flow_id);
        warn!(flow_id = %flow_id, reason, "OAuth flow failed");

        if let Some(tool_flow_id) = state.metadata().tool_flow_id.as_ref() {
            self.settle_linked(tool_flow_id, Settlement::Failed(reason.to_owned()))
                .await?;
        }
        Ok(())
    }

    /// Handles the authorization callback: exchanges `code`, stores the
    /// tokens for the flow's user and server, and completes the flow.
    ///
    /// A rejected exchange fails the flow before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::TokenExchange`] when the token endpoint refuses
    /// the code, plus the errors of [`Self::complete_flow`].
    pub async fn handle_callback(&self, flow_id: &FlowId, code: &str) -> OAuthResult<OAuthTokens> {
        let state = self.require_flow(flow_id).await?;
        if state.status().is_terminal() {
            return Err(OAuthDomainError::FlowNotPending {
                flow_id: flow_id.clone(),
                status: state.status(),
            }
            .into());
        }

        let metadata = state.metadata();
        let oauth = metadata
            .oauth
            .as_ref()
            .ok_or_else(|| OAuthError::MissingFlowData {
                flow_id: flow_id.clone(),
                field: "oauth",
            })?;
        let request = CodeExchangeRequest::from_config(oauth, code, metadata.code_verifier.clone());

        let response = match self.exchanger.exchange_code(&request).await {
            Ok(response) => response,
            Err(err) => {
                self.fail_flow(flow_id, &err.to_string()).await?;
                return Err(err.into());
            }
        };

        let tokens = response.into_tokens(self.clock.utc());
        let key = TokenKey::new(metadata.user_id.as_str(), metadata.server_name.as_str());
        self.store_tokens(&key, &tokens).await?;
        self.complete_flow(flow_id, tokens.clone()).await?;
        Ok(tokens)
    }

    /// Returns the tokens of a completed flow.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::FlowNotCompleted`] while pending and
    /// [`OAuthError::FlowFailed`] for failed flows.
    pub async fn get_tokens(&self, flow_id: &FlowId) -> OAuthResult<OAuthTokens> {
        let state = self.require_flow(flow_id).await?;
        settled_tokens(&state)?.ok_or_else(|| OAuthError::FlowNotCompleted(flow_id.clone()))
    }

    /// Waits until a flow completes or fails, or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Timeout`] when the deadline passes,
    /// [`OAuthError::FlowFailed`] for failed flows, and
    /// [`OAuthError::FlowNotFound`] when the flow disappears.
    pub async fn wait_for_completion(
        &self,
        flow_id: &FlowId,
        timeout: Duration,
    ) -> OAuthResult<OAuthTokens> {
        let deadline = Instant::now() + timeout;
        loop {
            let notify = self.waiter(flow_id)?;
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let settled = async { settled_tokens(&self.require_flow(flow_id).await?) }.await;
            match settled {
                Ok(None) => {}
                Ok(Some(tokens)) => {
                    self.forget_waiter(flow_id);
                    return Ok(tokens);
                }
                Err(err) => {
                    self.forget_waiter(flow_id);
                    return Err(err);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                self.forget_waiter(flow_id);
                return Err(OAuthError::Timeout(flow_id.clone()));
            }
            let pause = deadline.duration_since(now).min(WAIT_POLL_INTERVAL);
            if tokio::time::timeout(pause, notified).await.is_err() {
                debug!(flow_id = %flow_id, "re-polling OAuth flow state");
            }
        }
    }

    /// Returns unexpired stored credentials for a user and server.
    ///
    /// # Errors
    ///
    /// Returns token store errors.
    pub async fn stored_tokens(&self, key: &TokenKey) -> OAuthResult<Option<OAuthTokens>> {
        let now = self.clock.utc();
        Ok(self
            .tokens
            .find(key)
            .await?
            .filter(|tokens| !tokens.is_expired(now)))
    }

    /// Creates or replaces stored credentials.
    ///
    /// # Errors
    ///
    /// Returns token store errors.
    pub async fn store_tokens(&self, key: &TokenKey, tokens: &OAuthTokens) -> OAuthResult<()> {
        if self.tokens.find(key).await?.is_some() {
            self.tokens.update(key, tokens).await?;
        } else {
            self.tokens.create(key, tokens).await?;
        }
        debug!(key = %key, "stored OAuth tokens");
        Ok(())
    }

    /// Deletes stored credentials.
    ///
    /// # Errors
    ///
    /// Returns token store errors.
    pub async fn revoke_tokens(&self, key: &TokenKey) -> OAuthResult<()> {
        Ok(self.tokens.delete(key).await?)
    }

    /// Returns the custom variable values a user saved for a server.
    ///
    /// # Errors
    ///
    /// Returns token store errors.
    pub async fn user_variables(&self, key: &TokenKey) -> OAuthResult<BTreeMap<String, String>> {
        Ok(self.tokens.find_variables(key).await?)
    }

    /// Replaces the custom variable values a user saved for a server.
    ///
    /// # Errors
    ///
    /// Returns token store errors.
    pub async fn store_user_variables(
        &self,
        key: &TokenKey,
        values: &BTreeMap<String, String>,
    ) -> OAuthResult<()> {
        self.tokens.save_variables(key, values).await?;
        debug!(key = %key, count = values.len(), "stored custom user variables");
        Ok(())
    }

    async fn start_authorization(
        &self,
        server_name: &str,
        server_url: Option<&str>,
        user_id: &str,
        oauth: &OAuthConfig,
        tool_flow_id: Option<FlowId>,
    ) -> OAuthResult<InitiatedFlow> {
        oauth.validate()?;
        let flow_id = FlowId::generate(user_id, server_name);
        let pkce = PkcePair::generate();
        let authorization_url = build_authorization_url(oauth, &flow_id, pkce.challenge())?;

        let metadata = FlowMetadata {
            server_name: server_name.to_owned(),
            server_url: server_url.map(str::to_owned),
            user_id: user_id.to_owned(),
            oauth: Some(oauth.clone()),
            code_verifier: Some(pkce.verifier().to_owned()),
            tool_flow_id,
        };
        let state = OAuthFlowState::pending(flow_id.clone(), metadata, self.clock.utc());
        self.flows.put(&state, self.flow_ttl).await?;

        info!(flow_id = %flow_id, server = server_name, "initiated OAuth authorization flow");
        Ok(InitiatedFlow {
            flow_id,
            authorization_url,
        })
    }

    async fn settle_linked(&self, flow_id: &FlowId, settlement: Settlement) -> OAuthResult<()> {
        let Some(mut linked) = self.flows.get(flow_id).await? else {
            warn!(flow_id = %flow_id, "linked tool flow expired before completion");
            return Ok(());
        };
        if linked.status().is_terminal() {
            debug!(
                flow_id = %flow_id,
                status = %linked.status(),
                "linked tool flow already settled"
            );
            return Ok(());
        }

        let now = self.clock.utc();
        match settlement {
            Settlement::Completed(tokens) => linked.complete(tokens, now)?,
            Settlement::Failed(reason) => linked.fail(reason, now)?,
        }
        self.flows.put(&linked, self.flow_ttl).await?;
        self.wake(flow_id);
        Ok(())
    }

    async fn require_flow(&self, flow_id: &FlowId) -> OAuthResult<OAuthFlowState> {
        self.flows
            .get(flow_id)
            .await?
            .ok_or_else(|| OAuthError::FlowNotFound(flow_id.clone()))
    }

    fn waiter(&self, flow_id: &FlowId) -> OAuthResult<Arc<Notify>> {
        let mut waiters = self
            .waiters
            .lock()
            .map_err(|err| FlowStoreError::backend(std::io::Error::other(err.to_string())))?;
        Ok(waiters
            .entry(flow_id.clone())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone())
    }

    fn wake(&self, flow_id: &FlowId) {
        let removed = match self.waiters.lock() {
            Ok(mut waiters) => waiters.remove(flow_id),
            Err(err) => {
                warn!(flow_id = %flow_id, error = %err, "OAuth waiter registry poisoned");
                None
            }
        };
        if let Some(notify) = removed {
            notify.notify_waiters();
        }
    }

    fn forget_waiter(&self, flow_id: &FlowId) {
        if let Ok(mut waiters) = self.waiters.lock() {
            waiters.remove(flow_id);
        }
    }
}

enum Settlement {
    Completed(OAuthTokens),
    Failed(String),
}

fn settled_tokens(state: &OAuthFlowState) -> OAuthResult<Option<OAuthTokens>> {
    match state.status() {
        FlowStatus::Pending => Ok(None),
        FlowStatus::Completed => state
            .result()
            .cloned()
            .map(Some)
            .ok_or_else(|| OAuthError::MissingFlowData {
                flow_id: state.flow_id().clone(),
                field: "result",
            }),
        FlowStatus::Failed => Err(OAuthError::FlowFailed {
            flow_id: state.flow_id().clone(),
            reason: state.error().unwrap_or("unknown error").to_owned(),
        }),
    }
}
