//! Application services for OAuth flow orchestration.

mod flow_manager;

pub use flow_manager::{InitiatedFlow, OAuthError, OAuthFlowManager, OAuthResult};
