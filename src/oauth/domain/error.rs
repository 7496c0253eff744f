//! Validation and state errors for OAuth domain values.

use super::{FlowId, FlowStatus};
use thiserror::Error;

/// Errors returned while constructing or mutating OAuth domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OAuthDomainError {
    /// An OAuth endpoint URL is empty, unparsable, or not `http(s)`.
    #[error("OAuth {field} '{url}' must be an absolute http:// or https:// URL")]
    InvalidEndpointUrl {
        /// Configuration field that failed validation.
        field: &'static str,
        /// Offending value.
        url: String,
    },

    /// A flow transition was attempted from a terminal state.
    #[error("OAuth flow {flow_id} is {status}, expected PENDING")]
    FlowNotPending {
        /// Flow identifier.
        flow_id: FlowId,
        /// Current status.
        status: FlowStatus,
    },
}

/// Error returned while parsing a flow status from storage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown OAuth flow status: {0}")]
pub struct ParseFlowStatusError(pub String);
