//! Domain model for OAuth authorization flows.

mod authorization;
mod config;
mod error;
mod flow;
mod pkce;
mod tokens;

pub use authorization::build_authorization_url;
pub use config::{OAuthConfig, TokenExchangeMethod};
pub use error::{OAuthDomainError, ParseFlowStatusError};
pub use flow::{FlowId, FlowMetadata, FlowStatus, OAuthFlowState};
pub use pkce::PkcePair;
pub use tokens::{OAuthTokens, TokenEndpointResponse, TokenKey};
