//! Port contracts for OAuth flow persistence and token exchange.

mod exchange;
mod flow_store;
mod token_store;

pub use exchange::{CodeExchangeRequest, TokenExchangeError, TokenExchanger};
pub use flow_store::{FlowStateStore, FlowStoreError, FlowStoreResult};
pub use token_store::{TokenStore, TokenStoreError, TokenStoreResult};

#[cfg(test)]
pub use exchange::MockTokenExchanger;
