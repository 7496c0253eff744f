//! Adapter implementations for OAuth ports.

pub mod memory;

mod http;

pub use http::ReqwestTokenExchanger;
