//! A2A Protocol - Authentication, Dispatch and Transport
//!
//! JSON-RPC 2.0 envelope, credential verification, the method table and
//! the axum server that fronts it.

pub mod actions;
pub mod auth;
pub mod context;
pub mod error;
pub mod jsonrpc;
pub mod methods;
pub mod router;
pub mod server;
pub mod subscriptions;
pub mod token;
