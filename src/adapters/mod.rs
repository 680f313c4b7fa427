//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, WebSockets, file I/O). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `chain`: payment receipt lookup over Ethereum JSON-RPC
//! - `feeds`: perp reference prices (config seeds, Binance WebSocket)
//! - `identity`: in-memory sessions and agent registry
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: JSONL ledger journal and state snapshots

pub mod chain;
pub mod feeds;
pub mod identity;
pub mod metrics;
pub mod persistence;
