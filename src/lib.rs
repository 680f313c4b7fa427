//! A2A Exchange - Library Root
//!
//! Agent-to-agent trading server: prediction-market AMM, perpetuals,
//! wallet ledger and micropayments behind an authenticated JSON-RPC
//! router. Re-exports all modules for integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod protocol;
pub mod store;
pub mod usecases;
