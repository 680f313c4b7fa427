//! Chain Adapters - Payment Receipt Verification
//!
//! Implements the `PaymentVerifier` port:
//! - `RpcPaymentVerifier`: `eth_getTransactionReceipt` over JSON-RPC
//! - `OfflineVerifier`: rejects every receipt when no RPC is configured

pub mod receipts;

pub use receipts::{OfflineVerifier, RpcPaymentVerifier};
