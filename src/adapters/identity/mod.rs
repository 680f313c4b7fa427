//! Identity Adapters - Sessions and Agent Registry
//!
//! In-memory `IdentityStore` seeded from `[auth]` configuration.

pub mod memory;

pub use memory::MemoryIdentityStore;
