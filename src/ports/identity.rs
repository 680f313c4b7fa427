//! Identity Store Port - Sessions and Agent Registry
//!
//! Backs the legacy session-token verifier and the wallet-signature
//! verifier's agent-to-user lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
  /// Agent identifier, usually `chainId:tokenId`.
  pub agent_id: String,
  /// Platform user the agent acts for.
  pub user_id: String,
  /// Wallet address the agent signs with (lowercase hex).
  pub address: Option<String>,
}

/// Lookup of sessions and agents.
#[async_trait]
pub trait IdentityStore: Send + Sync + 'static {
  /// Resolve an opaque session token to a user id.
  async fn session_user(&self, token: &str) -> anyhow::Result<Option<String>>;

  /// Look up an agent by id.
  async fn agent(&self, agent_id: &str) -> anyhow::Result<Option<AgentRecord>>;

  /// Register a new agent; returns the stored record.
  async fn register_agent(&self, record: AgentRecord) -> anyhow::Result<AgentRecord>;

  /// Bind `address` to an agent registered without one.
  ///
  /// Compare-and-set: an address already bound is kept. Returns the record
  /// as stored, or `None` for an unknown agent.
  async fn bind_address(&self, agent_id: &str, address: &str) -> anyhow::Result<Option<AgentRecord>>;

  /// Wallet addresses bound to the agents acting for `user_id`.
  async fn addresses_of(&self, user_id: &str) -> anyhow::Result<Vec<String>>;

  /// All registered agents.
  async fn agents(&self) -> anyhow::Result<Vec<AgentRecord>>;
}
