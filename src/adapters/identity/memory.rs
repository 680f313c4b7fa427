//! In-Memory Identity Store
//!
//! Session tokens and registered agents held in concurrent maps.
//! Agents auto-registered at runtime live for the process lifetime.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use crate::config::AuthConfig;
use crate::ports::identity::{AgentRecord, IdentityStore};

/// Concurrent in-memory session and agent registry.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    /// Session token -> user id.
    sessions: DashMap<String, String>,
    /// Agent id -> record.
    agents: DashMap<String, AgentRecord>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed sessions and agents from configuration.
    pub fn from_config(config: &AuthConfig) -> Self {
        let store = Self::new();
        for session in &config.sessions {
            store.add_session(&session.token, &session.user_id);
        }
        for agent in &config.agents {
            store.agents.insert(
                agent.agent_id.clone(),
                AgentRecord {
                    agent_id: agent.agent_id.clone(),
                    user_id: agent.user_id.clone(),
                    address: agent.address.as_ref().map(|a| a.to_lowercase()),
                },
            );
        }
        info!(
            sessions = store.sessions.len(),
            agents = store.agents.len(),
            "Identity store seeded"
        );
        store
    }

    pub fn add_session(&self, token: &str, user_id: &str) {
        self.sessions.insert(token.to_string(), user_id.to_string());
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn session_user(&self, token: &str) -> Result<Option<String>> {
        Ok(self.sessions.get(token).map(|u| u.value().clone()))
    }

    async fn agent(&self, agent_id: &str) -> Result<Option<AgentRecord>> {
        Ok(self.agents.get(agent_id).map(|a| a.value().clone()))
    }

    async fn register_agent(&self, mut record: AgentRecord) -> Result<AgentRecord> {
        record.address = record.address.map(|a| a.to_lowercase());
        // First registration wins; concurrent first requests see one record.
        let stored = self
            .agents
            .entry(record.agent_id.clone())
            .or_insert(record)
            .value()
            .clone();
        Ok(stored)
    }

    async fn bind_address(&self, agent_id: &str, address: &str) -> Result<Option<AgentRecord>> {
        // The shard write lock makes check-then-set atomic per agent.
        let Some(mut entry) = self.agents.get_mut(agent_id) else {
            return Ok(None);
        };
        if entry.address.is_none() {
            entry.address = Some(address.to_lowercase());
            info!(agent_id, "Agent address bound on first signature");
        }
        Ok(Some(entry.value().clone()))
    }

    async fn addresses_of(&self, user_id: &str) -> Result<Vec<String>> {
        let mut addresses: Vec<String> = self
            .agents
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter_map(|a| a.address.clone())
            .collect();
        addresses.sort();
        addresses.dedup();
        Ok(addresses)
    }

    async fn agents(&self) -> Result<Vec<AgentRecord>> {
        let mut agents: Vec<AgentRecord> = self.agents.iter().map(|a| a.value().clone()).collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, SessionConfig};

    fn config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.sessions = vec![SessionConfig {
            token: "sess-1".into(),
            user_id: "alice".into(),
        }];
        config.agents = vec![AgentConfig {
            agent_id: "1:42".into(),
            user_id: "bob".into(),
            address: Some("0xABCdef0000000000000000000000000000000001".into()),
        }];
        config
    }

    #[tokio::test]
    async fn test_seeded_lookups() {
        let store = MemoryIdentityStore::from_config(&config());
        assert_eq!(store.session_user("sess-1").await.unwrap().as_deref(), Some("alice"));
        assert!(store.session_user("nope").await.unwrap().is_none());
        let agent = store.agent("1:42").await.unwrap().unwrap();
        assert_eq!(agent.user_id, "bob");
        assert_eq!(
            agent.address.as_deref(),
            Some("0xabcdef0000000000000000000000000000000001")
        );
    }

    #[tokio::test]
    async fn test_register_keeps_first_record() {
        let store = MemoryIdentityStore::new();
        let first = AgentRecord {
            agent_id: "a".into(),
            user_id: "a".into(),
            address: None,
        };
        let second = AgentRecord {
            user_id: "other".into(),
            ..first.clone()
        };
        store.register_agent(first.clone()).await.unwrap();
        let stored = store.register_agent(second).await.unwrap();
        assert_eq!(stored, first);
        assert_eq!(store.agents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bind_address_only_once() {
        let store = MemoryIdentityStore::new();
        store
            .register_agent(AgentRecord {
                agent_id: "a".into(),
                user_id: "u".into(),
                address: None,
            })
            .await
            .unwrap();
        let bound = store.bind_address("a", "0xAA").await.unwrap().unwrap();
        assert_eq!(bound.address.as_deref(), Some("0xaa"));
        let again = store.bind_address("a", "0xbb").await.unwrap().unwrap();
        assert_eq!(again.address.as_deref(), Some("0xaa"));
        assert!(store.bind_address("missing", "0xcc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_addresses_of_user() {
        let store = MemoryIdentityStore::from_config(&config());
        assert_eq!(
            store.addresses_of("bob").await.unwrap(),
            vec!["0xabcdef0000000000000000000000000000000001".to_string()]
        );
        assert!(store.addresses_of("alice").await.unwrap().is_empty());
    }
}
