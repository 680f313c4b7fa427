//! Market Subscriptions - Process-Local Fan-Out
//!
//! `marketId -> {agentId}` membership plus a broadcast channel of
//! committed market changes. Stream consumers filter the channel by
//! their own subscriptions. Best-effort: lagging receivers drop updates.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// What changed a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketEvent {
    Trade,
    Resolved,
}

/// Snapshot published after a committed market change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketUpdate {
    pub market_id: String,
    pub event: MarketEvent,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub at: DateTime<Utc>,
}

/// Subscriber registry owned by the router.
pub struct SubscriptionRegistry {
    members: DashMap<String, BTreeSet<String>>,
    updates: broadcast::Sender<MarketUpdate>,
}

impl SubscriptionRegistry {
    pub fn new(capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity);
        Self {
            members: DashMap::new(),
            updates,
        }
    }

    /// Returns `false` if the agent was already subscribed.
    pub fn subscribe(&self, market_id: &str, agent_id: &str) -> bool {
        self.members
            .entry(market_id.to_string())
            .or_default()
            .insert(agent_id.to_string())
    }

    /// Returns `false` if the agent was not subscribed.
    pub fn unsubscribe(&self, market_id: &str, agent_id: &str) -> bool {
        let removed = self
            .members
            .get_mut(market_id)
            .is_some_and(|mut set| set.remove(agent_id));
        self.members.remove_if(market_id, |_, set| set.is_empty());
        removed
    }

    pub fn is_subscribed(&self, market_id: &str, agent_id: &str) -> bool {
        self.members
            .get(market_id)
            .is_some_and(|set| set.contains(agent_id))
    }

    pub fn subscribers(&self, market_id: &str) -> Vec<String> {
        self.members
            .get(market_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Markets `agent_id` follows.
    pub fn subscriptions_of(&self, agent_id: &str) -> Vec<String> {
        let mut markets: Vec<String> = self
            .members
            .iter()
            .filter(|entry| entry.value().contains(agent_id))
            .map(|entry| entry.key().clone())
            .collect();
        markets.sort();
        markets
    }

    /// Total (market, agent) pairs.
    pub fn len(&self) -> usize {
        self.members.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish an update; returns how many subscribers should see it.
    pub fn publish(&self, update: MarketUpdate) -> usize {
        let audience = self.members.get(&update.market_id).map_or(0, |set| set.len());
        if audience > 0 {
            // No live stream receivers is not an error.
            let _ = self.updates.send(update);
        }
        debug!(audience, "Market update published");
        audience
    }

    pub fn updates(&self) -> broadcast::Receiver<MarketUpdate> {
        self.updates.subscribe()
    }
}
