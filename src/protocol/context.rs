//! Application Context - Services Shared by All Handlers
//!
//! Built once at startup from configuration plus the port
//! implementations chosen by `main` (or by tests).

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::router::MethodInfo;
use super::subscriptions::{MarketEvent, MarketUpdate, SubscriptionRegistry};
use super::token::TokenSigner;
use crate::adapters::metrics::MetricsRegistry;
use crate::config::AppConfig;
use crate::domain::amm::{AmmPricer, to_f64_lossy};
use crate::domain::fees::FeeSchedule;
use crate::ports::identity::IdentityStore;
use crate::ports::payments::PaymentVerifier;
use crate::ports::price_feed::PriceFeed;
use crate::store::Store;
use crate::usecases::ledger::LedgerService;
use crate::usecases::payments::PaymentService;
use crate::usecases::perpetuals::{PerpMarketSpec, PerpetualService};
use crate::usecases::prediction::PredictionService;
use crate::usecases::social::SocialService;

const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Port implementations injected into the context.
pub struct Collaborators {
    pub price_feed: Arc<dyn PriceFeed>,
    pub payment_verifier: Arc<dyn PaymentVerifier>,
    pub identity: Arc<dyn IdentityStore>,
    pub metrics: Option<Arc<MetricsRegistry>>,
}

pub struct AppContext {
    /// Exchange name reported by discovery.
    pub server_name: String,
    pub store: Arc<Store>,
    pub ledger: LedgerService,
    pub prediction: PredictionService,
    pub perps: PerpetualService,
    pub payments: PaymentService,
    pub social: SocialService,
    pub identity: Arc<dyn IdentityStore>,
    pub tokens: Arc<TokenSigner>,
    pub subscriptions: SubscriptionRegistry,
    pub metrics: Option<Arc<MetricsRegistry>>,
    admins: HashSet<String>,
    pub started_at: DateTime<Utc>,
    /// Registered methods, filled in when the router is built.
    pub catalog: OnceLock<Vec<MethodInfo>>,
}

impl AppContext {
    pub fn from_config(config: &AppConfig, store: Arc<Store>, deps: Collaborators, token_secret: &str) -> Self {
        let trading = &config.trading;
        let pricer = AmmPricer::new(FeeSchedule::new(trading.fee_rate));
        let perp_markets = config
            .perps
            .markets
            .iter()
            .map(|m| PerpMarketSpec {
                ticker: m.ticker.clone(),
                name: if m.name.is_empty() { m.ticker.clone() } else { m.name.clone() },
                max_leverage: m.max_leverage,
            })
            .collect();

        Self {
            server_name: config.server.name.clone(),
            ledger: LedgerService::new(
                Arc::clone(&store),
                trading.initial_balance,
                trading.initial_reputation_points,
            ),
            prediction: PredictionService::new(
                Arc::clone(&store),
                pricer,
                trading.max_trade_amount,
                trading.cache_ttl_secs,
            ),
            perps: PerpetualService::new(
                Arc::clone(&store),
                deps.price_feed,
                perp_markets,
                config.perps.maintenance_margin_ratio,
            ),
            payments: PaymentService::new(
                Arc::clone(&store),
                deps.payment_verifier,
                Arc::clone(&deps.identity),
                config.payments.ttl_secs,
                config.payments.max_amount,
            ),
            social: SocialService::new(),
            identity: deps.identity,
            tokens: Arc::new(TokenSigner::new(token_secret, config.auth.token_ttl_secs)),
            subscriptions: SubscriptionRegistry::new(UPDATE_CHANNEL_CAPACITY),
            metrics: deps.metrics,
            admins: config.moderation.admin_users.iter().cloned().collect(),
            started_at: Utc::now(),
            catalog: OnceLock::new(),
            store,
        }
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.contains(user_id)
    }

    /// Count a committed trade.
    pub fn record_trade(&self, kind: &str, notional: Decimal) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_trade(kind, to_f64_lossy(notional));
        }
    }

    /// Fan out a committed market change to subscribers.
    pub fn publish_market(&self, market_id: &str, event: MarketEvent, yes_price: Decimal, no_price: Decimal) {
        self.subscriptions.publish(MarketUpdate {
            market_id: market_id.to_string(),
            event,
            yes_price,
            no_price,
            at: Utc::now(),
        });
        if let Some(metrics) = &self.metrics {
            metrics.subscriptions.set(i64::try_from(self.subscriptions.len()).unwrap_or(i64::MAX));
        }
    }
}
