//! Configuration Module - TOML-based Exchange Configuration
//!
//! Loads and validates configuration from `config.toml`. Secrets are
//! never stored in the file: the bearer-token signing key is read from
//! the environment variable named by `auth.token_secret_env`.
//! Seed markets, perp tickers and trading parameters are externalized
//! here - nothing is hardcoded in the domain layer.

pub mod loader;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Top-level exchange configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any listener is bound.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Server identity and HTTP binding.
  pub server: ServerConfig,
  /// Prediction-market trading parameters.
  #[serde(default)]
  pub trading: TradingConfig,
  /// Perpetual instrument definitions.
  #[serde(default)]
  pub perps: PerpsConfig,
  /// Markets created at startup when the store is empty.
  #[serde(default)]
  pub markets: Vec<MarketSeedConfig>,
  /// Credential verification.
  #[serde(default)]
  pub auth: AuthConfig,
  /// Micropayment intents.
  #[serde(default)]
  pub payments: PaymentsConfig,
  /// Chain RPC used to verify payment receipts.
  #[serde(default)]
  pub chain: ChainConfig,
  /// Per-agent request limits.
  #[serde(default)]
  pub rate_limits: RateLimitConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Persistence configuration.
  #[serde(default)]
  pub persistence: PersistenceConfig,
  /// External price feeds for perp tickers.
  #[serde(default)]
  pub feeds: FeedsConfig,
  /// Moderation and admin rights.
  #[serde(default)]
  pub moderation: ModerationConfig,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Human-readable exchange name, reported by discovery.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// A2A endpoint bind address.
  #[serde(default = "default_bind_address")]
  pub bind_address: String,
}

/// Prediction-market trading configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
  /// AMM fee fraction (0.01 = 1%).
  #[serde(default = "default_fee_rate")]
  pub fee_rate: Decimal,
  /// Virtual balance granted to a new wallet.
  #[serde(default = "default_initial_balance")]
  pub initial_balance: Decimal,
  /// Reputation points granted to a new wallet.
  #[serde(default = "default_initial_points")]
  pub initial_reputation_points: i64,
  /// Largest single buy, in balance units.
  #[serde(default = "default_max_trade_amount")]
  pub max_trade_amount: Decimal,
  /// TTL of cached market reads (seconds).
  #[serde(default = "default_cache_ttl")]
  pub cache_ttl_secs: i64,
}

/// Perpetual instruments.
#[derive(Debug, Clone, Deserialize)]
pub struct PerpsConfig {
  /// Fraction of margin consumed at the liquidation price.
  #[serde(default = "default_mmr")]
  pub maintenance_margin_ratio: Decimal,
  /// Tradable tickers.
  #[serde(default)]
  pub markets: Vec<PerpMarketConfig>,
}

/// One perp ticker.
#[derive(Debug, Clone, Deserialize)]
pub struct PerpMarketConfig {
  /// Ticker as used in `openPosition` (e.g. "BTC").
  pub ticker: String,
  /// Display name.
  #[serde(default)]
  pub name: String,
  /// Exchange stream symbol (e.g. "btcusdt"); no live feed when absent.
  pub feed_symbol: Option<String>,
  /// Price used until the first live tick arrives.
  pub reference_price: Decimal,
  /// Highest allowed leverage.
  #[serde(default = "default_max_leverage")]
  pub max_leverage: u32,
}

/// Market created at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSeedConfig {
  pub question: String,
  pub end_time: DateTime<Utc>,
  /// Initial YES reserve.
  pub seed_yes: Decimal,
  /// Initial NO reserve.
  pub seed_no: Decimal,
}

/// Credential verification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
  /// Environment variable holding the bearer-token HMAC secret.
  #[serde(default = "default_token_secret_env")]
  pub token_secret_env: String,
  /// Lifetime of issued bearer tokens (seconds).
  #[serde(default = "default_token_ttl")]
  pub token_ttl_secs: i64,
  /// Accepted clock skew for wallet signatures (seconds).
  #[serde(default = "default_signature_window")]
  pub signature_window_secs: i64,
  /// Register unknown agents on their first valid signature.
  #[serde(default = "default_true")]
  pub auto_register_agents: bool,
  /// Pre-provisioned legacy session tokens.
  #[serde(default)]
  pub sessions: Vec<SessionConfig>,
  /// Pre-registered agents.
  #[serde(default)]
  pub agents: Vec<AgentConfig>,
}

/// Legacy session token mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
  pub token: String,
  pub user_id: String,
}

/// Pre-registered agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
  pub agent_id: String,
  pub user_id: String,
  pub address: Option<String>,
}

/// Micropayment configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
  /// Seconds before a pending intent expires.
  #[serde(default = "default_payment_ttl")]
  pub ttl_secs: i64,
  /// Largest amount a single intent may request.
  #[serde(default = "default_max_payment")]
  pub max_amount: Decimal,
}

/// Chain RPC configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
  /// JSON-RPC endpoint; receipts are rejected when absent.
  pub rpc_url: Option<String>,
  /// Address payments must be sent to, if enforced.
  pub receiver_address: Option<String>,
  /// Request timeout in seconds.
  #[serde(default = "default_timeout")]
  pub timeout_seconds: u64,
  /// Decimals of the native unit: one credit equals `10^value_decimals`
  /// base units of transaction value.
  #[serde(default = "default_value_decimals")]
  pub value_decimals: u32,
}

impl Default for ChainConfig {
  fn default() -> Self {
    Self {
      rpc_url: None,
      receiver_address: None,
      timeout_seconds: default_timeout(),
      value_decimals: default_value_decimals(),
    }
  }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
  /// Sustained requests per minute per agent.
  #[serde(default = "default_requests_per_minute")]
  pub requests_per_minute: u32,
  /// Bucket size: requests allowed back to back before the sustained rate applies.
  #[serde(default = "default_burst")]
  pub burst: u32,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Write snapshots and the ledger journal.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Directory for the state snapshot and JSONL ledger journal.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// State snapshot interval (seconds).
  #[serde(default = "default_snapshot_interval")]
  pub snapshot_interval_seconds: u64,
}

/// Price feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
  /// Stream live prices from Binance for tickers with a `feed_symbol`.
  #[serde(default)]
  pub binance_enabled: bool,
  /// Binance WebSocket base URL.
  #[serde(default = "default_binance_ws")]
  pub binance_ws_url: String,
  /// Seconds without a tick before the feed reports unhealthy.
  #[serde(default = "default_stale_after")]
  pub stale_after_secs: i64,
}

/// Moderation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModerationConfig {
  /// Users allowed to create and resolve markets.
  #[serde(default)]
  pub admin_users: Vec<String>,
}

impl Default for TradingConfig {
  fn default() -> Self {
    Self {
      fee_rate: default_fee_rate(),
      initial_balance: default_initial_balance(),
      initial_reputation_points: default_initial_points(),
      max_trade_amount: default_max_trade_amount(),
      cache_ttl_secs: default_cache_ttl(),
    }
  }
}

impl Default for PerpsConfig {
  fn default() -> Self {
    Self {
      maintenance_margin_ratio: default_mmr(),
      markets: Vec::new(),
    }
  }
}

impl Default for AuthConfig {
  fn default() -> Self {
    Self {
      token_secret_env: default_token_secret_env(),
      token_ttl_secs: default_token_ttl(),
      signature_window_secs: default_signature_window(),
      auto_register_agents: true,
      sessions: Vec::new(),
      agents: Vec::new(),
    }
  }
}

impl Default for PaymentsConfig {
  fn default() -> Self {
    Self {
      ttl_secs: default_payment_ttl(),
      max_amount: default_max_payment(),
    }
  }
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      requests_per_minute: default_requests_per_minute(),
      burst: default_burst(),
    }
  }
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      data_dir: default_data_dir(),
      snapshot_interval_seconds: default_snapshot_interval(),
    }
  }
}

impl Default for FeedsConfig {
  fn default() -> Self {
    Self {
      binance_enabled: false,
      binance_ws_url: default_binance_ws(),
      stale_after_secs: default_stale_after(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_bind_address() -> String {
  "0.0.0.0:3000".to_string()
}

fn default_true() -> bool {
  true
}

fn default_fee_rate() -> Decimal {
  dec!(0.01)
}

fn default_initial_balance() -> Decimal {
  dec!(1000)
}

fn default_initial_points() -> i64 {
  100
}

fn default_max_trade_amount() -> Decimal {
  dec!(100000)
}

fn default_cache_ttl() -> i64 {
  5
}

fn default_mmr() -> Decimal {
  crate::domain::perp::DEFAULT_MAINTENANCE_MARGIN_RATIO
}

fn default_max_leverage() -> u32 {
  100
}

fn default_token_secret_env() -> String {
  "A2A_TOKEN_SECRET".to_string()
}

fn default_token_ttl() -> i64 {
  3600
}

fn default_signature_window() -> i64 {
  300
}

fn default_payment_ttl() -> i64 {
  900
}

fn default_max_payment() -> Decimal {
  dec!(10000)
}

fn default_timeout() -> u64 {
  10
}

fn default_value_decimals() -> u32 {
  18
}

fn default_requests_per_minute() -> u32 {
  120
}

fn default_burst() -> u32 {
  20
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_snapshot_interval() -> u64 {
  60
}

fn default_binance_ws() -> String {
  "wss://stream.binance.com:9443/ws".to_string()
}

fn default_stale_after() -> i64 {
  30
}
