//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! resolving secrets from the environment, and providing clear
//! error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::{AppConfig, AuthConfig};

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    markets = config.markets.len(),
    perps = config.perps.markets.len(),
    fee_rate = %config.trading.fee_rate,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Resolve the bearer-token signing secret.
///
/// Falls back to a random per-process secret when the variable is unset;
/// tokens issued under it do not survive a restart.
pub fn resolve_token_secret(auth: &AuthConfig) -> String {
  match std::env::var(&auth.token_secret_env) {
    Ok(secret) if !secret.is_empty() => secret,
    _ => {
      warn!(
        var = %auth.token_secret_env,
        "Token secret not set; using an ephemeral secret"
      );
      format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
    }
  }
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Fee and margin ratios in range
/// - Positive balances, prices and limits
/// - Unique perp tickers with sane leverage caps
/// - Well-formed seed markets
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.server.name.is_empty(),
    "server.name must not be empty"
  );

  // Trading validation
  let trading = &config.trading;
  anyhow::ensure!(
    trading.fee_rate >= Decimal::ZERO && trading.fee_rate < Decimal::new(5, 1),
    "trading.fee_rate must be in [0, 0.5), got {}",
    trading.fee_rate
  );
  anyhow::ensure!(
    trading.initial_balance >= Decimal::ZERO,
    "trading.initial_balance must be non-negative, got {}",
    trading.initial_balance
  );
  anyhow::ensure!(
    trading.initial_reputation_points >= 0,
    "trading.initial_reputation_points must be non-negative"
  );
  anyhow::ensure!(
    trading.max_trade_amount > Decimal::ZERO,
    "trading.max_trade_amount must be positive"
  );

  // Perp validation
  let mmr = config.perps.maintenance_margin_ratio;
  anyhow::ensure!(
    mmr > Decimal::ZERO && mmr <= Decimal::ONE,
    "perps.maintenance_margin_ratio must be in (0, 1], got {}",
    mmr
  );
  let mut tickers = HashSet::new();
  for perp in &config.perps.markets {
    anyhow::ensure!(!perp.ticker.is_empty(), "Perp market has empty ticker");
    anyhow::ensure!(
      tickers.insert(perp.ticker.to_ascii_uppercase()),
      "Duplicate perp ticker {}",
      perp.ticker
    );
    anyhow::ensure!(
      perp.reference_price > Decimal::ZERO,
      "Perp {} reference_price must be positive",
      perp.ticker
    );
    anyhow::ensure!(
      (1..=1000).contains(&perp.max_leverage),
      "Perp {} max_leverage must be in [1, 1000], got {}",
      perp.ticker,
      perp.max_leverage
    );
  }

  // Seed market validation
  for (i, market) in config.markets.iter().enumerate() {
    anyhow::ensure!(
      !market.question.trim().is_empty(),
      "Market {} has an empty question",
      i
    );
    anyhow::ensure!(
      market.seed_yes >= Decimal::ZERO && market.seed_no >= Decimal::ZERO,
      "Market {} ({}) has negative seed reserves",
      i,
      market.question
    );
  }

  // Auth validation
  anyhow::ensure!(
    config.auth.token_ttl_secs > 0,
    "auth.token_ttl_secs must be positive"
  );
  anyhow::ensure!(
    config.auth.signature_window_secs > 0,
    "auth.signature_window_secs must be positive"
  );

  // Payments validation
  anyhow::ensure!(
    config.payments.ttl_secs > 0,
    "payments.ttl_secs must be positive"
  );
  anyhow::ensure!(
    config.payments.max_amount > Decimal::ZERO,
    "payments.max_amount must be positive"
  );

  anyhow::ensure!(
    config.chain.value_decimals <= 28,
    "chain.value_decimals must be at most 28, got {}",
    config.chain.value_decimals
  );

  // Rate limit validation
  anyhow::ensure!(
    config.rate_limits.requests_per_minute > 0,
    "rate_limits.requests_per_minute must be positive"
  );
  anyhow::ensure!(
    config.rate_limits.burst > 0,
    "rate_limits.burst must be positive"
  );

  anyhow::ensure!(
    config.feeds.stale_after_secs > 0,
    "feeds.stale_after_secs must be positive"
  );

  Ok(())
}
