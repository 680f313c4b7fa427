//! Leaderboard and aggregate statistics.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::social::OptionalUserParams;
use super::{Field, method, page};
use crate::domain::payment::PaymentStatus;
use crate::protocol::auth::Principal;
use crate::protocol::context::AppContext;
use crate::protocol::error::RpcFailure;
use crate::protocol::router::{MethodGroup, MethodRegistry, NoParams, Params};
use crate::usecases::ledger::{LeaderboardEntry, LeaderboardMetric};
use crate::usecases::social::SocialStats;

pub(super) fn register(registry: &mut MethodRegistry) {
    use Field::Optional;
    use MethodGroup::Stats;
    registry.register(
        method(
            "a2a.getLeaderboard",
            Stats,
            "Top users by pnl, balance or reputation",
            &[Optional("limit", "integer"), Optional("metric", "string")],
        ),
        get_leaderboard,
    );
    registry.register(
        method(
            "a2a.getUserStats",
            Stats,
            "Trading and social counters for one user",
            &[Optional("userId", "string")],
        ),
        get_user_stats,
    );
    registry.register(
        method("a2a.getSystemStats", Stats, "Exchange-wide counters", &[]),
        get_system_stats,
    );
}

#[derive(Debug, Deserialize)]
struct LeaderboardParams {
    limit: Option<usize>,
    #[serde(default)]
    metric: LeaderboardMetric,
}

impl Params for LeaderboardParams {}

#[derive(Debug, Serialize)]
struct Leaderboard {
    metric: &'static str,
    entries: Vec<LeaderboardEntry>,
}

async fn get_leaderboard(
    ctx: Arc<AppContext>,
    _: Principal,
    params: LeaderboardParams,
) -> Result<Leaderboard, RpcFailure> {
    let limit = page(params.limit, 10, 100);
    let metric = match params.metric {
        LeaderboardMetric::Pnl => "pnl",
        LeaderboardMetric::Balance => "balance",
        LeaderboardMetric::Reputation => "reputation",
    };
    Ok(Leaderboard {
        metric,
        entries: ctx.ledger.leaderboard(params.metric, limit).await,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserStats {
    user_id: String,
    balance: Decimal,
    #[serde(rename = "lifetimePnL")]
    lifetime_pnl: Decimal,
    reputation_points: i64,
    open_positions: usize,
    open_perp_positions: usize,
    trades: usize,
    #[serde(flatten)]
    social: SocialStats,
}

async fn get_user_stats(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: OptionalUserParams,
) -> Result<UserStats, RpcFailure> {
    let user_id = params.or_caller(&principal);
    let wallet = ctx.ledger.wallet(&user_id).await?;
    let (open_positions, open_perp_positions, trades) = ctx
        .store
        .read(|t| {
            (
                t.positions_for(&user_id).count(),
                t.perp_positions_for(&user_id).filter(|p| p.is_open()).count(),
                t.ledger_for(&user_id).filter(|row| row.kind.is_trade()).count(),
            )
        })
        .await;
    let social = ctx.social.stats(&user_id).await;
    Ok(UserStats {
        user_id,
        balance: wallet.virtual_balance,
        lifetime_pnl: wallet.lifetime_pnl,
        reputation_points: wallet.reputation_points,
        open_positions,
        open_perp_positions,
        trades,
        social,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SystemStats {
    server: String,
    markets: usize,
    open_markets: usize,
    wallets: usize,
    open_perp_positions: usize,
    pending_payments: usize,
    ledger_rows: usize,
    posts: usize,
    subscriptions: usize,
    methods: usize,
    uptime_secs: i64,
}

async fn get_system_stats(ctx: Arc<AppContext>, _: Principal, _: NoParams) -> Result<SystemStats, RpcFailure> {
    let (markets, open_markets, wallets, open_perp_positions, pending_payments, ledger_rows) = ctx
        .store
        .read(|t| {
            (
                t.markets.len(),
                t.markets.values().filter(|m| !m.resolved).count(),
                t.wallets.len(),
                t.perp_positions.values().filter(|p| p.is_open()).count(),
                t.payments
                    .values()
                    .filter(|p| p.status == PaymentStatus::Pending)
                    .count(),
                t.ledger.len(),
            )
        })
        .await;
    Ok(SystemStats {
        server: ctx.server_name.clone(),
        markets,
        open_markets,
        wallets,
        open_perp_positions,
        pending_payments,
        ledger_rows,
        posts: ctx.social.post_count().await,
        subscriptions: ctx.subscriptions.len(),
        methods: ctx.catalog.get().map_or(0, Vec::len),
        uptime_secs: (Utc::now() - ctx.started_at).num_seconds(),
    })
}
