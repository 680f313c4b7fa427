//! Portfolio: balances, positions and ledger history of the caller.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Field, method, page};
use crate::domain::market::{BalanceTransaction, Wallet};
use crate::protocol::auth::Principal;
use crate::protocol::context::AppContext;
use crate::protocol::error::RpcFailure;
use crate::protocol::router::{MethodGroup, MethodRegistry, NoParams, Params};
use crate::usecases::perpetuals::PerpPositionView;
use crate::usecases::prediction::PositionView;

pub(super) fn register(registry: &mut MethodRegistry) {
    use Field::*;
    use MethodGroup::Portfolio;
    registry.register(
        method("a2a.getBalance", Portfolio, "Wallet balance and lifetime PnL", &[]),
        get_balance,
    );
    registry.register(
        method(
            "a2a.getPositions",
            Portfolio,
            "Open prediction-market positions, marked to market",
            &[Optional("userId", "string")],
        ),
        get_positions,
    );
    registry.register(
        method(
            "a2a.getPerpPositions",
            Portfolio,
            "Perpetual positions with liquidation status",
            &[Optional("includeClosed", "boolean")],
        ),
        get_perp_positions,
    );
    registry.register(
        method(
            "a2a.getTransactions",
            Portfolio,
            "Ledger rows, newest first",
            &[Optional("limit", "integer")],
        ),
        get_transactions,
    );
    registry.register(
        method("a2a.getPortfolio", Portfolio, "Balance plus all open positions", &[]),
        get_portfolio,
    );
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResult {
    balance: Decimal,
    total_deposited: Decimal,
    total_withdrawn: Decimal,
    #[serde(rename = "lifetimePnL")]
    lifetime_pnl: Decimal,
    reputation_points: i64,
}

impl From<Wallet> for BalanceResult {
    fn from(w: Wallet) -> Self {
        Self {
            balance: w.virtual_balance,
            total_deposited: w.total_deposited,
            total_withdrawn: w.total_withdrawn,
            lifetime_pnl: w.lifetime_pnl,
            reputation_points: w.reputation_points,
        }
    }
}

async fn get_balance(ctx: Arc<AppContext>, principal: Principal, _: NoParams) -> Result<BalanceResult, RpcFailure> {
    Ok(ctx.ledger.wallet(&principal.user_id).await?.into())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionsParams {
    user_id: Option<String>,
}

impl Params for PositionsParams {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PositionList {
    user_id: String,
    positions: Vec<PositionView>,
}

/// Prediction positions are public; any user's may be listed.
async fn get_positions(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: PositionsParams,
) -> Result<PositionList, RpcFailure> {
    let user_id = params
        .user_id
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(principal.user_id);
    let positions = ctx.prediction.positions(&user_id).await;
    Ok(PositionList { user_id, positions })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PerpPositionsParams {
    #[serde(default)]
    include_closed: bool,
}

impl Params for PerpPositionsParams {}

#[derive(Debug, Serialize)]
struct PerpPositionList {
    positions: Vec<PerpPositionView>,
}

async fn get_perp_positions(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: PerpPositionsParams,
) -> Result<PerpPositionList, RpcFailure> {
    Ok(PerpPositionList {
        positions: ctx.perps.positions(&principal.user_id, params.include_closed).await,
    })
}

#[derive(Debug, Deserialize)]
struct TransactionsParams {
    limit: Option<usize>,
}

impl Params for TransactionsParams {}

#[derive(Debug, Serialize)]
struct TransactionList {
    transactions: Vec<BalanceTransaction>,
}

async fn get_transactions(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: TransactionsParams,
) -> Result<TransactionList, RpcFailure> {
    let limit = page(params.limit, 50, 500);
    Ok(TransactionList {
        transactions: ctx.ledger.transactions(&principal.user_id, limit).await,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PortfolioResult {
    #[serde(flatten)]
    balance: BalanceResult,
    positions: Vec<PositionView>,
    perp_positions: Vec<PerpPositionView>,
    /// Mark value of prediction positions.
    positions_value: Decimal,
    /// Open perp margin plus unrealized PnL.
    perp_equity: Decimal,
    total_value: Decimal,
}

async fn get_portfolio(ctx: Arc<AppContext>, principal: Principal, _: NoParams) -> Result<PortfolioResult, RpcFailure> {
    let wallet = ctx.ledger.wallet(&principal.user_id).await?;
    let positions = ctx.prediction.positions(&principal.user_id).await;
    let perp_positions = ctx.perps.positions(&principal.user_id, false).await;

    let positions_value: Decimal = positions.iter().map(|p| p.current_value).sum();
    let perp_equity: Decimal = perp_positions
        .iter()
        .map(|p| (p.position.size + p.position.unrealized_pnl).max(Decimal::ZERO))
        .sum();
    let total_value = wallet.virtual_balance + positions_value + perp_equity;

    Ok(PortfolioResult {
        balance: wallet.into(),
        positions,
        perp_positions,
        positions_value,
        perp_equity,
        total_value,
    })
}
