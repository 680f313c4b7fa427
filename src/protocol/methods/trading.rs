//! Trading: prediction-market buys and sells, perp opens and closes.
//!
//! Each call is one atomic store transaction in the service layer. After
//! commit the trade is counted and, for prediction markets, fanned out to
//! subscribers.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::{Field, method, non_empty};
use crate::domain::market::Outcome;
use crate::domain::perp::{PerpPosition, PerpSide};
use crate::protocol::auth::Principal;
use crate::protocol::context::AppContext;
use crate::protocol::error::RpcFailure;
use crate::protocol::router::{MethodGroup, MethodRegistry, Params};
use crate::protocol::subscriptions::MarketEvent;
use crate::usecases::perpetuals::CloseReceipt;
use crate::usecases::prediction::{BuyReceipt, SellReceipt};

pub(super) fn register(registry: &mut MethodRegistry) {
    use Field::*;
    use MethodGroup::Trading;
    registry.register(
        method(
            "a2a.buyShares",
            Trading,
            "Buy YES or NO shares with `amount` of balance",
            &[
                Required("marketId", "string"),
                Required("outcome", "string"),
                Required("amount", "number"),
            ],
        ),
        buy_shares,
    );
    registry.register(
        method(
            "a2a.sellShares",
            Trading,
            "Sell shares from a position",
            &[Required("positionId", "string"), Required("shares", "number")],
        ),
        sell_shares,
    );
    registry.register(
        method(
            "a2a.openPosition",
            Trading,
            "Open a leveraged perpetual position; `size` is the margin",
            &[
                Required("ticker", "string"),
                Required("side", "string"),
                Required("size", "number"),
                Required("leverage", "integer"),
            ],
        ),
        open_position,
    );
    registry.register(
        method(
            "a2a.closePosition",
            Trading,
            "Close a perpetual position at the current price",
            &[Required("positionId", "string")],
        ),
        close_position,
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuyParams {
    market_id: String,
    #[serde(alias = "side")]
    outcome: Outcome,
    amount: Decimal,
}

impl Params for BuyParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("marketId", &self.market_id)?;
        if self.amount <= Decimal::ZERO {
            return Err(format!("amount must be positive, got {}", self.amount));
        }
        Ok(())
    }
}

async fn buy_shares(ctx: Arc<AppContext>, principal: Principal, params: BuyParams) -> Result<BuyReceipt, RpcFailure> {
    let receipt = ctx
        .prediction
        .buy_shares(&principal.user_id, &params.market_id, params.outcome, params.amount)
        .await?;
    ctx.record_trade("pred_buy", receipt.amount);
    ctx.publish_market(&receipt.market_id, MarketEvent::Trade, receipt.yes_price, receipt.no_price);
    Ok(receipt)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SellParams {
    position_id: String,
    shares: Decimal,
}

impl Params for SellParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("positionId", &self.position_id)?;
        if self.shares <= Decimal::ZERO {
            return Err(format!("shares must be positive, got {}", self.shares));
        }
        Ok(())
    }
}

async fn sell_shares(ctx: Arc<AppContext>, principal: Principal, params: SellParams) -> Result<SellReceipt, RpcFailure> {
    let receipt = ctx
        .prediction
        .sell_shares(&principal.user_id, &params.position_id, params.shares)
        .await?;
    ctx.record_trade("pred_sell", receipt.gross_proceeds);
    ctx.publish_market(&receipt.market_id, MarketEvent::Trade, receipt.yes_price, receipt.no_price);
    Ok(receipt)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenParams {
    ticker: String,
    side: String,
    size: Decimal,
    leverage: u32,
}

impl Params for OpenParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("ticker", &self.ticker)?;
        if PerpSide::parse(&self.side).is_none() {
            return Err(format!("side must be long or short, got {}", self.side));
        }
        if self.size <= Decimal::ZERO {
            return Err(format!("size must be positive, got {}", self.size));
        }
        if self.leverage == 0 {
            return Err("leverage must be at least 1".into());
        }
        Ok(())
    }
}

async fn open_position(ctx: Arc<AppContext>, principal: Principal, params: OpenParams) -> Result<PerpPosition, RpcFailure> {
    let side = PerpSide::parse(&params.side)
        .ok_or_else(|| RpcFailure::invalid(format!("side must be long or short, got {}", params.side)))?;
    let position = ctx
        .perps
        .open_position(&principal.user_id, &params.ticker, side, params.size, params.leverage)
        .await?;
    ctx.record_trade("perp_open", position.size * Decimal::from(position.leverage));
    Ok(position)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseParams {
    position_id: String,
}

impl Params for CloseParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("positionId", &self.position_id)
    }
}

async fn close_position(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: CloseParams,
) -> Result<CloseReceipt, RpcFailure> {
    let receipt = ctx.perps.close_position(&principal.user_id, &params.position_id).await?;
    ctx.record_trade(
        "perp_close",
        receipt.position.size * Decimal::from(receipt.position.leverage),
    );
    Ok(receipt)
}
