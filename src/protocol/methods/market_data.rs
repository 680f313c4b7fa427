//! Market data: prediction markets, quotes, subscriptions and perp tickers.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Field, method, non_empty};
use crate::domain::amm::BuyQuote;
use crate::domain::market::{Market, Outcome};
use crate::protocol::auth::Principal;
use crate::protocol::context::AppContext;
use crate::protocol::error::RpcFailure;
use crate::protocol::router::{MethodGroup, MethodRegistry, NoParams, Params};
use crate::usecases::perpetuals::PerpMarketInfo;

pub(super) fn register(registry: &mut MethodRegistry) {
    use Field::*;
    use MethodGroup::MarketData;
    registry.register(
        method(
            "a2a.getMarketData",
            MarketData,
            "List prediction markets with current prices",
            &[Optional("includeResolved", "boolean")],
        ),
        get_market_data,
    );
    registry.register(
        method("a2a.getMarket", MarketData, "Get one market", &[Required("marketId", "string")]),
        get_market,
    );
    registry.register(
        method(
            "a2a.getMarketPrices",
            MarketData,
            "Current outcome prices, optionally with a buy quote",
            &[
                Required("marketId", "string"),
                Optional("outcome", "string"),
                Optional("amount", "number"),
            ],
        ),
        get_market_prices,
    );
    registry.register(
        method(
            "a2a.subscribeMarket",
            MarketData,
            "Receive updates for a market on the event stream",
            &[Required("marketId", "string")],
        ),
        subscribe_market,
    );
    registry.register(
        method(
            "a2a.unsubscribeMarket",
            MarketData,
            "Stop receiving updates for a market",
            &[Required("marketId", "string")],
        ),
        unsubscribe_market,
    );
    registry.register(
        method("a2a.getPerpMarkets", MarketData, "List perpetual tickers", &[]),
        get_perp_markets,
    );
}

/// A market with its derived prices.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MarketView {
    #[serde(flatten)]
    market: Market,
    yes_price: Decimal,
    no_price: Decimal,
}

impl From<Market> for MarketView {
    fn from(market: Market) -> Self {
        Self {
            yes_price: market.yes_price(),
            no_price: market.no_price(),
            market,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketListParams {
    #[serde(default)]
    include_resolved: bool,
}

impl Params for MarketListParams {}

#[derive(Debug, Serialize)]
struct MarketList {
    markets: Vec<MarketView>,
}

async fn get_market_data(
    ctx: Arc<AppContext>,
    _: Principal,
    params: MarketListParams,
) -> Result<MarketList, RpcFailure> {
    let markets = ctx.prediction.markets(params.include_resolved).await;
    Ok(MarketList {
        markets: markets.into_iter().map(MarketView::from).collect(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MarketIdParams {
    pub(super) market_id: String,
}

impl Params for MarketIdParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("marketId", &self.market_id)
    }
}

async fn get_market(ctx: Arc<AppContext>, _: Principal, params: MarketIdParams) -> Result<MarketView, RpcFailure> {
    Ok(ctx.prediction.market(&params.market_id).await?.into())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PricesParams {
    market_id: String,
    outcome: Option<Outcome>,
    amount: Option<Decimal>,
}

impl Params for PricesParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("marketId", &self.market_id)?;
        match (self.outcome, self.amount) {
            (Some(_), Some(amount)) if amount <= Decimal::ZERO => Err("amount must be positive".into()),
            (Some(_), None) | (None, Some(_)) => Err("outcome and amount must be given together".into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PricesResult {
    market_id: String,
    yes_price: Decimal,
    no_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    quote: Option<BuyQuote>,
}

async fn get_market_prices(
    ctx: Arc<AppContext>,
    _: Principal,
    params: PricesParams,
) -> Result<PricesResult, RpcFailure> {
    let market = ctx.prediction.market(&params.market_id).await?;
    let quote = match (params.outcome, params.amount) {
        (Some(side), Some(amount)) => Some(
            ctx.prediction
                .pricer()
                .calculate_buy_with_fees(market.yes_shares, market.no_shares, side, amount)
                .map_err(crate::domain::error::TradingError::from)?,
        ),
        _ => None,
    };
    Ok(PricesResult {
        yes_price: market.yes_price(),
        no_price: market.no_price(),
        market_id: market.id,
        quote,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionResult {
    market_id: String,
    subscribed: bool,
    /// Whether this call changed the subscription.
    changed: bool,
}

async fn subscribe_market(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: MarketIdParams,
) -> Result<SubscriptionResult, RpcFailure> {
    let market = ctx.prediction.market(&params.market_id).await?;
    let changed = ctx.subscriptions.subscribe(&market.id, &principal.agent_id);
    Ok(SubscriptionResult {
        market_id: market.id,
        subscribed: true,
        changed,
    })
}

async fn unsubscribe_market(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: MarketIdParams,
) -> Result<SubscriptionResult, RpcFailure> {
    let changed = ctx.subscriptions.unsubscribe(&params.market_id, &principal.agent_id);
    Ok(SubscriptionResult {
        market_id: params.market_id,
        subscribed: false,
        changed,
    })
}

#[derive(Debug, Serialize)]
struct PerpMarketList {
    markets: Vec<PerpMarketInfo>,
}

async fn get_perp_markets(ctx: Arc<AppContext>, _: Principal, _: NoParams) -> Result<PerpMarketList, RpcFailure> {
    Ok(PerpMarketList {
        markets: ctx.perps.markets().await,
    })
}
