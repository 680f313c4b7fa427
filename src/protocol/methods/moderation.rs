//! Moderation, market administration and reputation points.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::social::{OptionalUserParams, UserIdParams};
use super::{Field, method, non_empty, require_admin};
use crate::domain::market::Outcome;
use crate::protocol::auth::Principal;
use crate::protocol::context::AppContext;
use crate::protocol::error::RpcFailure;
use crate::protocol::router::{MethodGroup, MethodRegistry, NoParams, Params};
use crate::protocol::subscriptions::MarketEvent;
use crate::usecases::prediction::ResolutionSummary;
use crate::usecases::social::Report;

use super::market_data::MarketView;

pub(super) fn register(registry: &mut MethodRegistry) {
    use Field::*;
    use MethodGroup::{Moderation, Points};

    registry.register(
        method("a2a.blockUser", Moderation, "Block a user", &[Required("userId", "string")]),
        block_user,
    );
    registry.register(
        method("a2a.unblockUser", Moderation, "Unblock a user", &[Required("userId", "string")]),
        unblock_user,
    );
    registry.register(
        method("a2a.getBlockedUsers", Moderation, "Users you have blocked", &[]),
        get_blocked_users,
    );
    registry.register(
        method(
            "a2a.reportPost",
            Moderation,
            "Report a post for review",
            &[Required("postId", "string"), Required("reason", "string")],
        ),
        report_post,
    );
    registry.register(
        method(
            "a2a.createMarket",
            Moderation,
            "Create a prediction market (admin)",
            &[
                Required("question", "string"),
                Required("endTime", "string"),
                Optional("seedYes", "number"),
                Optional("seedNo", "number"),
            ],
        ),
        create_market,
    );
    registry.register(
        method(
            "a2a.resolveMarket",
            Moderation,
            "Resolve a market and pay out winners (admin)",
            &[Required("marketId", "string"), Required("outcome", "string")],
        ),
        resolve_market,
    );

    registry.register(
        method(
            "a2a.transferPoints",
            Points,
            "Give reputation points to another user",
            &[Required("toUserId", "string"), Required("amount", "integer")],
        ),
        transfer_points,
    );
    registry.register(
        method(
            "a2a.getReputation",
            Points,
            "Reputation points of a user",
            &[Optional("userId", "string")],
        ),
        get_reputation,
    );
}

// ── blocks and reports ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockResult {
    user_id: String,
    blocked: bool,
    changed: bool,
}

async fn block_user(ctx: Arc<AppContext>, principal: Principal, params: UserIdParams) -> Result<BlockResult, RpcFailure> {
    let changed = ctx.social.block(&principal.user_id, &params.user_id).await?;
    Ok(BlockResult {
        user_id: params.user_id,
        blocked: true,
        changed,
    })
}

async fn unblock_user(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: UserIdParams,
) -> Result<BlockResult, RpcFailure> {
    let changed = ctx.social.unblock(&principal.user_id, &params.user_id).await;
    Ok(BlockResult {
        user_id: params.user_id,
        blocked: false,
        changed,
    })
}

#[derive(Debug, Serialize)]
struct BlockedList {
    users: Vec<String>,
}

async fn get_blocked_users(ctx: Arc<AppContext>, principal: Principal, _: NoParams) -> Result<BlockedList, RpcFailure> {
    Ok(BlockedList {
        users: ctx.social.blocked(&principal.user_id).await,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportParams {
    post_id: String,
    reason: String,
}

impl Params for ReportParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("postId", &self.post_id)?;
        non_empty("reason", &self.reason)?;
        if self.reason.chars().count() > 1000 {
            return Err("reason is limited to 1000 characters".into());
        }
        Ok(())
    }
}

async fn report_post(ctx: Arc<AppContext>, principal: Principal, params: ReportParams) -> Result<Report, RpcFailure> {
    Ok(ctx
        .social
        .report_post(&principal.user_id, &params.post_id, &params.reason)
        .await?)
}

// ── market administration ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMarketParams {
    question: String,
    end_time: DateTime<Utc>,
    #[serde(default)]
    seed_yes: Decimal,
    #[serde(default)]
    seed_no: Decimal,
}

impl Params for CreateMarketParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("question", &self.question)?;
        if self.seed_yes.is_sign_negative() || self.seed_no.is_sign_negative() {
            return Err("seed reserves must be non-negative".into());
        }
        Ok(())
    }
}

async fn create_market(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: CreateMarketParams,
) -> Result<MarketView, RpcFailure> {
    require_admin(&ctx, &principal)?;
    let market = ctx
        .prediction
        .create_market(&params.question, params.end_time, params.seed_yes, params.seed_no)
        .await?;
    Ok(MarketView::from(market))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveParams {
    market_id: String,
    outcome: Outcome,
}

impl Params for ResolveParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("marketId", &self.market_id)
    }
}

async fn resolve_market(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: ResolveParams,
) -> Result<ResolutionSummary, RpcFailure> {
    require_admin(&ctx, &principal)?;
    let summary = ctx
        .prediction
        .resolve_market(&params.market_id, params.outcome)
        .await?;
    let market = ctx.prediction.market(&params.market_id).await?;
    ctx.publish_market(&market.id, MarketEvent::Resolved, market.yes_price(), market.no_price());
    Ok(summary)
}

// ── points ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferPointsParams {
    #[serde(alias = "userId")]
    to_user_id: String,
    amount: i64,
}

impl Params for TransferPointsParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("toUserId", &self.to_user_id)?;
        if self.amount <= 0 {
            return Err(format!("amount must be positive, got {}", self.amount));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferResult {
    to_user_id: String,
    amount: i64,
    sender_points: i64,
    recipient_points: i64,
}

async fn transfer_points(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: TransferPointsParams,
) -> Result<TransferResult, RpcFailure> {
    let (sender_points, recipient_points) = ctx
        .ledger
        .transfer_points(&principal.user_id, &params.to_user_id, params.amount)
        .await?;
    Ok(TransferResult {
        to_user_id: params.to_user_id,
        amount: params.amount,
        sender_points,
        recipient_points,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Reputation {
    user_id: String,
    reputation_points: i64,
}

async fn get_reputation(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: OptionalUserParams,
) -> Result<Reputation, RpcFailure> {
    let user_id = params.or_caller(&principal);
    let wallet = ctx.ledger.wallet(&user_id).await?;
    Ok(Reputation {
        user_id,
        reputation_points: wallet.reputation_points,
    })
}
