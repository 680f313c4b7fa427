//! Discovery: what this exchange offers and who is on it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Field, method, page};
use crate::ports::identity::AgentRecord;
use crate::protocol::auth::Principal;
use crate::protocol::context::AppContext;
use crate::protocol::error::RpcFailure;
use crate::protocol::router::{MethodGroup, MethodInfo, MethodRegistry, NoParams, Params};
use crate::usecases::social::{Profile, SocialStats};

pub(super) fn register(registry: &mut MethodRegistry) {
    use Field::*;
    use MethodGroup::Discovery;
    registry.register(
        method("a2a.discover", Discovery, "Describe the exchange and list every method", &[]),
        discover,
    );
    registry.register(
        method(
            "a2a.getAgentInfo",
            Discovery,
            "Look up an agent, its profile and social stats",
            &[Optional("agentId", "string")],
        ),
        get_agent_info,
    );
    registry.register(
        method(
            "a2a.searchAgents",
            Discovery,
            "Search registered agents by id or user",
            &[Optional("query", "string"), Optional("limit", "integer")],
        ),
        search_agents,
    );
    registry.register(
        method(
            "a2a.getAuthToken",
            Discovery,
            "Issue a bearer token for the calling agent",
            &[],
        ),
        get_auth_token,
    );
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiscoverResult {
    name: String,
    protocol: &'static str,
    version: &'static str,
    agent_id: String,
    method_count: usize,
    methods: Vec<MethodInfo>,
}

async fn discover(ctx: Arc<AppContext>, principal: Principal, _: NoParams) -> Result<DiscoverResult, RpcFailure> {
    let methods = ctx.catalog.get().cloned().unwrap_or_default();
    Ok(DiscoverResult {
        name: ctx.server_name.clone(),
        protocol: "a2a",
        version: env!("CARGO_PKG_VERSION"),
        agent_id: principal.agent_id,
        method_count: methods.len(),
        methods,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentInfoParams {
    agent_id: Option<String>,
}

impl Params for AgentInfoParams {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentInfo {
    agent: AgentRecord,
    profile: Profile,
    stats: SocialStats,
}

async fn get_agent_info(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: AgentInfoParams,
) -> Result<AgentInfo, RpcFailure> {
    let agent_id = params.agent_id.unwrap_or_else(|| principal.agent_id.clone());
    let agent = match ctx.identity.agent(&agent_id).await? {
        Some(record) => record,
        // Session-authenticated callers have no agent record of their own.
        None if agent_id == principal.agent_id => AgentRecord {
            agent_id: principal.agent_id.clone(),
            user_id: principal.user_id.clone(),
            address: None,
        },
        None => return Err(RpcFailure::AgentNotFound(agent_id)),
    };
    let profile = ctx.social.profile(&agent.user_id).await;
    let stats = ctx.social.stats(&agent.user_id).await;
    Ok(AgentInfo { agent, profile, stats })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    #[serde(default)]
    query: String,
    limit: Option<usize>,
}

impl Params for SearchParams {}

#[derive(Debug, Serialize)]
struct AgentList {
    agents: Vec<AgentRecord>,
}

async fn search_agents(ctx: Arc<AppContext>, _: Principal, params: SearchParams) -> Result<AgentList, RpcFailure> {
    let needle = params.query.trim().to_lowercase();
    let limit = page(params.limit, 20, 100);
    let agents = ctx
        .identity
        .agents()
        .await?
        .into_iter()
        .filter(|a| {
            needle.is_empty()
                || a.agent_id.to_lowercase().contains(&needle)
                || a.user_id.to_lowercase().contains(&needle)
        })
        .take(limit)
        .collect();
    Ok(AgentList { agents })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthToken {
    token: String,
    token_type: &'static str,
    expires_at: Option<DateTime<Utc>>,
}

async fn get_auth_token(ctx: Arc<AppContext>, principal: Principal, _: NoParams) -> Result<AuthToken, RpcFailure> {
    let (token, claims) = ctx.tokens.issue(&principal.user_id, &principal.agent_id, Utc::now());
    Ok(AuthToken {
        token,
        token_type: "Bearer",
        expires_at: DateTime::from_timestamp(claims.exp, 0),
    })
}
