//! Message Router - Authenticated JSON-RPC Dispatch
//!
//! Every request passes the same gate: envelope validation, credential
//! verification (which also provisions the caller's wallet), per-agent
//! rate limit, then a lookup in the method registry. Each registered
//! handler decodes and validates its own typed params.

use std::collections::BTreeMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, instrument, warn};

use super::auth::{AuthGateway, Credentials, Principal};
use super::context::AppContext;
use super::error::RpcFailure;
use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse, codes};
use crate::config::RateLimitConfig;

/// Handler output before serialization.
pub type HandlerFuture = BoxFuture<'static, Result<Value, RpcFailure>>;

type BoxedHandler = Arc<dyn Fn(Arc<AppContext>, Principal, Value) -> HandlerFuture + Send + Sync>;

/// Method families, as listed by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodGroup {
    Discovery,
    MarketData,
    Portfolio,
    Trading,
    Social,
    Messaging,
    Notifications,
    Stats,
    Payments,
    Moderation,
    Favorites,
    Points,
}

/// Public description of one method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodInfo {
    pub name: &'static str,
    pub group: MethodGroup,
    pub description: &'static str,
    /// JSON-Schema-style description of the params object.
    pub params: Value,
}

/// Typed params of one method.
pub trait Params: DeserializeOwned + Send + 'static {
    /// Checks serde cannot express. Runs before any state is touched.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Params for methods that take none.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct NoParams {}

impl Params for NoParams {}

fn decode_params<P: Params>(raw: Value) -> Result<P, RpcFailure> {
    let raw = if raw.is_null() { Value::Object(Map::new()) } else { raw };
    let params: P = serde_json::from_value(raw).map_err(|e| RpcFailure::invalid(e.to_string()))?;
    params.validate().map_err(RpcFailure::InvalidParams)?;
    Ok(params)
}

struct Entry {
    info: MethodInfo,
    handler: BoxedHandler,
}

/// Name -> handler table, built once at startup.
#[derive(Default)]
pub struct MethodRegistry {
    entries: BTreeMap<&'static str, Entry>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `info.name`, replacing any earlier entry.
    pub fn register<P, R, F, Fut>(&mut self, info: MethodInfo, handler: F)
    where
        P: Params,
        R: Serialize,
        F: Fn(Arc<AppContext>, Principal, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RpcFailure>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let boxed: BoxedHandler = Arc::new(move |ctx, principal, raw| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let params = decode_params::<P>(raw)?;
                let result = handler(ctx, principal, params).await?;
                serde_json::to_value(result).map_err(|e| RpcFailure::Internal(e.into()))
            })
        });
        if self.entries.insert(info.name, Entry { info, handler: boxed }).is_some() {
            warn!("Method registered twice");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn describe(&self) -> Vec<MethodInfo> {
        self.entries.values().map(|e| e.info.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn handler(&self, name: &str) -> Option<BoxedHandler> {
        self.entries.get(name).map(|e| Arc::clone(&e.handler))
    }
}

/// Authenticating, rate-limited dispatcher.
pub struct Router {
    ctx: Arc<AppContext>,
    gateway: AuthGateway,
    registry: MethodRegistry,
    limiter: DefaultKeyedRateLimiter<String>,
}

impl Router {
    pub fn new(ctx: Arc<AppContext>, gateway: AuthGateway, registry: MethodRegistry, limits: &RateLimitConfig) -> Self {
        let per_minute = NonZeroU32::new(limits.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(limits.burst).unwrap_or(NonZeroU32::MIN);
        if ctx.catalog.set(registry.describe()).is_err() {
            warn!("Method catalog already set; keeping the first");
        }
        Self {
            ctx,
            gateway,
            registry,
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute).allow_burst(burst)),
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    pub fn methods(&self) -> Vec<MethodInfo> {
        self.registry.describe()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Drop limiter state for agents whose quota has fully replenished.
    pub fn prune_rate_limits(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Agents currently holding limiter state.
    pub fn rate_limited_agents(&self) -> usize {
        self.limiter.len()
    }

    /// Resolve the caller and make sure their wallet exists.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Principal, RpcFailure> {
        let principal = match self.gateway.authenticate(credentials).await {
            Ok(principal) => principal,
            Err(e) => {
                if let Some(metrics) = &self.ctx.metrics {
                    metrics.observe_auth_failure(e.reason());
                }
                debug!(reason = e.reason(), "Authentication failed");
                return Err(e.into());
            }
        };
        if self.ctx.ledger.wallet(&principal.user_id).await.is_err() {
            self.ctx.ledger.ensure_wallet(&principal.user_id).await?;
        }
        Ok(principal)
    }

    /// Rate-limit, look up and run `method` for an authenticated caller.
    pub async fn dispatch(&self, principal: &Principal, method: &str, params: Value) -> Result<Value, RpcFailure> {
        if self.limiter.check_key(&principal.agent_id).is_err() {
            return Err(RpcFailure::RateLimited);
        }
        let handler = self
            .registry
            .handler(method)
            .ok_or_else(|| RpcFailure::MethodNotFound(method.to_string()))?;
        handler(Arc::clone(&self.ctx), principal.clone(), params).await
    }

    /// Handle one raw JSON-RPC request end to end.
    #[instrument(skip_all, fields(method = tracing::field::Empty, agent_id = tracing::field::Empty))]
    pub async fn handle(&self, credentials: &Credentials, raw: Value) -> JsonRpcResponse {
        let started = Instant::now();
        let request = match JsonRpcRequest::from_value(raw) {
            Ok(request) => request,
            Err((id, err)) => {
                self.observe("invalid", err.code, started);
                return JsonRpcResponse::failure(id, err);
            }
        };
        let span = tracing::Span::current();
        span.record("method", request.method.as_str());

        let outcome = match self.authenticate(credentials).await {
            Ok(principal) => {
                span.record("agent_id", principal.agent_id.as_str());
                let result = self.dispatch(&principal, &request.method, request.params).await;
                if let Err(failure) = &result {
                    if failure.is_internal() {
                        error!(
                            agent_id = %principal.agent_id,
                            method = %request.method,
                            error = %failure,
                            "Request failed with internal error"
                        );
                    }
                }
                result
            }
            Err(failure) => Err(failure),
        };

        let label = if self.registry.contains(&request.method) {
            request.method.as_str()
        } else {
            "unknown"
        };
        match outcome {
            Ok(result) => {
                self.observe(label, 0, started);
                JsonRpcResponse::success(request.id, result)
            }
            Err(failure) => {
                let err = failure.to_rpc_error();
                self.observe(label, err.code, started);
                JsonRpcResponse::failure(request.id, err)
            }
        }
    }

    fn observe(&self, method: &str, code: i64, started: Instant) {
        if let Some(metrics) = &self.ctx.metrics {
            let outcome = if code == 0 { "ok" } else { codes::name(code) };
            metrics.observe_rpc(method, outcome, started.elapsed().as_secs_f64());
        }
    }
}
