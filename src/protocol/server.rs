//! A2A HTTP Server - JSON-RPC, Actions and Market Stream
//!
//! axum 0.7 front end for the [`Router`]. Every route shares one router;
//! credentials are read from headers on each request.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use futures_util::stream;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument, warn};

use super::actions::{self, ActionRequest};
use super::auth::Credentials;
use super::jsonrpc::{JsonRpcResponse, RpcError};
use super::router::Router;

/// Routes under `/api/a2a`.
pub fn app(router: Arc<Router>) -> axum::Router {
    axum::Router::new()
        .route("/api/a2a", post(rpc))
        .route("/api/a2a/actions", post(action))
        .route("/api/a2a/methods", get(methods))
        .route("/api/a2a/stream", get(market_stream))
        .with_state(router)
}

/// Bind and serve until `shutdown_rx` fires.
#[instrument(skip(router, shutdown_rx))]
pub async fn serve(
    router: Arc<Router>,
    bind_address: String,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, methods = router.methods().len(), "A2A server started");

    axum::serve(listener, app(router))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    info!("A2A server stopped");
    Ok(())
}

async fn rpc(State(router): State<Arc<Router>>, headers: HeaderMap, body: Bytes) -> Json<JsonRpcResponse> {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "Unparseable JSON-RPC body");
            return Json(JsonRpcResponse::failure(Value::Null, RpcError::parse_error(e.to_string())));
        }
    };
    let credentials = Credentials::from_headers(&headers);
    Json(router.handle(&credentials, raw).await)
}

async fn action(State(router): State<Arc<Router>>, headers: HeaderMap, body: Bytes) -> Response {
    let request: ActionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let error = RpcError::parse_error(e.to_string());
            return (StatusCode::BAD_REQUEST, Json(error)).into_response();
        }
    };
    let credentials = Credentials::from_headers(&headers);
    Json(actions::execute(&router, &credentials, request).await).into_response()
}

/// Public method catalog; no credentials required.
async fn methods(State(router): State<Arc<Router>>) -> impl IntoResponse {
    Json(router.methods())
}

/// Server-sent market updates for the caller's subscriptions.
async fn market_stream(State(router): State<Arc<Router>>, headers: HeaderMap) -> Response {
    let credentials = Credentials::from_headers(&headers);
    let principal = match router.authenticate(&credentials).await {
        Ok(principal) => principal,
        Err(failure) => {
            let body = JsonRpcResponse::failure(Value::Null, failure.to_rpc_error());
            return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        }
    };

    let ctx = Arc::clone(router.context());
    let updates = ctx.subscriptions.updates();
    let agent_id = principal.agent_id;
    info!(agent_id = %agent_id, "Market stream opened");

    let events = stream::unfold((updates, ctx, agent_id), |(mut updates, ctx, agent_id)| async move {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    if !ctx.subscriptions.is_subscribed(&update.market_id, &agent_id) {
                        continue;
                    }
                    match Event::default().event("market").json_data(&update) {
                        Ok(event) => return Some((Ok::<_, Infallible>(event), (updates, ctx, agent_id))),
                        Err(e) => warn!(error = %e, "Dropping unserializable market update"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(agent_id = %agent_id, skipped, "Market stream lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}
