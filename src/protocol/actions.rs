//! Action executor - snake_case agent actions on top of the method table.
//!
//! Agent frameworks emit tool calls like `{"action": "buy_yes", "params":
//! {...}}`. Each action resolves to one `a2a.*` method. Names outside the
//! alias table fall back to their camelCase form, so `get_user_stats` reaches
//! `a2a.getUserStats`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::auth::Credentials;
use super::error::RpcFailure;
use super::jsonrpc::RpcError;
use super::router::Router;

/// One agent tool call.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

/// Outcome of one action. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub action: String,
    pub method: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Actions whose method name is not simply the camelCase of the action.
const ALIASES: &[(&str, &str)] = &[
    ("get_markets", "a2a.getMarketData"),
    ("get_market_data", "a2a.getMarketData"),
    ("get_prices", "a2a.getMarketPrices"),
    ("quote", "a2a.getMarketPrices"),
    ("buy_yes", "a2a.buyShares"),
    ("buy_no", "a2a.buyShares"),
    ("buy", "a2a.buyShares"),
    ("sell", "a2a.sellShares"),
    ("open_perp", "a2a.openPosition"),
    ("close_perp", "a2a.closePosition"),
    ("post", "a2a.createPost"),
    ("comment", "a2a.createComment"),
    ("follow", "a2a.followUser"),
    ("unfollow", "a2a.unfollowUser"),
    ("message", "a2a.sendMessage"),
    ("leaderboard", "a2a.getLeaderboard"),
    ("request_payment", "a2a.paymentRequest"),
    ("submit_receipt", "a2a.paymentReceipt"),
];

/// Outcome injected into params by the one-sided buy actions.
fn implied_outcome(action: &str) -> Option<&'static str> {
    match action {
        "buy_yes" => Some("YES"),
        "buy_no" => Some("NO"),
        _ => None,
    }
}

/// `get_user_stats` -> `a2a.getUserStats`. `None` for names that are not
/// lowercase snake_case.
fn camel_method(action: &str) -> Option<String> {
    if action.is_empty()
        || !action
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return None;
    }
    let mut out = String::from("a2a.");
    let mut upper = false;
    for c in action.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// The method an action runs and the params it runs with.
pub fn resolve(request: &ActionRequest, is_known: impl Fn(&str) -> bool) -> Result<(String, Value), RpcFailure> {
    let action = request.action.trim();
    let method = ALIASES
        .iter()
        .find(|(name, _)| *name == action)
        .map(|(_, method)| (*method).to_string())
        .or_else(|| camel_method(action).filter(|m| is_known(m)))
        .ok_or_else(|| RpcFailure::MethodNotFound(action.to_string()))?;

    let mut params = match &request.params {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        _ => return Err(RpcFailure::invalid("params must be an object")),
    };
    if let Some(outcome) = implied_outcome(action) {
        params.remove("side");
        params.insert("outcome".into(), Value::String(outcome.into()));
    }
    Ok((method, Value::Object(params)))
}

/// Authenticate, resolve and run one action.
pub async fn execute(router: &Router, credentials: &Credentials, request: ActionRequest) -> ActionResponse {
    let resolved = resolve(&request, |m| router.has_method(m));
    let method = resolved.as_ref().ok().map(|(m, _)| m.clone());
    let outcome = match resolved {
        Ok((method, params)) => match router.authenticate(credentials).await {
            Ok(principal) => router.dispatch(&principal, &method, params).await,
            Err(failure) => Err(failure),
        },
        Err(failure) => Err(failure),
    };
    match outcome {
        Ok(result) => ActionResponse {
            action: request.action,
            method,
            success: true,
            result: Some(result),
            error: None,
        },
        Err(failure) => {
            debug!(action = %request.action, error = %failure, "Action failed");
            ActionResponse {
                action: request.action,
                method,
                success: false,
                result: None,
                error: Some(failure.to_rpc_error()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(action: &str, params: Value) -> ActionRequest {
        ActionRequest {
            action: action.into(),
            params,
        }
    }

    #[test]
    fn test_buy_yes_injects_outcome() {
        let (method, params) = resolve(
            &request("buy_yes", json!({"marketId": "m1", "amount": 10, "side": "NO"})),
            |_| true,
        )
        .unwrap();
        assert_eq!(method, "a2a.buyShares");
        assert_eq!(params["outcome"], json!("YES"));
        assert!(params.get("side").is_none());
    }

    #[test]
    fn test_buy_no_with_null_params() {
        let (_, params) = resolve(&request("buy_no", Value::Null), |_| true).unwrap();
        assert_eq!(params, json!({"outcome": "NO"}));
    }

    #[test]
    fn test_snake_case_falls_back_to_registered_method() {
        let known = |m: &str| m == "a2a.getUserStats";
        let (method, _) = resolve(&request("get_user_stats", json!({})), known).unwrap();
        assert_eq!(method, "a2a.getUserStats");
    }

    #[test]
    fn test_unknown_action_is_method_not_found() {
        let err = resolve(&request("launch_rocket", json!({})), |_| false).unwrap_err();
        assert!(matches!(err, RpcFailure::MethodNotFound(_)));
        assert!(resolve(&request("Get-Markets", json!({})), |_| true).is_err());
    }

    #[test]
    fn test_non_object_params_rejected() {
        let err = resolve(&request("get_markets", json!([1, 2])), |_| true).unwrap_err();
        assert!(matches!(err, RpcFailure::InvalidParams(_)));
    }

    #[test]
    fn test_camel_method() {
        assert_eq!(camel_method("get_portfolio").as_deref(), Some("a2a.getPortfolio"));
        assert_eq!(camel_method("discover").as_deref(), Some("a2a.discover"));
        assert_eq!(camel_method(""), None);
    }
}
