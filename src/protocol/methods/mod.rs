//! A2A Method Handlers - The Dispatch Table
//!
//! One sub-module per method family. Each exposes `register`, which adds
//! its methods to the registry with a params description and a typed
//! handler.

mod discovery;
mod market_data;
mod moderation;
mod payments;
mod portfolio;
mod social;
mod stats;
mod trading;

use serde_json::{Map, Value, json};

use super::auth::Principal;
use super::context::AppContext;
use super::error::RpcFailure;
use super::router::{MethodGroup, MethodInfo, MethodRegistry};
use crate::domain::error::TradingError;

/// Every `a2a.*` method.
pub fn build_registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    discovery::register(&mut registry);
    market_data::register(&mut registry);
    portfolio::register(&mut registry);
    trading::register(&mut registry);
    social::register(&mut registry);
    stats::register(&mut registry);
    payments::register(&mut registry);
    moderation::register(&mut registry);
    registry
}

/// Field kinds used in params descriptions.
#[derive(Debug, Clone, Copy)]
enum Field {
    Required(&'static str, &'static str),
    Optional(&'static str, &'static str),
}

fn method(name: &'static str, group: MethodGroup, description: &'static str, fields: &[Field]) -> MethodInfo {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in fields {
        let (name, kind, is_required) = match *field {
            Field::Required(name, kind) => (name, kind, true),
            Field::Optional(name, kind) => (name, kind, false),
        };
        properties.insert(name.to_string(), json!({ "type": kind }));
        if is_required {
            required.push(Value::String(name.to_string()));
        }
    }
    MethodInfo {
        name,
        group,
        description,
        params: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

fn require_admin(ctx: &AppContext, principal: &Principal) -> Result<(), RpcFailure> {
    if ctx.is_admin(&principal.user_id) {
        Ok(())
    } else {
        Err(TradingError::Forbidden("admin rights required".into()).into())
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be empty"))
    } else {
        Ok(())
    }
}

/// Page size clamped to `1..=max`.
fn page(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.unwrap_or(default).clamp(1, max)
}
