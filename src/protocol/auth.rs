//! Authentication Gateway - Ordered Credential Verifiers
//!
//! Each verifier inspects the request credentials and either resolves a
//! `Principal`, declines as not applicable, or fails. The gateway tries
//! them in order and the first applicable verifier decides:
//! 1. Signed bearer token (`Authorization: Bearer ...`)
//! 2. Legacy session token (`x-session-token`)
//! 3. Wallet-signature challenge (`x-agent-*` headers)

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{Address, PrimitiveSignature};
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::token::TokenSigner;
use crate::ports::identity::{AgentRecord, IdentityStore};

/// How a principal was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    BearerToken,
    SessionToken,
    WalletSignature,
}

/// The authenticated caller of one request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub agent_id: String,
    pub user_id: String,
    pub method: AuthMethod,
}

/// Credential verification failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no credentials supplied")]
    MissingCredentials,

    #[error("invalid bearer token: {0}")]
    InvalidToken(String),

    #[error("bearer token expired")]
    ExpiredToken,

    #[error("unknown session token")]
    UnknownSession,

    #[error("missing signature header: {0}")]
    IncompleteSignature(&'static str),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("signature does not match the agent address")]
    SignatureMismatch,

    #[error("signature timestamp is outside the {0}s window")]
    ExpiredSignature(i64),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("identity lookup failed: {0}")]
    Backend(String),
}

impl AuthError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::InvalidToken(_) => "invalid_token",
            Self::ExpiredToken => "expired_token",
            Self::UnknownSession => "unknown_session",
            Self::IncompleteSignature(_) => "incomplete_signature",
            Self::MalformedSignature(_) => "malformed_signature",
            Self::SignatureMismatch => "signature_mismatch",
            Self::ExpiredSignature(_) => "expired_signature",
            Self::AgentNotFound(_) => "agent_not_found",
            Self::Backend(_) => "backend",
        }
    }
}

/// Raw credentials extracted from a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub bearer_token: Option<String>,
    pub session_token: Option<String>,
    pub agent_id: Option<String>,
    pub agent_address: Option<String>,
    pub agent_signature: Option<String>,
    /// Unix milliseconds, as sent.
    pub agent_timestamp: Option<String>,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let bearer_token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Self {
            bearer_token,
            session_token: get("x-session-token"),
            agent_id: get("x-agent-id"),
            agent_address: get("x-agent-address"),
            agent_signature: get("x-agent-signature"),
            agent_timestamp: get("x-agent-timestamp"),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn session(token: impl Into<String>) -> Self {
        Self {
            session_token: Some(token.into()),
            ..Self::default()
        }
    }
}

/// Outcome of one verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Authenticated(Principal),
    NotApplicable,
}

/// One credential strategy.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn verify(&self, credentials: &Credentials, now: DateTime<Utc>) -> Result<Verification, AuthError>;
}

// ────────────────────────────────────────────
// Bearer token
// ────────────────────────────────────────────

pub struct BearerTokenVerifier {
    signer: Arc<TokenSigner>,
}

impl BearerTokenVerifier {
    pub fn new(signer: Arc<TokenSigner>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl CredentialVerifier for BearerTokenVerifier {
    fn name(&self) -> &'static str {
        "bearer_token"
    }

    async fn verify(&self, credentials: &Credentials, now: DateTime<Utc>) -> Result<Verification, AuthError> {
        let Some(token) = &credentials.bearer_token else {
            return Ok(Verification::NotApplicable);
        };
        let claims = self.signer.verify(token, now)?;
        Ok(Verification::Authenticated(Principal {
            agent_id: claims.agent_id,
            user_id: claims.sub,
            method: AuthMethod::BearerToken,
        }))
    }
}

// ────────────────────────────────────────────
// Legacy session token
// ────────────────────────────────────────────

pub struct SessionTokenVerifier {
    identity: Arc<dyn IdentityStore>,
}

impl SessionTokenVerifier {
    pub fn new(identity: Arc<dyn IdentityStore>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl CredentialVerifier for SessionTokenVerifier {
    fn name(&self) -> &'static str {
        "session_token"
    }

    async fn verify(&self, credentials: &Credentials, _now: DateTime<Utc>) -> Result<Verification, AuthError> {
        let Some(token) = &credentials.session_token else {
            return Ok(Verification::NotApplicable);
        };
        let user_id = self
            .identity
            .session_user(token)
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))?
            .ok_or(AuthError::UnknownSession)?;
        Ok(Verification::Authenticated(Principal {
            agent_id: user_id.clone(),
            user_id,
            method: AuthMethod::SessionToken,
        }))
    }
}

// ────────────────────────────────────────────
// Wallet signature
// ────────────────────────────────────────────

/// The message an agent signs (EIP-191 personal sign).
pub fn canonical_message(agent_id: &str, address: &str, timestamp_ms: i64) -> String {
    format!("A2A Authentication\n\nAgent: {agent_id}\nAddress: {address}\nTimestamp: {timestamp_ms}")
}

pub struct WalletSignatureVerifier {
    identity: Arc<dyn IdentityStore>,
    window_secs: i64,
    auto_register: bool,
}

impl WalletSignatureVerifier {
    pub fn new(identity: Arc<dyn IdentityStore>, window_secs: i64, auto_register: bool) -> Self {
        Self {
            identity,
            window_secs,
            auto_register,
        }
    }

    /// The agent record for a verified signer, binding or registering as needed.
    ///
    /// Every path ends in the same check: the record's bound address must be
    /// the signer. An unbound agent is bound to its first valid signer.
    async fn resolve_agent(&self, agent_id: &str, address: &str) -> Result<AgentRecord, AuthError> {
        let known = self.identity.agent(agent_id).await.map_err(backend)?;
        let record = match known {
            Some(record) if record.address.is_some() => record,
            Some(_) => self
                .identity
                .bind_address(agent_id, address)
                .await
                .map_err(backend)?
                .ok_or_else(|| AuthError::AgentNotFound(agent_id.to_string()))?,
            None if self.auto_register => {
                let record = self
                    .identity
                    .register_agent(AgentRecord {
                        agent_id: agent_id.to_string(),
                        user_id: agent_id.to_string(),
                        address: Some(address.to_lowercase()),
                    })
                    .await
                    .map_err(backend)?;
                info!(agent_id, "Agent auto-registered");
                record
            }
            None => return Err(AuthError::AgentNotFound(agent_id.to_string())),
        };
        match &record.address {
            Some(bound) if bound.eq_ignore_ascii_case(address) => Ok(record),
            _ => {
                debug!(agent_id, "Signer is not the agent's bound address");
                Err(AuthError::SignatureMismatch)
            }
        }
    }
}

fn backend(e: anyhow::Error) -> AuthError {
    AuthError::Backend(e.to_string())
}

#[async_trait]
impl CredentialVerifier for WalletSignatureVerifier {
    fn name(&self) -> &'static str {
        "wallet_signature"
    }

    async fn verify(&self, credentials: &Credentials, now: DateTime<Utc>) -> Result<Verification, AuthError> {
        if credentials.agent_signature.is_none() && credentials.agent_timestamp.is_none() {
            return Ok(Verification::NotApplicable);
        }
        let signature = credentials
            .agent_signature
            .as_deref()
            .ok_or(AuthError::IncompleteSignature("x-agent-signature"))?;
        let timestamp = credentials
            .agent_timestamp
            .as_deref()
            .ok_or(AuthError::IncompleteSignature("x-agent-timestamp"))?;
        let agent_id = credentials
            .agent_id
            .as_deref()
            .ok_or(AuthError::IncompleteSignature("x-agent-id"))?;
        let address = credentials
            .agent_address
            .as_deref()
            .ok_or(AuthError::IncompleteSignature("x-agent-address"))?;

        let timestamp_ms: i64 = timestamp
            .parse()
            .map_err(|_| AuthError::MalformedSignature("timestamp must be Unix milliseconds".into()))?;
        if (now.timestamp_millis() - timestamp_ms).abs() > self.window_secs * 1000 {
            return Err(AuthError::ExpiredSignature(self.window_secs));
        }

        let claimed = Address::from_str(address)
            .map_err(|_| AuthError::MalformedSignature("invalid agent address".into()))?;
        let recovered = recover_signer(&canonical_message(agent_id, address, timestamp_ms), signature)?;
        if recovered != claimed {
            debug!(agent_id, %recovered, "Recovered address does not match");
            return Err(AuthError::SignatureMismatch);
        }

        let record = self.resolve_agent(agent_id, address).await?;
        Ok(Verification::Authenticated(Principal {
            agent_id: record.agent_id,
            user_id: record.user_id,
            method: AuthMethod::WalletSignature,
        }))
    }
}

/// Recover the EIP-191 signer of `message` from a 65-byte hex signature.
fn recover_signer(message: &str, signature: &str) -> Result<Address, AuthError> {
    let bytes = alloy::hex::decode(signature)
        .map_err(|_| AuthError::MalformedSignature("signature is not hex".into()))?;
    let signature = PrimitiveSignature::try_from(bytes.as_slice())
        .map_err(|e| AuthError::MalformedSignature(e.to_string()))?;
    signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|e| AuthError::MalformedSignature(e.to_string()))
}

// ────────────────────────────────────────────
// Gateway
// ────────────────────────────────────────────

/// Tries each verifier in order; the first applicable one decides.
pub struct AuthGateway {
    verifiers: Vec<Box<dyn CredentialVerifier>>,
}

impl AuthGateway {
    pub fn new(verifiers: Vec<Box<dyn CredentialVerifier>>) -> Self {
        Self { verifiers }
    }

    /// Bearer token, then session token, then wallet signature.
    pub fn standard(
        signer: Arc<TokenSigner>,
        identity: Arc<dyn IdentityStore>,
        window_secs: i64,
        auto_register: bool,
    ) -> Self {
        Self::new(vec![
            Box::new(BearerTokenVerifier::new(signer)),
            Box::new(SessionTokenVerifier::new(Arc::clone(&identity))),
            Box::new(WalletSignatureVerifier::new(identity, window_secs, auto_register)),
        ])
    }

    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Principal, AuthError> {
        self.verify_at(credentials, Utc::now()).await
    }

    pub async fn verify_at(&self, credentials: &Credentials, now: DateTime<Utc>) -> Result<Principal, AuthError> {
        for verifier in &self.verifiers {
            match verifier.verify(credentials, now).await? {
                Verification::Authenticated(principal) => {
                    debug!(verifier = verifier.name(), agent_id = %principal.agent_id, "Authenticated");
                    return Ok(principal);
                }
                Verification::NotApplicable => continue,
            }
        }
        Err(AuthError::MissingCredentials)
    }
}
