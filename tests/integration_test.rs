//! Integration Tests - End-to-end JSON-RPC Flows
//!
//! Drives the router the way the HTTP server does: raw JSON-RPC values in,
//! envelopes out. External ports are replaced with mockall mocks; the store,
//! services and method table are the real ones.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::mock;
use mockall::predicate::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};

use a2a_exchange::config::loader::parse_config;
use a2a_exchange::ports::identity::AgentRecord;
use a2a_exchange::ports::payments::{ReceiptCheck, ReceiptStatus};
use a2a_exchange::protocol::auth::{AuthGateway, Credentials};
use a2a_exchange::protocol::context::{AppContext, Collaborators};
use a2a_exchange::protocol::jsonrpc::codes;
use a2a_exchange::protocol::methods::build_registry;
use a2a_exchange::protocol::router::Router;
use a2a_exchange::store::Store;

// ---- Mock Definitions ----

mock! {
    pub Prices {}

    #[async_trait::async_trait]
    impl a2a_exchange::ports::price_feed::PriceFeed for Prices {
        async fn price(&self, ticker: &str) -> anyhow::Result<Option<Decimal>>;
        async fn is_healthy(&self) -> bool;
    }
}

mock! {
    pub Verifier {}

    #[async_trait::async_trait]
    impl a2a_exchange::ports::payments::PaymentVerifier for Verifier {
        async fn verify(&self, check: &ReceiptCheck) -> anyhow::Result<ReceiptStatus>;
    }
}

mock! {
    pub Identity {}

    #[async_trait::async_trait]
    impl a2a_exchange::ports::identity::IdentityStore for Identity {
        async fn session_user(&self, token: &str) -> anyhow::Result<Option<String>>;
        async fn agent(&self, agent_id: &str) -> anyhow::Result<Option<AgentRecord>>;
        async fn register_agent(&self, record: AgentRecord) -> anyhow::Result<AgentRecord>;
        async fn bind_address(&self, agent_id: &str, address: &str) -> anyhow::Result<Option<AgentRecord>>;
        async fn addresses_of(&self, user_id: &str) -> anyhow::Result<Vec<String>>;
        async fn agents(&self) -> anyhow::Result<Vec<AgentRecord>>;
    }
}

// ---- Harness ----

const CONFIG: &str = r#"
[server]
name = "test-exchange"

[trading]
fee_rate = "0.01"
initial_balance = "1000"

[payments]
ttl_secs = 1

[rate_limits]
requests_per_minute = 6000
burst = 1000

[[perps.markets]]
ticker = "BTC"
reference_price = "50"
max_leverage = 20

[moderation]
admin_users = ["admin"]
"#;

const TX_HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

struct Harness {
    router: Arc<Router>,
    btc_price: Arc<Mutex<Decimal>>,
}

fn identity() -> MockIdentity {
    let mut identity = MockIdentity::new();
    identity.expect_session_user().returning(|token| {
        Ok(token.strip_prefix("sess-").map(str::to_string))
    });
    identity
        .expect_addresses_of()
        .returning(|user| Ok(vec![format!("wallet-of-{user}")]));
    identity
}

fn harness_with(config_toml: &str, verifier: MockVerifier) -> Harness {
    let config = parse_config(config_toml).unwrap();
    let btc_price = Arc::new(Mutex::new(dec!(50)));

    let mut prices = MockPrices::new();
    let shared = Arc::clone(&btc_price);
    prices
        .expect_price()
        .returning(move |ticker| Ok((ticker == "BTC").then(|| *shared.lock().unwrap())));
    prices.expect_is_healthy().returning(|| true);

    let identity = Arc::new(identity());
    let ctx = Arc::new(AppContext::from_config(
        &config,
        Arc::new(Store::new()),
        Collaborators {
            price_feed: Arc::new(prices),
            payment_verifier: Arc::new(verifier),
            identity: identity.clone(),
            metrics: None,
        },
        "integration-secret",
    ));
    let gateway = AuthGateway::standard(Arc::clone(&ctx.tokens), identity, 300, true);
    let router = Arc::new(Router::new(ctx, gateway, build_registry(), &config.rate_limits));
    Harness { router, btc_price }
}

fn harness() -> Harness {
    harness_with(CONFIG, MockVerifier::new())
}

async fn call(router: &Router, user: &str, method: &str, params: Value) -> Value {
    let request = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});
    let response = router.handle(&Credentials::session(format!("sess-{user}")), request).await;
    serde_json::to_value(response).unwrap()
}

async fn ok(router: &Router, user: &str, method: &str, params: Value) -> Value {
    let response = call(router, user, method, params).await;
    assert!(response.get("error").is_none_or(Value::is_null), "{method} failed: {response}");
    response["result"].clone()
}

fn error_code(response: &Value) -> i64 {
    response["error"]["code"].as_i64().unwrap_or_default()
}

fn dec_of(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap(),
        other => panic!("not a decimal: {other}"),
    }
}

async fn balance(router: &Router, user: &str) -> Decimal {
    dec_of(&ok(router, user, "a2a.getBalance", json!({})).await["balance"])
}

async fn create_market(router: &Router) -> String {
    let market = ok(
        router,
        "admin",
        "a2a.createMarket",
        json!({
            "question": "Will the integration test pass?",
            "endTime": "2099-01-01T00:00:00Z",
            "seedYes": 100,
            "seedNo": 100,
        }),
    )
    .await;
    market["id"].as_str().unwrap().to_string()
}

// ---- Protocol Errors ----

#[tokio::test]
async fn test_missing_credentials_is_not_authenticated() {
    let h = harness();
    let request = json!({"jsonrpc": "2.0", "id": 7, "method": "a2a.getBalance"});
    let response = serde_json::to_value(h.router.handle(&Credentials::default(), request).await).unwrap();
    assert_eq!(error_code(&response), codes::NOT_AUTHENTICATED);
    assert_eq!(response["id"], json!(7));
}

#[tokio::test]
async fn test_unknown_method_and_bad_params() {
    let h = harness();
    let response = call(&h.router, "alice", "a2a.launchRocket", json!({})).await;
    assert_eq!(error_code(&response), codes::METHOD_NOT_FOUND);

    let response = call(
        &h.router,
        "alice",
        "a2a.buyShares",
        json!({"marketId": "m", "outcome": "YES", "amount": -5}),
    )
    .await;
    assert_eq!(error_code(&response), codes::INVALID_PARAMS);

    let response = call(&h.router, "alice", "a2a.buyShares", json!({"marketId": "m"})).await;
    assert_eq!(error_code(&response), codes::INVALID_PARAMS);
}

#[tokio::test]
async fn test_invalid_envelope_is_invalid_request() {
    let h = harness();
    let response = serde_json::to_value(
        h.router
            .handle(&Credentials::session("sess-alice"), json!({"id": 3, "method": 12}))
            .await,
    )
    .unwrap();
    assert_eq!(error_code(&response), codes::INVALID_REQUEST);
}

#[tokio::test]
async fn test_rate_limit_per_agent() {
    let config = CONFIG.replace("requests_per_minute = 6000", "requests_per_minute = 1")
        .replace("burst = 1000", "burst = 2");
    let h = harness_with(&config, MockVerifier::new());
    ok(&h.router, "alice", "a2a.getBalance", json!({})).await;
    ok(&h.router, "alice", "a2a.getBalance", json!({})).await;
    let response = call(&h.router, "alice", "a2a.getBalance", json!({})).await;
    assert_eq!(error_code(&response), codes::RATE_LIMITED);

    // Limits are keyed per agent.
    ok(&h.router, "bob", "a2a.getBalance", json!({})).await;
}

// ---- Auth ----

#[tokio::test]
async fn test_issued_bearer_token_authenticates() {
    let h = harness();
    let token = ok(&h.router, "alice", "a2a.getAuthToken", json!({})).await;
    let token = token["token"].as_str().unwrap().to_string();

    let request = json!({"jsonrpc": "2.0", "id": 1, "method": "a2a.getBalance"});
    let response = serde_json::to_value(h.router.handle(&Credentials::bearer(&token), request.clone()).await).unwrap();
    assert!(response["error"].is_null(), "{response}");

    let mut tampered = token.clone();
    tampered.push('x');
    let response = serde_json::to_value(h.router.handle(&Credentials::bearer(tampered), request).await).unwrap();
    assert_eq!(error_code(&response), codes::NOT_AUTHENTICATED);
}

#[tokio::test]
async fn test_first_call_provisions_wallet() {
    let h = harness();
    assert_eq!(balance(&h.router, "carol").await, dec!(1000));
}

// ---- Trading ----

#[tokio::test]
async fn test_buy_then_sell_loses_to_fees() {
    let h = harness();
    let market_id = create_market(&h.router).await;

    let receipt = ok(
        &h.router,
        "alice",
        "a2a.buyShares",
        json!({"marketId": market_id, "outcome": "YES", "amount": 50}),
    )
    .await;
    assert_eq!(dec_of(&receipt["fee"]), dec!(0.5));
    assert!(dec_of(&receipt["yesPrice"]) > dec!(0.5));
    assert_eq!(balance(&h.router, "alice").await, dec!(950));

    let sold = ok(
        &h.router,
        "alice",
        "a2a.sellShares",
        json!({"positionId": receipt["positionId"], "shares": receipt["sharesBought"]}),
    )
    .await;
    assert!(dec_of(&sold["netProceeds"]) < dec!(49.5));
    assert_eq!(sold["positionClosed"], json!(true));
    assert!(balance(&h.router, "alice").await < dec!(1000));
}

#[tokio::test]
async fn test_buy_on_unknown_market() {
    let h = harness();
    let response = call(
        &h.router,
        "alice",
        "a2a.buyShares",
        json!({"marketId": "nope", "outcome": "NO", "amount": 5}),
    )
    .await;
    assert_eq!(error_code(&response), codes::MARKET_NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_buys_never_overdraw() {
    let h = harness();
    let market_id = create_market(&h.router).await;
    ok(&h.router, "alice", "a2a.getBalance", json!({})).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let router = Arc::clone(&h.router);
        let market_id = market_id.clone();
        handles.push(tokio::spawn(async move {
            call(
                &router,
                "alice",
                "a2a.buyShares",
                json!({"marketId": market_id, "outcome": "YES", "amount": 100}),
            )
            .await
        }));
    }
    let mut filled = 0;
    for handle in handles {
        let response = handle.await.unwrap();
        if response["error"].is_null() {
            filled += 1;
        } else {
            assert_eq!(error_code(&response), codes::INSUFFICIENT_FUNDS);
        }
    }
    assert_eq!(filled, 10);
    assert_eq!(balance(&h.router, "alice").await, Decimal::ZERO);
}

#[tokio::test]
async fn test_resolution_pays_winners_and_is_admin_only() {
    let h = harness();
    let market_id = create_market(&h.router).await;
    let receipt = ok(
        &h.router,
        "alice",
        "a2a.buyShares",
        json!({"marketId": market_id, "outcome": "YES", "amount": 100}),
    )
    .await;
    ok(
        &h.router,
        "bob",
        "a2a.buyShares",
        json!({"marketId": market_id, "outcome": "NO", "amount": 100}),
    )
    .await;

    let response = call(
        &h.router,
        "alice",
        "a2a.resolveMarket",
        json!({"marketId": market_id, "outcome": "YES"}),
    )
    .await;
    assert_eq!(error_code(&response), codes::FORBIDDEN);

    let summary = ok(
        &h.router,
        "admin",
        "a2a.resolveMarket",
        json!({"marketId": market_id, "outcome": "YES"}),
    )
    .await;
    assert_eq!(summary["winners"], json!(1));
    assert_eq!(summary["positionsSettled"], json!(2));

    let shares = dec_of(&receipt["sharesBought"]);
    assert_eq!(balance(&h.router, "alice").await, dec!(900) + shares);
    assert_eq!(balance(&h.router, "bob").await, dec!(900));

    let response = call(
        &h.router,
        "alice",
        "a2a.buyShares",
        json!({"marketId": market_id, "outcome": "YES", "amount": 1}),
    )
    .await;
    assert_eq!(error_code(&response), codes::TRADE_REJECTED);
}

#[tokio::test]
async fn test_perp_flags_liquidation_breach() {
    let h = harness();
    let position = ok(
        &h.router,
        "alice",
        "a2a.openPosition",
        json!({"ticker": "BTC", "side": "long", "size": 100, "leverage": 10}),
    )
    .await;
    assert!(dec_of(&position["liquidationPrice"]) < dec!(50));

    *h.btc_price.lock().unwrap() = dec!(45);
    let positions = ok(&h.router, "alice", "a2a.getPerpPositions", json!({})).await;
    let positions = positions["positions"].as_array().unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0]["breachesLiquidation"], json!(true));

    let response = call(
        &h.router,
        "alice",
        "a2a.openPosition",
        json!({"ticker": "DOGE", "side": "long", "size": 10, "leverage": 2}),
    )
    .await;
    assert_eq!(error_code(&response), codes::TRADE_REJECTED);
}

// ---- Payments ----

#[tokio::test]
async fn test_payment_receipt_credits_once() {
    let mut verifier = MockVerifier::new();
    verifier
        .expect_verify()
        .with(function(|check: &ReceiptCheck| {
            check.tx_hash == TX_HASH
                && check.amount == dec!(25)
                && check.payer_addresses == vec!["wallet-of-alice".to_string()]
        }))
        .times(1)
        .returning(|_| Ok(ReceiptStatus::Verified));
    let config = CONFIG.replace("ttl_secs = 1", "ttl_secs = 600");
    let h = harness_with(&config, verifier);
    ok(&h.router, "bob", "a2a.getBalance", json!({})).await;

    let intent = ok(
        &h.router,
        "alice",
        "a2a.paymentRequest",
        json!({"to": "bob", "amount": 25, "service": "analysis"}),
    )
    .await;
    let request_id = intent["id"].as_str().unwrap().to_string();

    let first = ok(
        &h.router,
        "alice",
        "a2a.paymentReceipt",
        json!({"requestId": request_id, "txHash": TX_HASH}),
    )
    .await;
    assert_eq!(first["credited"], json!(true));

    let replay = ok(
        &h.router,
        "alice",
        "a2a.paymentReceipt",
        json!({"requestId": request_id, "txHash": TX_HASH}),
    )
    .await;
    assert_eq!(replay["credited"], json!(false));
    assert_eq!(balance(&h.router, "bob").await, dec!(1025));

    let response = call(&h.router, "carol", "a2a.getPayment", json!({"requestId": request_id})).await;
    assert_eq!(error_code(&response), codes::FORBIDDEN);
}

#[tokio::test]
async fn test_payment_request_on_behalf_of_another_user_is_forbidden() {
    let h = harness();
    ok(&h.router, "bob", "a2a.getBalance", json!({})).await;
    let response = call(
        &h.router,
        "alice",
        "a2a.paymentRequest",
        json!({"to": "bob", "from": "carol", "amount": 5, "service": "x"}),
    )
    .await;
    assert_eq!(error_code(&response), codes::FORBIDDEN);
}

#[tokio::test]
async fn test_expired_intent_rejects_receipt() {
    let mut verifier = MockVerifier::new();
    verifier.expect_verify().never();
    let h = harness_with(CONFIG, verifier);
    ok(&h.router, "bob", "a2a.getBalance", json!({})).await;
    let intent = ok(
        &h.router,
        "alice",
        "a2a.paymentRequest",
        json!({"to": "bob", "amount": 5, "service": "quote"}),
    )
    .await;

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let response = call(
        &h.router,
        "alice",
        "a2a.paymentReceipt",
        json!({"requestId": intent["id"], "txHash": TX_HASH}),
    )
    .await;
    assert_eq!(error_code(&response), codes::PAYMENT_FAILED);
    assert_eq!(balance(&h.router, "bob").await, dec!(1000));
}

// ---- Social and Points ----

#[tokio::test]
async fn test_post_like_and_notify() {
    let h = harness();
    let post = ok(&h.router, "alice", "a2a.createPost", json!({"content": "YES is cheap"})).await;
    let post_id = post["id"].clone();

    let liked = ok(&h.router, "bob", "a2a.likePost", json!({"postId": post_id})).await;
    assert_eq!(liked["likeCount"], json!(1));
    ok(&h.router, "bob", "a2a.followUser", json!({"userId": "alice"})).await;

    let feed = ok(&h.router, "bob", "a2a.getFeed", json!({"limit": 10})).await;
    assert_eq!(feed["posts"].as_array().unwrap().len(), 1);

    let notifications = ok(&h.router, "alice", "a2a.getNotifications", json!({"unreadOnly": true})).await;
    assert_eq!(notifications["notifications"].as_array().unwrap().len(), 2);
    let marked = ok(&h.router, "alice", "a2a.markNotificationsRead", json!({})).await;
    assert_eq!(marked["marked"], json!(2));

    let followers = ok(&h.router, "alice", "a2a.getFollowers", json!({})).await;
    assert_eq!(followers["users"], json!(["bob"]));
}

#[tokio::test]
async fn test_transfer_points_and_leaderboard() {
    let h = harness();
    ok(&h.router, "bob", "a2a.getBalance", json!({})).await;
    let sent = ok(
        &h.router,
        "alice",
        "a2a.transferPoints",
        json!({"toUserId": "bob", "amount": 10}),
    )
    .await;
    assert_eq!(
        sent["recipientPoints"].as_i64().unwrap() - sent["senderPoints"].as_i64().unwrap(),
        20
    );

    let board = ok(
        &h.router,
        "alice",
        "a2a.getLeaderboard",
        json!({"metric": "reputation", "limit": 5}),
    )
    .await;
    assert_eq!(board["entries"][0]["userId"], json!("bob"));
    assert_eq!(board["entries"][0]["rank"], json!(1));
}

#[tokio::test]
async fn test_discover_lists_every_method() {
    let h = harness();
    let discovered = ok(&h.router, "alice", "a2a.discover", json!({})).await;
    let methods = h.router.methods();
    assert_eq!(methods.len(), 54);
    assert!(discovered.to_string().contains("a2a.paymentReceipt"));
}
