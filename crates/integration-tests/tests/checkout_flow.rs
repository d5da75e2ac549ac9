//! End-to-end checkout through the HTTP surface.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::StatusCode;
use chrono::{NaiveDate, Utc};
use serde_json::json;

use sole_core::profile::age_on;
use sole_core::{ProductId, ShoeSize, UserId};
use sole_storefront::db::{
    InsertOutcome, MemoryOrderLedger, OrderLedger, RepositoryError, StockLedger,
};
use sole_storefront::models::{NewOrder, Order};
use sole_integration_tests::{TestApp, TestClient};

const DUNK_LOW: i32 = 4;
const YEEZY: i32 = 5;

async fn shopper(app: &TestApp, email: &str) -> TestClient {
    let client = app.client();
    let res = client.register(email, Some("Jamie Rivera")).await;
    assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.body);
    client
}

async fn complete_profile(client: &TestClient) {
    let res = client
        .post(
            "/checkout/profile",
            &json!({ "firstName": "Jamie", "lastName": "Rivera", "dob": "1994-03-02" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
}

async fn add_to_cart(client: &TestClient, product_id: i32, size: f64) {
    let res = client
        .post("/cart/add", &json!({ "productId": product_id, "size": size }))
        .await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
}

async fn pay(client: &TestClient) -> serde_json::Value {
    let res = client.post_empty("/checkout/intent").await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
    assert_eq!(res.body["state"], "awaiting_payment");

    let res = client
        .post("/checkout/confirm", &json!({ "paymentMethod": "pm_card_visa" }))
        .await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
    res.body
}

#[tokio::test]
async fn test_paid_checkout_records_taxed_order_and_empties_cart() {
    let app = TestApp::new().await;
    let client = shopper(&app, "jamie@example.com").await;
    complete_profile(&client).await;
    add_to_cart(&client, DUNK_LOW, 10.0).await;

    let res = client.post_empty("/checkout/intent").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["payment"]["amountMinor"], 11300);
    assert_eq!(res.body["payment"]["currency"], "usd");
    assert_eq!(res.body["total"].as_f64(), Some(113.0));

    let res = client
        .post("/checkout/confirm", &json!({ "paymentMethod": "pm_card_visa" }))
        .await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
    let order = res.body;
    assert_eq!(order["subtotal"].as_f64(), Some(100.0));
    assert_eq!(order["vat"].as_f64(), Some(13.0));
    assert_eq!(order["total"].as_f64(), Some(113.0));
    assert_eq!(order["status"], "paid");
    assert_eq!(order["paymentIntentId"], "pi_1");
    assert_eq!(order["items"].as_array().unwrap().len(), 1);

    let cart = client.get("/cart").await;
    assert!(cart.body["lines"].as_array().unwrap().is_empty());

    let checkout = client.get("/checkout").await;
    assert_eq!(checkout.body["state"], "completed");
    assert_eq!(checkout.body["orderNumber"], order["orderNumber"]);

    let history = client.get("/account/orders").await;
    assert_eq!(history.body.as_array().unwrap().len(), 1);
    assert_eq!(app.gateway.created().len(), 1);
}

#[tokio::test]
async fn test_out_of_stock_add_is_conflict_and_leaves_cart_empty() {
    let app = TestApp::new().await;
    app.stock
        .set(ProductId::new(YEEZY), "9".parse().unwrap(), 0)
        .await;
    let client = app.client();

    let res = client
        .post("/cart/add", &json!({ "productId": YEEZY, "size": 9 }))
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert!(res.body["error"].as_str().is_some());

    let cart = client.get("/cart").await;
    assert_eq!(cart.status, StatusCode::OK);
    assert!(cart.body["lines"].as_array().unwrap().is_empty());

    let stock = client.get("/products/5/stock?size=9").await;
    assert_eq!(stock.body["remaining"], 0);
}

#[tokio::test]
async fn test_repeated_settlement_records_one_order() {
    let app = TestApp::new().await;
    let client = shopper(&app, "jamie@example.com").await;
    complete_profile(&client).await;
    add_to_cart(&client, DUNK_LOW, 9.0).await;
    let order = pay(&client).await;

    let again = client
        .post("/checkout/confirm", &json!({ "paymentMethod": "pm_card_visa" }))
        .await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(again.body["orderNumber"], order["orderNumber"]);

    let returned = client.get("/checkout/complete?payment_intent=pi_1").await;
    assert_eq!(returned.status, StatusCode::OK);
    assert_eq!(returned.body["orderNumber"], order["orderNumber"]);

    let second_tab = client.clone();
    let returned = second_tab
        .get("/checkout/complete?payment_intent=pi_1")
        .await;
    assert_eq!(returned.body["id"], order["id"]);

    assert_eq!(app.ledger.len().await, 1);
}

#[tokio::test]
async fn test_missing_dob_blocks_intent() {
    let app = TestApp::new().await;
    let client = shopper(&app, "jamie@example.com").await;
    add_to_cart(&client, DUNK_LOW, 10.0).await;

    let res = client
        .post(
            "/checkout/profile",
            &json!({ "firstName": "Jamie", "lastName": "Rivera" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["state"], "awaiting_profile");
    assert_eq!(res.body["missing"], json!(["dob"]));

    let res = client.post_empty("/checkout/intent").await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["missing"], json!(["dob"]));
    assert!(app.gateway.created().is_empty());

    // Names were kept, so only the date is needed now.
    let res = client
        .post("/checkout/profile", &json!({ "dob": "1994-03-02" }))
        .await;
    assert_eq!(res.body["state"], "awaiting_intent");
    assert_eq!(res.body["missing"], json!([]));
}

#[tokio::test]
async fn test_age_is_derived_from_submitted_dob() {
    let app = TestApp::new().await;
    let client = shopper(&app, "jamie@example.com").await;
    let dob = NaiveDate::from_ymd_opt(2001, 12, 31).unwrap();

    let res = client
        .post(
            "/checkout/profile",
            &json!({ "firstName": "Jamie", "lastName": "Rivera", "dob": dob }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(
        res.body["age"],
        json!(age_on(dob, Utc::now().date_naive()))
    );

    let account = client.get("/account").await;
    assert_eq!(account.body["dob"], "2001-12-31");
}

#[tokio::test]
async fn test_future_dob_is_rejected() {
    let app = TestApp::new().await;
    let client = shopper(&app, "jamie@example.com").await;
    let tomorrow = Utc::now().date_naive().succ_opt().unwrap();

    let res = client
        .post("/checkout/profile", &json!({ "dob": tomorrow }))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_declined_card_keeps_payment_pending() {
    let app = TestApp::new().await;
    let client = shopper(&app, "jamie@example.com").await;
    complete_profile(&client).await;
    add_to_cart(&client, DUNK_LOW, 10.0).await;
    client.post_empty("/checkout/intent").await;

    app.gateway.decline("Your card was declined.");
    let res = client
        .post("/checkout/confirm", &json!({ "paymentMethod": "pm_card_chargeDeclined" }))
        .await;
    assert_eq!(res.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(res.body["error"], "Your card was declined.");
    assert_eq!(client.get("/checkout").await.body["state"], "awaiting_payment");
    assert_eq!(app.ledger.len().await, 0);

    app.gateway.approve();
    let res = client
        .post("/checkout/confirm", &json!({ "paymentMethod": "pm_card_visa" }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(app.gateway.created().len(), 1);
}

#[tokio::test]
async fn test_gateway_outage_is_bad_gateway_and_retryable() {
    let app = TestApp::new().await;
    let client = shopper(&app, "jamie@example.com").await;
    complete_profile(&client).await;
    add_to_cart(&client, DUNK_LOW, 10.0).await;

    app.gateway.set_unavailable(true);
    let res = client.post_empty("/checkout/intent").await;
    assert_eq!(res.status, StatusCode::BAD_GATEWAY);
    assert_eq!(client.get("/checkout").await.body["state"], "awaiting_intent");

    app.gateway.set_unavailable(false);
    let res = client.post_empty("/checkout/intent").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["state"], "awaiting_payment");
}

#[tokio::test]
async fn test_changed_cart_gets_new_intent() {
    let app = TestApp::new().await;
    let client = shopper(&app, "jamie@example.com").await;
    complete_profile(&client).await;
    add_to_cart(&client, DUNK_LOW, 10.0).await;

    let first = client.post_empty("/checkout/intent").await;
    let reused = client.post_empty("/checkout/intent").await;
    assert_eq!(first.body["payment"]["intentId"], reused.body["payment"]["intentId"]);

    add_to_cart(&client, DUNK_LOW, 11.0).await;
    let res = client.post_empty("/checkout/intent").await;
    assert_eq!(res.body["payment"]["intentId"], "pi_2");
    assert_eq!(res.body["payment"]["amountMinor"], 22600);
}

#[tokio::test]
async fn test_checkout_requires_login() {
    let app = TestApp::new().await;
    let client = app.client();

    assert_eq!(client.get("/checkout").await.status, StatusCode::UNAUTHORIZED);
    let res = client.post_empty("/checkout/intent").await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "Login required");
}

#[tokio::test]
async fn test_order_lookup_is_owner_only() {
    let app = TestApp::new().await;
    let owner = shopper(&app, "jamie@example.com").await;
    complete_profile(&owner).await;
    add_to_cart(&owner, DUNK_LOW, 10.0).await;
    let order = pay(&owner).await;

    let res = owner.get("/orders/by-intent/pi_1").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["orderNumber"], order["orderNumber"]);

    let stranger = shopper(&app, "casey@example.com").await;
    let res = stranger.get("/orders/by-intent/pi_1").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    let res = stranger.get("/checkout/complete?payment_intent=pi_1").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_order_number_collision_is_retried() {
    let app = TestApp::with_suffixes(vec![4321, 4321, 8765]).await;

    let first = shopper(&app, "jamie@example.com").await;
    complete_profile(&first).await;
    add_to_cart(&first, DUNK_LOW, 10.0).await;
    let first_order = pay(&first).await;

    let second = shopper(&app, "casey@example.com").await;
    complete_profile(&second).await;
    add_to_cart(&second, DUNK_LOW, 10.0).await;
    let second_order = pay(&second).await;

    assert_ne!(first_order["orderNumber"], second_order["orderNumber"]);
    assert!(second_order["orderNumber"].as_str().unwrap().ends_with("8765"));
    assert_eq!(app.ledger.len().await, 2);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let client = app.client();

    assert_eq!(client.get("/health").await.status, StatusCode::OK);
    assert_eq!(client.get("/health/ready").await.status, StatusCode::OK);
}

/// Memory ledger that can be switched off, like a database going away.
#[derive(Default)]
struct FlakyLedger {
    inner: MemoryOrderLedger,
    offline: AtomicBool,
}

impl FlakyLedger {
    fn check(&self) -> Result<(), RepositoryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RepositoryError::DataCorruption("ledger offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl OrderLedger for FlakyLedger {
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        self.check()?;
        self.inner.insert(order).await
    }

    async fn insert_if_absent(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError> {
        self.check()?;
        self.inner.insert_if_absent(order).await
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        self.inner.find_by_payment_intent(payment_intent_id).await
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        self.inner.list_by_user(user_id).await
    }
}

#[tokio::test]
async fn test_unrecorded_payment_is_recorded_on_retry() {
    let ledger = Arc::new(FlakyLedger::default());
    ledger.offline.store(true, Ordering::SeqCst);
    let app = TestApp::with_ledger(Arc::clone(&ledger) as Arc<dyn OrderLedger>).await;
    let client = shopper(&app, "jamie@example.com").await;
    complete_profile(&client).await;
    add_to_cart(&client, DUNK_LOW, 10.0).await;
    client.post_empty("/checkout/intent").await;

    let res = client
        .post("/checkout/confirm", &json!({ "paymentMethod": "pm_card_visa" }))
        .await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body["code"], "reconciliation_required");
    assert_eq!(res.body["paymentIntentId"], "pi_1");

    // The 500 still persisted the settling checkout.
    assert_eq!(client.get("/checkout").await.body["state"], "settling");
    let cart = client.get("/cart").await;
    assert_eq!(cart.body["lines"].as_array().unwrap().len(), 1);

    ledger.offline.store(false, Ordering::SeqCst);
    let res = client
        .post("/checkout/confirm", &json!({ "paymentMethod": "pm_card_visa" }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["paymentIntentId"], "pi_1");
    assert_eq!(ledger.inner.len().await, 1);
    // Settling again never charges the card a second time.
    assert_eq!(app.gateway.confirmations(), 1);

    let cart = client.get("/cart").await;
    assert!(cart.body["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_cart_returns_stock() {
    let app = TestApp::new().await;
    let client = shopper(&app, "casey@example.com").await;
    add_to_cart(&client, DUNK_LOW, 10.0).await;
    add_to_cart(&client, YEEZY, 9.0).await;

    let size = |s: &str| -> ShoeSize { s.parse().unwrap() };
    assert_eq!(
        app.stock.remaining(ProductId::new(DUNK_LOW), size("10")).await.unwrap(),
        99
    );

    let res = client.post_empty("/cart/clear").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body["lines"].as_array().unwrap().is_empty());
    assert_eq!(
        app.stock.remaining(ProductId::new(DUNK_LOW), size("10")).await.unwrap(),
        100
    );
    assert_eq!(
        app.stock.remaining(ProductId::new(YEEZY), size("9")).await.unwrap(),
        100
    );
    assert!(client.get("/cart").await.body["lines"].as_array().unwrap().is_empty());
}
