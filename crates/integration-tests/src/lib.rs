//! Integration tests for the Sole storefront.
//!
//! The full router runs in-process over in-memory stores and a scripted
//! payment gateway. Requests go through `tower::ServiceExt::oneshot`, and each
//! [`TestClient`] carries its session cookie between requests like a browser
//! tab would.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p sole-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use sole_core::{CurrencyCode, PaymentStatus};
use sole_storefront::config::{CheckoutConfig, StorefrontConfig, StripeConfig};
use sole_storefront::db::{MemoryOrderLedger, MemoryStock, OrderLedger, StockLedger};
use sole_storefront::middleware::session_layer;
use sole_storefront::payments::{
    IntentHandle, IntentOutcome, PaymentDetails, PaymentError, PaymentGateway,
    intent_id_from_secret,
};
use sole_storefront::state::{AppState, Stores};

/// Configuration for an in-process app. Nothing here is ever dialed.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused@localhost/unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        session_secret: SecretString::from("k3J9x2Lq8vN4mP7wR1tY6uZ0aB5cD8eF"),
        stripe: StripeConfig {
            secret_key: SecretString::from("sk_test_unused"),
            api_base: "http://localhost:12111".to_string(),
        },
        checkout: CheckoutConfig {
            payment_timeout: Duration::from_millis(200),
            ..CheckoutConfig::default()
        },
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// Payment gateway whose answers are set by the test.
pub struct FakeGateway {
    created: Mutex<Vec<(i64, CurrencyCode)>>,
    confirmations: Mutex<usize>,
    status: Mutex<PaymentStatus>,
    decline_message: Mutex<Option<String>>,
    unavailable: Mutex<bool>,
    hang: Mutex<bool>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            confirmations: Mutex::new(0),
            status: Mutex::new(PaymentStatus::Succeeded),
            decline_message: Mutex::new(None),
            unavailable: Mutex::new(false),
            hang: Mutex::new(false),
        }
    }
}

impl FakeGateway {
    /// Amounts and currencies of every intent created so far.
    pub fn created(&self) -> Vec<(i64, CurrencyCode)> {
        self.created.lock().unwrap().clone()
    }

    /// How many times a card payment was confirmed.
    pub fn confirmations(&self) -> usize {
        *self.confirmations.lock().unwrap()
    }

    /// Make confirmations and lookups report a decline.
    pub fn decline(&self, message: &str) {
        *self.status.lock().unwrap() = PaymentStatus::Failed;
        *self.decline_message.lock().unwrap() = Some(message.to_string());
    }

    /// Make confirmations and lookups report success.
    pub fn approve(&self) {
        *self.status.lock().unwrap() = PaymentStatus::Succeeded;
        *self.decline_message.lock().unwrap() = None;
    }

    /// Fail every call with a 503.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    /// Never answer intent creation.
    pub fn set_hang(&self, hang: bool) {
        *self.hang.lock().unwrap() = hang;
    }

    fn check_available(&self) -> Result<(), PaymentError> {
        if *self.unavailable.lock().unwrap() {
            return Err(PaymentError::Api {
                status: 503,
                message: "Stripe is temporarily unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn outcome(&self, intent_id: &str) -> IntentOutcome {
        IntentOutcome {
            intent_id: intent_id.to_string(),
            status: *self.status.lock().unwrap(),
            message: self.decline_message.lock().unwrap().clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
    ) -> Result<IntentHandle, PaymentError> {
        let hang = *self.hang.lock().unwrap();
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.check_available()?;

        let intent_id = {
            let mut created = self.created.lock().unwrap();
            created.push((amount_minor, currency));
            format!("pi_{}", created.len())
        };
        Ok(IntentHandle {
            client_secret: format!("{intent_id}_secret_test"),
            intent_id,
        })
    }

    async fn confirm(
        &self,
        client_secret: &str,
        _details: &PaymentDetails,
    ) -> Result<IntentOutcome, PaymentError> {
        self.check_available()?;
        *self.confirmations.lock().unwrap() += 1;
        Ok(self.outcome(intent_id_from_secret(client_secret)?))
    }

    async fn retrieve(&self, intent_id: &str) -> Result<IntentOutcome, PaymentError> {
        self.check_available()?;
        Ok(self.outcome(intent_id))
    }
}

/// The storefront running in-process, with handles on its fakes.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub stock: Arc<MemoryStock>,
    pub ledger: Arc<MemoryOrderLedger>,
}

impl TestApp {
    /// A seeded storefront over in-memory stores.
    pub async fn new() -> Self {
        Self::build(None, None).await
    }

    /// Like [`Self::new`], with the order ledger swapped out.
    pub async fn with_ledger(ledger: Arc<dyn OrderLedger>) -> Self {
        Self::build(Some(ledger), None).await
    }

    /// Like [`Self::new`], drawing order number suffixes from `suffixes`.
    pub async fn with_suffixes(suffixes: Vec<u16>) -> Self {
        Self::build(None, Some(suffixes)).await
    }

    async fn build(ledger: Option<Arc<dyn OrderLedger>>, suffixes: Option<Vec<u16>>) -> Self {
        let config = test_config();
        let memory_stock = Arc::new(MemoryStock::new(config.checkout.default_stock));
        let memory_ledger = Arc::new(MemoryOrderLedger::new());
        let gateway = Arc::new(FakeGateway::default());

        let mut stores = Stores::in_memory(config.checkout.default_stock);
        stores.stock = Arc::clone(&memory_stock) as Arc<dyn StockLedger>;
        stores.orders =
            ledger.unwrap_or_else(|| Arc::clone(&memory_ledger) as Arc<dyn OrderLedger>);

        let state = AppState::with_checkout(
            config.clone(),
            stores,
            Arc::clone(&gateway) as Arc<dyn PaymentGateway>,
            |checkout| match suffixes {
                Some(suffixes) => {
                    let queue = Mutex::new(VecDeque::from(suffixes));
                    checkout.with_suffixes(Arc::new(move || {
                        queue.lock().unwrap().pop_front().unwrap_or(9999)
                    }))
                }
                None => checkout,
            },
        );
        sole_storefront::seed(&state).await.unwrap();

        let router = sole_storefront::app(state.clone(), session_layer(MemoryStore::default(), &config));

        Self {
            router,
            state,
            gateway,
            stock: memory_stock,
            ledger: memory_ledger,
        }
    }

    /// A new browser with an empty cookie jar.
    pub fn client(&self) -> TestClient {
        TestClient {
            router: self.router.clone(),
            cookie: Arc::new(Mutex::new(None)),
        }
    }
}

/// A browser session. Clones share the cookie jar, like two tabs.
#[derive(Clone)]
pub struct TestClient {
    router: Router,
    cookie: Arc<Mutex<Option<String>>>,
}

/// Status and decoded JSON body (`Null` when empty or not JSON).
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestClient {
    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &impl Serialize) -> TestResponse {
        self.send(Method::POST, path, Some(serde_json::to_vec(body).unwrap()))
            .await
    }

    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.send(Method::POST, path, None).await
    }

    /// Register a fresh account and stay logged in.
    pub async fn register(&self, email: &str, name: Option<&str>) -> TestResponse {
        self.post(
            "/auth/register",
            &serde_json::json!({
                "email": email,
                "password": "correct-horse-battery",
                "name": name,
            }),
        )
        .await
    }

    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let cookie = self.cookie.lock().unwrap().clone();
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = builder
            .body(body.map_or_else(Body::empty, Body::from))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();

        if let Some(set_cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            && let Some(pair) = set_cookie.split(';').next()
        {
            *self.cookie.lock().unwrap() = Some(pair.to_string());
        }

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }
}
