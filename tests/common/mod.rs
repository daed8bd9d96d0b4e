//! Shared harness: the full router over an in-memory store, a stub Khalti gateway
//! and the real eSewa gateway with remote verification off.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::{to_bytes, Body}, http::{header, Request, StatusCode}, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tower::ServiceExt;

use storefront::domain::aggregates::{PendingPayment, Role, User, UserProfile};
use storefront::payments::esewa::{self, EsewaGateway};
use storefront::payments::{khalti, Gateways, InitiatedPayment, NormalizedPayment, PaymentError, PaymentGateway, PaymentProvider, QueryParams, Redirect};
use storefront::store::{MemoryStore, Repo, SharedStore};
use storefront::{api, AppState, Config};

pub const BRIDGE_SECRET: &str = "bridge-secret";
pub const ESEWA_SECRET: &str = "esewa-test-secret";

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("storefront=debug").with_test_writer().try_init();
}

/// Khalti stand-in: issues `pidx-<reference>` and trusts whatever comes back.
pub struct StubKhalti;

#[async_trait]
impl PaymentGateway for StubKhalti {
    fn provider(&self) -> PaymentProvider { PaymentProvider::Khalti }

    async fn initiate(&self, pending: &PendingPayment, _customer: &UserProfile) -> Result<InitiatedPayment, PaymentError> {
        let pidx = format!("pidx-{}", pending.reference);
        Ok(InitiatedPayment {
            redirect: Redirect { method: "GET", url: format!("https://pay.test/{}", pidx), fields: BTreeMap::new() },
            gateway_token: Some(pidx),
        })
    }

    fn decode(&self, params: &QueryParams) -> Result<NormalizedPayment, PaymentError> { khalti::decode_return(params) }

    async fn verify(&self, _payment: &NormalizedPayment) -> Result<(), PaymentError> { Ok(()) }
}

pub struct TestApp {
    pub router: Router,
    pub store: SharedStore,
}

impl TestApp {
    pub fn new() -> Self {
        init_test_tracing();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("JWT_SECRET", "test-secret"), ("AUTH_BRIDGE_SECRET", BRIDGE_SECRET), ("PAYMENT_REMOTE_VERIFY", "false"),
            ("ESEWA_SECRET_KEY", ESEWA_SECRET),
        ]);
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        let store: SharedStore = Arc::new(MemoryStore::new());
        let esewa = EsewaGateway::new(config.esewa.clone(), reqwest::Client::new(), "http://shop.test", false);
        let gateways = Gateways::new().with(Arc::new(StubKhalti)).with(Arc::new(esewa));
        let router = api::router(AppState::new(config, store.clone(), gateways, None));
        Self { router, store }
    }

    pub async fn request(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token { builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token)); }
        let request = match body {
            Some(b) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(b.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    /// Signs up a customer and returns their token.
    pub async fn customer(&self, email: &str) -> String {
        let (status, body) = self.request("POST", "/api/auth/signup", None, Some(json!({
            "name": "Sita Sharma", "email": email, "password": "namaste123",
        }))).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn set_role(&self, email: &str, role: Role) {
        let users: Repo<User> = Repo::new(self.store.clone());
        let mut user = users.find_one(json!({ "email": email })).await.unwrap().unwrap();
        user.role = role;
        users.save(&user).await.unwrap();
    }

    pub async fn promote(&self, email: &str) { self.set_role(email, Role::Admin).await }

    pub async fn demote(&self, email: &str) { self.set_role(email, Role::User).await }

    pub async fn admin(&self, email: &str) -> String {
        self.customer(email).await;
        self.promote(email).await;
        let (status, body) = self.request("POST", "/api/auth/signin", None, Some(json!({ "email": email, "password": "namaste123" }))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    pub fn pending(&self) -> Repo<PendingPayment> { Repo::new(self.store.clone()) }

    pub async fn pending_by_reference(&self, reference: &str) -> PendingPayment {
        self.pending().find_one(json!({ "reference": reference })).await.unwrap().unwrap()
    }

    pub async fn order_count(&self, token: &str) -> usize {
        let (_, orders) = self.request("GET", "/api/orders", Some(token), None).await;
        orders.as_array().unwrap().len()
    }

    pub async fn address(&self, token: &str) -> String {
        let (status, body) = self.request("POST", "/api/user/addresses", Some(token), Some(json!({
            "fullName": "Sita Sharma", "phone": "9800000000", "street": "Thamel Marg", "city": "Kathmandu", "state": "Bagmati",
        }))).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}

pub fn cart(product_id: &str, price: i64, quantity: u32) -> Value {
    json!([{ "productId": product_id, "name": "Dhaka Topi", "price": price, "quantity": quantity }])
}

/// Base64 eSewa success document signed with `secret`, percent-encoded for a query string.
pub fn esewa_data(secret: &str, reference: &str, amount: &str) -> String {
    let names = "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names";
    let message = format!(
        "transaction_code=000AWEO,status=COMPLETE,total_amount={amount},transaction_uuid={reference},product_code=EPAYTEST,signed_field_names={names}"
    );
    let doc = json!({
        "transaction_code": "000AWEO", "status": "COMPLETE", "total_amount": amount, "transaction_uuid": reference,
        "product_code": "EPAYTEST", "signed_field_names": names, "signature": esewa::sign(secret, &message).unwrap(),
    });
    STANDARD.encode(doc.to_string()).replace('+', "%2B").replace('/', "%2F").replace('=', "%3D")
}
