mod common;

use axum::{body::Body, http::{Request, StatusCode}};
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use common::{cart, esewa_data, TestApp, BRIDGE_SECRET, ESEWA_SECRET};
use storefront::domain::aggregates::PendingState;

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy", "service": "storefront"}));
}

#[tokio::test]
async fn test_cash_on_delivery_order() {
    let app = TestApp::new();
    let token = app.customer("sita@shop.np").await;
    let address_id = app.address(&token).await;
    let product_id = Uuid::now_v7().to_string();

    let (status, body) = app.request("POST", "/api/orders", Some(&token), Some(json!({
        "addressId": address_id, "items": cart(&product_id, 500, 2),
    }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["order"]["subtotal"].as_f64(), Some(1000.0));
    assert_eq!(body["order"]["total"].as_f64(), Some(1100.0));
    assert_eq!(body["order"]["status"], "pending");
    assert_eq!(body["order"]["paymentStatus"], "pending");
    assert!(body["orderNumber"].as_str().unwrap().starts_with("ORD-"));

    let (_, orders) = app.request("GET", "/api/orders", Some(&token), None).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_address_is_not_found() {
    let app = TestApp::new();
    let token = app.customer("ram@shop.np").await;
    let (status, _) = app.request("POST", "/api/orders", Some(&token), Some(json!({
        "addressId": Uuid::now_v7(), "items": cart(&Uuid::now_v7().to_string(), 500, 1),
    }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_percentage_discount_is_capped() {
    let app = TestApp::new();
    let admin = app.admin("admin@shop.np").await;
    let (status, body) = app.request("POST", "/api/admin/discounts", Some(&admin), Some(json!({
        "code": "dashain20", "type": "percentage", "value": 20, "maxDiscount": 500,
        "startDate": "2020-01-01T00:00:00Z", "endDate": "2099-01-01T00:00:00Z",
    }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["code"], "DASHAIN20");

    let customer = app.customer("gita@shop.np").await;
    let (status, body) = app.request("POST", "/api/discounts/validate", Some(&customer), Some(json!({
        "code": "DASHAIN20", "subtotal": 4000, "items": [],
    }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["valid"], true);
    assert_eq!(body["discountAmount"].as_f64(), Some(500.0));

    let (status, _) = app.request("POST", "/api/discounts/validate", Some(&customer), Some(json!({
        "code": "NOSUCHCODE", "subtotal": 4000,
    }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_khalti_cancellation_creates_nothing() {
    let app = TestApp::new();
    let token = app.customer("hari@shop.np").await;
    let (status, body) = app.request("POST", "/api/payments/complete", Some(&token), Some(json!({
        "provider": "khalti", "params": { "error": "user_canceled" },
    }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["category"], "cancelled");
    assert_eq!(body["clearPendingState"], true);
    assert_eq!(body["error"], "Payment was cancelled. Your cart has been kept so you can try again.");

    let (_, orders) = app.request("GET", "/api/orders", Some(&token), None).await;
    assert!(orders.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_khalti_payment_completes_once() {
    let app = TestApp::new();
    let token = app.customer("maya@shop.np").await;
    let address_id = app.address(&token).await;

    let (status, initiated) = app.request("POST", "/api/payments/initiate", Some(&token), Some(json!({
        "provider": "khalti", "addressId": address_id, "items": cart(&Uuid::now_v7().to_string(), 500, 2), "subtotal": 1000,
    }))).await;
    assert_eq!(status, StatusCode::OK, "{initiated}");
    assert_eq!(initiated["total"].as_f64(), Some(1100.0));
    let reference = initiated["reference"].as_str().unwrap();

    let uri = format!("/api/payments/khalti/return?pidx=pidx-{reference}&status=Completed&amount=110000&purchase_order_id={reference}&transaction_id=TX42");
    let (status, first) = app.request("GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["paymentStatus"], "paid");
    assert_eq!(first["status"], "processing");
    assert_eq!(first["paymentReference"], "TX42");
    assert_eq!(first["alreadyProcessed"], false);

    let (status, second) = app.request("GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{second}");
    assert_eq!(second["alreadyProcessed"], true);
    assert_eq!(second["orderId"], first["orderId"]);

    let (_, orders) = app.request("GET", "/api/orders", Some(&token), None).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_khalti_amount_mismatch_rejected() {
    let app = TestApp::new();
    let token = app.customer("bina@shop.np").await;
    let address_id = app.address(&token).await;
    let (_, initiated) = app.request("POST", "/api/payments/initiate", Some(&token), Some(json!({
        "provider": "khalti", "addressId": address_id, "items": cart(&Uuid::now_v7().to_string(), 500, 2),
    }))).await;
    let reference = initiated["reference"].as_str().unwrap();

    let uri = format!("/api/payments/khalti/return?pidx=pidx-{reference}&amount=1000&purchase_order_id={reference}");
    let (status, body) = app.request("GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["category"], "invalid_amount");
}

#[tokio::test]
async fn test_oauth_keeps_admin_role() {
    let app = TestApp::new();
    app.admin("boss@shop.np").await;
    let request = Request::builder().method("POST").uri("/api/auth/oauth")
        .header("content-type", "application/json").header("x-auth-bridge-secret", BRIDGE_SECRET)
        .body(Body::from(json!({ "provider": "google", "email": "Boss@Shop.np", "name": "The Boss" }).to_string())).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["user"]["role"], "admin");

    let (status, _) = app.request("POST", "/api/auth/oauth", None, Some(json!({ "provider": "google", "email": "x@y.np", "name": "X" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_category_in_use_cannot_be_deleted() {
    let app = TestApp::new();
    let admin = app.admin("admin@shop.np").await;
    let (status, category) = app.request("POST", "/api/admin/categories", Some(&admin), Some(json!({ "name": "Handicrafts" }))).await;
    assert_eq!(status, StatusCode::CREATED, "{category}");
    let (status, product) = app.request("POST", "/api/admin/products", Some(&admin), Some(json!({
        "name": "Singing Bowl", "price": 3000, "categoryId": category["id"], "status": "published",
    }))).await;
    assert_eq!(status, StatusCode::CREATED, "{product}");

    let uri = format!("/api/admin/categories/{}", category["id"].as_str().unwrap());
    let (status, body) = app.request("DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("reassign or delete products first"));

    let (_, listed) = app.request("GET", "/api/products?category=handicrafts", None, None).await;
    assert_eq!(listed["total"], 1);
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let app = TestApp::new();
    let token = app.customer("plain@shop.np").await;
    let (status, _) = app.request("GET", "/api/admin/stats", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.request("GET", "/api/admin/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin = app.admin("admin@shop.np").await;
    let (status, stats) = app.request("GET", "/api/admin/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalCustomers"], 1);
    let (status, all) = app.request("GET", "/api/admin/analytics?type=all&period=monthly", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK, "{all}");
    assert!(all["revenue"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_single_default_address() {
    let app = TestApp::new();
    let token = app.customer("nima@shop.np").await;
    let first = app.address(&token).await;
    let second = app.address(&token).await;

    let (_, list) = app.request("GET", "/api/user/addresses", Some(&token), None).await;
    let defaults: Vec<_> = list.as_array().unwrap().iter().filter(|a| a["isDefault"] == true).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0]["id"], first.as_str());

    let (status, list) = app.request("POST", &format!("/api/user/addresses/{second}/default"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let defaults: Vec<_> = list.as_array().unwrap().iter().filter(|a| a["isDefault"] == true).collect();
    assert_eq!((defaults.len(), defaults[0]["id"].as_str()), (1, Some(second.as_str())));

    let (_, list) = app.request("DELETE", &format!("/api/user/addresses/{second}"), Some(&token), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["isDefault"], true);
}

async fn khalti_initiated(app: &TestApp, token: &str) -> String {
    let address_id = app.address(token).await;
    let (status, initiated) = app.request("POST", "/api/payments/initiate", Some(token), Some(json!({
        "provider": "khalti", "addressId": address_id, "items": cart(&Uuid::now_v7().to_string(), 500, 2),
    }))).await;
    assert_eq!(status, StatusCode::OK, "{initiated}");
    initiated["reference"].as_str().unwrap().to_string()
}

async fn lapse(app: &TestApp, reference: &str) {
    let mut pending = app.pending_by_reference(reference).await;
    pending.expires_at = Utc::now() - Duration::minutes(1);
    assert!(app.pending().save(&pending).await.unwrap());
}

#[tokio::test]
async fn test_payment_captured_after_expiry_still_places_order() {
    let app = TestApp::new();
    let token = app.customer("late@shop.np").await;
    let reference = khalti_initiated(&app, &token).await;
    lapse(&app, &reference).await;

    let uri = format!("/api/payments/khalti/return?pidx=pidx-{reference}&status=Completed&amount=110000&purchase_order_id={reference}&transaction_id=TX99");
    let (status, body) = app.request("GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["paymentStatus"], "paid");
    assert_eq!(body["total"].as_f64(), Some(1100.0));
    assert_eq!(app.order_count(&token).await, 1);
    assert_eq!(app.pending_by_reference(&reference).await.state, PendingState::Completed);
}

#[tokio::test]
async fn test_expired_attempt_with_wrong_amount_is_session_expired() {
    let app = TestApp::new();
    let token = app.customer("stale@shop.np").await;
    let reference = khalti_initiated(&app, &token).await;
    lapse(&app, &reference).await;

    let uri = format!("/api/payments/khalti/return?pidx=pidx-{reference}&amount=5000&purchase_order_id={reference}");
    let (status, body) = app.request("GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::GONE, "{body}");
    assert_eq!(body["category"], "session_expired");
    assert_eq!(body["clearPendingState"], true);
    assert_eq!(app.order_count(&token).await, 0);
    assert_eq!(app.pending_by_reference(&reference).await.state, PendingState::Failed);
}

#[tokio::test]
async fn test_gateway_error_cannot_fail_another_users_attempt() {
    let app = TestApp::new();
    let owner = app.customer("owner@shop.np").await;
    let reference = khalti_initiated(&app, &owner).await;

    let intruder = app.customer("intruder@shop.np").await;
    let (status, body) = app.request("POST", "/api/payments/complete", Some(&intruder), Some(json!({
        "provider": "khalti", "params": { "error": "user_canceled", "purchase_order_id": reference, "pidx": format!("pidx-{reference}") },
    }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["category"], "cancelled");
    assert_eq!(app.pending_by_reference(&reference).await.state, PendingState::Awaiting);

    app.request("POST", "/api/payments/complete", Some(&owner), Some(json!({
        "provider": "khalti", "params": { "error": "user_canceled", "purchase_order_id": reference },
    }))).await;
    assert_eq!(app.pending_by_reference(&reference).await.state, PendingState::Failed);
}

#[tokio::test]
async fn test_oversized_cart_is_rejected() {
    let app = TestApp::new();
    let token = app.customer("bulk@shop.np").await;
    let address_id = app.address(&token).await;
    let product_id = Uuid::now_v7();

    let (status, body) = app.request("POST", "/api/orders", Some(&token), Some(json!({
        "addressId": address_id, "items": [{ "productId": product_id, "name": "Pashmina", "price": 1e25, "quantity": 100000 }],
    }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = app.request("POST", "/api/orders", Some(&token), Some(json!({
        "addressId": address_id, "items": [
            { "productId": product_id, "name": "Pashmina", "price": 10, "quantity": u32::MAX },
            { "productId": product_id, "name": "Pashmina", "price": 10, "quantity": u32::MAX },
        ],
    }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(body["error"].as_str().unwrap().contains("too large"));
    assert_eq!(app.order_count(&token).await, 0);
}

#[tokio::test]
async fn test_esewa_signed_return_places_order() {
    let app = TestApp::new();
    let token = app.customer("esewa@shop.np").await;
    let address_id = app.address(&token).await;
    let (status, initiated) = app.request("POST", "/api/payments/initiate", Some(&token), Some(json!({
        "provider": "esewa", "addressId": address_id, "items": cart(&Uuid::now_v7().to_string(), 500, 2),
    }))).await;
    assert_eq!(status, StatusCode::OK, "{initiated}");
    assert_eq!(initiated["redirect"]["method"], "POST");
    let reference = initiated["reference"].as_str().unwrap();
    assert_eq!(initiated["redirect"]["fields"]["transaction_uuid"], reference);

    let forged = format!("/api/payments/esewa/return?data={}", esewa_data("not-the-secret", reference, "1100.0"));
    let (status, body) = app.request("GET", &forged, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["category"], "verification_failed");
    assert_eq!(app.order_count(&token).await, 0);

    let signed = format!("/api/payments/esewa/return?data={}", esewa_data(ESEWA_SECRET, reference, "1100.0"));
    let (status, body) = app.request("GET", &signed, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["paymentStatus"], "paid");
    assert_eq!(body["paymentReference"], "000AWEO");
    assert_eq!(app.order_count(&token).await, 1);
}

#[tokio::test]
async fn test_esewa_unsigned_return_needs_remote_verification() {
    let app = TestApp::new();
    let token = app.customer("legacy@shop.np").await;
    let address_id = app.address(&token).await;
    let (_, initiated) = app.request("POST", "/api/payments/initiate", Some(&token), Some(json!({
        "provider": "esewa", "addressId": address_id, "items": cart(&Uuid::now_v7().to_string(), 500, 2),
    }))).await;
    let reference = initiated["reference"].as_str().unwrap();

    let uri = format!("/api/payments/esewa/return?oid={reference}&amt=1100&refId=ESW1");
    let (status, body) = app.request("GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["category"], "verification_failed");
    assert_eq!(app.order_count(&token).await, 0);
}

#[tokio::test]
async fn test_completion_from_client_snapshot() {
    let app = TestApp::new();
    let token = app.customer("snapshot@shop.np").await;
    let address_id = app.address(&token).await;
    let product_id = Uuid::now_v7();
    let order_data = json!({
        "items": [{ "productId": product_id, "name": "Dhaka Topi", "price": 500, "quantity": 2 }],
        "addressId": address_id, "paymentMethod": "khalti", "subtotal": 1000, "shippingFee": 100, "total": 1100,
    });

    let mut tampered = order_data.clone();
    tampered["subtotal"] = json!(10);
    tampered["total"] = json!(110);
    let (status, body) = app.request("POST", "/api/payments/complete", Some(&token), Some(json!({
        "provider": "khalti", "params": { "pidx": "pidx-tampered", "amount": "11000" }, "orderData": tampered,
    }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["category"], "invalid_request");

    let (status, body) = app.request("POST", "/api/payments/complete", Some(&token), Some(json!({
        "provider": "khalti", "params": { "pidx": "pidx-snapshot", "amount": "110000", "transaction_id": "TX7" }, "orderData": order_data,
    }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["total"].as_f64(), Some(1100.0));
    assert_eq!(body["paymentReference"], "TX7");
    assert_eq!(app.order_count(&token).await, 1);
}

#[tokio::test]
async fn test_completion_from_bare_cart_takes_shipping_from_amount() {
    let app = TestApp::new();
    let token = app.customer("bare@shop.np").await;
    let address_id = app.address(&token).await;
    let items = cart(&Uuid::now_v7().to_string(), 500, 2);

    let (status, body) = app.request("POST", "/api/payments/complete", Some(&token), Some(json!({
        "provider": "khalti", "params": { "pidx": "pidx-short", "amount": "90000" }, "cart": items, "addressId": address_id,
    }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["category"], "invalid_amount");

    let (status, body) = app.request("POST", "/api/payments/complete", Some(&token), Some(json!({
        "provider": "khalti", "params": { "pidx": "pidx-bare", "amount": "125000" }, "cart": items, "addressId": address_id,
    }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (_, order) = app.request("GET", &format!("/api/orders/{}", body["orderId"].as_str().unwrap()), Some(&token), None).await;
    assert_eq!(order["subtotal"].as_f64(), Some(1000.0));
    assert_eq!(order["shippingFee"].as_f64(), Some(250.0));
    assert_eq!(order["total"].as_f64(), Some(1250.0));
    assert_eq!(order["paymentStatus"], "paid");
}

#[tokio::test]
async fn test_discount_usage_is_counted_and_limited() {
    let app = TestApp::new();
    let admin = app.admin("admin@shop.np").await;
    let (status, body) = app.request("POST", "/api/admin/discounts", Some(&admin), Some(json!({
        "code": "NEWYEAR", "type": "fixed", "value": 200, "usageLimit": 1,
        "startDate": "2020-01-01T00:00:00Z", "endDate": "2099-01-01T00:00:00Z",
    }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let token = app.customer("festive@shop.np").await;
    let address_id = app.address(&token).await;
    let (status, body) = app.request("POST", "/api/orders", Some(&token), Some(json!({
        "addressId": address_id, "items": cart(&Uuid::now_v7().to_string(), 500, 2), "discountCode": "newyear",
    }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["order"]["total"].as_f64(), Some(900.0));

    let (_, discounts) = app.request("GET", "/api/admin/discounts", Some(&admin), None).await;
    assert_eq!(discounts[0]["usageCount"], 1);

    let (status, body) = app.request("POST", "/api/orders", Some(&token), Some(json!({
        "addressId": address_id, "items": cart(&Uuid::now_v7().to_string(), 500, 2), "discountCode": "NEWYEAR",
    }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(body["error"].as_str().unwrap().contains("usage limit"));
    assert_eq!(app.order_count(&token).await, 1);
}

#[tokio::test]
async fn test_demoted_admin_loses_access_immediately() {
    let app = TestApp::new();
    let admin = app.admin("former@shop.np").await;
    let (status, _) = app.request("GET", "/api/admin/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    app.demote("former@shop.np").await;
    let (status, _) = app.request("GET", "/api/admin/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
