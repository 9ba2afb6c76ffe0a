//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::{Collaborators, SharedGateway};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use checkout::{
    Address, InMemoryAddressBook, InMemoryCatalog, InMemoryPaymentGateway, PaymentGatewayAdapter,
    SignatureVerifier,
};
use domain::{AddressId, Money, PricingPolicy, ShippingPolicy, UserId};
use event_store::InMemoryEventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    router: axum::Router,
    gateway: InMemoryPaymentGateway,
    signatures: SignatureVerifier,
    user: UserId,
}

/// SHIRT costs 1200 (stock 5), SOCKS 200. Free shipping above 1000,
/// otherwise 400.
async fn setup() -> TestApp {
    let catalog = InMemoryCatalog::new();
    catalog.upsert("SHIRT", Money::from_minor(1_200), 5).await;
    catalog.upsert("SOCKS", Money::from_minor(200), 50).await;

    let user = UserId::new();
    let addresses = InMemoryAddressBook::new();
    addresses
        .add(Address {
            id: AddressId::new("home"),
            user_id: user,
            line1: "12 MG Road".into(),
            city: "Bengaluru".into(),
            postal_code: "560001".into(),
            country: "IN".into(),
        })
        .await;

    let gateway = InMemoryPaymentGateway::new();
    let shared: SharedGateway = Arc::new(gateway.clone());
    let signatures = SignatureVerifier::new(b"key_secret", b"webhook_secret").unwrap();

    let state = api::create_state(
        InMemoryEventStore::new(),
        Collaborators {
            catalog,
            addresses,
            gateway: PaymentGatewayAdapter::new(shared, signatures.clone(), "INR"),
            pricing: PricingPolicy {
                shipping: ShippingPolicy {
                    free_shipping_threshold: Money::from_minor(1_000),
                    flat_shipping_fee: Money::from_minor(400),
                },
                tax_rate_bps: 0,
            },
        },
    );

    TestApp {
        router: api::create_app(state, get_metrics_handle()),
        gateway,
        signatures,
        user,
    }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.call(request).await
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn create_flat_promo(&self, code: &str, amount: i64) {
        let now = Utc::now();
        let (status, _) = self
            .send(
                "POST",
                "/admin/promo-codes",
                Some(json!({
                    "code": code,
                    "rule": {"type": "flat", "amount": amount},
                    "valid_from": now - Duration::hours(1),
                    "valid_to": now + Duration::days(1),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    fn cart(&self, method: &str) -> Value {
        json!({
            "user_id": self.user,
            "items": [{"product_id": "SHIRT", "quantity": 1}],
            "address_id": "home",
            "payment_method": method,
        })
    }

    /// Checks out one SHIRT online and returns (order id, gateway order id).
    async fn online_order(&self) -> (String, String) {
        let (status, body) = self.send("POST", "/checkout", Some(self.cart("ONLINE"))).await;
        assert_eq!(status, StatusCode::CREATED);
        (
            body["order"]["id"].as_str().unwrap().to_string(),
            body["payment"]["gateway_order_id"]
                .as_str()
                .unwrap()
                .to_string(),
        )
    }

    async fn verify(&self, order_id: &str, gateway_order_id: &str) -> (StatusCode, Value) {
        let signature = self.signatures.sign_payment(gateway_order_id, "pay_1");
        self.send(
            "POST",
            "/payments/verify",
            Some(json!({
                "order_id": order_id,
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": "pay_1",
                "signature": signature,
            })),
        )
        .await
    }

    async fn set_status(&self, order_id: &str, status: &str) -> (StatusCode, Value) {
        self.send(
            "PUT",
            &format!("/admin/orders/{order_id}/status"),
            Some(json!({"status": status})),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;
    let (status, body) = app.send("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}

#[tokio::test]
async fn test_checkout_with_promo_prices_on_the_server() {
    let app = setup().await;
    app.create_flat_promo("SAVE10", 100).await;

    let mut cart = app.cart("ONLINE");
    cart["promo_code"] = json!("save10");
    let (status, body) = app.send("POST", "/checkout", Some(cart)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order"]["pricing"]["subtotal"], 1_200);
    assert_eq!(body["order"]["pricing"]["shipping"], 0);
    assert_eq!(body["order"]["pricing"]["total"], 1_100);
    assert_eq!(body["discount"], 100);
    assert_eq!(body["order"]["status"], "PENDING");
    assert_eq!(body["order"]["payment_status"], "PENDING");
    assert_eq!(body["payment"]["amount"], 1_100);
    assert_eq!(body["payment"]["currency"], "INR");
    assert_eq!(body["replayed"], false);

    let (status, usages) = app.send("GET", "/admin/promo-codes/save10/usages", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usages["code"], "SAVE10");
    assert_eq!(usages["count"], 1);
}

#[tokio::test]
async fn test_promo_validation_quotes_without_redeeming() {
    let app = setup().await;
    app.create_flat_promo("SAVE10", 100).await;

    let request = json!({"code": "save10", "user_id": app.user, "subtotal": 1_200});
    for _ in 0..2 {
        let (status, body) = app
            .send("POST", "/promo-codes/validate", Some(request.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], "SAVE10");
        assert_eq!(body["discount"], 100);
    }

    let (status, body) = app
        .send(
            "POST",
            "/promo-codes/validate",
            Some(json!({"code": "NOPE", "user_id": app.user, "subtotal": 1_200})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "promo_invalid");

    let (status, _) = app
        .send(
            "POST",
            "/promo-codes/validate",
            Some(json!({"code": " ", "user_id": app.user, "subtotal": 1_200})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut cart = app.cart("ONLINE");
    cart["promo_code"] = json!("SAVE10");
    let (status, _) = app.send("POST", "/checkout", Some(cart)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, usages) = app.send("GET", "/admin/promo-codes/SAVE10/usages", None).await;
    assert_eq!(usages["count"], 1);
}

#[tokio::test]
async fn test_verify_payment_confirms_once() {
    let app = setup().await;
    let (order_id, gateway_order_id) = app.online_order().await;

    let (status, body) = app.verify(&order_id, &gateway_order_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "captured");
    assert_eq!(body["order"]["status"], "CONFIRMED");
    assert_eq!(body["order"]["payment_status"], "PAID");

    let (status, body) = app.verify(&order_id, &gateway_order_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "already_captured");
}

#[tokio::test]
async fn test_tampered_signature_is_payment_required() {
    let app = setup().await;
    let (order_id, gateway_order_id) = app.online_order().await;

    let (status, body) = app
        .send(
            "POST",
            "/payments/verify",
            Some(json!({
                "order_id": order_id,
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": "pay_1",
                "signature": "00".repeat(32),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "verification_failed");

    let (_, order) = app.send("GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(order["payment_status"], "PENDING");
}

#[tokio::test]
async fn test_admin_status_changes_follow_the_transition_table() {
    let app = setup().await;
    let (order_id, gateway_order_id) = app.online_order().await;
    app.verify(&order_id, &gateway_order_id).await;

    assert_eq!(app.set_status(&order_id, "PROCESSING").await.0, StatusCode::OK);
    assert_eq!(app.set_status(&order_id, "SHIPPED").await.0, StatusCode::OK);

    let (status, body) = app.set_status(&order_id, "PROCESSING").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "illegal_transition");

    let (_, order) = app.send("GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(order["status"], "SHIPPED");
}

#[tokio::test]
async fn test_unpaid_online_order_cannot_be_confirmed() {
    let app = setup().await;
    let (order_id, _) = app.online_order().await;

    let (status, body) = app.set_status(&order_id, "CONFIRMED").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "awaiting_payment");
}

#[tokio::test]
async fn test_refund_paid_order() {
    let app = setup().await;
    let (order_id, gateway_order_id) = app.online_order().await;
    app.verify(&order_id, &gateway_order_id).await;

    let uri = format!("/admin/orders/{order_id}/refund");
    let (status, body) = app.send("POST", &uri, Some(json!({"amount": 1_200}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], 1_200);
    assert_eq!(body["order"]["payment_status"], "REFUNDED");
    assert!(body["refund_id"].is_string());

    let (status, body) = app.send("POST", &uri, Some(json!({"amount": 1_200}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "not_refundable");
    assert_eq!(app.gateway.refund_count().await, 1);
}

#[tokio::test]
async fn test_gateway_outage_then_retry_with_checkout_id() {
    let app = setup().await;
    app.gateway.set_unavailable(true).await;

    let checkout_id = common::AggregateId::new();
    let mut cart = app.cart("ONLINE");
    cart["checkout_id"] = json!(checkout_id);

    let (status, body) = app.send("POST", "/checkout", Some(cart.clone())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "gateway_unavailable");
    assert_eq!(body["order_id"], checkout_id.to_string());

    app.gateway.set_unavailable(false).await;
    let (status, body) = app.send("POST", "/checkout", Some(cart)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["replayed"], true);
    assert_eq!(body["order"]["id"], checkout_id.to_string());
    assert!(body["payment"]["gateway_order_id"].is_string());
}

#[tokio::test]
async fn test_checkout_rejections() {
    let app = setup().await;

    let mut empty = app.cart("ONLINE");
    empty["items"] = json!([]);
    let (status, body) = app.send("POST", "/checkout", Some(empty)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "empty_cart");

    let mut unknown_promo = app.cart("ONLINE");
    unknown_promo["promo_code"] = json!("NOPE");
    let (status, body) = app.send("POST", "/checkout", Some(unknown_promo)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "promo_invalid");

    let mut too_many = app.cart("ONLINE");
    too_many["items"] = json!([{"product_id": "SHIRT", "quantity": 6}]);
    let (status, body) = app.send("POST", "/checkout", Some(too_many)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "insufficient_stock");

    let mut elsewhere = app.cart("ONLINE");
    elsewhere["address_id"] = json!("office");
    let (status, _) = app.send("POST", "/checkout", Some(elsewhere)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, orders) = app
        .send("GET", &format!("/users/{}/orders", app.user), None)
        .await;
    assert_eq!(orders.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_cod_order_cash_collection() {
    let app = setup().await;
    let (status, body) = app.send("POST", "/checkout", Some(app.cart("COD"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order"]["payment_status"], "COD_PENDING");
    assert!(body["payment"].is_null());
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let cash_uri = format!("/admin/orders/{order_id}/cash-collected");
    let collected = json!({"collected_by": "courier-7"});
    let (status, _) = app.send("POST", &cash_uri, Some(collected.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    for target in ["CONFIRMED", "PROCESSING", "SHIPPED", "DELIVERED"] {
        assert_eq!(app.set_status(&order_id, target).await.0, StatusCode::OK);
    }

    let (status, body) = app.send("POST", &cash_uri, Some(collected)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "PAID");

    let (status, body) = app
        .send(
            "POST",
            &format!("/admin/orders/{order_id}/refund"),
            Some(json!({"amount": 1_200})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "not_refundable");
}

#[tokio::test]
async fn test_customer_cancel_and_return() {
    let app = setup().await;
    let (order_id, _) = app.online_order().await;

    let stranger = json!({"user_id": UserId::new()});
    let (status, _) = app
        .send("POST", &format!("/orders/{order_id}/cancel"), Some(stranger))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let owner = json!({"user_id": app.user, "reason": "ordered twice"});
    let (status, body) = app
        .send("POST", &format!("/orders/{order_id}/cancel"), Some(owner.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");

    let (status, body) = app
        .send("POST", &format!("/orders/{order_id}/return"), Some(owner))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "illegal_transition");
}

#[tokio::test]
async fn test_signed_webhook_captures_payment() {
    let app = setup().await;
    let (order_id, gateway_order_id) = app.online_order().await;

    let body = json!({
        "event": "payment.captured",
        "payload": {
            "order_id": order_id,
            "gateway_order_id": gateway_order_id,
            "payment_id": "pay_9",
        },
    })
    .to_string();

    let unsigned = Request::builder()
        .method("POST")
        .uri("/payments/webhook")
        .body(Body::from(body.clone()))
        .unwrap();
    assert_eq!(app.call(unsigned).await.0, StatusCode::BAD_REQUEST);

    let signed = Request::builder()
        .method("POST")
        .uri("/payments/webhook")
        .header("x-gateway-signature", app.signatures.sign_webhook(body.as_bytes()))
        .body(Body::from(body))
        .unwrap();
    let (status, response) = app.call(signed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["outcome"], "captured");

    let (_, orders) = app
        .send("GET", &format!("/users/{}/orders", app.user), None)
        .await;
    assert_eq!(orders[0]["payment_status"], "PAID");
    assert_eq!(orders[0]["status"], "CONFIRMED");
}

#[tokio::test]
async fn test_catalog_and_address_admin() {
    let app = setup().await;
    let user = UserId::new();

    let (status, _) = app
        .send(
            "PUT",
            "/admin/products/CAP",
            Some(json!({"price": 300, "stock": 2})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            "POST",
            &format!("/users/{user}/addresses"),
            Some(json!({
                "id": "flat",
                "line1": "4 Park Street",
                "city": "Kolkata",
                "postal_code": "700016",
                "country": "IN",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(
            "POST",
            "/checkout",
            Some(json!({
                "user_id": user,
                "items": [{"product_id": "CAP", "quantity": 2}],
                "address_id": "flat",
                "payment_method": "COD",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    // 600 is below the free shipping threshold
    assert_eq!(body["order"]["pricing"]["total"], 1_000);
}

#[tokio::test]
async fn test_invalid_and_unknown_ids() {
    let app = setup().await;

    let (status, _) = app.send("GET", "/orders/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send("GET", &format!("/orders/{}", common::AggregateId::new()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = app.send("GET", "/admin/promo-codes/NOPE/usages", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
