//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::config::Config;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Money, StoreId};
use domain::{Notifications, RecordingNotifier};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryCatalog, InMemoryOrderStore, Product};
use payments::{InMemoryPaymentGateway, SIGNATURE_HEADER, WebhookVerifier};
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

const SECRET: &str = "whsec_api_tests";

struct TestApp {
    app: Router,
    catalog: InMemoryCatalog,
    gateway: InMemoryPaymentGateway,
    signer: WebhookVerifier,
    mug: Product,
    tote: Product,
}

impl TestApp {
    async fn new() -> Self {
        let catalog = InMemoryCatalog::new();
        let mug = catalog
            .add_product(StoreId::new(1), "Mug", Money::from_major(50), 10)
            .await;
        let tote = catalog
            .add_product(StoreId::new(1), "Tote", Money::from_major(20), 5)
            .await;
        let store = InMemoryOrderStore::with_catalog(catalog.clone());
        let gateway = InMemoryPaymentGateway::new();
        let config = Config {
            webhook_secret: SECRET.to_string(),
            ..Config::default()
        };

        let state: Arc<AppState<InMemoryOrderStore, InMemoryCatalog>> = api::create_state(
            store,
            catalog.clone(),
            gateway.clone(),
            Notifications::inline(Arc::new(RecordingNotifier::new())),
            &config,
        )
        .unwrap();

        Self {
            app: api::create_app(state, get_metrics_handle()),
            catalog,
            gateway,
            signer: WebhookVerifier::new(SECRET, 300).unwrap(),
            mug,
            tote,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
    }

    fn checkout_body(&self) -> Value {
        json!({
            "customer_name": "Aina Rahman",
            "customer_email": "aina@example.com",
            "customer_phone": "+60123456789",
            "customer_address": "1 Jalan Ampang, Kuala Lumpur",
            "items": [
                { "product_id": self.mug.id, "quantity": 1 },
                { "product_id": self.tote.id, "quantity": 2 }
            ],
            "payment_method": "stripe"
        })
    }

    /// Places the RM90.00 guest order and returns its id.
    async fn place_order(&self) -> i64 {
        let (status, order) = self
            .json("POST", "/stores/1/checkout", self.checkout_body())
            .await;
        assert_eq!(status, StatusCode::CREATED);
        order["id"].as_i64().unwrap()
    }

    async fn deliver_webhook(&self, body: &Value, signature: Option<String>) -> (StatusCode, Value) {
        let payload = serde_json::to_vec(body).unwrap();
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/payments")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        self.send(builder.body(Body::from(payload)).unwrap()).await
    }

    fn sign(&self, body: &Value) -> String {
        let payload = serde_json::to_vec(body).unwrap();
        self.signer.sign(&payload, chrono::Utc::now().timestamp())
    }
}

fn succeeded_event(intent_id: &str, order_id: i64) -> Value {
    json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": {
            "object": {
                "id": intent_id,
                "status": "succeeded",
                "metadata": { "order_id": order_id.to_string() }
            }
        }
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;

    let (status, json) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    let app = TestApp::new().await;
    app.place_order().await;

    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn test_checkout_creates_pending_order() {
        let app = TestApp::new().await;

        let (status, order) = app
            .json("POST", "/stores/1/checkout", app.checkout_body())
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["status"], "pending");
        assert_eq!(order["total_amount"], "90.00");
        assert_eq!(order["total_cents"], 9000);
        assert_eq!(order["items"].as_array().unwrap().len(), 2);
        assert!(order["order_number"].as_str().unwrap().starts_with("ORD-"));
        assert_eq!(app.catalog.stock_of(app.mug.id).await, Some(10));
    }

    #[tokio::test]
    async fn test_invalid_fields_are_listed() {
        let app = TestApp::new().await;
        let mut body = app.checkout_body();
        body["customer_email"] = json!("not-an-email");
        body["customer_phone"] = Value::Null;

        let (status, json) = app.json("POST", "/stores/1/checkout", body).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let fields: Vec<&str> = json["details"]["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"customer_email"));
        assert!(fields.contains(&"customer_phone"));
    }

    #[tokio::test]
    async fn test_mistyped_body_is_a_field_error() {
        let app = TestApp::new().await;
        let mut body = app.checkout_body();
        body["items"][0]["quantity"] = json!(-1);

        let (status, json) = app.json("POST", "/stores/1/checkout", body).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"], "Invalid request body");
        assert_eq!(json["details"]["fields"][0]["field"], "items.0.quantity");
        assert_eq!(app.get("/stores/1/orders").await.1["total"], 0);
    }

    #[tokio::test]
    async fn test_unparseable_body_is_bad_request() {
        let app = TestApp::new().await;

        let (status, json) = app
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/stores/1/checkout")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"customer_name\": "))
                    .unwrap(),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_overlong_phone_is_rejected_before_saving() {
        let app = TestApp::new().await;
        let mut body = app.checkout_body();
        body["customer_phone"] = json!("6".repeat(40));

        let (status, json) = app.json("POST", "/stores/1/checkout", body).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["details"]["fields"][0]["field"], "customer_phone");
    }

    #[tokio::test]
    async fn test_insufficient_stock_reports_availability() {
        let app = TestApp::new().await;
        let mut body = app.checkout_body();
        body["items"] = json!([{ "product_id": app.tote.id, "quantity": 6 }]);

        let (status, json) = app.json("POST", "/stores/1/checkout", body).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["details"]["available"], 5);
        assert_eq!(json["details"]["requested"], 6);
    }

    #[tokio::test]
    async fn test_receipt_is_readable_by_id() {
        let app = TestApp::new().await;
        let id = app.place_order().await;

        let (status, receipt) = app.get(&format!("/orders/{id}/receipt")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(receipt["customer_name"], "Aina Rahman");
        assert_eq!(app.get("/orders/999/receipt").await.0, StatusCode::NOT_FOUND);
    }
}

mod administration {
    use super::*;

    #[tokio::test]
    async fn test_other_store_cannot_see_order() {
        let app = TestApp::new().await;
        let id = app.place_order().await;

        let (status, _) = app.get(&format!("/stores/2/orders/{id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, order) = app.get(&format!("/stores/1/orders/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["id"], id);
    }

    #[tokio::test]
    async fn test_status_moves_along_lifecycle() {
        let app = TestApp::new().await;
        let id = app.place_order().await;
        let uri = format!("/stores/1/orders/{id}/status");

        for target in ["paid", "shipped", "completed"] {
            let (status, order) = app.json("PATCH", &uri, json!({ "status": target })).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(order["status"], target);
        }

        let (status, json) = app.json("PATCH", &uri, json!({ "status": "paid" })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["details"]["current"], "completed");
        assert_eq!(json["details"]["allowed"], json!([]));
    }

    #[tokio::test]
    async fn test_unknown_status_is_a_field_error() {
        let app = TestApp::new().await;
        let id = app.place_order().await;

        let (status, json) = app
            .json(
                "PATCH",
                &format!("/stores/1/orders/{id}/status"),
                json!({ "status": "refunded" }),
            )
            .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["details"]["fields"][0]["field"], "status");
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_date() {
        let app = TestApp::new().await;
        let first = app.place_order().await;
        app.place_order().await;
        app.json(
            "PATCH",
            &format!("/stores/1/orders/{first}/status"),
            json!({ "status": "cancelled" }),
        )
        .await;

        let (status, all) = app.get("/stores/1/orders").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all["total"], 2);

        let (_, cancelled) = app.get("/stores/1/orders?status=cancelled").await;
        assert_eq!(cancelled["total"], 1);
        assert_eq!(cancelled["orders"][0]["id"], first);

        let (_, future) = app.get("/stores/1/orders?date_from=2999-01-01").await;
        assert_eq!(future["total"], 0);

        let (status, _) = app.get("/stores/1/orders?date_from=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stats_count_confirmed_revenue() {
        let app = TestApp::new().await;
        let paid = app.place_order().await;
        app.place_order().await;
        app.json(
            "PATCH",
            &format!("/stores/1/orders/{paid}/status"),
            json!({ "status": "paid" }),
        )
        .await;

        let (status, stats) = app.get("/stores/1/orders/stats").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total_orders"], 2);
        assert_eq!(stats["by_status"]["pending"], 1);
        assert_eq!(stats["by_status"]["paid"], 1);
        assert_eq!(stats["total_revenue"], 9000);
    }

    #[tokio::test]
    async fn test_delete_removes_order() {
        let app = TestApp::new().await;
        let id = app.place_order().await;

        let (status, _) = app
            .send(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/stores/1/orders/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(
            app.get(&format!("/stores/1/orders/{id}")).await.0,
            StatusCode::NOT_FOUND
        );
    }
}

mod customer {
    use super::*;

    async fn place_as_customer(app: &TestApp, customer_id: i64) -> i64 {
        let mut body = app.checkout_body();
        body["store_id"] = json!(1);
        body["customer_phone"] = Value::Null;

        let (status, order) = app
            .json("POST", &format!("/customers/{customer_id}/orders"), body)
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["customer_id"], customer_id);
        order["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_customer_sees_only_own_orders() {
        let app = TestApp::new().await;
        let own = place_as_customer(&app, 7).await;
        place_as_customer(&app, 8).await;

        let (status, list) = app.get("/customers/7/orders").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["total"], 1);
        assert_eq!(list["orders"][0]["id"], own);
        assert_eq!(
            app.get(&format!("/customers/8/orders/{own}")).await.0,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_cancel_pending_then_refuse_paid() {
        let app = TestApp::new().await;
        let pending = place_as_customer(&app, 7).await;
        let paid = place_as_customer(&app, 7).await;
        app.json(
            "PATCH",
            &format!("/stores/1/orders/{paid}/status"),
            json!({ "status": "paid" }),
        )
        .await;

        let (status, order) = app
            .json("POST", &format!("/customers/7/orders/{pending}/cancel"), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "cancelled");

        let (status, json) = app
            .json("POST", &format!("/customers/7/orders/{paid}/cancel"), json!({}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["details"]["current"], "paid");
    }
}

mod payment {
    use super::*;

    #[tokio::test]
    async fn test_signed_webhook_settles_once() {
        let app = TestApp::new().await;
        let id = app.place_order().await;
        let event = succeeded_event("pi_test_1", id);

        let (status, ack) = app.deliver_webhook(&event, Some(app.sign(&event))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["received"], true);
        assert_eq!(ack["outcome"], "settled");

        let (status, ack) = app.deliver_webhook(&event, Some(app.sign(&event))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["outcome"], "already_settled");

        assert_eq!(app.catalog.stock_of(app.mug.id).await, Some(9));
        assert_eq!(app.catalog.stock_of(app.tote.id).await, Some(3));

        let (_, payment) = app.get(&format!("/payments/orders/{id}/status")).await;
        assert_eq!(payment["paid"], true);
        assert_eq!(payment["payment_reference"], "pi_test_1");

        let (status, by_ref) = app.get("/payments/references/pi_test_1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_ref["order_id"], id);
    }

    #[tokio::test]
    async fn test_unsigned_or_forged_webhook_is_rejected() {
        let app = TestApp::new().await;
        let id = app.place_order().await;
        let event = succeeded_event("pi_test_1", id);

        let (status, _) = app.deliver_webhook(&event, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let forged = WebhookVerifier::new("whsec_wrong", 300)
            .unwrap()
            .sign(&serde_json::to_vec(&event).unwrap(), chrono::Utc::now().timestamp());
        let (status, _) = app.deliver_webhook(&event, Some(forged)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, order) = app.get(&format!("/stores/1/orders/{id}")).await;
        assert_eq!(order["status"], "pending");
        assert_eq!(app.catalog.stock_of(app.mug.id).await, Some(10));
    }

    #[tokio::test]
    async fn test_webhook_for_missing_order_is_acknowledged() {
        let app = TestApp::new().await;
        let event = succeeded_event("pi_ghost", 4242);

        let (status, ack) = app.deliver_webhook(&event, Some(app.sign(&event))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["outcome"], "order_not_found");
    }

    #[tokio::test]
    async fn test_intent_then_confirm_settles() {
        let app = TestApp::new().await;
        let id = app.place_order().await;

        let (status, intent) = app
            .json("POST", "/payments/intents", json!({ "order_id": id }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(intent["amount_cents"], 9000);
        assert_eq!(intent["currency"], "myr");
        let intent_id = intent["payment_intent_id"].as_str().unwrap().to_string();

        let confirm = json!({ "order_id": id, "payment_intent_id": intent_id });
        let (status, result) = app.json("POST", "/payments/confirm", confirm.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["paid"], false);
        assert_eq!(result["outcome"], "payment_failed");

        app.gateway.succeed_intent(&intent_id).unwrap();
        let (status, result) = app.json("POST", "/payments/confirm", confirm).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["paid"], true);
        assert_eq!(result["outcome"], "settled");

        let (status, _) = app
            .json("POST", "/payments/intents", json!({ "order_id": id }))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_not_found() {
        let app = TestApp::new().await;

        let (status, _) = app.get("/payments/references/pi_missing").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
