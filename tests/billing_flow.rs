//! Payments against a real Postgres and a local stand-in for the Stripe API:
//! checkout, signed webhooks, refunds and subscription lifecycle.
//!
//! Needs `DATABASE_URL`; the test is skipped when it is not set.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use market_platform::infra::payments::stripe::signature_header;
use market_platform::{create_router, AppState, Config, DatabaseService};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::env;
use std::sync::{Arc, Mutex};

const WEBHOOK_SECRET: &str = "whsec_billing_flow";

/// Requests the fake Stripe API received, as `"<path> <form body>"`.
type Calls = Arc<Mutex<Vec<String>>>;

async fn fake_session(State(calls): State<Calls>, body: String) -> Json<Value> {
    calls.lock().unwrap().push(format!("/checkout/sessions {body}"));
    Json(json!({ "id": "cs_test_billing", "url": "https://checkout.stripe.test/pay/cs_test_billing" }))
}

async fn fake_subscription_update(
    State(calls): State<Calls>,
    Path(id): Path<String>,
    body: String,
) -> Json<Value> {
    calls.lock().unwrap().push(format!("/subscriptions/{id} {body}"));
    Json(json!({ "id": id, "object": "subscription", "cancel_at_period_end": body.contains("cancel_at_period_end=true") }))
}

async fn spawn_fake_stripe(calls: Calls) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
    let router = Router::new()
        .route("/checkout/sessions", post(fake_session))
        .route("/subscriptions/:id", post(fake_subscription_update))
        .with_state(calls);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    base
}

struct TestApp {
    base: String,
    client: Client,
    _storage: tempfile::TempDir,
}

impl TestApp {
    async fn send(&self, req: reqwest::RequestBuilder, token: Option<&str>) -> (StatusCode, Value) {
        let req = match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let resp = req.send().await.unwrap();
        (resp.status(), resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(self.client.post(format!("{}{path}", self.base)).json(&body), token)
            .await
    }

    async fn patch(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.patch(format!("{}{path}", self.base)).json(&body), Some(token))
            .await
    }

    async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.send(self.client.get(format!("{}{path}", self.base)), Some(token))
            .await
    }

    async fn register(&self, email: &str) -> (i64, String) {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({"email": email, "password": "correct horse battery", "display_name": "Billing"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["data"]["user"]["id"].as_i64().unwrap(),
            body["data"]["token"].as_str().unwrap().to_string(),
        )
    }

    /// Delivers a Stripe event signed the way Stripe signs it.
    async fn stripe_event(&self, event: &Value) -> (StatusCode, Value) {
        let body = serde_json::to_vec(event).unwrap();
        let signature = signature_header(WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &body);
        let resp = self
            .client
            .post(format!("{}/api/webhooks/stripe", self.base))
            .header("content-type", "application/json")
            .header("stripe-signature", signature)
            .body(body)
            .send()
            .await
            .unwrap();
        (resp.status(), resp.json().await.unwrap())
    }
}

async fn spawn_app(
    database_url: &str,
    admin_email: &str,
    stripe_base: &str,
) -> Result<TestApp, Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://127.0.0.1:{}", listener.local_addr()?.port());
    let storage = tempfile::tempdir()?;
    let storage_dir = storage.path().display().to_string();

    let vars = [
        ("DATABASE_URL", database_url),
        ("JWT_SECRET", "billing-jwt-secret"),
        ("LICENSE_SECRET", "billing-license-secret"),
        ("STORAGE_DIR", storage_dir.as_str()),
        ("PUBLIC_BASE_URL", base.as_str()),
        ("BOOTSTRAP_ADMIN_EMAIL", admin_email),
        ("STRIPE_SECRET_KEY", "sk_test_billing"),
        ("STRIPE_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("STRIPE_API_BASE", stripe_base),
    ];
    let config = Config::from_lookup(|key| {
        vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    })?;

    let db_service = DatabaseService::new(&config).await?;
    let state = AppState::new(config, db_service)?;
    state.storage.ensure_layout().await?;
    let router = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Ok(TestApp {
        base,
        client: Client::new(),
        _storage: storage,
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_billing_flow() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let Ok(database_url) = env::var("DATABASE_URL") else {
        println!("DATABASE_URL not set; skipping billing flow");
        return Ok(());
    };

    let run = uuid::Uuid::new_v4().simple().to_string();
    let admin_email = format!("billing-admin-{run}@example.com");
    let calls: Calls = Arc::default();
    let stripe_base = spawn_fake_stripe(calls.clone()).await;
    let app = spawn_app(&database_url, &admin_email, &stripe_base).await?;

    let (_, admin) = app.register(&admin_email).await;
    let (seller_id, seller) = app.register(&format!("billing-seller-{run}@example.com")).await;
    let (buyer_id, buyer) = app.register(&format!("billing-buyer-{run}@example.com")).await;
    let (status, _) = app
        .patch(&format!("/api/admin/users/{seller_id}/role"), &admin, json!({"role": "seller"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, product) = app
        .post(
            "/api/products",
            Some(&seller),
            json!({"title": "Billing Plugin", "price_cents": 2500, "currency": "USD"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{product}");
    let product_id = product["data"]["id"].as_i64().unwrap();
    let (status, _) = app
        .patch(&format!("/api/products/{product_id}"), &seller, json!({"status": "published"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    println!("--- checkout and payment webhook ---");
    let (status, order) = app
        .post("/api/orders", Some(&buyer), json!({"product_id": product_id}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    let order_id = order["data"]["id"].as_i64().unwrap();

    let (status, checkout) = app
        .post(&format!("/api/orders/{order_id}/checkout"), Some(&buyer), json!({"provider": "stripe"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{checkout}");
    assert_eq!(
        checkout["data"]["checkout_url"],
        "https://checkout.stripe.test/pay/cs_test_billing"
    );
    assert!(calls
        .lock()
        .unwrap()
        .iter()
        .any(|c| c.starts_with("/checkout/sessions") && c.contains(&order_id.to_string())));

    let paid = json!({
        "id": format!("evt_paid_{run}"),
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test_billing",
            "mode": "payment",
            "payment_status": "paid",
            "metadata": { "order_id": order_id.to_string() }
        }}
    });
    let (status, ack) = app.stripe_event(&paid).await;
    assert_eq!(status, StatusCode::OK, "{ack}");
    assert_eq!(ack["data"]["duplicate"], false);

    let (_, order) = app.get(&format!("/api/orders/{order_id}"), &buyer).await;
    assert_eq!(order["data"]["status"], "paid");
    let (_, licenses) = app.get("/api/licenses", &buyer).await;
    let owned: Vec<&Value> = licenses["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|l| l["product_id"].as_i64() == Some(product_id))
        .collect();
    assert_eq!(owned.len(), 1, "{licenses}");
    assert_eq!(owned[0]["status"], "active");

    let (status, ack) = app.stripe_event(&paid).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["data"]["duplicate"], true, "redelivery is acknowledged without effect");
    let (_, licenses) = app.get("/api/licenses", &buyer).await;
    assert_eq!(licenses["data"].as_array().unwrap().len(), 1);

    let forged = app
        .client
        .post(format!("{}/api/webhooks/stripe", app.base))
        .header("stripe-signature", signature_header("whsec_wrong", chrono::Utc::now().timestamp(), b"{}"))
        .body("{}")
        .send()
        .await?;
    assert_eq!(forged.status(), StatusCode::BAD_REQUEST);

    println!("--- refund ---");
    let (status, _) = app
        .post(&format!("/api/admin/orders/{order_id}/refund"), Some(&buyer), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, refunded) = app
        .post(&format!("/api/admin/orders/{order_id}/refund"), Some(&admin), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{refunded}");
    assert_eq!(refunded["data"]["status"], "refunded");
    let (_, licenses) = app.get("/api/licenses", &buyer).await;
    assert_eq!(licenses["data"][0]["status"], "revoked");
    let (status, _) = app
        .post(&format!("/api/admin/orders/{order_id}/refund"), Some(&admin), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    println!("--- subscription lifecycle ---");
    let provider_ref = format!("sub_{run}");
    let period_end = chrono::Utc::now().timestamp() + 30 * 86_400;
    let created = json!({
        "id": format!("evt_sub_{run}"),
        "type": "customer.subscription.created",
        "data": { "object": {
            "id": provider_ref,
            "status": "active",
            "current_period_end": period_end,
            "cancel_at_period_end": false,
            "metadata": { "user_id": buyer_id.to_string(), "plan": "pro" }
        }}
    });
    let (status, ack) = app.stripe_event(&created).await;
    assert_eq!(status, StatusCode::OK, "{ack}");

    let (_, overview) = app.get("/api/subscriptions/me", &buyer).await;
    assert_eq!(overview["data"]["entitled"], true, "{overview}");
    assert_eq!(overview["data"]["subscription"]["plan"], "pro");
    let subscription_id = overview["data"]["subscription"]["id"].as_i64().unwrap();

    let (status, _) = app
        .post(&format!("/api/subscriptions/{subscription_id}/cancel"), Some(&seller), json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "only the subscriber can cancel");

    let (status, canceled) = app
        .post(&format!("/api/subscriptions/{subscription_id}/cancel"), Some(&buyer), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{canceled}");
    assert_eq!(canceled["data"]["cancel_at_period_end"], true);
    assert!(
        calls
            .lock()
            .unwrap()
            .iter()
            .any(|c| c == &format!("/subscriptions/{provider_ref} cancel_at_period_end=true")),
        "cancellation reaches Stripe"
    );
    let (_, overview) = app.get("/api/subscriptions/me", &buyer).await;
    assert_eq!(overview["data"]["entitled"], true, "access runs to the end of the period");

    let failed = json!({
        "id": format!("evt_invoice_{run}"),
        "type": "invoice.payment_failed",
        "data": { "object": { "id": format!("in_{run}"), "subscription": provider_ref } }
    });
    let (status, _) = app.stripe_event(&failed).await;
    assert_eq!(status, StatusCode::OK);
    let (_, overview) = app.get("/api/subscriptions/me", &buyer).await;
    assert_eq!(overview["data"]["subscription"]["status"], "past_due");
    assert_eq!(overview["data"]["entitled"], true, "past due keeps a grace period");

    let deleted = json!({
        "id": format!("evt_sub_deleted_{run}"),
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": provider_ref, "status": "canceled", "current_period_end": period_end } }
    });
    let (status, _) = app.stripe_event(&deleted).await;
    assert_eq!(status, StatusCode::OK);
    let (_, overview) = app.get("/api/subscriptions/me", &buyer).await;
    assert_eq!(overview["data"]["subscription"]["status"], "canceled");
    assert_eq!(overview["data"]["entitled"], false);
    let (status, _) = app
        .post(&format!("/api/subscriptions/{subscription_id}/cancel"), Some(&buyer), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}
