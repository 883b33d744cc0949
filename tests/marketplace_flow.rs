//! End-to-end flow against a real Postgres: accounts, upload review, product
//! publication, licensing, signed downloads and the forum.
//!
//! Needs `DATABASE_URL`; the test is skipped when it is not set.

use market_platform::{create_router, AppState, Config, DatabaseService};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::env;

struct TestApp {
    base: String,
    client: Client,
    _storage: tempfile::TempDir,
}

impl TestApp {
    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self.client.post(format!("{}{path}", self.base)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.unwrap();
        (resp.status(), resp.json().await.unwrap())
    }

    async fn patch(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .patch(format!("{}{path}", self.base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status(), resp.json().await.unwrap())
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = self.client.get(format!("{}{path}", self.base));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.unwrap();
        (resp.status(), resp.json().await.unwrap())
    }

    /// Registers an account and returns `(user_id, token)`.
    async fn register(&self, email: &str) -> (i64, String) {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({"email": email, "password": "correct horse battery", "display_name": "Tester"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["data"]["user"]["id"].as_i64().unwrap(),
            body["data"]["token"].as_str().unwrap().to_string(),
        )
    }

    async fn login(&self, email: &str) -> String {
        let (status, body) = self
            .post(
                "/api/auth/login",
                None,
                json!({"email": email, "password": "correct horse battery"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }
}

async fn spawn_app(database_url: &str, admin_email: &str) -> Result<TestApp, Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://127.0.0.1:{}", listener.local_addr()?.port());
    let storage = tempfile::tempdir()?;
    let storage_dir = storage.path().display().to_string();

    let vars = [
        ("DATABASE_URL", database_url),
        ("JWT_SECRET", "flow-jwt-secret"),
        ("LICENSE_SECRET", "flow-license-secret"),
        ("STORAGE_DIR", storage_dir.as_str()),
        ("PUBLIC_BASE_URL", base.as_str()),
        ("BOOTSTRAP_ADMIN_EMAIL", admin_email),
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
async fn test_marketplace_flow() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let Ok(database_url) = env::var("DATABASE_URL") else {
        println!("DATABASE_URL not set; skipping marketplace flow");
        return Ok(());
    };

    let run = uuid::Uuid::new_v4().simple().to_string();
    let admin_email = format!("admin-{run}@example.com");
    let seller_email = format!("seller-{run}@example.com");
    let app = spawn_app(&database_url, &admin_email).await?;

    println!("--- accounts ---");
    let (_, admin) = app.register(&admin_email).await;
    let (seller_id, seller) = app.register(&seller_email).await;
    let (buyer_id, buyer) = app.register(&format!("buyer-{run}@example.com")).await;

    let (status, me) = app.get("/api/auth/me", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["role"], "admin");

    let (status, _) = app
        .post(
            "/api/auth/register",
            None,
            json!({"email": seller_email, "password": "another password", "display_name": "Dup"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post("/api/products", Some(&seller), json!({"title": "Plugin", "price_cents": 900, "currency": "USD"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .patch(&format!("/api/admin/users/{seller_id}/role"), &admin, json!({"role": "seller"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    // The stored role is authoritative, so the existing token picks it up.
    let (_, me) = app.get("/api/auth/me", Some(&seller)).await;
    assert_eq!(me["data"]["role"], "seller");

    println!("--- role and ban enforcement ---");
    for path in ["/api/admin/users", "/api/moderation/queue"] {
        let (status, _) = app.get(path, Some(&buyer)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{path}");
    }

    let moderator_email = format!("moderator-{run}@example.com");
    let (moderator_id, moderator) = app.register(&moderator_email).await;
    let (status, body) = app
        .patch(&format!("/api/admin/users/{moderator_id}/role"), &admin, json!({"role": "moderator"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, _) = app.get("/api/moderation/queue", Some(&moderator)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(&format!("/api/admin/users/{moderator_id}/ban"), Some(&admin), json!({"reason": "spam"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, denied) = app.get("/api/moderation/queue", Some(&moderator)).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "banned accounts lose access mid-session");
    assert_eq!(denied["error"], "account is banned");
    let (status, _) = app.get("/api/auth/me", Some(&moderator)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(&format!("/api/admin/users/{moderator_id}/unban"), Some(&admin), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .patch(&format!("/api/admin/users/{moderator_id}/role"), &admin, json!({"role": "user"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/moderation/queue", Some(&moderator)).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "a demotion applies to tokens already issued");
    let fresh = app.login(&moderator_email).await;
    let (_, me) = app.get("/api/auth/me", Some(&fresh)).await;
    assert_eq!(me["data"]["role"], "user");

    println!("--- upload review ---");
    let payload = b"PK\x03\x04 plugin archive".to_vec();
    let resp = app
        .client
        .put(format!("{}/api/uploads?filename=plugin.zip", app.base))
        .bearer_auth(&seller)
        .header("content-type", "application/zip")
        .body(payload.clone())
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let upload: Value = resp.json().await?;
    let upload_id = upload["data"]["id"].as_i64().unwrap();
    assert_eq!(upload["data"]["status"], "quarantined");

    let (status, product) = app
        .post(
            "/api/products",
            Some(&seller),
            json!({"title": "Fancy Plugin", "description": "Does things", "price_cents": 1999, "currency": "USD"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{product}");
    let product_id = product["data"]["id"].as_i64().unwrap();
    assert_eq!(product["data"]["status"], "draft");

    let (status, _) = app
        .patch(&format!("/api/products/{product_id}"), &seller, json!({"upload_id": upload_id}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "quarantined uploads cannot be attached");

    let (status, _) = app
        .post(&format!("/api/uploads/{upload_id}/approve"), Some(&buyer), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, reviewed) = app
        .post(&format!("/api/uploads/{upload_id}/approve"), Some(&admin), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{reviewed}");
    assert_eq!(reviewed["data"]["status"], "approved");
    let (status, _) = app
        .post(&format!("/api/uploads/{upload_id}/reject"), Some(&admin), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, published) = app
        .patch(
            &format!("/api/products/{product_id}"),
            &seller,
            json!({"upload_id": upload_id, "status": "published"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{published}");
    assert_eq!(published["data"]["status"], "published");

    let (status, listing) = app.get("/api/products?q=fancy", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listing["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p["id"].as_i64() == Some(product_id)));

    println!("--- orders and licenses ---");
    let (status, order) = app
        .post("/api/orders", Some(&buyer), json!({"product_id": product_id}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["data"]["status"], "pending");
    assert_eq!(order["data"]["amount_cents"], 1999);
    let order_id = order["data"]["id"].as_i64().unwrap();

    let (status, _) = app
        .post("/api/orders", Some(&seller), json!({"product_id": product_id}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "sellers cannot buy their own product");

    let (status, _) = app.get(&format!("/api/orders/{order_id}"), Some(&seller)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post(&format!("/api/orders/{order_id}/checkout"), Some(&buyer), json!({"provider": "stripe"}))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    // Binance Pay settles in USDT, so only dollar prices can go through it.
    let (status, _) = app
        .patch(&format!("/api/products/{product_id}"), &seller, json!({"currency": "EUR"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, euro_order) = app
        .post("/api/orders", Some(&buyer), json!({"product_id": product_id}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{euro_order}");
    assert_eq!(euro_order["data"]["currency"], "EUR");
    let euro_order_id = euro_order["data"]["id"].as_i64().unwrap();
    let (status, refused) = app
        .post(
            &format!("/api/orders/{euro_order_id}/checkout"),
            Some(&buyer),
            json!({"provider": "binance"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{refused}");
    let (status, _) = app
        .patch(&format!("/api/products/{product_id}"), &seller, json!({"currency": "USD"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, issued) = app
        .post(
            "/api/admin/licenses",
            Some(&admin),
            json!({"user_id": buyer_id, "product_id": product_id}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{issued}");
    let key = issued["data"]["key"].as_str().unwrap().to_string();
    let license_id = issued["data"]["license"]["id"].as_i64().unwrap();

    let (status, outcome) = app
        .post("/api/licenses/validate", None, json!({"key": key, "product_id": product_id}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["data"]["valid"], true, "{outcome}");

    let (_, outcome) = app
        .post("/api/licenses/validate", None, json!({"key": key, "product_id": product_id + 1}))
        .await;
    assert_eq!(outcome["data"]["valid"], false);

    let (status, link) = app
        .get(&format!("/api/licenses/{license_id}/download"), Some(&buyer))
        .await;
    assert_eq!(status, StatusCode::OK, "{link}");
    let url = link["data"]["url"].as_str().unwrap();
    let file = app.client.get(url).send().await?;
    assert_eq!(file.status(), StatusCode::OK);
    assert_eq!(file.bytes().await?.as_ref(), payload.as_slice());

    let (status, _) = app
        .get(&format!("/api/licenses/{license_id}/download"), Some(&seller))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, regenerated) = app
        .post(&format!("/api/licenses/{license_id}/regenerate"), Some(&buyer), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{regenerated}");
    let new_key = regenerated["data"]["key"].as_str().unwrap().to_string();
    assert_ne!(new_key, key);
    let (_, outcome) = app
        .post("/api/licenses/validate", None, json!({"key": key}))
        .await;
    assert_eq!(outcome["data"]["valid"], false, "old key stops working");

    let (status, _) = app
        .post(&format!("/api/admin/licenses/{license_id}/revoke"), Some(&admin), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, outcome) = app
        .post("/api/licenses/validate", None, json!({"key": new_key}))
        .await;
    assert_eq!(outcome["data"]["valid"], false);

    println!("--- forum ---");
    let (status, topic) = app
        .post(
            "/api/forum/topics",
            Some(&buyer),
            json!({"title": "How do I install it?", "body": "Unzip and then what?"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{topic}");
    // No classifier configured: content is approved on creation.
    assert_eq!(topic["data"]["status"], "approved");
    let topic_id = topic["data"]["id"].as_i64().unwrap();

    let (status, comment) = app
        .post(
            &format!("/api/forum/topics/{topic_id}/comments"),
            Some(&seller),
            json!({"body": "Drop it into the plugins folder."}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{comment}");

    for _ in 0..2 {
        let (status, liked) = app
            .post(&format!("/api/forum/topics/{topic_id}/like"), Some(&seller), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(liked["data"]["like_count"], 1, "liking twice counts once");
    }

    let (status, view) = app.get(&format!("/api/forum/topics/{topic_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["data"]["comments"].as_array().unwrap().len(), 1);
    assert_eq!(view["data"]["topic"]["comment_count"], 1);

    let (status, _) = app
        .post(&format!("/api/forum/topics/{topic_id}/lock"), Some(&admin), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .post(
            &format!("/api/forum/topics/{topic_id}/comments"),
            Some(&buyer),
            json!({"body": "Thanks!"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, logs) = app
        .get(&format!("/api/moderation/logs?target_type=topic&target_id={topic_id}"), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!logs["data"].as_array().unwrap().is_empty());

    println!("--- analytics ---");
    let (status, overview) = app.get("/api/admin/analytics/overview", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK, "{overview}");
    let (status, signups) = app.get("/api/admin/analytics/signups?days=7", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(signups["data"].as_array().unwrap().len(), 7);

    Ok(())
}
