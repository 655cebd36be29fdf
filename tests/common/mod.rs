use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    middleware,
    response::Response,
    Router,
};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::Value;
use sha2::Sha256;
use storefront_api::{
    config::AppConfig,
    entities::product_variation,
    events::{self, EventSender},
    middleware_helpers::request_id::request_id_middleware,
    repositories::Repositories,
    services::catalog::{CreateCategoryInput, CreateProductInput, CreateVariationInput},
    services::factory::AppServices,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Webhook secret wired into every test app.
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

type HmacSha256 = Hmac<Sha256>;

/// Helper harness spinning up the full router on in-memory repositories.
/// No database or external service is required.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        cfg.payment_webhook_tolerance_secs = Some(300);

        let repos = Repositories::in_memory();
        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::build(repos, event_sender.clone(), &cfg);
        let state = AppState::new(Arc::new(cfg), None, event_sender, services);

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Send a JSON request against the router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request_with_headers(method, uri, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Raw-body POST for webhook tests, where the signature covers the exact
    /// bytes sent.
    #[allow(dead_code)]
    pub async fn post_raw(&self, uri: &str, payload: Vec<u8>, headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(payload))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Seed a category, a product, and one variation with the given opening
    /// stock, going through the catalog service so the opening quantity is
    /// ledgered like production data.
    #[allow(dead_code)]
    pub async fn seed_variation(
        &self,
        sku: &str,
        price: Decimal,
        stock: i32,
        min_stock: i32,
    ) -> product_variation::Model {
        let catalog = &self.state.services.catalog;
        let category = catalog
            .create_category(CreateCategoryInput {
                name: format!("Category {}", sku),
                slug: None,
                description: None,
                sort_order: None,
            })
            .await
            .expect("seed category");
        let product = catalog
            .create_product(CreateProductInput {
                category_id: category.id,
                name: format!("Product {}", sku),
                slug: None,
                description: None,
            })
            .await
            .expect("seed product");
        catalog
            .create_variation(CreateVariationInput {
                product_id: product.id,
                sku: sku.to_string(),
                name: format!("Variation {}", sku),
                price,
                opening_stock: Some(stock),
                min_stock: Some(min_stock),
            })
            .await
            .expect("seed variation")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Decode a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Sign a webhook body the way the gateway does: hex HMAC-SHA256 over
/// `"{timestamp}.{body}"`.
#[allow(dead_code)]
pub fn sign_webhook(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}
