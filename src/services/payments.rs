use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::PaymentStatus;
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::services::orders::OrderService;

type HmacSha256 = Hmac<Sha256>;

/// Redirect target returned by the payment provider for a new checkout.
#[derive(Debug, Clone, serde::Serialize, ToSchema)]
pub struct PreferenceHandle {
    pub preference_id: String,
    pub redirect_url: String,
}

/// Boundary to the external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_preference(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<PreferenceHandle, ServiceError>;
}

/// Gateway used in development and tests. Issues locally generated
/// preference ids and redirects straight to the storefront's checkout
/// result page, no network involved.
pub struct SandboxGateway {
    redirect_base: String,
    currency: String,
}

impl SandboxGateway {
    pub fn new(redirect_base: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            redirect_base: redirect_base.into(),
            currency: currency.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_preference(
        &self,
        order: &order::Model,
        _items: &[order_item::Model],
    ) -> Result<PreferenceHandle, ServiceError> {
        let preference_id = format!("sbx-{}", Uuid::new_v4().simple());
        let redirect_url = format!(
            "{}/{}?preference_id={}&amount={}&currency={}",
            self.redirect_base.trim_end_matches('/'),
            order.token,
            preference_id,
            order.total,
            self.currency
        );
        Ok(PreferenceHandle {
            preference_id,
            redirect_url,
        })
    }
}

/// Payload the provider posts back once a payment settles.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentNotification {
    pub order_token: String,
    pub status: String,
    #[serde(default)]
    pub preference_id: Option<String>,
}

#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    orders: OrderService,
    webhook_secret: Option<String>,
    tolerance_secs: u64,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        orders: OrderService,
        webhook_secret: Option<String>,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            gateway,
            orders,
            webhook_secret,
            tolerance_secs,
        }
    }

    /// Registers the order with the payment provider and stores the
    /// returned preference id on the order.
    #[instrument(skip(self, order, items), fields(order_token = %order.token))]
    pub async fn create_preference(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<PreferenceHandle, ServiceError> {
        let handle = self.gateway.create_preference(order, items).await?;
        self.orders
            .set_preference(order.id, handle.preference_id.clone())
            .await?;
        info!(preference_id = %handle.preference_id, "Payment preference created");
        Ok(handle)
    }

    /// Applies a provider notification after verifying its HMAC signature.
    ///
    /// A deployment without a configured webhook secret refuses every
    /// notification rather than accepting unsigned state changes.
    #[instrument(skip_all)]
    pub async fn process_notification(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<order::Model, ServiceError> {
        let secret = self.webhook_secret.as_deref().ok_or_else(|| {
            ServiceError::Unauthorized("Webhook secret not configured".to_string())
        })?;
        let (timestamp, signature) = match (timestamp, signature) {
            (Some(ts), Some(sig)) => (ts, sig),
            _ => {
                warn!("Payment notification missing signature headers");
                return Err(ServiceError::Unauthorized(
                    "Missing signature headers".to_string(),
                ));
            }
        };
        if !verify_signature(timestamp, signature, body, secret, self.tolerance_secs) {
            warn!("Payment notification signature verification failed");
            return Err(ServiceError::Unauthorized(
                "Invalid webhook signature".to_string(),
            ));
        }

        let notification: PaymentNotification = serde_json::from_slice(body).map_err(|e| {
            ServiceError::BadRequest(format!("invalid notification payload: {}", e))
        })?;

        let outcome = match notification.status.as_str() {
            "approved" => PaymentStatus::Approved,
            "rejected" => PaymentStatus::Rejected,
            other => {
                return Err(ServiceError::InvalidInput(format!(
                    "Unsupported payment status '{}'",
                    other
                )))
            }
        };

        let order = self
            .orders
            .mark_payment(&notification.order_token, outcome)
            .await?;
        info!(
            order_token = %order.token,
            status = %notification.status,
            "Payment notification applied"
        );
        Ok(order)
    }
}

/// Checks `signature` against HMAC-SHA256 over `"{timestamp}.{body}"`.
/// The timestamp must parse and sit within the tolerance window, which
/// bounds how long a captured notification can be replayed.
fn verify_signature(
    timestamp: &str,
    signature: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    let ts = match timestamp.parse::<i64>() {
        Ok(ts) => ts,
        Err(_) => return false,
    };
    let now = chrono::Utc::now().timestamp();
    if (now - ts).unsigned_abs() > tolerance_secs {
        return false;
    }
    let signed = format!("{}.{}", timestamp, std::str::from_utf8(payload).unwrap_or(""));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    use super::*;
    use crate::entities::order::OrderStatus;
    use crate::entities::product_variation;
    use crate::events::{Event, EventSender};
    use crate::repositories::Repositories;
    use crate::services::orders::{CheckoutInput, CheckoutItem};
    use crate::services::stock_accounting::StockAccountingService;
    use crate::services::stock_movements::StockMovementService;

    const SECRET: &str = "test-webhook-secret";

    struct Harness {
        payments: PaymentService,
        orders: OrderService,
        repos: Repositories,
        _rx: mpsc::Receiver<Event>,
    }

    fn harness_with_secret(secret: Option<&str>) -> Harness {
        let repos = Repositories::in_memory();
        let (tx, rx) = mpsc::channel(64);
        let event_sender = Arc::new(EventSender::new(tx));
        let movements = StockMovementService::new(repos.movements.clone());
        let accounting = StockAccountingService::new(
            repos.variations.clone(),
            movements,
            event_sender.clone(),
        );
        let orders = OrderService::new(
            repos.orders.clone(),
            repos.products.clone(),
            repos.variations.clone(),
            accounting,
            event_sender,
        );
        let payments = PaymentService::new(
            Arc::new(SandboxGateway::new("http://localhost:5173/checkout", "USD")),
            orders.clone(),
            secret.map(str::to_string),
            300,
        );
        Harness {
            payments,
            orders,
            repos,
            _rx: rx,
        }
    }

    fn harness() -> Harness {
        harness_with_secret(Some(SECRET))
    }

    async fn place_order(h: &Harness) -> crate::services::orders::PlacedOrder {
        let now = Utc::now();
        let variation = h
            .repos
            .variations
            .insert(product_variation::Model {
                id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                sku: format!("SKU-{}", Uuid::new_v4()),
                name: "Classic".to_string(),
                price: dec!(9.9900),
                stock: 10,
                min_stock: 1,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        h.orders
            .create_order(CheckoutInput {
                customer_name: "Ada".to_string(),
                customer_email: "ada@example.com".to_string(),
                payment_method: "card".to_string(),
                items: vec![CheckoutItem {
                    variation_id: Some(variation.id),
                    quantity: 1,
                }],
            })
            .await
            .unwrap()
    }

    fn sign(secret: &str, timestamp: i64, body: &str) -> String {
        let signed = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[tokio::test]
    async fn valid_notification_marks_the_order_paid() {
        let h = harness();
        let placed = place_order(&h).await;

        let body = serde_json::json!({
            "order_token": placed.order.token,
            "status": "approved",
        })
        .to_string();
        let ts = Utc::now().timestamp();
        let sig = sign(SECRET, ts, &body);

        let order = h
            .payments
            .process_notification(Some(&ts.to_string()), Some(&sig), body.as_bytes())
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.payment_status, PaymentStatus::Approved);
    }

    #[tokio::test]
    async fn tampered_body_is_unauthorized() {
        let h = harness();
        let placed = place_order(&h).await;

        let body = serde_json::json!({
            "order_token": placed.order.token,
            "status": "approved",
        })
        .to_string();
        let ts = Utc::now().timestamp();
        let sig = sign(SECRET, ts, &body);
        let tampered = body.replace("approved", "rejected");

        let err = h
            .payments
            .process_notification(Some(&ts.to_string()), Some(&sig), tampered.as_bytes())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Unauthorized(_));

        let current = h.orders.get_order(&placed.order.token).await.unwrap();
        assert_eq!(current.order.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn stale_timestamp_is_unauthorized() {
        let h = harness();
        let placed = place_order(&h).await;

        let body = serde_json::json!({
            "order_token": placed.order.token,
            "status": "approved",
        })
        .to_string();
        let ts = Utc::now().timestamp() - 3600;
        let sig = sign(SECRET, ts, &body);

        let err = h
            .payments
            .process_notification(Some(&ts.to_string()), Some(&sig), body.as_bytes())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Unauthorized(_));
    }

    #[tokio::test]
    async fn missing_secret_refuses_every_notification() {
        let h = harness_with_secret(None);
        let err = h
            .payments
            .process_notification(Some("0"), Some("sig"), b"{}")
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Unauthorized(msg) => {
            assert!(msg.contains("not configured"));
        });
    }

    #[tokio::test]
    async fn unsupported_status_is_rejected_after_verification() {
        let h = harness();
        let placed = place_order(&h).await;

        let body = serde_json::json!({
            "order_token": placed.order.token,
            "status": "refunded",
        })
        .to_string();
        let ts = Utc::now().timestamp();
        let sig = sign(SECRET, ts, &body);

        let err = h
            .payments
            .process_notification(Some(&ts.to_string()), Some(&sig), body.as_bytes())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(_));
    }

    #[tokio::test]
    async fn create_preference_stores_the_id_on_the_order() {
        let h = harness();
        let placed = place_order(&h).await;

        let handle = h
            .payments
            .create_preference(&placed.order, &placed.items)
            .await
            .unwrap();
        assert!(handle.preference_id.starts_with("sbx-"));
        assert!(handle.redirect_url.contains(&placed.order.token));

        let stored = h
            .repos
            .orders
            .find_by_token(&placed.order.token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.preference_id, Some(handle.preference_id));
    }

    #[test]
    fn non_numeric_timestamp_never_verifies() {
        let sig = sign(SECRET, 0, "{}");
        assert!(!verify_signature("yesterday", &sig, b"{}", SECRET, u64::MAX));
    }
}
