use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::order::{OrderStatus, PaymentStatus};
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{OrderRepository, ProductRepository, VariationRepository};
use crate::services::stock_accounting::StockAccountingService;

/// Order intake and payment state transitions.
///
/// Checkout is the only writer of orders. It prices every line item from
/// the catalog (client-sent prices are ignored), persists the order with
/// its items in one transaction, and hands the items to stock accounting
/// exactly once. An order that fails accounting stays on record as
/// `rejected` together with whatever ledger entries were already written,
/// so a half-discounted order is never silently forgotten.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    products: Arc<dyn ProductRepository>,
    variations: Arc<dyn VariationRepository>,
    accounting: StockAccountingService,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CheckoutInput {
    #[validate(length(min = 1, max = 120))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(min = 1, max = 40))]
    pub payment_method: String,
    #[validate(length(min = 1))]
    pub items: Vec<CheckoutItem>,
}

/// One checkout line. The variation reference is optional in the payload
/// shape; stock accounting is the single place that rejects its absence.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutItem {
    pub variation_id: Option<Uuid>,
    pub quantity: i32,
}

/// A persisted order together with its priced line items.
#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

fn generate_order_token() -> String {
    format!("ord-{}", Uuid::new_v4().simple())
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductRepository>,
        variations: Arc<dyn VariationRepository>,
        accounting: StockAccountingService,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            orders,
            products,
            variations,
            accounting,
            event_sender,
        }
    }

    /// Places an order: price, persist, discount stock, confirm.
    ///
    /// Line items referencing a variation are priced from the catalog at
    /// the current price. Items without a reference are stored at zero
    /// price with placeholder names; accounting rejects them and the order
    /// is kept as `rejected`. On any accounting failure the movements
    /// already recorded stand, the order flips to `rejected`, and the
    /// error propagates to the caller.
    #[instrument(skip(self, input), fields(items = input.items.len()))]
    pub async fn create_order(&self, input: CheckoutInput) -> Result<PlacedOrder, ServiceError> {
        input.validate()?;

        let order_id = Uuid::new_v4();
        let mut items = Vec::with_capacity(input.items.len());
        let mut total = Decimal::ZERO;

        for line in &input.items {
            if line.quantity < 1 {
                return Err(ServiceError::InvalidInput(
                    "Item quantity must be at least 1".to_string(),
                ));
            }

            let (product_name, variation_name, unit_price) = match line.variation_id {
                Some(variation_id) => {
                    let variation = self
                        .variations
                        .find_by_id(variation_id)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Variation {} not found",
                                variation_id
                            ))
                        })?;
                    if !variation.is_active {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Variation {} is not available",
                            variation.sku
                        )));
                    }
                    let product_name = self
                        .products
                        .find_by_id(variation.product_id)
                        .await?
                        .map(|p| p.name)
                        .unwrap_or_default();
                    (product_name, variation.name, variation.price)
                }
                None => ("unknown".to_string(), "unknown".to_string(), Decimal::ZERO),
            };

            let line_total = unit_price * Decimal::from(line.quantity);
            total += line_total;
            items.push(order_item::Model {
                id: Uuid::new_v4(),
                order_id,
                variation_id: line.variation_id,
                product_name,
                variation_name,
                quantity: line.quantity,
                unit_price,
                total: line_total,
            });
        }

        let now = Utc::now();
        let order = order::Model {
            id: order_id,
            token: generate_order_token(),
            customer_name: input.customer_name,
            customer_email: input.customer_email,
            payment_method: input.payment_method,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            preference_id: None,
            total,
            created_at: now,
            updated_at: now,
        };

        let (order, items) = self.orders.insert_with_items(order, items).await?;

        if let Err(err) = self.accounting.discount_from_order(&order, &items).await {
            let reason = err.to_string();
            if let Err(update_err) = self
                .orders
                .update_status(order.id, OrderStatus::Rejected)
                .await
            {
                error!(
                    order_token = %order.token,
                    error = %update_err,
                    "Failed to mark order rejected after accounting failure"
                );
            }
            self.event_sender
                .send_or_log(Event::OrderRejected {
                    order_id: order.id,
                    reason,
                })
                .await;
            return Err(err);
        }

        let order = self
            .orders
            .update_status(order.id, OrderStatus::Confirmed)
            .await?;
        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;
        info!(order_token = %order.token, total = %order.total, "Order placed");

        Ok(PlacedOrder { order, items })
    }

    pub async fn get_order(&self, token: &str) -> Result<PlacedOrder, ServiceError> {
        let order = self
            .orders
            .find_by_token(token)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", token)))?;
        let items = self.orders.items_for_order(order.id).await?;
        Ok(PlacedOrder { order, items })
    }

    pub async fn get_order_by_id(&self, id: Uuid) -> Result<PlacedOrder, ServiceError> {
        let order = self
            .orders
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;
        let items = self.orders.items_for_order(order.id).await?;
        Ok(PlacedOrder { order, items })
    }

    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        self.orders.list(page, per_page).await
    }

    pub(crate) async fn set_preference(
        &self,
        order_id: Uuid,
        preference_id: String,
    ) -> Result<(), ServiceError> {
        self.orders.set_preference(order_id, preference_id).await
    }

    /// Applies a verified payment outcome to the order.
    ///
    /// Idempotent: replaying the outcome the order already carries returns
    /// it unchanged. A payment resolved once (approved or rejected) cannot
    /// be resolved again to something else.
    #[instrument(skip(self))]
    pub async fn mark_payment(
        &self,
        token: &str,
        outcome: PaymentStatus,
    ) -> Result<order::Model, ServiceError> {
        let order = self
            .orders
            .find_by_token(token)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", token)))?;

        if order.payment_status == outcome {
            return Ok(order);
        }
        if order.payment_status != PaymentStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment already resolved for order {}",
                token
            )));
        }

        match outcome {
            PaymentStatus::Pending => Err(ServiceError::InvalidOperation(
                "Payment status cannot move back to pending".to_string(),
            )),
            PaymentStatus::Approved => {
                if order.status == OrderStatus::Rejected {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Order {} was rejected and cannot be paid",
                        token
                    )));
                }
                let updated = self
                    .orders
                    .update_payment(token, PaymentStatus::Approved, OrderStatus::Paid)
                    .await?;
                self.event_sender
                    .send_or_log(Event::OrderPaid(updated.id))
                    .await;
                info!(order_token = %token, "Order paid");
                Ok(updated)
            }
            PaymentStatus::Rejected => {
                let updated = self
                    .orders
                    .update_payment(token, PaymentStatus::Rejected, OrderStatus::Rejected)
                    .await?;
                self.event_sender
                    .send_or_log(Event::PaymentRejected {
                        order_id: updated.id,
                    })
                    .await;
                info!(order_token = %token, "Payment rejected");
                Ok(updated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    use super::*;
    use crate::entities::product_variation;
    use crate::repositories::Repositories;
    use crate::services::stock_movements::StockMovementService;

    struct Harness {
        service: OrderService,
        repos: Repositories,
        _rx: mpsc::Receiver<Event>,
    }

    fn harness() -> Harness {
        let repos = Repositories::in_memory();
        let (tx, rx) = mpsc::channel(64);
        let event_sender = Arc::new(EventSender::new(tx));
        let movements = StockMovementService::new(repos.movements.clone());
        let accounting = StockAccountingService::new(
            repos.variations.clone(),
            movements,
            event_sender.clone(),
        );
        let service = OrderService::new(
            repos.orders.clone(),
            repos.products.clone(),
            repos.variations.clone(),
            accounting,
            event_sender,
        );
        Harness {
            service,
            repos,
            _rx: rx,
        }
    }

    async fn seed_variation(repos: &Repositories, stock: i32) -> product_variation::Model {
        let now = Utc::now();
        repos
            .variations
            .insert(product_variation::Model {
                id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                sku: format!("SKU-{}", Uuid::new_v4()),
                name: "Large".to_string(),
                price: dec!(12.5000),
                stock,
                min_stock: 1,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    fn checkout(items: Vec<CheckoutItem>) -> CheckoutInput {
        CheckoutInput {
            customer_name: "Ada".to_string(),
            customer_email: "ada@example.com".to_string(),
            payment_method: "card".to_string(),
            items,
        }
    }

    #[tokio::test]
    async fn checkout_prices_discounts_and_confirms() {
        let h = harness();
        let variation = seed_variation(&h.repos, 10).await;

        let placed = h
            .service
            .create_order(checkout(vec![CheckoutItem {
                variation_id: Some(variation.id),
                quantity: 2,
            }]))
            .await
            .unwrap();

        assert_eq!(placed.order.status, OrderStatus::Confirmed);
        assert_eq!(placed.order.payment_status, PaymentStatus::Pending);
        assert_eq!(placed.order.total, dec!(25.0000));
        assert_eq!(placed.items.len(), 1);
        assert_eq!(placed.items[0].unit_price, dec!(12.5000));

        let current = h
            .repos
            .variations
            .find_by_id(variation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.stock, 8);

        let ledger = h
            .repos
            .movements
            .list_for_order(&placed.order.token)
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].previous_stock, 10);
        assert_eq!(ledger[0].new_stock, 8);
    }

    #[tokio::test]
    async fn unknown_variation_fails_before_anything_is_written() {
        let h = harness();
        let err = h
            .service
            .create_order(checkout(vec![CheckoutItem {
                variation_id: Some(Uuid::new_v4()),
                quantity: 1,
            }]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::NotFound(_));

        let (orders, total) = h.repos.orders.list(1, 10).await.unwrap();
        assert!(orders.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn insufficient_stock_keeps_a_rejected_order_on_record() {
        let h = harness();
        let variation = seed_variation(&h.repos, 5).await;

        let err = h
            .service
            .create_order(checkout(vec![CheckoutItem {
                variation_id: Some(variation.id),
                quantity: 30,
            }]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InsufficientStock(_));

        let (orders, _) = h.repos.orders.list(1, 10).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Rejected);

        let current = h
            .repos
            .variations
            .find_by_id(variation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.stock, 5);
    }

    #[tokio::test]
    async fn missing_variation_reference_is_rejected_by_accounting() {
        let h = harness();

        let err = h
            .service
            .create_order(checkout(vec![CheckoutItem {
                variation_id: None,
                quantity: 1,
            }]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) => {
            assert!(msg.contains("variation reference"));
        });

        // The order exists as rejected, with its zero-priced item on file.
        let (orders, _) = h.repos.orders.list(1, 10).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Rejected);
        assert_eq!(orders[0].total, dec!(0));
        let items = h.repos.orders.items_for_order(orders[0].id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price, dec!(0));
    }

    #[tokio::test]
    async fn partial_failure_keeps_earlier_movements_and_rejects_the_order() {
        let h = harness();
        let good = seed_variation(&h.repos, 10).await;

        let err = h
            .service
            .create_order(checkout(vec![
                CheckoutItem {
                    variation_id: Some(good.id),
                    quantity: 2,
                },
                CheckoutItem {
                    variation_id: None,
                    quantity: 1,
                },
            ]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));

        let (orders, _) = h.repos.orders.list(1, 10).await.unwrap();
        assert_eq!(orders[0].status, OrderStatus::Rejected);

        let current = h
            .repos
            .variations
            .find_by_id(good.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.stock, 8);
        let ledger = h
            .repos
            .movements
            .list_for_order(&orders[0].token)
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn mark_payment_is_idempotent_and_resolves_once() {
        let h = harness();
        let variation = seed_variation(&h.repos, 10).await;
        let placed = h
            .service
            .create_order(checkout(vec![CheckoutItem {
                variation_id: Some(variation.id),
                quantity: 1,
            }]))
            .await
            .unwrap();
        let token = placed.order.token.clone();

        let paid = h
            .service
            .mark_payment(&token, PaymentStatus::Approved)
            .await
            .unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(paid.payment_status, PaymentStatus::Approved);

        // Replaying the same outcome is a no-op.
        let replay = h
            .service
            .mark_payment(&token, PaymentStatus::Approved)
            .await
            .unwrap();
        assert_eq!(replay.status, OrderStatus::Paid);

        // Flipping a resolved payment is refused.
        let err = h
            .service
            .mark_payment(&token, PaymentStatus::Rejected)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidOperation(_));
    }

    #[tokio::test]
    async fn rejected_payment_rejects_the_order() {
        let h = harness();
        let variation = seed_variation(&h.repos, 10).await;
        let placed = h
            .service
            .create_order(checkout(vec![CheckoutItem {
                variation_id: Some(variation.id),
                quantity: 1,
            }]))
            .await
            .unwrap();

        let rejected = h
            .service
            .mark_payment(&placed.order.token, PaymentStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(rejected.status, OrderStatus::Rejected);
        assert_eq!(rejected.payment_status, PaymentStatus::Rejected);
    }

    #[tokio::test]
    async fn quantity_below_one_is_invalid() {
        let h = harness();
        let variation = seed_variation(&h.repos, 10).await;
        let err = h
            .service
            .create_order(checkout(vec![CheckoutItem {
                variation_id: Some(variation.id),
                quantity: 0,
            }]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(_));
    }
}
