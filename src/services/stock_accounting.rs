use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::stock_movement::{self, MovementReason, MovementType};
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{NewStockMovement, StockDelta, VariationRepository};
use crate::services::stock_movements::StockMovementService;

/// Stock accounting for order intake and manual corrections.
///
/// This is the only place that mutates `Variation.stock`. Every mutation
/// goes through the repository's atomic delta (so concurrent orders cannot
/// oversell) and leaves exactly one ledger record carrying the snapshot
/// pair the delta observed.
///
/// `discount_from_order` works item by item and stops at the first failure.
/// Items already processed keep their stock effect and their ledger record;
/// nothing is rolled back. A failure mid-order therefore leaves an exact
/// record of what was taken, and the caller decides what to do with the
/// order itself.
#[derive(Clone)]
pub struct StockAccountingService {
    variations: Arc<dyn VariationRepository>,
    movements: StockMovementService,
    event_sender: Arc<EventSender>,
}

/// Manual stock correction, admin-facing.
#[derive(Debug, Clone)]
pub struct AdjustStockInput {
    pub variation_id: Uuid,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub reason: Option<MovementReason>,
    pub note: Option<String>,
}

impl StockAccountingService {
    pub fn new(
        variations: Arc<dyn VariationRepository>,
        movements: StockMovementService,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            variations,
            movements,
            event_sender,
        }
    }

    /// Discounts stock for every line item of a newly created order.
    ///
    /// For each item, in list order:
    /// 1. the item must carry a variation reference, otherwise the whole
    ///    call fails with a validation error right there;
    /// 2. the variation's stock is decremented atomically by the item
    ///    quantity, failing on unknown variations and on decrements that
    ///    would cross below zero;
    /// 3. one `OUT`/`SALE` ledger record is appended with the observed
    ///    snapshot pair and the order token.
    ///
    /// Returns the created movements in item order. Not idempotent: the
    /// order service calls this exactly once per order.
    #[instrument(skip(self, order, items), fields(order_token = %order.token))]
    pub async fn discount_from_order(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let mut recorded = Vec::with_capacity(items.len());

        for item in items {
            let variation_id = item.variation_id.ok_or_else(|| {
                warn!(
                    order_token = %order.token,
                    product = %item.product_name,
                    "Order item without variation reference"
                );
                ServiceError::ValidationError(
                    "every item must carry a variation reference".to_string(),
                )
            })?;

            let delta = self
                .variations
                .apply_stock_delta(variation_id, -item.quantity)
                .await?;

            let movement = self
                .movements
                .create_movement(NewStockMovement {
                    product_id: delta.product_id,
                    variation_id,
                    movement_type: MovementType::Out,
                    reason: MovementReason::Sale,
                    quantity: item.quantity,
                    previous_stock: delta.previous_stock,
                    new_stock: delta.new_stock,
                    order_token: Some(order.token.clone()),
                    note: None,
                })
                .await?;

            self.publish_stock_events(&delta, MovementType::Out, MovementReason::Sale, item.quantity)
                .await;
            recorded.push(movement);
        }

        info!(
            order_token = %order.token,
            movements = recorded.len(),
            "Discounted stock for order"
        );
        Ok(recorded)
    }

    /// Applies a manual stock correction and records it in the ledger.
    ///
    /// `IN` adds, `OUT` removes; the quantity must be positive. `SALE` is
    /// reserved for order accounting and rejected here. Defaults to
    /// `MANUAL` when no reason is given.
    #[instrument(skip(self, input), fields(variation_id = %input.variation_id))]
    pub async fn adjust_stock(
        &self,
        input: AdjustStockInput,
    ) -> Result<stock_movement::Model, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::InvalidInput(
                "Adjustment quantity must be at least 1".to_string(),
            ));
        }
        let reason = input.reason.unwrap_or(MovementReason::Manual);
        if reason == MovementReason::Sale {
            return Err(ServiceError::InvalidInput(
                "SALE movements are recorded by order accounting only".to_string(),
            ));
        }

        let delta = match input.movement_type {
            MovementType::In => input.quantity,
            MovementType::Out => -input.quantity,
        };
        let delta = self
            .variations
            .apply_stock_delta(input.variation_id, delta)
            .await?;

        let movement = self
            .movements
            .create_movement(NewStockMovement {
                product_id: delta.product_id,
                variation_id: input.variation_id,
                movement_type: input.movement_type,
                reason,
                quantity: input.quantity,
                previous_stock: delta.previous_stock,
                new_stock: delta.new_stock,
                order_token: None,
                note: input.note,
            })
            .await?;

        self.publish_stock_events(&delta, input.movement_type, reason, input.quantity)
            .await;
        Ok(movement)
    }

    /// Emits `StockAdjusted` always, and `LowStockDetected` only when this
    /// movement crossed the threshold from above. Edge-triggered so a
    /// variation sitting at its minimum does not re-alert on every read.
    async fn publish_stock_events(
        &self,
        delta: &StockDelta,
        movement_type: MovementType,
        reason: MovementReason,
        quantity: i32,
    ) {
        self.event_sender
            .send_or_log(Event::StockAdjusted {
                variation_id: delta.variation_id,
                movement_type,
                reason,
                quantity,
                new_stock: delta.new_stock,
            })
            .await;

        if delta.previous_stock > delta.min_stock && delta.new_stock <= delta.min_stock {
            self.event_sender
                .send_or_log(Event::LowStockDetected {
                    product_id: delta.product_id,
                    variation_id: delta.variation_id,
                    stock: delta.new_stock,
                    min_stock: delta.min_stock,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    use super::*;
    use crate::entities::order::{OrderStatus, PaymentStatus};
    use crate::entities::product_variation;
    use crate::repositories::Repositories;

    struct Harness {
        service: StockAccountingService,
        repos: Repositories,
        rx: mpsc::Receiver<Event>,
    }

    fn harness() -> Harness {
        let repos = Repositories::in_memory();
        let (tx, rx) = mpsc::channel(64);
        let event_sender = Arc::new(EventSender::new(tx));
        let movements = StockMovementService::new(repos.movements.clone());
        let service =
            StockAccountingService::new(repos.variations.clone(), movements, event_sender);
        Harness {
            service,
            repos,
            rx,
        }
    }

    async fn seed_variation(
        repos: &Repositories,
        stock: i32,
        min_stock: i32,
    ) -> product_variation::Model {
        let now = Utc::now();
        repos
            .variations
            .insert(product_variation::Model {
                id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                sku: format!("SKU-{}", Uuid::new_v4()),
                name: "Seeded variation".to_string(),
                price: dec!(25.0000),
                stock,
                min_stock,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    fn order_fixture(token: &str) -> order::Model {
        let now = Utc::now();
        order::Model {
            id: Uuid::new_v4(),
            token: token.to_string(),
            customer_name: "Ada".to_string(),
            customer_email: "ada@example.com".to_string(),
            payment_method: "card".to_string(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            preference_id: None,
            total: dec!(0),
            created_at: now,
            updated_at: now,
        }
    }

    fn item(order_id: Uuid, variation_id: Option<Uuid>, quantity: i32) -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id,
            variation_id,
            product_name: "Widget".to_string(),
            variation_name: "Large".to_string(),
            quantity,
            unit_price: dec!(10.0000),
            total: dec!(10.0000) * Decimal::from(quantity),
        }
    }

    fn low_stock_events(rx: &mut mpsc::Receiver<Event>) -> usize {
        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, Event::LowStockDetected { .. }) {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn records_one_movement_per_item() {
        let h = harness();
        let first = seed_variation(&h.repos, 10, 2).await;
        let second = seed_variation(&h.repos, 7, 2).await;
        let order = order_fixture("ord-multi");
        let items = vec![
            item(order.id, Some(first.id), 2),
            item(order.id, Some(second.id), 3),
        ];

        let movements = h.service.discount_from_order(&order, &items).await.unwrap();

        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].movement_type, MovementType::Out);
        assert_eq!(movements[0].reason, MovementReason::Sale);
        assert_eq!(movements[0].previous_stock, 10);
        assert_eq!(movements[0].new_stock, 8);
        assert_eq!(movements[1].previous_stock, 7);
        assert_eq!(movements[1].new_stock, 4);
        for m in &movements {
            assert_eq!(m.order_token.as_deref(), Some("ord-multi"));
            assert_eq!(m.previous_stock - m.new_stock, m.quantity);
        }

        let first_now = h.repos.variations.find_by_id(first.id).await.unwrap().unwrap();
        let second_now = h.repos.variations.find_by_id(second.id).await.unwrap().unwrap();
        assert_eq!(first_now.stock, 8);
        assert_eq!(second_now.stock, 4);
    }

    #[tokio::test]
    async fn item_without_variation_reference_fails_before_any_mutation() {
        let mut h = harness();
        let variation = seed_variation(&h.repos, 10, 2).await;
        let order = order_fixture("ord-bad");
        let items = vec![item(order.id, None, 2)];

        let err = h
            .service
            .discount_from_order(&order, &items)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) => {
            assert!(msg.contains("variation reference"));
        });

        let current = h
            .repos
            .variations
            .find_by_id(variation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.stock, 10);
        assert!(h
            .repos
            .movements
            .list_for_order("ord-bad")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(low_stock_events(&mut h.rx), 0);
    }

    #[tokio::test]
    async fn failure_midway_keeps_earlier_effects() {
        let h = harness();
        let good = seed_variation(&h.repos, 10, 2).await;
        let order = order_fixture("ord-partial");
        let items = vec![
            item(order.id, Some(good.id), 2),
            item(order.id, None, 1),
        ];

        let err = h
            .service
            .discount_from_order(&order, &items)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));

        // The first item's effect stands: stock moved and the ledger has it.
        let current = h.repos.variations.find_by_id(good.id).await.unwrap().unwrap();
        assert_eq!(current.stock, 8);
        let ledger = h.repos.movements.list_for_order("ord-partial").await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].new_stock, 8);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_item_untouched() {
        let h = harness();
        let scarce = seed_variation(&h.repos, 1, 0).await;
        let order = order_fixture("ord-scarce");
        let items = vec![item(order.id, Some(scarce.id), 3)];

        let err = h
            .service
            .discount_from_order(&order, &items)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InsufficientStock(_));

        let current = h
            .repos
            .variations
            .find_by_id(scarce.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.stock, 1);
        assert!(h
            .repos
            .movements
            .list_for_order("ord-scarce")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unknown_variation_is_not_found() {
        let h = harness();
        let order = order_fixture("ord-ghost");
        let items = vec![item(order.id, Some(Uuid::new_v4()), 1)];

        let err = h
            .service
            .discount_from_order(&order, &items)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::NotFound(_));
    }

    #[tokio::test]
    async fn low_stock_event_fires_only_when_crossing_the_threshold() {
        let mut h = harness();
        let variation = seed_variation(&h.repos, 6, 4).await;

        let adjust = |qty| AdjustStockInput {
            variation_id: variation.id,
            movement_type: MovementType::Out,
            quantity: qty,
            reason: None,
            note: None,
        };

        // 6 -> 5: still above the threshold.
        h.service.adjust_stock(adjust(1)).await.unwrap();
        assert_eq!(low_stock_events(&mut h.rx), 0);

        // 5 -> 4: crosses onto the threshold, alert fires.
        h.service.adjust_stock(adjust(1)).await.unwrap();
        assert_eq!(low_stock_events(&mut h.rx), 1);

        // 4 -> 3: already at or below, no repeat alert.
        h.service.adjust_stock(adjust(1)).await.unwrap();
        assert_eq!(low_stock_events(&mut h.rx), 0);
    }

    #[tokio::test]
    async fn manual_adjustments_move_stock_both_ways() {
        let h = harness();
        let variation = seed_variation(&h.repos, 10, 2).await;

        let out = h
            .service
            .adjust_stock(AdjustStockInput {
                variation_id: variation.id,
                movement_type: MovementType::Out,
                quantity: 5,
                reason: Some(MovementReason::Adjustment),
                note: Some("damaged in storage".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(out.previous_stock, 10);
        assert_eq!(out.new_stock, 5);
        assert_eq!(out.note.as_deref(), Some("damaged in storage"));

        let back_in = h
            .service
            .adjust_stock(AdjustStockInput {
                variation_id: variation.id,
                movement_type: MovementType::In,
                quantity: 2,
                reason: None,
                note: None,
            })
            .await
            .unwrap();
        assert_eq!(back_in.previous_stock, 5);
        assert_eq!(back_in.new_stock, 7);
        assert_eq!(back_in.reason, MovementReason::Manual);
    }

    #[tokio::test]
    async fn adjustment_rejects_sale_reason_and_bad_quantity() {
        let h = harness();
        let variation = seed_variation(&h.repos, 10, 2).await;

        let err = h
            .service
            .adjust_stock(AdjustStockInput {
                variation_id: variation.id,
                movement_type: MovementType::Out,
                quantity: 1,
                reason: Some(MovementReason::Sale),
                note: None,
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(_));

        let err = h
            .service
            .adjust_stock(AdjustStockInput {
                variation_id: variation.id,
                movement_type: MovementType::In,
                quantity: 0,
                reason: None,
                note: None,
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(_));
    }

    #[tokio::test]
    async fn sale_then_manual_removal_walks_the_ledger_down() {
        let h = harness();
        let variation = seed_variation(&h.repos, 10, 2).await;
        let order = order_fixture("ord-story");
        let items = vec![item(order.id, Some(variation.id), 2)];

        h.service.discount_from_order(&order, &items).await.unwrap();
        h.service
            .adjust_stock(AdjustStockInput {
                variation_id: variation.id,
                movement_type: MovementType::Out,
                quantity: 5,
                reason: Some(MovementReason::Adjustment),
                note: None,
            })
            .await
            .unwrap();

        let current = h
            .repos
            .variations
            .find_by_id(variation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.stock, 3);

        let ledger = h
            .repos
            .movements
            .list_for_product(variation.product_id, 10)
            .await
            .unwrap();
        assert_eq!(ledger.len(), 2);
        // Newest first: the manual removal, then the sale.
        assert_eq!(ledger[0].previous_stock, 8);
        assert_eq!(ledger[0].new_stock, 3);
        assert_eq!(ledger[1].previous_stock, 10);
        assert_eq!(ledger[1].new_stock, 8);
    }
}
