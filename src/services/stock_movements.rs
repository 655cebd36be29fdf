use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::stock_movement;
use crate::errors::ServiceError;
use crate::repositories::{NewStockMovement, StockMovementRepository};

/// Writer and reader for the append-only stock ledger.
///
/// Every stock mutation in the system ends up here as exactly one record
/// carrying the before/after snapshot the mutation observed. The service
/// never touches `Variation.stock` itself; callers pass the snapshot they
/// obtained from the atomic delta, and the record is immutable once
/// written.
#[derive(Clone)]
pub struct StockMovementService {
    movements: Arc<dyn StockMovementRepository>,
}

impl StockMovementService {
    pub fn new(movements: Arc<dyn StockMovementRepository>) -> Self {
        Self { movements }
    }

    /// Appends one movement to the ledger.
    ///
    /// Pure append: no stock is mutated here. Fails with `InvalidInput`
    /// when the quantity is not positive or a snapshot is negative.
    #[instrument(skip(self, movement), fields(variation_id = %movement.variation_id))]
    pub async fn create_movement(
        &self,
        movement: NewStockMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        if movement.quantity < 1 {
            return Err(ServiceError::InvalidInput(
                "Movement quantity must be at least 1".to_string(),
            ));
        }
        if movement.previous_stock < 0 || movement.new_stock < 0 {
            return Err(ServiceError::InvalidInput(
                "Stock snapshots cannot be negative".to_string(),
            ));
        }

        let saved = self.movements.append(movement).await?;
        info!(
            movement_id = %saved.id,
            movement_type = saved.movement_type.as_str(),
            reason = saved.reason.as_str(),
            quantity = saved.quantity,
            "Recorded stock movement"
        );
        Ok(saved)
    }

    /// Movements recorded for one order, oldest first.
    pub async fn movements_for_order(
        &self,
        order_token: &str,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        self.movements.list_for_order(order_token).await
    }

    /// Latest movements for one product, newest first.
    pub async fn movements_for_product(
        &self,
        product_id: Uuid,
        limit: u64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        self.movements.list_for_product(product_id, limit).await
    }

    /// Latest movements across the whole store, newest first.
    pub async fn recent_movements(
        &self,
        limit: u64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        self.movements.list_recent(limit).await
    }
}
