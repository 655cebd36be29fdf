use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::stock_movement::{MovementReason, MovementType};

/// Cloneable handle for emitting domain events onto the process-wide channel.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, erroring when every receiver has been dropped.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is
    /// unavailable. Event delivery is never allowed to fail the operation
    /// that produced the event.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

// The events the storefront can emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order lifecycle
    OrderCreated(Uuid),
    OrderRejected {
        order_id: Uuid,
        reason: String,
    },
    OrderPaid(Uuid),
    PaymentRejected {
        order_id: Uuid,
    },

    // Stock events
    StockAdjusted {
        variation_id: Uuid,
        movement_type: MovementType,
        reason: MovementReason,
        quantity: i32,
        new_stock: i32,
    },
    LowStockDetected {
        product_id: Uuid,
        variation_id: Uuid,
        stock: i32,
        min_stock: i32,
    },

    // Catalog events
    CategoryCreated(Uuid),
    ProductCreated(Uuid),
    VariationCreated {
        product_id: Uuid,
        variation_id: Uuid,
    },
}

// Processes incoming events. Most handlers just log; low-stock is the
// alerting sink the dashboard relies on.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::LowStockDetected {
                product_id,
                variation_id,
                stock,
                min_stock,
            } => {
                warn!(
                    %product_id,
                    %variation_id,
                    stock,
                    min_stock,
                    "Low stock threshold crossed"
                );
            }
            Event::OrderRejected { order_id, reason } => {
                warn!(%order_id, %reason, "Order rejected");
            }
            Event::StockAdjusted {
                variation_id,
                movement_type,
                reason,
                quantity,
                new_stock,
            } => {
                info!(
                    %variation_id,
                    movement_type = movement_type.as_str(),
                    reason = reason.as_str(),
                    quantity,
                    new_stock,
                    "Stock adjusted"
                );
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::OrderCreated(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(Event::OrderCreated(_))));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or error out
        sender.send_or_log(Event::OrderCreated(Uuid::new_v4())).await;
    }
}
