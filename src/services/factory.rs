use std::sync::Arc;

use tracing::warn;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::repositories::Repositories;
use crate::services::catalog::CatalogService;
use crate::services::inventory_overview::InventoryOverviewService;
use crate::services::orders::OrderService;
use crate::services::payments::{PaymentGateway, PaymentService, SandboxGateway};
use crate::services::stock_accounting::StockAccountingService;
use crate::services::stock_movements::StockMovementService;

const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Container holding every service, wired over one repository set.
///
/// Services are cheap to clone (shared handles inside), so the container
/// itself clones into each request handler via `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: CatalogService,
    pub inventory: InventoryOverviewService,
    pub accounting: StockAccountingService,
    pub movements: StockMovementService,
    pub orders: OrderService,
    pub payments: PaymentService,
}

impl AppServices {
    pub fn build(repos: Repositories, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let movements = StockMovementService::new(repos.movements.clone());
        let accounting = StockAccountingService::new(
            repos.variations.clone(),
            movements.clone(),
            event_sender.clone(),
        );
        let catalog = CatalogService::new(
            repos.categories.clone(),
            repos.products.clone(),
            repos.variations.clone(),
            accounting.clone(),
            event_sender.clone(),
        );
        let inventory = InventoryOverviewService::new(
            repos.categories.clone(),
            repos.products.clone(),
            repos.variations.clone(),
        );
        let orders = OrderService::new(
            repos.orders.clone(),
            repos.products.clone(),
            repos.variations.clone(),
            accounting.clone(),
            event_sender,
        );
        let payments = PaymentService::new(
            select_gateway(config),
            orders.clone(),
            config.payment_webhook_secret.clone(),
            config
                .payment_webhook_tolerance_secs
                .unwrap_or(DEFAULT_WEBHOOK_TOLERANCE_SECS),
        );

        Self {
            catalog,
            inventory,
            accounting,
            movements,
            orders,
            payments,
        }
    }
}

fn select_gateway(config: &AppConfig) -> Arc<dyn PaymentGateway> {
    let sandbox = || {
        Arc::new(SandboxGateway::new(
            &config.checkout_redirect_base,
            &config.default_currency,
        ))
    };
    match config.payment_provider.as_deref() {
        None | Some("sandbox") => sandbox(),
        Some(other) => {
            warn!(provider = other, "Unknown payment provider, using sandbox");
            sandbox()
        }
    }
}
