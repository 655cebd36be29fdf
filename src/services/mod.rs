// Stock ledger and accounting
pub mod stock_accounting;
pub mod stock_movements;

// Catalog and read-side projections
pub mod catalog;
pub mod inventory_overview;

// Orders and payments
pub mod orders;
pub mod payments;

// Service wiring
pub mod factory;
