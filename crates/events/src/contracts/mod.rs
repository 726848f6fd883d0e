//! Marketplace payload contracts, one struct per event class.

mod fulfillment;
mod inventory;
mod invoicing;
mod orders;
mod payments;
mod pricing;

pub use fulfillment::{BatchStatus, PickPackBatch};
pub use inventory::InventoryLedgerDelta;
pub use invoicing::{InvoiceRecord, InvoiceStatus};
pub use orders::{OrderStatus, OrderSyncStatus};
pub use payments::{PaymentSettlement, SettlementStatus};
pub use pricing::{WeightPriceRule, WeightUnit};
