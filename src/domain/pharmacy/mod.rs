//! Pharmacy counter functions: drug information, pickup orders and order status

pub mod handlers;
pub mod inventory;

pub use handlers::{dollars, Pharmacy};
pub use inventory::{Drug, InMemoryInventory, InventoryStore, Order, OrderStatus, StockShortfall};
