//! Drug inventory and pickup orders
//!
//! Prices are held in cents. [`InventoryStore::take_stock`] checks and
//! decrements under one lock so two concurrent orders cannot both take the
//! last units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drug {
    /// Lowercase catalog key
    pub name: String,
    pub price_cents: u64,
    pub stock: u32,
    pub prescription_required: bool,
}

impl Drug {
    pub fn new(name: &str, price_cents: u64, stock: u32, prescription_required: bool) -> Self {
        Self {
            name: name.to_string(),
            price_cents,
            stock,
            prescription_required,
        }
    }

    /// Name as spoken to the caller, e.g. "Pepto Bismol"
    pub fn display_name(&self) -> String {
        self.name
            .split_whitespace()
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Processing,
    Ready,
    PickedUp,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "processing",
            OrderStatus::Ready => "ready",
            OrderStatus::PickedUp => "picked up",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer_name: String,
    pub drug: String,
    pub quantity: u32,
    pub total_cents: u64,
    /// Spoken pickup time, e.g. "02:45 PM"
    pub pickup_time: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Why stock could not be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockShortfall {
    NotCarried,
    Insufficient { available: u32 },
}

/// Stock and order backend used by the pharmacy handlers
pub trait InventoryStore: Send + Sync {
    /// Exact match on the catalog key first, then a partial match either way
    fn find(&self, query: &str) -> Option<Drug>;

    /// Remove `quantity` units of `name` from stock
    fn take_stock(&self, name: &str, quantity: u32) -> Result<(), StockShortfall>;

    /// Store a new order. Returns false when its id is already in use.
    fn save_order(&self, order: Order) -> bool;

    fn order(&self, id: &str) -> Option<Order>;
}

/// Catalog key normalisation shared by lookups
fn normalise(query: &str) -> String {
    query.trim().to_lowercase()
}

pub struct InMemoryInventory {
    drugs: Mutex<BTreeMap<String, Drug>>,
    orders: Mutex<HashMap<String, Order>>,
}

impl InMemoryInventory {
    pub fn with_stock(drugs: impl IntoIterator<Item = Drug>) -> Self {
        Self {
            drugs: Mutex::new(drugs.into_iter().map(|d| (d.name.clone(), d)).collect()),
            orders: Mutex::new(HashMap::new()),
        }
    }

    fn drugs(&self) -> MutexGuard<'_, BTreeMap<String, Drug>> {
        self.drugs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn orders(&self) -> MutexGuard<'_, HashMap<String, Order>> {
        self.orders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stock_of(&self, name: &str) -> Option<u32> {
        self.drugs().get(&normalise(name)).map(|d| d.stock)
    }

    pub fn order_count(&self) -> usize {
        self.orders().len()
    }
}

impl Default for InMemoryInventory {
    /// The counter's standard stock
    fn default() -> Self {
        Self::with_stock([
            Drug::new("aspirin", 599, 50, false),
            Drug::new("ibuprofen", 799, 20, false),
            Drug::new("acetaminophen", 649, 35, false),
            Drug::new("tylenol", 899, 40, false),
            Drug::new("advil", 949, 25, false),
            Drug::new("benadryl", 1199, 15, false),
            Drug::new("zyrtec", 1499, 30, false),
            Drug::new("claritin", 1299, 28, false),
            Drug::new("pepto bismol", 849, 22, false),
            Drug::new("tums", 499, 60, false),
            Drug::new("amoxicillin", 1599, 10, true),
            Drug::new("lisinopril", 1249, 8, true),
            Drug::new("metformin", 999, 12, true),
        ])
    }
}

impl InventoryStore for InMemoryInventory {
    fn find(&self, query: &str) -> Option<Drug> {
        let key = normalise(query);
        if key.is_empty() {
            return None;
        }
        let drugs = self.drugs();
        if let Some(drug) = drugs.get(&key) {
            return Some(drug.clone());
        }
        drugs
            .values()
            .find(|d| d.name.contains(&key) || key.contains(&d.name))
            .cloned()
    }

    fn take_stock(&self, name: &str, quantity: u32) -> Result<(), StockShortfall> {
        let mut drugs = self.drugs();
        let drug = drugs
            .get_mut(&normalise(name))
            .ok_or(StockShortfall::NotCarried)?;
        if drug.stock < quantity {
            return Err(StockShortfall::Insufficient {
                available: drug.stock,
            });
        }
        drug.stock -= quantity;
        Ok(())
    }

    fn save_order(&self, order: Order) -> bool {
        let mut orders = self.orders();
        if orders.contains_key(&order.id) {
            return false;
        }
        orders.insert(order.id.clone(), order);
        true
    }

    fn order(&self, id: &str) -> Option<Order> {
        self.orders().get(&id.trim().to_uppercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_exact_then_partial() {
        let inventory = InMemoryInventory::default();
        assert_eq!(inventory.find(" Aspirin ").unwrap().price_cents, 599);
        assert_eq!(inventory.find("pepto").unwrap().name, "pepto bismol");
        assert_eq!(inventory.find("children's tylenol").unwrap().name, "tylenol");
        assert!(inventory.find("unobtainium").is_none());
        assert!(inventory.find("   ").is_none());
    }

    #[test]
    fn test_take_stock_is_all_or_nothing() {
        let inventory = InMemoryInventory::with_stock([Drug::new("tums", 499, 3, false)]);
        assert_eq!(
            inventory.take_stock("tums", 5),
            Err(StockShortfall::Insufficient { available: 3 })
        );
        assert_eq!(inventory.stock_of("tums"), Some(3));
        assert_eq!(inventory.take_stock("tums", 3), Ok(()));
        assert_eq!(inventory.stock_of("tums"), Some(0));
        assert_eq!(inventory.take_stock("zantac", 1), Err(StockShortfall::NotCarried));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(Drug::new("pepto bismol", 849, 1, false).display_name(), "Pepto Bismol");
    }
}
