//! Pharmacy counter functions exposed to the voice agent

use super::inventory::{Drug, InventoryStore, Order, OrderStatus, StockShortfall};
use crate::domain::handler::{
    generate_code, payload, Arguments, FieldKind, FieldSpec, HandlerFailure, HandlerResult,
    InputSchema, RegistryBuilder,
};
use crate::domain::shared::Result;
use chrono::{Duration, Local, NaiveDateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const SALES_TAX_PERCENT: u64 = 8;
const PICKUP_DELAY_MINUTES: i64 = 30;
const CODE_ATTEMPTS: usize = 5;

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// "$12.34"
pub fn dollars(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

/// Drug information and pickup orders for a pharmacy counter
pub struct Pharmacy {
    inventory: Arc<dyn InventoryStore>,
    now: fn() -> NaiveDateTime,
}

impl Pharmacy {
    pub fn new(inventory: Arc<dyn InventoryStore>) -> Self {
        Self {
            inventory,
            now: local_now,
        }
    }

    /// Use a fixed clock, for deterministic pickup times
    pub fn with_clock(inventory: Arc<dyn InventoryStore>, now: fn() -> NaiveDateTime) -> Self {
        Self { inventory, now }
    }

    fn lookup(&self, query: &str) -> std::result::Result<Drug, HandlerFailure> {
        self.inventory.find(query).ok_or_else(|| not_carried(query))
    }

    pub fn get_drug_info(&self, args: &Arguments) -> HandlerResult {
        let drug = self.lookup(args.require_str("drug_name")?)?;
        let name = drug.display_name();
        if drug.stock == 0 {
            return Err(out_of_stock(&name));
        }

        let note = if drug.prescription_required {
            " (requires prescription)"
        } else {
            ""
        };
        Ok(payload(json!({
            "drug": name,
            "price": dollars(drug.price_cents),
            "stock": drug.stock,
            "prescription_required": drug.prescription_required,
            "message": format!(
                "{} is {} and we have {} units in stock{}.",
                name,
                dollars(drug.price_cents),
                drug.stock,
                note
            ),
        })))
    }

    pub fn place_order(&self, args: &Arguments) -> HandlerResult {
        let query = args.require_str("drug_name")?;
        let customer = args.require_str("customer_name")?;
        let quantity = args
            .i64("quantity")
            .and_then(|q| u32::try_from(q).ok())
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                HandlerFailure::new(
                    "invalid_quantity",
                    "How many units would you like? The quantity needs to be at least one.",
                )
            })?;

        let drug = self.lookup(query)?;
        let name = drug.display_name();
        if drug.prescription_required {
            return Err(HandlerFailure::new(
                "prescription_required",
                format!(
                    "{} requires a prescription. Please bring your prescription to the pharmacy to complete this order.",
                    name
                ),
            ));
        }

        match self.inventory.take_stock(&drug.name, quantity) {
            Ok(()) => {}
            Err(StockShortfall::NotCarried) => return Err(not_carried(query)),
            Err(StockShortfall::Insufficient { available: 0 }) => return Err(out_of_stock(&name)),
            Err(StockShortfall::Insufficient { available }) => {
                return Err(HandlerFailure::new(
                    "insufficient_stock",
                    format!(
                        "Sorry, we only have {} units of {} in stock. Would you like to order {} instead?",
                        available, name, available
                    ),
                ))
            }
        }

        let subtotal = drug.price_cents * u64::from(quantity);
        let tax = (subtotal * SALES_TAX_PERCENT + 50) / 100;
        let total = subtotal + tax;
        let pickup_time = ((self.now)() + Duration::minutes(PICKUP_DELAY_MINUTES))
            .format("%I:%M %p")
            .to_string();

        let mut order = Order {
            id: generate_code(),
            customer_name: customer.to_string(),
            drug: drug.name.clone(),
            quantity,
            total_cents: total,
            pickup_time: pickup_time.clone(),
            status: OrderStatus::Processing,
            created_at: Utc::now(),
        };
        for _ in 1..CODE_ATTEMPTS {
            if self.inventory.order(&order.id).is_none() {
                break;
            }
            order.id = generate_code();
        }
        let order_id = order.id.clone();
        if !self.inventory.save_order(order) {
            return Err(HandlerFailure::new(
                "order_failed",
                "I'm sorry, I couldn't record that order just now. Could we try again?",
            ));
        }

        info!("Order placed: {} for {} x {}", order_id, quantity, drug.name);

        Ok(payload(json!({
            "order_id": order_id,
            "drug": name,
            "quantity": quantity,
            "subtotal": dollars(subtotal),
            "tax": dollars(tax),
            "total": dollars(total),
            "pickup_time": pickup_time,
            "order_status": OrderStatus::Processing.as_str(),
            "message": format!(
                "Order confirmed! Order ID: {}. {} units of {} for {}. Total: {} including tax. Ready for pickup at {}.",
                order_id, quantity, name, customer, dollars(total), pickup_time
            ),
        })))
    }

    pub fn check_order_status(&self, args: &Arguments) -> HandlerResult {
        let id = args.require_str("order_id")?;
        let order = self.inventory.order(id).ok_or_else(|| {
            HandlerFailure::new(
                "not_found",
                format!(
                    "I couldn't find an order with ID {}. Please double-check the order number and try again.",
                    id
                ),
            )
        })?;

        let name = Drug::new(&order.drug, 0, 0, false).display_name();
        Ok(payload(json!({
            "order_id": order.id,
            "drug": name,
            "quantity": order.quantity,
            "total": dollars(order.total_cents),
            "pickup_time": order.pickup_time,
            "order_status": order.status.as_str(),
            "message": format!(
                "Order {} for {}: {} units of {}. Status: {}. Ready for pickup at {}. Total: {}.",
                order.id,
                order.customer_name,
                order.quantity,
                name,
                order.status.as_str(),
                order.pickup_time,
                dollars(order.total_cents)
            ),
        })))
    }

    /// Register every pharmacy function
    pub fn register(self: Arc<Self>, builder: &mut RegistryBuilder) -> Result<()> {
        let this = self.clone();
        builder.register(
            "get_drug_info",
            "Get the price and stock availability of a drug",
            InputSchema::new().field(
                FieldSpec::required("drug_name", FieldKind::String)
                    .describe("Name of the drug, e.g. 'aspirin'"),
            ),
            move |args: &Arguments| this.get_drug_info(args),
        )?;

        let this = self.clone();
        builder.register(
            "place_order",
            "Place a pickup order for a drug",
            InputSchema::new()
                .field(FieldSpec::required("drug_name", FieldKind::String))
                .field(
                    FieldSpec::required("quantity", FieldKind::Integer)
                        .describe("Number of units"),
                )
                .field(FieldSpec::required("customer_name", FieldKind::String)),
            move |args: &Arguments| this.place_order(args),
        )?;

        let this = self;
        builder.register(
            "check_order_status",
            "Check the status of an existing order",
            InputSchema::new().field(
                FieldSpec::required("order_id", FieldKind::String)
                    .describe("Six-character order ID"),
            ),
            move |args: &Arguments| this.check_order_status(args),
        )?;

        Ok(())
    }
}

fn not_carried(query: &str) -> HandlerFailure {
    HandlerFailure::new(
        "not_found",
        format!(
            "Sorry, we don't carry {}. Would you like me to suggest an alternative?",
            query
        ),
    )
}

fn out_of_stock(name: &str) -> HandlerFailure {
    HandlerFailure::new(
        "out_of_stock",
        format!("Sorry, {} is currently out of stock.", name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::handler::HandlerRegistry;
    use crate::domain::pharmacy::inventory::InMemoryInventory;
    use crate::domain::shared::DispatchError;
    use chrono::NaiveDate;
    use serde_json::Value;

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(14, 15, 0)
            .unwrap()
    }

    fn pharmacy_with(inventory: InMemoryInventory) -> (Arc<Pharmacy>, Arc<InMemoryInventory>) {
        let inventory = Arc::new(inventory);
        let pharmacy = Arc::new(Pharmacy::with_clock(inventory.clone(), fixed_now));
        (pharmacy, inventory)
    }

    fn pharmacy() -> (Arc<Pharmacy>, Arc<InMemoryInventory>) {
        pharmacy_with(InMemoryInventory::default())
    }

    fn registry() -> HandlerRegistry {
        let (pharmacy, _) = pharmacy();
        let mut builder = HandlerRegistry::builder();
        pharmacy.register(&mut builder).unwrap();
        builder.build()
    }

    fn args(function: &str, value: Value) -> Arguments {
        registry()
            .lookup(function)
            .unwrap()
            .schema()
            .validate(&value)
            .unwrap()
    }

    #[test]
    fn test_register_all_functions() {
        let registry = registry();
        assert_eq!(
            registry.names(),
            vec!["check_order_status", "get_drug_info", "place_order"]
        );
    }

    #[test]
    fn test_drug_info_reports_price_and_stock() {
        let (pharmacy, _) = pharmacy();
        let result = pharmacy
            .get_drug_info(&args("get_drug_info", json!({"drug_name": "Aspirin"})))
            .unwrap();
        assert_eq!(result["price"], "$5.99");
        assert_eq!(result["stock"], 50);
        assert_eq!(
            result["message"],
            "Aspirin is $5.99 and we have 50 units in stock."
        );

        let result = pharmacy
            .get_drug_info(&args("get_drug_info", json!({"drug_name": "amoxicillin"})))
            .unwrap();
        assert_eq!(result["prescription_required"], true);
        assert!(result["message"].as_str().unwrap().ends_with("(requires prescription)."));
    }

    #[test]
    fn test_drug_info_unknown_drug() {
        let (pharmacy, _) = pharmacy();
        let failure = pharmacy
            .get_drug_info(&args("get_drug_info", json!({"drug_name": "unobtainium"})))
            .unwrap_err();
        assert_eq!(failure.code, "not_found");
        assert!(failure.message.contains("don't carry unobtainium"));
    }

    #[test]
    fn test_drug_info_out_of_stock() {
        let (pharmacy, _) = pharmacy_with(InMemoryInventory::with_stock([Drug::new(
            "zyrtec", 1499, 0, false,
        )]));
        let failure = pharmacy
            .get_drug_info(&args("get_drug_info", json!({"drug_name": "zyrtec"})))
            .unwrap_err();
        assert_eq!(failure.code, "out_of_stock");
    }

    #[test]
    fn test_place_order_totals_and_stock() {
        let (pharmacy, inventory) = pharmacy();
        let result = pharmacy
            .place_order(&args(
                "place_order",
                json!({"drug_name": "ibuprofen", "quantity": 2, "customer_name": "John Smith"}),
            ))
            .unwrap();

        assert_eq!(result["subtotal"], "$15.98");
        assert_eq!(result["tax"], "$1.28");
        assert_eq!(result["total"], "$17.26");
        assert_eq!(result["pickup_time"], "02:45 PM");
        assert_eq!(result["order_status"], "processing");
        assert_eq!(inventory.stock_of("ibuprofen"), Some(18));

        let id = result["order_id"].as_str().unwrap();
        assert_eq!(id.len(), 6);
        assert!(inventory.order(id).is_some());
    }

    #[test]
    fn test_place_order_refusals() {
        let (pharmacy, inventory) = pharmacy();
        let order = |drug: &str, quantity: i64| {
            pharmacy
                .place_order(&args(
                    "place_order",
                    json!({"drug_name": drug, "quantity": quantity, "customer_name": "Ann"}),
                ))
                .unwrap_err()
        };

        assert_eq!(order("unobtainium", 1).code, "not_found");
        assert_eq!(order("lisinopril", 1).code, "prescription_required");
        assert_eq!(order("aspirin", 0).code, "invalid_quantity");

        let failure = order("benadryl", 16);
        assert_eq!(failure.code, "insufficient_stock");
        assert!(failure.message.contains("only have 15 units of Benadryl"));

        assert_eq!(inventory.stock_of("benadryl"), Some(15));
        assert_eq!(inventory.stock_of("lisinopril"), Some(8));
        assert_eq!(inventory.order_count(), 0);
    }

    #[test]
    fn test_place_order_when_sold_out() {
        let (pharmacy, _) = pharmacy_with(InMemoryInventory::with_stock([Drug::new(
            "tums", 499, 0, false,
        )]));
        let failure = pharmacy
            .place_order(&args(
                "place_order",
                json!({"drug_name": "tums", "quantity": 1, "customer_name": "Ann"}),
            ))
            .unwrap_err();
        assert_eq!(failure.code, "out_of_stock");
    }

    #[test]
    fn test_check_order_status() {
        let (pharmacy, _) = pharmacy();
        let placed = pharmacy
            .place_order(&args(
                "place_order",
                json!({"drug_name": "pepto", "quantity": 1, "customer_name": "Ann"}),
            ))
            .unwrap();
        let id = placed["order_id"].as_str().unwrap().to_lowercase();

        let status = pharmacy
            .check_order_status(&args("check_order_status", json!({"order_id": id})))
            .unwrap();
        assert_eq!(status["drug"], "Pepto Bismol");
        assert_eq!(status["order_status"], "processing");
        assert_eq!(status["total"], "$9.17");
        assert!(status["message"].as_str().unwrap().contains("for Ann"));

        let failure = pharmacy
            .check_order_status(&args("check_order_status", json!({"order_id": "ZZZ999"})))
            .unwrap_err();
        assert_eq!(failure.code, "not_found");
    }

    #[test]
    fn test_quantity_must_be_an_integer() {
        let err = registry()
            .lookup("place_order")
            .unwrap()
            .schema()
            .validate(&json!({"drug_name": "aspirin", "quantity": "two", "customer_name": "Ann"}))
            .unwrap_err();
        assert!(matches!(err, DispatchError::ValidationFailed { ref field, .. } if field == "quantity"));
    }
}
