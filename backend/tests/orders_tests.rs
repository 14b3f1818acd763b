//! Tests for order building and receiving arithmetic
//!
//! Ordering snapshots each line's box cost in CDF at order time; receiving
//! converts boxes to dispensable units and books every delivery as a lot.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use uuid::Uuid;

use shared::{order_line_cost, Currency, OrderStatus};

/// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[derive(Debug, Clone, Copy)]
struct ProductInfo {
    box_price: Decimal,
    currency: Currency,
    units_per_box: i32,
}

#[derive(Debug, PartialEq)]
struct PendingLine {
    product_id: Uuid,
    quantity: i32,
    box_cost: Decimal,
}

#[derive(Debug, PartialEq)]
enum OrderRejection {
    NoLines,
    BadQuantity,
    DuplicateLine,
    UnknownProduct,
    AlreadyOrderedToday,
    MissingRate,
}

/// Build the order lines the way the service does: every line validated,
/// every box cost frozen in CDF before anything is stored
fn build_order(
    products: &HashMap<Uuid, ProductInfo>,
    requested: &[(Uuid, i32)],
    ordered_today: &HashSet<Uuid>,
    rate: Option<Decimal>,
) -> Result<Vec<PendingLine>, OrderRejection> {
    if requested.is_empty() {
        return Err(OrderRejection::NoLines);
    }
    let mut seen = HashSet::new();
    for &(product_id, quantity) in requested {
        if quantity <= 0 {
            return Err(OrderRejection::BadQuantity);
        }
        if !seen.insert(product_id) {
            return Err(OrderRejection::DuplicateLine);
        }
        if ordered_today.contains(&product_id) {
            return Err(OrderRejection::AlreadyOrderedToday);
        }
    }

    let mut lines = Vec::new();
    for &(product_id, quantity) in requested {
        let product = products
            .get(&product_id)
            .ok_or(OrderRejection::UnknownProduct)?;
        let box_cost = order_line_cost(product.box_price, product.currency, rate)
            .map_err(|_| OrderRejection::MissingRate)?;
        lines.push(PendingLine {
            product_id,
            quantity,
            box_cost,
        });
    }
    Ok(lines)
}

#[derive(Debug, Clone, PartialEq)]
struct StockedEntry {
    quantity: i32,
    lot_quantities: Vec<i32>,
}

/// Book a confirmed delivery: boxes become units, units land on the entry
/// aggregate and in a fresh lot, and the order is done
fn receive(
    entries: &mut HashMap<Uuid, StockedEntry>,
    delivered: &[(Uuid, i32)],
    products: &HashMap<Uuid, ProductInfo>,
) -> Result<(OrderStatus, i32), OrderRejection> {
    let mut total_units = 0;
    for &(product_id, boxes) in delivered {
        let product = products
            .get(&product_id)
            .ok_or(OrderRejection::UnknownProduct)?;
        let units = boxes * product.units_per_box;

        let entry = entries.entry(product_id).or_insert(StockedEntry {
            quantity: 0,
            lot_quantities: Vec::new(),
        });
        entry.quantity += units;
        entry.lot_quantities.push(units);
        total_units += units;
    }
    Ok((OrderStatus::Confirmed, total_units))
}

fn product(box_price: &str, currency: Currency, units_per_box: i32) -> ProductInfo {
    ProductInfo {
        box_price: dec(box_price),
        currency,
        units_per_box,
    }
}

// ============================================================================
// Order Building
// ============================================================================

#[cfg(test)]
mod order_building {
    use super::*;

    #[test]
    fn test_line_costs_are_frozen_at_order_time() {
        let paracetamol = Uuid::new_v4();
        let products = HashMap::from([(paracetamol, product("4.80", Currency::Usd, 60))]);

        let lines = build_order(
            &products,
            &[(paracetamol, 5)],
            &HashSet::new(),
            Some(dec("2700")),
        )
        .unwrap();

        assert_eq!(lines[0].box_cost, dec("12960.00"));

        // A later rate would price differently; the stored line keeps its cost
        let repriced = order_line_cost(dec("4.80"), Currency::Usd, Some(dec("2850"))).unwrap();
        assert_ne!(lines[0].box_cost, repriced);
    }

    #[test]
    fn test_cdf_products_order_without_any_rate() {
        let serum = Uuid::new_v4();
        let products = HashMap::from([(serum, product("3500", Currency::Cdf, 24))]);

        let lines = build_order(&products, &[(serum, 2)], &HashSet::new(), None).unwrap();
        assert_eq!(lines[0].box_cost, dec("3500"));
    }

    #[test]
    fn test_usd_products_cannot_be_ordered_without_a_rate() {
        let imported = Uuid::new_v4();
        let products = HashMap::from([(imported, product("12.50", Currency::Usd, 100))]);

        let result = build_order(&products, &[(imported, 1)], &HashSet::new(), None);
        assert_eq!(result.unwrap_err(), OrderRejection::MissingRate);
    }

    #[test]
    fn test_a_product_already_ordered_today_is_refused() {
        let reordered = Uuid::new_v4();
        let products = HashMap::from([(reordered, product("3500", Currency::Cdf, 24))]);
        let ordered_today = HashSet::from([reordered]);

        let result = build_order(&products, &[(reordered, 1)], &ordered_today, None);
        assert_eq!(result.unwrap_err(), OrderRejection::AlreadyOrderedToday);
    }

    #[test]
    fn test_empty_and_duplicate_requests_are_refused() {
        let id = Uuid::new_v4();
        let products = HashMap::from([(id, product("3500", Currency::Cdf, 24))]);

        assert_eq!(
            build_order(&products, &[], &HashSet::new(), None).unwrap_err(),
            OrderRejection::NoLines
        );
        assert_eq!(
            build_order(&products, &[(id, 1), (id, 3)], &HashSet::new(), None).unwrap_err(),
            OrderRejection::DuplicateLine
        );
        assert_eq!(
            build_order(&products, &[(id, 0)], &HashSet::new(), None).unwrap_err(),
            OrderRejection::BadQuantity
        );
    }
}

// ============================================================================
// Receiving
// ============================================================================

#[cfg(test)]
mod receiving {
    use super::*;

    #[test]
    fn test_boxes_convert_to_dispensable_units() {
        let paracetamol = Uuid::new_v4();
        let products = HashMap::from([(paracetamol, product("4.80", Currency::Usd, 60))]);
        let mut entries = HashMap::from([(
            paracetamol,
            StockedEntry {
                quantity: 40,
                lot_quantities: vec![40],
            },
        )]);

        let (status, units) = receive(&mut entries, &[(paracetamol, 3)], &products).unwrap();

        assert_eq!(status, OrderStatus::Confirmed);
        assert_eq!(units, 180);
        assert_eq!(entries[&paracetamol].quantity, 220);
    }

    #[test]
    fn test_first_delivery_creates_the_entry() {
        let novelty = Uuid::new_v4();
        let products = HashMap::from([(novelty, product("8000", Currency::Cdf, 12))]);
        let mut entries = HashMap::new();

        receive(&mut entries, &[(novelty, 2)], &products).unwrap();

        assert_eq!(entries[&novelty].quantity, 24);
        assert_eq!(entries[&novelty].lot_quantities, vec![24]);
    }

    #[test]
    fn test_every_delivery_becomes_its_own_lot() {
        let restocked = Uuid::new_v4();
        let products = HashMap::from([(restocked, product("8000", Currency::Cdf, 12))]);
        let mut entries = HashMap::new();

        receive(&mut entries, &[(restocked, 2)], &products).unwrap();
        receive(&mut entries, &[(restocked, 5)], &products).unwrap();

        let entry = &entries[&restocked];
        assert_eq!(entry.lot_quantities, vec![24, 60]);
        assert_eq!(entry.quantity, 84);
    }

    #[test]
    fn test_partial_deliveries_book_what_arrived() {
        // Ordered 10 boxes, only 4 turned up
        let shorted = Uuid::new_v4();
        let products = HashMap::from([(shorted, product("8000", Currency::Cdf, 12))]);
        let mut entries = HashMap::new();

        let (_, units) = receive(&mut entries, &[(shorted, 4)], &products).unwrap();

        assert_eq!(units, 48);
        assert_eq!(entries[&shorted].quantity, 48);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_aggregate_always_equals_the_sum_of_lots(
            deliveries in prop::collection::vec((1..50i32, 1..200i32), 1..10),
        ) {
            let product_id = Uuid::new_v4();
            let mut entries = HashMap::new();

            for (boxes, units_per_box) in deliveries {
                let products =
                    HashMap::from([(product_id, product("8000", Currency::Cdf, units_per_box))]);
                receive(&mut entries, &[(product_id, boxes)], &products).unwrap();
            }

            let entry = &entries[&product_id];
            let lot_sum: i32 = entry.lot_quantities.iter().sum();
            prop_assert_eq!(entry.quantity, lot_sum);
        }
    }
}
