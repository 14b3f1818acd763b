//! Tests for currency conversion and catalog price derivation
//!
//! All amounts end up in CDF at two decimal places; USD conversions must
//! fail outright when no rate is recorded.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::{box_cost_in_cdf, compute_entry_prices, order_line_cost, round2, Currency, PricingError};

/// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_round2_midpoint_rounds_away_from_zero() {
        assert_eq!(round2(dec("2.345")), dec("2.35"));
        assert_eq!(round2(dec("2.344")), dec("2.34"));
        assert_eq!(round2(dec("-2.345")), dec("-2.35"));
        assert_eq!(round2(dec("4.4955")), dec("4.50"));
    }

    #[test]
    fn test_round2_leaves_two_decimal_amounts_alone() {
        assert_eq!(round2(dec("1500.00")), dec("1500.00"));
        assert_eq!(round2(dec("0.01")), dec("0.01"));
    }

    #[test]
    fn test_cdf_box_price_passes_through() {
        assert_eq!(
            box_cost_in_cdf(dec("4500"), Currency::Cdf, None).unwrap(),
            dec("4500")
        );
        // A recorded rate is irrelevant for CDF prices
        assert_eq!(
            box_cost_in_cdf(dec("4500"), Currency::Cdf, Some(dec("2700"))).unwrap(),
            dec("4500")
        );
    }

    #[test]
    fn test_usd_box_price_converts_at_rate() {
        assert_eq!(
            box_cost_in_cdf(dec("4.80"), Currency::Usd, Some(dec("2700"))).unwrap(),
            dec("12960.00")
        );
    }

    #[test]
    fn test_usd_without_rate_is_rejected() {
        assert_eq!(
            box_cost_in_cdf(dec("4.80"), Currency::Usd, None),
            Err(PricingError::MissingExchangeRate)
        );
    }

    #[test]
    fn test_entry_prices_usd_product() {
        // $4.80 box at 2700 CDF/USD, 60 units, 35% margin
        let prices =
            compute_entry_prices(dec("4.80"), Currency::Usd, 60, dec("35"), Some(dec("2700")))
                .unwrap();
        assert_eq!(prices.unit_cost, dec("216.00"));
        assert_eq!(prices.sale_price, dec("291.60"));
    }

    #[test]
    fn test_entry_prices_divide_the_box_evenly() {
        // $10.00 box at 2800 CDF/USD, 5 units, 35% margin
        let prices =
            compute_entry_prices(dec("10.00"), Currency::Usd, 5, dec("35"), Some(dec("2800")))
                .unwrap();
        assert_eq!(prices.unit_cost, dec("5600.00"));
        assert_eq!(prices.sale_price, dec("7560.00"));
    }

    #[test]
    fn test_entry_prices_rounds_each_stage() {
        // 10 CDF over 3 units: cost rounds to 3.33, then margin rounds again
        let prices = compute_entry_prices(dec("10"), Currency::Cdf, 3, dec("35"), None).unwrap();
        assert_eq!(prices.unit_cost, dec("3.33"));
        assert_eq!(prices.sale_price, dec("4.50"));
    }

    #[test]
    fn test_entry_prices_zero_margin_sells_at_cost() {
        let prices = compute_entry_prices(dec("1200"), Currency::Cdf, 12, dec("0"), None).unwrap();
        assert_eq!(prices.unit_cost, dec("100.00"));
        assert_eq!(prices.sale_price, prices.unit_cost);
    }

    #[test]
    fn test_entry_prices_reject_nonpositive_units() {
        assert_eq!(
            compute_entry_prices(dec("10"), Currency::Cdf, 0, dec("35"), None),
            Err(PricingError::InvalidUnitCount)
        );
        assert_eq!(
            compute_entry_prices(dec("10"), Currency::Cdf, -4, dec("35"), None),
            Err(PricingError::InvalidUnitCount)
        );
    }

    #[test]
    fn test_entry_prices_usd_without_rate_fails_before_margin() {
        assert_eq!(
            compute_entry_prices(dec("4.80"), Currency::Usd, 60, dec("35"), None),
            Err(PricingError::MissingExchangeRate)
        );
    }

    #[test]
    fn test_order_line_cost_snapshots_at_currency_precision() {
        assert_eq!(
            order_line_cost(dec("7.25"), Currency::Usd, Some(dec("2835.5"))).unwrap(),
            dec("20557.38")
        );
        assert_eq!(
            order_line_cost(dec("1500"), Currency::Cdf, None).unwrap(),
            dec("1500")
        );
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for box prices with cent precision
    fn price_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..1_000_000).prop_map(|cents| Decimal::new(cents, 2))
    }

    /// Strategy for plausible USD→CDF rates
    fn rate_strategy() -> impl Strategy<Value = Decimal> {
        (1_000i64..5_000_00).prop_map(|hundredths| Decimal::new(hundredths, 2))
    }

    /// Strategy for margins as whole percents
    fn margin_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..300).prop_map(Decimal::from)
    }

    fn units_strategy() -> impl Strategy<Value = i32> {
        1..500i32
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_round2_is_idempotent(cents in -1_000_000i64..1_000_000, scale in 0u32..6) {
            let amount = Decimal::new(cents, scale);
            prop_assert_eq!(round2(round2(amount)), round2(amount));
        }

        #[test]
        fn test_round2_stays_within_half_a_cent(cents in -1_000_000i64..1_000_000, scale in 0u32..6) {
            let amount = Decimal::new(cents, scale);
            let delta = (round2(amount) - amount).abs();
            prop_assert!(delta <= dec("0.005"));
        }

        #[test]
        fn test_usd_conversion_is_exact_before_rounding(
            price in price_strategy(),
            rate in rate_strategy(),
        ) {
            let converted = box_cost_in_cdf(price, Currency::Usd, Some(rate)).unwrap();
            prop_assert_eq!(converted, price * rate);
        }

        #[test]
        fn test_entry_prices_are_deterministic(
            price in price_strategy(),
            rate in rate_strategy(),
            margin in margin_strategy(),
            units in units_strategy(),
        ) {
            let first = compute_entry_prices(price, Currency::Usd, units, margin, Some(rate)).unwrap();
            let second = compute_entry_prices(price, Currency::Usd, units, margin, Some(rate)).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn test_sale_price_never_below_cost(
            price in price_strategy(),
            margin in margin_strategy(),
            units in units_strategy(),
        ) {
            let prices = compute_entry_prices(price, Currency::Cdf, units, margin, None).unwrap();
            prop_assert!(prices.sale_price >= prices.unit_cost);
        }

        #[test]
        fn test_higher_margin_never_lowers_sale_price(
            price in price_strategy(),
            margin in 0i64..299,
            units in units_strategy(),
        ) {
            let lower = compute_entry_prices(price, Currency::Cdf, units, Decimal::from(margin), None).unwrap();
            let higher = compute_entry_prices(price, Currency::Cdf, units, Decimal::from(margin + 1), None).unwrap();
            prop_assert!(higher.sale_price >= lower.sale_price);
        }

        #[test]
        fn test_cdf_prices_ignore_the_rate(
            price in price_strategy(),
            rate in rate_strategy(),
            margin in margin_strategy(),
            units in units_strategy(),
        ) {
            let with_rate = compute_entry_prices(price, Currency::Cdf, units, margin, Some(rate)).unwrap();
            let without = compute_entry_prices(price, Currency::Cdf, units, margin, None).unwrap();
            prop_assert_eq!(with_rate, without);
        }
    }
}

// ============================================================================
// Repricing Sweep Simulation
// ============================================================================

#[cfg(test)]
mod integration_helpers {
    use super::*;
    use shared::EntryPrices;

    struct UsdEntry {
        box_price: Decimal,
        units_per_box: i32,
        margin_percent: Decimal,
        cached: EntryPrices,
    }

    /// Recompute every USD entry under a new rate, the way a rate change
    /// sweeps the catalog
    fn sweep(entries: &mut [UsdEntry], rate: Decimal) {
        for entry in entries.iter_mut() {
            entry.cached = compute_entry_prices(
                entry.box_price,
                Currency::Usd,
                entry.units_per_box,
                entry.margin_percent,
                Some(rate),
            )
            .unwrap();
        }
    }

    fn catalog() -> Vec<UsdEntry> {
        let initial = dec("2700");
        [("4.80", 60, "35"), ("12.50", 100, "40"), ("0.99", 10, "35")]
            .into_iter()
            .map(|(price, units, margin)| UsdEntry {
                box_price: dec(price),
                units_per_box: units,
                margin_percent: dec(margin),
                cached: compute_entry_prices(
                    dec(price),
                    Currency::Usd,
                    units,
                    dec(margin),
                    Some(initial),
                )
                .unwrap(),
            })
            .collect()
    }

    #[test]
    fn test_rate_change_updates_every_usd_entry() {
        let mut entries = catalog();
        let before: Vec<EntryPrices> = entries.iter().map(|e| e.cached).collect();

        sweep(&mut entries, dec("2850"));

        for (entry, old) in entries.iter().zip(before) {
            assert_ne!(entry.cached, old);
            let fresh = compute_entry_prices(
                entry.box_price,
                Currency::Usd,
                entry.units_per_box,
                entry.margin_percent,
                Some(dec("2850")),
            )
            .unwrap();
            assert_eq!(entry.cached, fresh);
        }
    }

    #[test]
    fn test_sweeping_twice_at_the_same_rate_changes_nothing() {
        let mut entries = catalog();

        sweep(&mut entries, dec("2850"));
        let after_first: Vec<EntryPrices> = entries.iter().map(|e| e.cached).collect();

        sweep(&mut entries, dec("2850"));
        let after_second: Vec<EntryPrices> = entries.iter().map(|e| e.cached).collect();

        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_sweeping_back_to_the_original_rate_restores_prices() {
        let mut entries = catalog();
        let original: Vec<EntryPrices> = entries.iter().map(|e| e.cached).collect();

        sweep(&mut entries, dec("2850"));
        sweep(&mut entries, dec("2700"));

        let restored: Vec<EntryPrices> = entries.iter().map(|e| e.cached).collect();
        assert_eq!(original, restored);
    }
}
