//! Tests for subscription lifecycle, advertisement windows and query types

use chrono::{Duration, NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use pharmacy_management_backend::models::{
    Advertisement, Currency, ExpenseCategory, OrderStatus, Packaging, PaymentMethod, Pharmacy,
    UserRole,
};
use shared::{DateRange, Pagination};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn pharmacy(expires_on: Option<NaiveDate>) -> Pharmacy {
    Pharmacy {
        id: Uuid::new_v4(),
        name: "Pharmacie du Rond-Point".to_string(),
        city: "Kinshasa".to_string(),
        commune: "Gombe".to_string(),
        address: "12 Avenue de la Paix".to_string(),
        national_id: "CD/KNG/RCCM/22-B-01234".to_string(),
        phone: "0812345678".to_string(),
        logo_url: None,
        location: None,
        monthly_fee: Decimal::new(5000, 2),
        is_active: true,
        expires_on,
        created_at: Utc::now(),
    }
}

// ============================================================================
// Subscription Lifecycle
// ============================================================================

mod subscription_lifecycle {
    use super::*;

    #[test]
    fn no_expiration_date_never_expires() {
        let open_ended = pharmacy(None);
        assert!(!open_ended.is_expired(date(2026, 8, 22)));
        assert_eq!(open_ended.days_remaining(date(2026, 8, 22)), None);
    }

    #[test]
    fn valid_through_the_expiration_date_itself() {
        let subject = pharmacy(Some(date(2026, 8, 22)));
        assert!(!subject.is_expired(date(2026, 8, 22)));
        assert!(subject.is_expired(date(2026, 8, 23)));
    }

    #[test]
    fn days_remaining_counts_down_to_zero() {
        let subject = pharmacy(Some(date(2026, 9, 21)));
        assert_eq!(subject.days_remaining(date(2026, 8, 22)), Some(30));
        assert_eq!(subject.days_remaining(date(2026, 9, 21)), Some(0));
    }

    #[test]
    fn lapsed_subscriptions_report_zero_not_negative_days() {
        let lapsed = pharmacy(Some(date(2026, 8, 1)));
        assert!(lapsed.is_expired(date(2026, 8, 22)));
        assert_eq!(lapsed.days_remaining(date(2026, 8, 22)), Some(0));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn days_remaining_is_never_negative(offset in -1000i64..1000) {
            let today = date(2026, 8, 22);
            let subject = pharmacy(Some(today + Duration::days(offset)));
            let remaining = subject.days_remaining(today).unwrap();
            prop_assert!(remaining >= 0);
            prop_assert_eq!(remaining, offset.max(0));
        }

        #[test]
        fn expiry_and_days_remaining_agree(offset in -1000i64..1000) {
            let today = date(2026, 8, 22);
            let subject = pharmacy(Some(today + Duration::days(offset)));
            if subject.is_expired(today) {
                prop_assert_eq!(subject.days_remaining(today), Some(0));
            }
        }
    }
}

// ============================================================================
// Advertisement Windows
// ============================================================================

mod advertisement_windows {
    use super::*;

    fn campaign(starts_on: NaiveDate, ends_on: NaiveDate) -> Advertisement {
        Advertisement {
            id: Uuid::new_v4(),
            image_url: "https://cdn.example.cd/promos/vitamines.png".to_string(),
            description: "Promotion vitamines".to_string(),
            starts_on,
            ends_on,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn runs_on_both_boundary_days() {
        let promo = campaign(date(2026, 8, 1), date(2026, 8, 31));
        assert!(promo.is_active(date(2026, 8, 1)));
        assert!(promo.is_active(date(2026, 8, 15)));
        assert!(promo.is_active(date(2026, 8, 31)));
    }

    #[test]
    fn inactive_outside_the_window() {
        let promo = campaign(date(2026, 8, 1), date(2026, 8, 31));
        assert!(!promo.is_active(date(2026, 7, 31)));
        assert!(!promo.is_active(date(2026, 9, 1)));
    }

    #[test]
    fn single_day_campaigns_run_that_day_only() {
        let promo = campaign(date(2026, 8, 10), date(2026, 8, 10));
        assert!(promo.is_active(date(2026, 8, 10)));
        assert!(!promo.is_active(date(2026, 8, 9)));
        assert!(!promo.is_active(date(2026, 8, 11)));
    }
}

// ============================================================================
// Query Types
// ============================================================================

mod query_types {
    use super::*;

    #[test]
    fn first_page_starts_at_row_zero() {
        let page = Pagination {
            page: 1,
            per_page: 20,
        };
        assert_eq!(page.offset(), 0);
        assert_eq!(page.limit(), 20);
    }

    #[test]
    fn later_pages_offset_by_whole_pages() {
        let page = Pagination {
            page: 3,
            per_page: 20,
        };
        assert_eq!(page.offset(), 40);
    }

    #[test]
    fn page_zero_is_treated_as_the_first() {
        let page = Pagination {
            page: 0,
            per_page: 20,
        };
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn default_pagination_is_twenty_per_page() {
        let page = Pagination::default();
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 20);
    }

    #[test]
    fn date_ranges_include_both_endpoints() {
        let range = DateRange {
            start: date(2026, 8, 1),
            end: date(2026, 8, 31),
        };
        assert!(range.contains(date(2026, 8, 1)));
        assert!(range.contains(date(2026, 8, 31)));
        assert!(!range.contains(date(2026, 7, 31)));
        assert!(!range.contains(date(2026, 9, 1)));
    }
}

// ============================================================================
// Stored String Forms
// ============================================================================

// Enum columns travel as text, both in the database and in sync documents;
// every variant must survive the trip and unknown strings must be refused.
mod stored_string_forms {
    use super::*;

    #[test]
    fn order_status_round_trips() {
        for status in [OrderStatus::Pending, OrderStatus::Confirmed] {
            assert_eq!(OrderStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::from_str("cancelled"), None);
    }

    #[test]
    fn user_roles_round_trip() {
        for role in [
            UserRole::Superuser,
            UserRole::Admin,
            UserRole::Director,
            UserRole::Accountant,
        ] {
            assert_eq!(UserRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::from_str("cashier"), None);
    }

    #[test]
    fn expense_fields_round_trip() {
        for category in [
            ExpenseCategory::Transport,
            ExpenseCategory::Food,
            ExpenseCategory::Equipment,
            ExpenseCategory::Salary,
            ExpenseCategory::Rent,
            ExpenseCategory::Other,
        ] {
            assert_eq!(ExpenseCategory::from_str(category.as_str()), Some(category));
        }
        assert_eq!(PaymentMethod::from_str("cash"), Some(PaymentMethod::Cash));
        assert_eq!(PaymentMethod::from_str("mobile_money"), None);
    }

    #[test]
    fn packaging_round_trips() {
        for packaging in [Packaging::Piece, Packaging::Box, Packaging::Carton] {
            assert_eq!(Packaging::from_str(packaging.as_str()), Some(packaging));
        }
        assert_eq!(Packaging::from_str("blister"), None);
    }

    #[test]
    fn currency_parsing_ignores_case() {
        assert_eq!(Currency::from_str("USD"), Some(Currency::Usd));
        assert_eq!(Currency::from_str("usd"), Some(Currency::Usd));
        assert_eq!(Currency::from_str("cdf"), Some(Currency::Cdf));
        assert_eq!(Currency::from_str("EUR"), None);
    }
}
