//! Validation utilities for the pharmacy management platform
//!
//! Includes DRC-specific validations for data captured from Congolese
//! pharmacies and suppliers.

use rust_decimal::Decimal;

use crate::models::{BARCODE_CHARSET, BARCODE_LENGTH};

// ============================================================================
// Pricing & Inventory Validations
// ============================================================================

/// Validate a margin percentage fits the stored precision (two decimals,
/// below 1000)
pub fn validate_margin_percent(margin: Decimal) -> Result<(), &'static str> {
    if margin < Decimal::ZERO {
        return Err("Margin percent cannot be negative");
    }
    if margin >= Decimal::from(1000) {
        return Err("Margin percent must be below 1000");
    }
    Ok(())
}

/// Validate the declared box packing size
pub fn validate_units_per_box(units: i32) -> Result<(), &'static str> {
    if units <= 0 {
        return Err("Units per box must be strictly positive");
    }
    Ok(())
}

/// Validate an exchange rate value
pub fn validate_exchange_rate(rate: Decimal) -> Result<(), &'static str> {
    if rate <= Decimal::ZERO {
        return Err("Exchange rate must be strictly positive");
    }
    Ok(())
}

/// Validate a shelf barcode (6 characters from the generation charset)
pub fn validate_barcode(code: &str) -> Result<(), &'static str> {
    if code.len() != BARCODE_LENGTH {
        return Err("Barcode must be exactly 6 characters");
    }
    if !code.bytes().all(|b| BARCODE_CHARSET.contains(&b)) {
        return Err("Barcode contains characters outside the allowed set");
    }
    Ok(())
}

/// Validate a supplier-provided lot number
pub fn validate_lot_number(number: &str) -> Result<(), &'static str> {
    if number.trim().is_empty() {
        return Err("Lot number cannot be empty");
    }
    if number.len() > 50 {
        return Err("Lot number must be at most 50 characters");
    }
    Ok(())
}

/// Validate a quantity that must move stock
pub fn validate_positive_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be strictly positive");
    }
    Ok(())
}

/// Validate a stock alert threshold
pub fn validate_alert_threshold(threshold: i32) -> Result<(), &'static str> {
    if threshold < 0 {
        return Err("Alert threshold cannot be negative");
    }
    Ok(())
}

/// Validate a monetary amount that must be strictly positive
pub fn validate_positive_amount(amount: Decimal) -> Result<(), &'static str> {
    if amount <= Decimal::ZERO {
        return Err("Amount must be strictly positive");
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    if email.contains('@') && email.contains('.') && email.len() >= 5 {
        Ok(())
    } else {
        Err("Invalid email format")
    }
}

/// Validate a client phone number (8 to 15 digits, digits only)
pub fn validate_client_phone(phone: &str) -> Result<(), &'static str> {
    if phone.len() < 8 {
        return Err("Phone number must be at least 8 digits");
    }
    if phone.len() > 15 {
        return Err("Phone number must be at most 15 digits");
    }
    if !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err("Phone number must contain digits only");
    }
    Ok(())
}

// ============================================================================
// DRC-Specific Validations
// ============================================================================

/// Validate a DRC phone number format
/// Accepts: 0812345678, 081-234-5678, +243812345678
pub fn validate_drc_phone(phone: &str) -> Result<(), &'static str> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    // National format: 10 digits starting with 0 (e.g., 0812345678)
    if digits.len() == 10 && digits.starts_with('0') {
        return Ok(());
    }
    // Without leading zero: 9 digits (e.g., 812345678)
    if digits.len() == 9 && !digits.starts_with('0') {
        return Ok(());
    }
    // International format with country code: 12 digits starting with 243
    if digits.len() == 12 && digits.starts_with("243") {
        return Ok(());
    }

    Err("Invalid DRC phone number format")
}

/// Validate a DRC trade register (RCCM) number
/// Format: CD/<office>/RCCM/<sequence> (e.g., CD/KNG/RCCM/22-B-01234)
pub fn validate_rccm_number(number: &str) -> Result<(), &'static str> {
    let parts: Vec<&str> = number.split('/').collect();

    if parts.len() < 4 {
        return Err("RCCM number must be in format CD/<office>/RCCM/<sequence>");
    }
    if parts[0] != "CD" {
        return Err("RCCM number must start with 'CD'");
    }
    if parts[1].is_empty() {
        return Err("RCCM number is missing its registry office");
    }
    if parts[2] != "RCCM" {
        return Err("RCCM number must carry the 'RCCM' marker");
    }
    if parts[3].is_empty() {
        return Err("RCCM number is missing its sequence");
    }
    Ok(())
}

/// Communes of Kinshasa
pub const KINSHASA_COMMUNES: &[&str] = &[
    "Bandalungwa",
    "Barumbu",
    "Bumbu",
    "Gombe",
    "Kalamu",
    "Kasa-Vubu",
    "Kimbanseke",
    "Kinshasa",
    "Kintambo",
    "Kisenso",
    "Lemba",
    "Limete",
    "Lingwala",
    "Makala",
    "Maluku",
    "Masina",
    "Matete",
    "Mont-Ngafula",
    "Ndjili",
    "Ngaba",
    "Ngaliema",
    "Ngiri-Ngiri",
    "Nsele",
    "Selembao",
];

/// Check if a commune is a known Kinshasa commune
pub fn is_kinshasa_commune(commune: &str) -> bool {
    let commune_lower = commune.to_lowercase();
    KINSHASA_COMMUNES
        .iter()
        .any(|c| c.to_lowercase() == commune_lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Pricing & Inventory Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_margin_percent_valid() {
        assert!(validate_margin_percent(Decimal::new(3500, 2)).is_ok());
        assert!(validate_margin_percent(Decimal::ZERO).is_ok());
        assert!(validate_margin_percent(Decimal::new(99999, 2)).is_ok());
    }

    #[test]
    fn test_validate_margin_percent_invalid() {
        assert!(validate_margin_percent(Decimal::from(-1)).is_err());
        assert!(validate_margin_percent(Decimal::from(1000)).is_err());
    }

    #[test]
    fn test_validate_units_per_box() {
        assert!(validate_units_per_box(1).is_ok());
        assert!(validate_units_per_box(30).is_ok());
        assert!(validate_units_per_box(0).is_err());
        assert!(validate_units_per_box(-5).is_err());
    }

    #[test]
    fn test_validate_exchange_rate() {
        assert!(validate_exchange_rate(Decimal::new(285000, 2)).is_ok());
        assert!(validate_exchange_rate(Decimal::ZERO).is_err());
        assert!(validate_exchange_rate(Decimal::from(-10)).is_err());
    }

    #[test]
    fn test_validate_barcode_valid() {
        assert!(validate_barcode("aB3!@^").is_ok());
        assert!(validate_barcode("XYZ789").is_ok());
    }

    #[test]
    fn test_validate_barcode_invalid() {
        assert!(validate_barcode("abc12").is_err()); // Too short
        assert!(validate_barcode("abc1234").is_err()); // Too long
        assert!(validate_barcode("abc 12").is_err()); // Space outside charset
    }

    #[test]
    fn test_validate_lot_number_valid() {
        assert!(validate_lot_number("lot-aB3!@%&*12").is_ok());
        assert!(validate_lot_number("BATCH-2024-07").is_ok());
    }

    #[test]
    fn test_validate_lot_number_invalid() {
        assert!(validate_lot_number("").is_err());
        assert!(validate_lot_number("   ").is_err());
        assert!(validate_lot_number(&"x".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_positive_quantity() {
        assert!(validate_positive_quantity(1).is_ok());
        assert!(validate_positive_quantity(0).is_err());
        assert!(validate_positive_quantity(-3).is_err());
    }

    #[test]
    fn test_validate_alert_threshold() {
        assert!(validate_alert_threshold(0).is_ok());
        assert!(validate_alert_threshold(8).is_ok());
        assert!(validate_alert_threshold(-1).is_err());
    }

    #[test]
    fn test_validate_positive_amount() {
        assert!(validate_positive_amount(Decimal::new(1500, 2)).is_ok());
        assert!(validate_positive_amount(Decimal::ZERO).is_err());
        assert!(validate_positive_amount(Decimal::from(-20)).is_err());
    }

    // ========================================================================
    // General Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_email_valid() {
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("user.name@domain.cd").is_ok());
    }

    #[test]
    fn test_validate_email_invalid() {
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("no@domain").is_err());
        assert!(validate_email("@.").is_err());
    }

    #[test]
    fn test_validate_client_phone_valid() {
        assert!(validate_client_phone("81234567").is_ok());
        assert!(validate_client_phone("0812345678").is_ok());
        assert!(validate_client_phone("243812345678").is_ok());
    }

    #[test]
    fn test_validate_client_phone_invalid() {
        assert!(validate_client_phone("1234567").is_err()); // Too short
        assert!(validate_client_phone("1234567890123456").is_err()); // Too long
        assert!(validate_client_phone("08-1234-567").is_err()); // Formatting chars
    }

    // ========================================================================
    // DRC-Specific Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_drc_phone_valid() {
        // Standard national mobile
        assert!(validate_drc_phone("0812345678").is_ok());
        // With dashes
        assert!(validate_drc_phone("081-234-5678").is_ok());
        // Without leading zero
        assert!(validate_drc_phone("812345678").is_ok());
        // International format
        assert!(validate_drc_phone("+243812345678").is_ok());
        assert!(validate_drc_phone("243812345678").is_ok());
    }

    #[test]
    fn test_validate_drc_phone_invalid() {
        assert!(validate_drc_phone("12345").is_err());
        assert!(validate_drc_phone("1234567890123").is_err());
        assert!(validate_drc_phone("abcdefghij").is_err());
    }

    #[test]
    fn test_validate_rccm_number_valid() {
        assert!(validate_rccm_number("CD/KNG/RCCM/22-B-01234").is_ok());
        assert!(validate_rccm_number("CD/LSH/RCCM/19-A-00007").is_ok());
    }

    #[test]
    fn test_validate_rccm_number_invalid() {
        assert!(validate_rccm_number("KNG/RCCM/22-B-01234").is_err());
        assert!(validate_rccm_number("CD/KNG/22-B-01234").is_err());
        assert!(validate_rccm_number("CD//RCCM/22-B-01234").is_err());
        assert!(validate_rccm_number("CD/KNG/RCCM/").is_err());
    }

    #[test]
    fn test_is_kinshasa_commune() {
        assert!(is_kinshasa_commune("Gombe"));
        assert!(is_kinshasa_commune("gombe")); // Case insensitive
        assert!(is_kinshasa_commune("Mont-Ngafula"));
        assert!(!is_kinshasa_commune("Lubumbashi"));
    }
}
