//! Pharmacy operating expense models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of an operating expense
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Transport,
    Food,
    Equipment,
    Salary,
    Rent,
    Other,
}

impl ExpenseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Transport => "transport",
            ExpenseCategory::Food => "food",
            ExpenseCategory::Equipment => "equipment",
            ExpenseCategory::Salary => "salary",
            ExpenseCategory::Rent => "rent",
            ExpenseCategory::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "transport" => Some(ExpenseCategory::Transport),
            "food" => Some(ExpenseCategory::Food),
            "equipment" => Some(ExpenseCategory::Equipment),
            "salary" => Some(ExpenseCategory::Salary),
            "rent" => Some(ExpenseCategory::Rent),
            "other" => Some(ExpenseCategory::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an expense was paid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An operating expense recorded against a pharmacy's till, in CDF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub pharmacy_id: Uuid,
    pub category: ExpenseCategory,
    pub description: Option<String>,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub spent_on: DateTime<Utc>,
    /// User who recorded the expense
    pub user_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}
