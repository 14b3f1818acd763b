//! Expense tracking
//!
//! Cash expenses recorded against a pharmacy's till, in CDF.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::models::{Expense, ExpenseCategory, PaymentMethod};
use shared::types::DateRange;
use shared::validation::validate_positive_amount;

#[derive(Clone)]
pub struct ExpenseService {
    db: PgPool,
}

#[derive(Debug, Deserialize)]
pub struct RecordExpenseInput {
    pub category: ExpenseCategory,
    pub description: Option<String>,
    pub amount: Decimal,
    /// Defaults to cash
    pub payment_method: Option<PaymentMethod>,
    /// Defaults to now
    pub spent_on: Option<DateTime<Utc>>,
    /// User recording the expense
    pub user_id: Option<Uuid>,
}

const EXPENSE_COLUMNS: &str =
    "id, pharmacy_id, category, description, amount, payment_method, spent_on, user_id, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ExpenseRow {
    id: Uuid,
    pharmacy_id: Uuid,
    category: String,
    description: Option<String>,
    amount: Decimal,
    payment_method: String,
    spent_on: DateTime<Utc>,
    user_id: Option<Uuid>,
    updated_at: DateTime<Utc>,
}

impl ExpenseRow {
    fn into_model(self) -> AppResult<Expense> {
        let category = ExpenseCategory::from_str(&self.category).ok_or_else(|| {
            AppError::Internal(format!("Unknown expense category {} on expense {}", self.category, self.id))
        })?;
        let payment_method = PaymentMethod::from_str(&self.payment_method).ok_or_else(|| {
            AppError::Internal(format!(
                "Unknown payment method {} on expense {}",
                self.payment_method, self.id
            ))
        })?;

        Ok(Expense {
            id: self.id,
            pharmacy_id: self.pharmacy_id,
            category,
            description: self.description,
            amount: self.amount,
            payment_method,
            spent_on: self.spent_on,
            user_id: self.user_id,
            updated_at: self.updated_at,
        })
    }
}

impl ExpenseService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record an expense; amounts must be strictly positive
    pub async fn record_expense(
        &self,
        pharmacy_id: Uuid,
        input: RecordExpenseInput,
    ) -> AppResult<Expense> {
        validate_positive_amount(input.amount).map_err(|msg| AppError::Validation {
            field: "amount".to_string(),
            message: msg.to_string(),
        })?;

        let payment_method = input.payment_method.unwrap_or(PaymentMethod::Cash);
        let spent_on = input.spent_on.unwrap_or_else(Utc::now);

        let query = format!(
            r#"
            INSERT INTO expenses (pharmacy_id, category, description, amount, payment_method, spent_on, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {EXPENSE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ExpenseRow>(&query)
            .bind(pharmacy_id)
            .bind(input.category.as_str())
            .bind(input.description)
            .bind(input.amount)
            .bind(payment_method.as_str())
            .bind(spent_on)
            .bind(input.user_id)
            .fetch_one(&self.db)
            .await?;

        row.into_model()
    }

    /// Expenses of a pharmacy, optionally restricted to a date range
    pub async fn list_expenses(
        &self,
        pharmacy_id: Uuid,
        range: Option<&DateRange>,
    ) -> AppResult<Vec<Expense>> {
        let rows = match range {
            Some(range) => {
                let query = format!(
                    r#"
                    SELECT {EXPENSE_COLUMNS} FROM expenses
                    WHERE pharmacy_id = $1 AND spent_on::date >= $2 AND spent_on::date <= $3
                    ORDER BY spent_on DESC
                    "#
                );
                sqlx::query_as::<_, ExpenseRow>(&query)
                    .bind(pharmacy_id)
                    .bind(range.start)
                    .bind(range.end)
                    .fetch_all(&self.db)
                    .await?
            }
            None => {
                let query = format!(
                    "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE pharmacy_id = $1 ORDER BY spent_on DESC"
                );
                sqlx::query_as::<_, ExpenseRow>(&query)
                    .bind(pharmacy_id)
                    .fetch_all(&self.db)
                    .await?
            }
        };

        rows.into_iter().map(ExpenseRow::into_model).collect()
    }
}
