//! Client registry and loyalty
//!
//! Clients are registered per pharmacy and identified by phone within
//! it. Loyalty points accrue at sale time; the spending statistics are
//! always recomputed from the sales record rather than patched
//! incrementally.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::models::{Client, ClientPurchase};
use shared::types::Pagination;
use shared::validation::validate_client_phone;

#[derive(Clone)]
pub struct ClientService {
    db: PgPool,
}

#[derive(Debug, Deserialize)]
pub struct CreateClientInput {
    pub full_name: String,
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClientInput {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

const CLIENT_COLUMNS: &str =
    "id, pharmacy_id, full_name, phone, loyalty_score, total_spent, last_purchase_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ClientRow {
    id: Uuid,
    pharmacy_id: Uuid,
    full_name: String,
    phone: String,
    loyalty_score: i32,
    total_spent: Decimal,
    last_purchase_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ClientRow {
    fn into_model(self) -> Client {
        Client {
            id: self.id,
            pharmacy_id: self.pharmacy_id,
            full_name: self.full_name,
            phone: self.phone,
            loyalty_score: self.loyalty_score,
            total_spent: self.total_spent,
            last_purchase_at: self.last_purchase_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

type PurchaseRow = (Uuid, Uuid, Uuid, i32, i32, DateTime<Utc>, DateTime<Utc>);

fn purchase_from_row(row: PurchaseRow) -> ClientPurchase {
    ClientPurchase {
        id: row.0,
        client_id: row.1,
        catalog_entry_id: row.2,
        quantity: row.3,
        points: row.4,
        purchased_at: row.5,
        updated_at: row.6,
    }
}

impl ClientService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Register a client with a pharmacy
    pub async fn create_client(
        &self,
        pharmacy_id: Uuid,
        input: CreateClientInput,
    ) -> AppResult<Client> {
        // Validate
        let full_name = input.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(AppError::Validation {
                field: "full_name".to_string(),
                message: "Client name cannot be empty".to_string(),
            });
        }
        validate_client_phone(&input.phone).map_err(|msg| AppError::Validation {
            field: "phone".to_string(),
            message: msg.to_string(),
        })?;
        self.ensure_phone_free(pharmacy_id, &input.phone, None).await?;

        let query = format!(
            r#"
            INSERT INTO clients (pharmacy_id, full_name, phone)
            VALUES ($1, $2, $3)
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ClientRow>(&query)
            .bind(pharmacy_id)
            .bind(&full_name)
            .bind(&input.phone)
            .fetch_one(&self.db)
            .await?;

        Ok(row.into_model())
    }

    pub async fn get_client(&self, pharmacy_id: Uuid, client_id: Uuid) -> AppResult<Client> {
        let query = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1 AND pharmacy_id = $2");
        let row = sqlx::query_as::<_, ClientRow>(&query)
            .bind(client_id)
            .bind(pharmacy_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Client".to_string()))?;

        Ok(row.into_model())
    }

    pub async fn list_clients(&self, pharmacy_id: Uuid, page: &Pagination) -> AppResult<Vec<Client>> {
        let query = format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE pharmacy_id = $1 ORDER BY full_name LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, ClientRow>(&query)
            .bind(pharmacy_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.db)
            .await?;

        Ok(rows.into_iter().map(ClientRow::into_model).collect())
    }

    pub async fn update_client(
        &self,
        pharmacy_id: Uuid,
        client_id: Uuid,
        input: UpdateClientInput,
    ) -> AppResult<Client> {
        let current = self.get_client(pharmacy_id, client_id).await?;

        let full_name = match input.full_name {
            Some(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(AppError::Validation {
                        field: "full_name".to_string(),
                        message: "Client name cannot be empty".to_string(),
                    });
                }
                name
            }
            None => current.full_name,
        };

        let phone = match input.phone {
            Some(phone) if phone != current.phone => {
                validate_client_phone(&phone).map_err(|msg| AppError::Validation {
                    field: "phone".to_string(),
                    message: msg.to_string(),
                })?;
                self.ensure_phone_free(pharmacy_id, &phone, Some(client_id))
                    .await?;
                phone
            }
            Some(phone) => phone,
            None => current.phone,
        };

        let query = format!(
            r#"
            UPDATE clients
            SET full_name = $1, phone = $2, updated_at = NOW()
            WHERE id = $3 AND pharmacy_id = $4
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ClientRow>(&query)
            .bind(&full_name)
            .bind(&phone)
            .bind(client_id)
            .bind(pharmacy_id)
            .fetch_one(&self.db)
            .await?;

        Ok(row.into_model())
    }

    /// A client's purchase history, newest first
    pub async fn purchase_history(
        &self,
        pharmacy_id: Uuid,
        client_id: Uuid,
    ) -> AppResult<Vec<ClientPurchase>> {
        self.get_client(pharmacy_id, client_id).await?;

        let rows = sqlx::query_as::<_, PurchaseRow>(
            r#"
            SELECT id, client_id, catalog_entry_id, quantity, points, purchased_at, updated_at
            FROM client_purchases
            WHERE client_id = $1
            ORDER BY purchased_at DESC
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(purchase_from_row).collect())
    }

    /// Rebuild a client's spending statistics from the sales record
    pub async fn recompute_stats(&self, pharmacy_id: Uuid, client_id: Uuid) -> AppResult<Client> {
        self.get_client(pharmacy_id, client_id).await?;

        let query = format!(
            r#"
            UPDATE clients
            SET total_spent = (SELECT COALESCE(SUM(total), 0) FROM sales WHERE client_id = $1),
                last_purchase_at = (SELECT MAX(sold_at) FROM sales WHERE client_id = $1),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ClientRow>(&query)
            .bind(client_id)
            .fetch_one(&self.db)
            .await?;

        Ok(row.into_model())
    }

    async fn ensure_phone_free(
        &self,
        pharmacy_id: Uuid,
        phone: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<()> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM clients
                WHERE pharmacy_id = $1 AND phone = $2 AND ($3::uuid IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(pharmacy_id)
        .bind(phone)
        .bind(exclude)
        .fetch_one(&self.db)
        .await?;

        if taken {
            return Err(AppError::DuplicateEntry(format!(
                "Phone {} is already registered with this pharmacy",
                phone
            )));
        }

        Ok(())
    }
}
