//! Database operations for digest `recipients`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RecipientRow {
    pub id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Returns all recipients ordered by address.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recipients(pool: &PgPool) -> Result<Vec<RecipientRow>, DbError> {
    let rows = sqlx::query_as::<_, RecipientRow>(
        "SELECT id, email, created_at FROM recipients ORDER BY email",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Returns just the addresses, for building a digest.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recipient_emails(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let emails = sqlx::query_scalar::<_, String>("SELECT email FROM recipients ORDER BY email")
        .fetch_all(pool)
        .await?;
    Ok(emails)
}

/// Adds a recipient address.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the address already exists, or
/// [`DbError::Sqlx`] if the insert fails.
pub async fn add_recipient(pool: &PgPool, email: &str) -> Result<RecipientRow, DbError> {
    sqlx::query_as::<_, RecipientRow>(
        "INSERT INTO recipients (email) VALUES ($1) RETURNING id, email, created_at",
    )
    .bind(email)
    .fetch_one(pool)
    .await
    .map_err(|e| DbError::from_unique_violation(e, &format!("recipient '{email}' already exists")))
}

/// Removes a recipient by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no recipient has `id`, or
/// [`DbError::Sqlx`] if the delete fails.
pub async fn delete_recipient(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM recipients WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
