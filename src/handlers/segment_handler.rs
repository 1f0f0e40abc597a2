//! Expense Segment Handlers
//!
//! Splitting an expense into category segments. The expense row is locked
//! for the duration of each write, so two concurrent splits of the same
//! expense serialize and the set is validated against a stable amount.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    check_segment_batch, check_segment_fits, percentage_of, DomainError, SegmentInput,
    SegmentRecord,
};
use crate::error::AppResult;

// =========================================================================
// SegmentHandler
// =========================================================================

/// Handler for listing and writing an expense's segments
pub struct SegmentHandler {
    pool: PgPool,
}

impl SegmentHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List an expense's segments ordered by category.
    pub async fn list(&self, expense_id: Uuid) -> AppResult<Vec<SegmentRecord>> {
        let rows: Vec<SegmentRow> = sqlx::query_as(
            r#"
            SELECT id, expense_id, category, amount, percentage, created_at, updated_at
            FROM expense_segments
            WHERE expense_id = $1
            ORDER BY category
            "#,
        )
        .bind(expense_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(segment_row_to_record).collect())
    }

    /// Add the first segment to an unsegmented expense. An expense that
    /// already has segments rejects single additions; the whole set must
    /// be replaced instead.
    pub async fn add(&self, expense_id: Uuid, input: SegmentInput) -> AppResult<SegmentRecord> {
        let mut tx = self.pool.begin().await?;

        let expense_amount = lock_expense_amount(&mut tx, expense_id).await?;

        check_segment_fits(expense_amount, input.amount)?;

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM expense_segments WHERE expense_id = $1")
                .bind(expense_id)
                .fetch_one(&mut *tx)
                .await?;
        if existing > 0 {
            return Err(DomainError::invalid_operation(
                "Expense already has segments. Replace the whole set to modify them.",
            )
            .into());
        }

        let record = insert_segment(&mut tx, expense_id, expense_amount, &input).await?;

        tx.commit().await?;

        tracing::info!(segment_id = %record.id, expense_id = %expense_id, "segment created");

        Ok(record)
    }

    /// Replace an expense's whole segment set. The new set is validated
    /// against the expense amount before any existing segment is touched.
    pub async fn replace(
        &self,
        expense_id: Uuid,
        inputs: Vec<SegmentInput>,
    ) -> AppResult<Vec<SegmentRecord>> {
        let mut tx = self.pool.begin().await?;

        let expense_amount = lock_expense_amount(&mut tx, expense_id).await?;

        check_segment_batch(expense_amount, &inputs)?;

        sqlx::query("DELETE FROM expense_segments WHERE expense_id = $1")
            .bind(expense_id)
            .execute(&mut *tx)
            .await?;

        let mut records = Vec::with_capacity(inputs.len());
        for input in &inputs {
            records.push(insert_segment(&mut tx, expense_id, expense_amount, input).await?);
        }

        tx.commit().await?;

        tracing::info!(expense_id = %expense_id, count = records.len(), "segments replaced");

        Ok(records)
    }
}

type SegmentRow = (
    Uuid,
    Uuid,
    String,
    Decimal,
    Decimal,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn segment_row_to_record(row: SegmentRow) -> SegmentRecord {
    let (id, expense_id, category, amount, percentage, created_at, updated_at) = row;
    SegmentRecord {
        id,
        expense_id,
        category,
        amount,
        percentage,
        created_at,
        updated_at,
    }
}

/// Read the expense amount under a `FOR UPDATE` lock.
async fn lock_expense_amount(
    tx: &mut Transaction<'_, Postgres>,
    expense_id: Uuid,
) -> AppResult<Decimal> {
    let amount: Option<Decimal> =
        sqlx::query_scalar("SELECT amount FROM expenses WHERE id = $1 FOR UPDATE")
            .bind(expense_id)
            .fetch_optional(&mut **tx)
            .await?;

    amount.ok_or_else(|| DomainError::not_found("Expense", expense_id.to_string()).into())
}

async fn insert_segment(
    tx: &mut Transaction<'_, Postgres>,
    expense_id: Uuid,
    expense_amount: Decimal,
    input: &SegmentInput,
) -> AppResult<SegmentRecord> {
    let percentage = input
        .percentage
        .unwrap_or_else(|| percentage_of(input.amount, expense_amount));

    let row: SegmentRow = sqlx::query_as(
        r#"
        INSERT INTO expense_segments
            (id, expense_id, category, amount, percentage, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        RETURNING id, expense_id, category, amount, percentage, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(expense_id)
    .bind(input.category.trim())
    .bind(input.amount)
    .bind(percentage)
    .fetch_one(&mut **tx)
    .await?;

    Ok(segment_row_to_record(row))
}
