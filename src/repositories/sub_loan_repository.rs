use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{HistoryEntry, SubLoan, SubLoanStatus};

/// Repository for installment rows.
///
/// Waterfall and reversal flows mutate installments under row locks inside
/// the engine's transaction; those operations take the open connection.
/// Pool-bound methods serve read paths and scheduled maintenance.
pub struct SubLoanRepository {
    pool: PgPool,
}

impl SubLoanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<SubLoan>> {
        let row = sqlx::query_as::<_, SubLoan>(
            r#"
            SELECT id, loan_id, payment_number, total_amount, paid_amount, status, due_date, paid_date, payment_history, created_at, updated_at, deleted_at
            FROM sub_loans
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_by_loan(&self, loan_id: Uuid) -> Result<Vec<SubLoan>> {
        let rows = sqlx::query_as::<_, SubLoan>(
            r#"
            SELECT id, loan_id, payment_number, total_amount, paid_amount, status, due_date, paid_date, payment_history, created_at, updated_at, deleted_at
            FROM sub_loans
            WHERE loan_id = $1 AND deleted_at IS NULL
            ORDER BY payment_number
            "#,
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Scheduled maintenance: flips PENDING installments past their due date
    /// with nothing collected to OVERDUE. Returns the number of rows flipped.
    pub async fn mark_overdue(&self, today: NaiveDate) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sub_loans
            SET status = 'OVERDUE', updated_at = NOW()
            WHERE status = 'PENDING' AND due_date < $1 AND paid_amount = 0 AND deleted_at IS NULL
            "#,
        )
        .bind(today)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Locks and fetches one installment inside the caller's transaction.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<SubLoan>> {
        let row = sqlx::query_as::<_, SubLoan>(
            r#"
            SELECT id, loan_id, payment_number, total_amount, paid_amount, status, due_date, paid_date, payment_history, created_at, updated_at, deleted_at
            FROM sub_loans
            WHERE id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Batched fetch of every PARTIAL predecessor eligible to absorb
    /// cascaded excess, locked, in ascending waterfall order.
    pub async fn lock_partial_predecessors(
        conn: &mut PgConnection,
        loan_id: Uuid,
        payment_number: i32,
    ) -> Result<Vec<SubLoan>> {
        let rows = sqlx::query_as::<_, SubLoan>(
            r#"
            SELECT id, loan_id, payment_number, total_amount, paid_amount, status, due_date, paid_date, payment_history, created_at, updated_at, deleted_at
            FROM sub_loans
            WHERE loan_id = $1 AND payment_number < $2 AND status = 'PARTIAL' AND deleted_at IS NULL
            ORDER BY payment_number
            FOR UPDATE
            "#,
        )
        .bind(loan_id)
        .bind(payment_number)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    /// Batched fetch of predecessors that have absorbed money, most recently
    /// touched first, locked. Reversal paths walk these to unwind cascades.
    pub async fn lock_touched_predecessors(
        conn: &mut PgConnection,
        loan_id: Uuid,
        payment_number: i32,
    ) -> Result<Vec<SubLoan>> {
        let rows = sqlx::query_as::<_, SubLoan>(
            r#"
            SELECT id, loan_id, payment_number, total_amount, paid_amount, status, due_date, paid_date, payment_history, created_at, updated_at, deleted_at
            FROM sub_loans
            WHERE loan_id = $1 AND payment_number < $2 AND paid_amount > 0 AND deleted_at IS NULL
            ORDER BY updated_at DESC, payment_number DESC
            FOR UPDATE
            "#,
        )
        .bind(loan_id)
        .bind(payment_number)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    /// Writes back an installment's collection state and full history inside
    /// the caller's transaction. The row must already be locked.
    pub async fn persist_state(
        conn: &mut PgConnection,
        id: Uuid,
        paid_amount: Decimal,
        status: SubLoanStatus,
        paid_date: Option<DateTime<Utc>>,
        history: &[HistoryEntry],
    ) -> Result<SubLoan> {
        let row = sqlx::query_as::<_, SubLoan>(
            r#"
            UPDATE sub_loans
            SET paid_amount = $2, status = $3, paid_date = $4, payment_history = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING id, loan_id, payment_number, total_amount, paid_amount, status, due_date, paid_date, payment_history, created_at, updated_at, deleted_at
            "#,
        )
        .bind(id)
        .bind(paid_amount)
        .bind(status)
        .bind(paid_date)
        .bind(Json(history))
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Bulk-inserts the schedule at loan issuance.
    pub async fn insert_batch(
        conn: &mut PgConnection,
        sub_loans: &[SubLoan],
    ) -> Result<Vec<SubLoan>> {
        let mut created = Vec::with_capacity(sub_loans.len());

        for sub_loan in sub_loans {
            let row = sqlx::query_as::<_, SubLoan>(
                r#"
                INSERT INTO sub_loans (id, loan_id, payment_number, total_amount, paid_amount, status, due_date, paid_date, payment_history, created_at, updated_at, deleted_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                RETURNING id, loan_id, payment_number, total_amount, paid_amount, status, due_date, paid_date, payment_history, created_at, updated_at, deleted_at
                "#,
            )
            .bind(sub_loan.id)
            .bind(sub_loan.loan_id)
            .bind(sub_loan.payment_number)
            .bind(sub_loan.total_amount)
            .bind(sub_loan.paid_amount)
            .bind(sub_loan.status)
            .bind(sub_loan.due_date)
            .bind(sub_loan.paid_date)
            .bind(&sub_loan.payment_history)
            .bind(sub_loan.created_at)
            .bind(sub_loan.updated_at)
            .bind(sub_loan.deleted_at)
            .fetch_one(&mut *conn)
            .await?;

            created.push(row);
        }

        Ok(created)
    }
}
