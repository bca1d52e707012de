use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Payment;

/// Repository for registered payment rows.
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_by_sub_loan(&self, sub_loan_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, sub_loan_id, amount, currency, payment_date, description, registered_by, created_at
            FROM payments
            WHERE sub_loan_id = $1
            ORDER BY payment_date, created_at
            "#,
        )
        .bind(sub_loan_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Inserts one payment inside the caller's transaction.
    pub async fn insert(conn: &mut PgConnection, payment: &Payment) -> Result<Payment> {
        let row = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (id, sub_loan_id, amount, currency, payment_date, description, registered_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, sub_loan_id, amount, currency, payment_date, description, registered_by, created_at
            "#,
        )
        .bind(payment.id)
        .bind(payment.sub_loan_id)
        .bind(payment.amount)
        .bind(payment.currency)
        .bind(payment.payment_date)
        .bind(&payment.description)
        .bind(payment.registered_by)
        .bind(payment.created_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Locks and returns the most recent payment on an installment.
    pub async fn lock_latest(
        conn: &mut PgConnection,
        sub_loan_id: Uuid,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, sub_loan_id, amount, currency, payment_date, description, registered_by, created_at
            FROM payments
            WHERE sub_loan_id = $1
            ORDER BY payment_date DESC, created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(sub_loan_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Locks and returns every payment on an installment, newest first.
    pub async fn lock_all(conn: &mut PgConnection, sub_loan_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, sub_loan_id, amount, currency, payment_date, description, registered_by, created_at
            FROM payments
            WHERE sub_loan_id = $1
            ORDER BY payment_date DESC, created_at DESC
            FOR UPDATE
            "#,
        )
        .bind(sub_loan_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    /// Full reversal deletes the row outright.
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Partial reversal of cascaded excess reduces the recorded amount.
    pub async fn shrink_amount(
        conn: &mut PgConnection,
        id: Uuid,
        new_amount: Decimal,
    ) -> Result<Payment> {
        let row = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET amount = $2
            WHERE id = $1
            RETURNING id, sub_loan_id, amount, currency, payment_date, description, registered_by, created_at
            "#,
        )
        .bind(id)
        .bind(new_amount)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Bulk reset wipes the installment's whole payment record.
    pub async fn delete_all_for_sub_loan(
        conn: &mut PgConnection,
        sub_loan_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM payments WHERE sub_loan_id = $1")
            .bind(sub_loan_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }
}
