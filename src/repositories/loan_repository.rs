use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Loan;

/// Repository for Loan rows and the manager/client relationship table.
pub struct LoanRepository {
    pool: PgPool,
}

impl LoanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Loan>> {
        let row = sqlx::query_as::<_, Loan>(
            r#"
            SELECT id, client_id, manager_id, tracking_code, original_amount, total_amount, currency, interest_rate, payment_frequency, total_payments, start_date, created_at, deleted_at
            FROM loans
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_tracking_code(&self, code: &str) -> Result<Option<Loan>> {
        let row = sqlx::query_as::<_, Loan>(
            r#"
            SELECT id, client_id, manager_id, tracking_code, original_amount, total_amount, currency, interest_rate, payment_frequency, total_payments, start_date, created_at, deleted_at
            FROM loans
            WHERE tracking_code = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Grants `manager_id` a management relationship over `client_id`.
    pub async fn assign_client_manager(&self, manager_id: Uuid, client_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO client_managers (manager_id, client_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(manager_id)
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetches a loan inside the caller's transaction.
    pub async fn fetch(conn: &mut PgConnection, id: Uuid) -> Result<Option<Loan>> {
        let row = sqlx::query_as::<_, Loan>(
            r#"
            SELECT id, client_id, manager_id, tracking_code, original_amount, total_amount, currency, interest_rate, payment_frequency, total_payments, start_date, created_at, deleted_at
            FROM loans
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Inserts a loan inside the caller's transaction.
    pub async fn insert(conn: &mut PgConnection, loan: &Loan) -> Result<Loan> {
        let row = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (id, client_id, manager_id, tracking_code, original_amount, total_amount, currency, interest_rate, payment_frequency, total_payments, start_date, created_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, client_id, manager_id, tracking_code, original_amount, total_amount, currency, interest_rate, payment_frequency, total_payments, start_date, created_at, deleted_at
            "#,
        )
        .bind(loan.id)
        .bind(loan.client_id)
        .bind(loan.manager_id)
        .bind(&loan.tracking_code)
        .bind(loan.original_amount)
        .bind(loan.total_amount)
        .bind(loan.currency)
        .bind(loan.interest_rate)
        .bind(loan.payment_frequency)
        .bind(loan.total_payments)
        .bind(loan.start_date)
        .bind(loan.created_at)
        .bind(loan.deleted_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    /// True when the actor may move money for this loan: either the assigned
    /// manager or a user holding a management relationship over the client.
    pub async fn has_management_relationship(
        conn: &mut PgConnection,
        actor_id: Uuid,
        loan_manager_id: Uuid,
        client_id: Uuid,
    ) -> Result<bool> {
        if actor_id == loan_manager_id {
            return Ok(true);
        }

        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM client_managers
                WHERE manager_id = $1 AND client_id = $2
            )
            "#,
        )
        .bind(actor_id)
        .bind(client_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(exists)
    }
}
