use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CollectorWallet, CollectorWalletTransaction};

/// Repository for collector cash-float wallets.
pub struct CollectorWalletRepository {
    pool: PgPool,
}

impl CollectorWalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, wallet: &CollectorWallet) -> Result<CollectorWallet> {
        let row = sqlx::query_as::<_, CollectorWallet>(
            r#"
            INSERT INTO collector_wallets (id, owner_id, balance, currency, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, owner_id, balance, currency, created_at, updated_at
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.owner_id)
        .bind(wallet.balance)
        .bind(wallet.currency)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_owner(&self, owner_id: Uuid) -> Result<Option<CollectorWallet>> {
        let row = sqlx::query_as::<_, CollectorWallet>(
            r#"
            SELECT id, owner_id, balance, currency, created_at, updated_at
            FROM collector_wallets
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_transactions(
        &self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CollectorWalletTransaction>> {
        let rows = sqlx::query_as::<_, CollectorWalletTransaction>(
            r#"
            SELECT id, wallet_id, type, amount, balance_before, balance_after, description, created_at
            FROM collector_wallet_transactions
            WHERE wallet_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(wallet_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// All entries oldest first, locked for the stamp repair pass.
    pub async fn lock_entries_chronological(
        conn: &mut PgConnection,
        wallet_id: Uuid,
    ) -> Result<Vec<CollectorWalletTransaction>> {
        let rows = sqlx::query_as::<_, CollectorWalletTransaction>(
            r#"
            SELECT id, wallet_id, type, amount, balance_before, balance_after, description, created_at
            FROM collector_wallet_transactions
            WHERE wallet_id = $1
            ORDER BY created_at, id
            FOR UPDATE
            "#,
        )
        .bind(wallet_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    /// Overwrites one entry's stamps. Only the repair pass may call this.
    pub async fn overwrite_stamps(
        conn: &mut PgConnection,
        entry_id: Uuid,
        balance_before: Decimal,
        balance_after: Decimal,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE collector_wallet_transactions
            SET balance_before = $2, balance_after = $3
            WHERE id = $1
            "#,
        )
        .bind(entry_id)
        .bind(balance_before)
        .bind(balance_after)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn set_balance(
        conn: &mut PgConnection,
        wallet_id: Uuid,
        balance: Decimal,
    ) -> Result<CollectorWallet> {
        let row = sqlx::query_as::<_, CollectorWallet>(
            r#"
            UPDATE collector_wallets
            SET balance = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, owner_id, balance, currency, created_at, updated_at
            "#,
        )
        .bind(wallet_id)
        .bind(balance)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }
}
