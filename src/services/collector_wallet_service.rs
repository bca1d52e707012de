use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    CollectorTransactionType, CollectorWallet, CollectorWalletTransaction, Currency,
};
use crate::observability::get_metrics;
use crate::repositories::CollectorWalletRepository;

use super::wallet_ledger;
use super::wallet_service::{require_positive, StampRepairReport};

/// Standalone operations on collector cash floats.
pub struct CollectorWalletService {
    pool: PgPool,
    wallets: CollectorWalletRepository,
}

impl CollectorWalletService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            wallets: CollectorWalletRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn open_wallet(&self, owner_id: Uuid, currency: Currency) -> Result<CollectorWallet> {
        self.wallets
            .create(&CollectorWallet::new(owner_id, currency))
            .await
    }

    pub async fn get_wallet(&self, owner_id: Uuid) -> Result<CollectorWallet> {
        self.wallets
            .find_by_owner(owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("collector wallet for owner '{}'", owner_id)))
    }

    pub async fn list_transactions(
        &self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CollectorWalletTransaction>> {
        self.wallets.list_transactions(wallet_id, limit, offset).await
    }

    /// Collector hands cash over; the float may legitimately go negative.
    pub async fn withdraw(
        &self,
        owner_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> Result<(CollectorWallet, CollectorWalletTransaction)> {
        require_positive(amount)?;

        let mut tx = self.pool.begin().await?;
        let result = wallet_ledger::debit_collector_wallet(
            &mut *tx,
            owner_id,
            amount,
            CollectorTransactionType::Withdrawal,
            description,
        )
        .await?;
        tx.commit().await?;

        get_metrics().record_wallet_operation("collector", "WITHDRAWAL");
        Ok(result)
    }

    /// Books a route expense against the float.
    pub async fn route_expense(
        &self,
        owner_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> Result<(CollectorWallet, CollectorWalletTransaction)> {
        require_positive(amount)?;

        let mut tx = self.pool.begin().await?;
        let result = wallet_ledger::debit_collector_wallet(
            &mut *tx,
            owner_id,
            amount,
            CollectorTransactionType::RouteExpense,
            description,
        )
        .await?;
        tx.commit().await?;

        get_metrics().record_wallet_operation("collector", "ROUTE_EXPENSE");
        Ok(result)
    }

    /// Signed correction of the float after a physical cash count.
    pub async fn cash_adjustment(
        &self,
        owner_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> Result<(CollectorWallet, CollectorWalletTransaction)> {
        if amount == Decimal::ZERO {
            return Err(AppError::Validation(
                "adjustment amount cannot be zero".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let result = if amount > Decimal::ZERO {
            wallet_ledger::credit_collector_wallet(
                &mut *tx,
                owner_id,
                amount,
                CollectorTransactionType::CashAdjustment,
                description,
            )
            .await?
        } else {
            wallet_ledger::debit_collector_wallet(
                &mut *tx,
                owner_id,
                -amount,
                CollectorTransactionType::CashAdjustment,
                description,
            )
            .await?
        };
        tx.commit().await?;

        get_metrics().record_wallet_operation("collector", "CASH_ADJUSTMENT");
        Ok(result)
    }

    /// Maintenance pass for drift repair, identical in spirit to the manager
    /// wallet variant: replay chronologically, rewrite disagreeing stamps,
    /// reset the balance.
    pub async fn repair_stamps(&self, owner_id: Uuid) -> Result<StampRepairReport> {
        let mut tx = self.pool.begin().await?;

        let wallet = wallet_ledger::lock_collector_wallet(&mut *tx, owner_id).await?;
        let entries =
            CollectorWalletRepository::lock_entries_chronological(&mut *tx, wallet.id).await?;

        let mut running = Decimal::ZERO;
        let mut rewritten = 0;

        for entry in &entries {
            let expected_after = running + entry.amount;
            if entry.balance_before != running || entry.balance_after != expected_after {
                CollectorWalletRepository::overwrite_stamps(
                    &mut *tx,
                    entry.id,
                    running,
                    expected_after,
                )
                .await?;
                rewritten += 1;
            }
            running = expected_after;
        }

        CollectorWalletRepository::set_balance(&mut *tx, wallet.id, running).await?;
        tx.commit().await?;

        info!(
            wallet_id = %wallet.id,
            entries_rewritten = rewritten,
            "collector wallet stamp repair finished"
        );

        Ok(StampRepairReport {
            wallet_id: wallet.id,
            entries_scanned: entries.len(),
            entries_rewritten: rewritten,
            final_balance: running,
        })
    }
}
