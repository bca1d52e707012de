use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Currency, Wallet, WalletTransaction, WalletTransactionType};
use crate::observability::get_metrics;
use crate::repositories::WalletRepository;

use super::wallet_ledger;

/// Report of a stamp repair pass over one wallet.
#[derive(Debug, Clone, Serialize)]
pub struct StampRepairReport {
    pub wallet_id: Uuid,
    pub entries_scanned: usize,
    pub entries_rewritten: usize,
    pub final_balance: Decimal,
}

/// Standalone operations on manager working-capital wallets.
///
/// The in-transaction primitives live in [`super::wallet_ledger`]; this
/// service wraps them in their own unit of work for the operations that are
/// not part of a larger flow.
pub struct WalletService {
    pool: PgPool,
    wallets: WalletRepository,
}

impl WalletService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            wallets: WalletRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn open_wallet(&self, owner_id: Uuid, currency: Currency) -> Result<Wallet> {
        self.wallets.create(&Wallet::new(owner_id, currency)).await
    }

    pub async fn get_wallet(&self, owner_id: Uuid) -> Result<Wallet> {
        self.wallets
            .find_by_owner(owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("wallet for owner '{}'", owner_id)))
    }

    pub async fn list_transactions(
        &self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletTransaction>> {
        self.wallets.list_transactions(wallet_id, limit, offset).await
    }

    pub async fn deposit(
        &self,
        owner_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> Result<(Wallet, WalletTransaction)> {
        require_positive(amount)?;

        let mut tx = self.pool.begin().await?;
        let result = wallet_ledger::credit_wallet(
            &mut *tx,
            owner_id,
            amount,
            WalletTransactionType::Deposit,
            description,
        )
        .await?;
        tx.commit().await?;

        get_metrics().record_wallet_operation("wallet", "DEPOSIT");
        Ok(result)
    }

    pub async fn withdraw(
        &self,
        owner_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> Result<(Wallet, WalletTransaction)> {
        require_positive(amount)?;

        let mut tx = self.pool.begin().await?;
        let result = wallet_ledger::debit_wallet(
            &mut *tx,
            owner_id,
            amount,
            WalletTransactionType::Withdrawal,
            description,
        )
        .await?;
        tx.commit().await?;

        get_metrics().record_wallet_operation("wallet", "WITHDRAWAL");
        Ok(result)
    }

    /// Moves working capital from a subadmin's wallet into a manager's, as
    /// one atomic pair of entries.
    pub async fn transfer_to_manager(
        &self,
        subadmin_id: Uuid,
        manager_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> Result<(Wallet, Wallet)> {
        require_positive(amount)?;
        if subadmin_id == manager_id {
            return Err(AppError::Validation(
                "transfer source and destination must differ".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let (source, _) = wallet_ledger::debit_wallet(
            &mut *tx,
            subadmin_id,
            amount,
            WalletTransactionType::TransferToManager,
            description,
        )
        .await?;

        let (destination, _) = wallet_ledger::credit_wallet(
            &mut *tx,
            manager_id,
            amount,
            WalletTransactionType::TransferFromSubadmin,
            description,
        )
        .await?;

        tx.commit().await?;

        get_metrics().record_wallet_operation("wallet", "TRANSFER_TO_MANAGER");
        Ok((source, destination))
    }

    /// Maintenance pass for drift repair: replays every entry of the wallet
    /// chronologically, overwrites any stamps that disagree with the replay,
    /// and resets the wallet balance to the replayed total. Never part of
    /// normal flows.
    pub async fn repair_stamps(&self, owner_id: Uuid) -> Result<StampRepairReport> {
        let mut tx = self.pool.begin().await?;

        let wallet = wallet_ledger::lock_wallet(&mut *tx, owner_id).await?;
        let entries = WalletRepository::lock_entries_chronological(&mut *tx, wallet.id).await?;

        let mut running = Decimal::ZERO;
        let mut rewritten = 0;

        for entry in &entries {
            let expected_after = running + entry.amount;
            if entry.balance_before != running || entry.balance_after != expected_after {
                WalletRepository::overwrite_stamps(&mut *tx, entry.id, running, expected_after)
                    .await?;
                rewritten += 1;
            }
            running = expected_after;
        }

        WalletRepository::set_balance(&mut *tx, wallet.id, running).await?;
        tx.commit().await?;

        info!(
            wallet_id = %wallet.id,
            entries_rewritten = rewritten,
            "wallet stamp repair finished"
        );

        Ok(StampRepairReport {
            wallet_id: wallet.id,
            entries_scanned: entries.len(),
            entries_rewritten: rewritten,
            final_balance: running,
        })
    }
}

pub(super) fn require_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }
    Ok(())
}
