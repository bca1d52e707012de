//! In-transaction debit/credit primitives for both cash ledgers.
//!
//! Every function takes the caller's open transaction connection: the wallet
//! row is locked, the balance moved, and one balance-stamped entry appended,
//! all inside the enclosing unit of work. These primitives are shared by
//! every money-moving feature (payment registration, reversals, loan
//! disbursement, withdrawals, transfers).

use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    CollectorTransactionType, CollectorWallet, CollectorWalletTransaction, Wallet,
    WalletTransaction, WalletTransactionType,
};

/// Locks and returns a manager wallet by owner.
pub async fn lock_wallet(conn: &mut PgConnection, owner_id: Uuid) -> Result<Wallet> {
    sqlx::query_as::<_, Wallet>(
        r#"
        SELECT id, owner_id, balance, currency, created_at, updated_at
        FROM wallets
        WHERE owner_id = $1
        FOR UPDATE
        "#,
    )
    .bind(owner_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("wallet for owner '{}'", owner_id)))
}

/// Locks and returns a collector wallet by owner.
pub async fn lock_collector_wallet(
    conn: &mut PgConnection,
    owner_id: Uuid,
) -> Result<CollectorWallet> {
    sqlx::query_as::<_, CollectorWallet>(
        r#"
        SELECT id, owner_id, balance, currency, created_at, updated_at
        FROM collector_wallets
        WHERE owner_id = $1
        FOR UPDATE
        "#,
    )
    .bind(owner_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("collector wallet for owner '{}'", owner_id)))
}

/// Credits a manager wallet and appends a stamped entry.
pub async fn credit_wallet(
    conn: &mut PgConnection,
    owner_id: Uuid,
    amount: Decimal,
    transaction_type: WalletTransactionType,
    description: &str,
) -> Result<(Wallet, WalletTransaction)> {
    let wallet = lock_wallet(&mut *conn, owner_id).await?;

    let updated = sqlx::query_as::<_, Wallet>(
        r#"
        UPDATE wallets
        SET balance = balance + $2, updated_at = NOW()
        WHERE id = $1
        RETURNING id, owner_id, balance, currency, created_at, updated_at
        "#,
    )
    .bind(wallet.id)
    .bind(amount)
    .fetch_one(&mut *conn)
    .await?;

    let entry = append_wallet_entry(
        &mut *conn,
        WalletTransaction::stamp(
            wallet.id,
            transaction_type,
            amount,
            wallet.balance,
            Some(description.to_string()),
        ),
    )
    .await?;

    Ok((updated, entry))
}

/// Debits a manager wallet and appends a stamped entry.
///
/// The balance is re-checked by the guarded UPDATE inside the same
/// transaction; a result below zero is rejected with `InsufficientFunds`.
pub async fn debit_wallet(
    conn: &mut PgConnection,
    owner_id: Uuid,
    amount: Decimal,
    transaction_type: WalletTransactionType,
    description: &str,
) -> Result<(Wallet, WalletTransaction)> {
    let wallet = lock_wallet(&mut *conn, owner_id).await?;

    let updated = sqlx::query_as::<_, Wallet>(
        r#"
        UPDATE wallets
        SET balance = balance - $2, updated_at = NOW()
        WHERE id = $1 AND balance >= $2
        RETURNING id, owner_id, balance, currency, created_at, updated_at
        "#,
    )
    .bind(wallet.id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::InsufficientFunds {
        requested: amount,
        available: wallet.balance,
    })?;

    let entry = append_wallet_entry(
        &mut *conn,
        WalletTransaction::stamp(
            wallet.id,
            transaction_type,
            -amount,
            wallet.balance,
            Some(description.to_string()),
        ),
    )
    .await?;

    Ok((updated, entry))
}

/// Credits a collector wallet and appends a stamped entry.
pub async fn credit_collector_wallet(
    conn: &mut PgConnection,
    owner_id: Uuid,
    amount: Decimal,
    transaction_type: CollectorTransactionType,
    description: &str,
) -> Result<(CollectorWallet, CollectorWalletTransaction)> {
    move_collector_balance(conn, owner_id, amount, transaction_type, description).await
}

/// Debits a collector wallet and appends a negative-amount stamped entry.
/// The float may go below zero; no floor is enforced.
pub async fn debit_collector_wallet(
    conn: &mut PgConnection,
    owner_id: Uuid,
    amount: Decimal,
    transaction_type: CollectorTransactionType,
    description: &str,
) -> Result<(CollectorWallet, CollectorWalletTransaction)> {
    move_collector_balance(conn, owner_id, -amount, transaction_type, description).await
}

async fn move_collector_balance(
    conn: &mut PgConnection,
    owner_id: Uuid,
    signed_amount: Decimal,
    transaction_type: CollectorTransactionType,
    description: &str,
) -> Result<(CollectorWallet, CollectorWalletTransaction)> {
    let wallet = lock_collector_wallet(&mut *conn, owner_id).await?;

    let updated = sqlx::query_as::<_, CollectorWallet>(
        r#"
        UPDATE collector_wallets
        SET balance = balance + $2, updated_at = NOW()
        WHERE id = $1
        RETURNING id, owner_id, balance, currency, created_at, updated_at
        "#,
    )
    .bind(wallet.id)
    .bind(signed_amount)
    .fetch_one(&mut *conn)
    .await?;

    let entry = CollectorWalletTransaction::stamp(
        wallet.id,
        transaction_type,
        signed_amount,
        wallet.balance,
        Some(description.to_string()),
    );

    let entry = sqlx::query_as::<_, CollectorWalletTransaction>(
        r#"
        INSERT INTO collector_wallet_transactions
            (id, wallet_id, type, amount, balance_before, balance_after, description, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, wallet_id, type, amount, balance_before, balance_after, description, created_at
        "#,
    )
    .bind(entry.id)
    .bind(entry.wallet_id)
    .bind(entry.transaction_type)
    .bind(entry.amount)
    .bind(entry.balance_before)
    .bind(entry.balance_after)
    .bind(&entry.description)
    .bind(entry.created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok((updated, entry))
}

async fn append_wallet_entry(
    conn: &mut PgConnection,
    entry: WalletTransaction,
) -> Result<WalletTransaction> {
    let row = sqlx::query_as::<_, WalletTransaction>(
        r#"
        INSERT INTO wallet_transactions
            (id, wallet_id, type, amount, balance_before, balance_after, description, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, wallet_id, type, amount, balance_before, balance_after, description, created_at
        "#,
    )
    .bind(entry.id)
    .bind(entry.wallet_id)
    .bind(entry.transaction_type)
    .bind(entry.amount)
    .bind(entry.balance_before)
    .bind(entry.balance_after)
    .bind(&entry.description)
    .bind(entry.created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}
