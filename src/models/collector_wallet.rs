use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Currency;

/// Movement categories on a collector's cash-on-hand wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "collector_transaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectorTransactionType {
    Collection,
    Withdrawal,
    RouteExpense,
    LoanDisbursement,
    CashAdjustment,
    PaymentReset,
}

/// A field-cash float. Unlike the working-capital wallet this balance may go
/// negative: disbursing a loan from the street float ahead of the day's
/// collections is an accepted business posture.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CollectorWallet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub balance: Decimal,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectorWallet {
    pub fn new(owner_id: Uuid, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            balance: Decimal::ZERO,
            currency,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Append-only entry on the collector float, balance-stamped at write time.
/// Reversals are encoded as negative-amount COLLECTION or PAYMENT_RESET
/// entries; rows are never edited or deleted in normal operation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CollectorWalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    #[sqlx(rename = "type")]
    pub transaction_type: CollectorTransactionType,
    /// Signed movement: positive credits, negative debits.
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CollectorWalletTransaction {
    pub fn stamp(
        wallet_id: Uuid,
        transaction_type: CollectorTransactionType,
        amount: Decimal,
        balance_before: Decimal,
        description: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            transaction_type,
            amount,
            balance_before,
            balance_after: balance_before + amount,
            description,
            created_at: Utc::now(),
        }
    }
}
