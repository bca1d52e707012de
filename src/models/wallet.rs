use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Currency;

/// Movement categories on a manager's working-capital wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "wallet_transaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletTransactionType {
    Deposit,
    Withdrawal,
    LoanDisbursement,
    LoanPayment,
    TransferToManager,
    TransferFromSubadmin,
}

impl WalletTransactionType {
    /// Types that add funds when carried in a positive-amount entry.
    pub fn is_inflow(&self) -> bool {
        matches!(
            self,
            WalletTransactionType::Deposit
                | WalletTransactionType::LoanPayment
                | WalletTransactionType::TransferFromSubadmin
        )
    }
}

/// A manager's working-capital wallet. Balance must never go negative.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub balance: Decimal,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
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

    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}

/// Append-only ledger entry, balance-stamped at write time.
///
/// `balance_before`/`balance_after` are the source of truth for that point in
/// time; normal operation never recomputes them. Only the explicit stamp
/// repair maintenance pass may overwrite them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    #[sqlx(rename = "type")]
    pub transaction_type: WalletTransactionType,
    /// Signed movement: positive credits, negative debits.
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn stamp(
        wallet_id: Uuid,
        transaction_type: WalletTransactionType,
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stamp_credits_and_debits() {
        let wallet_id = Uuid::new_v4();

        let credit = WalletTransaction::stamp(
            wallet_id,
            WalletTransactionType::LoanPayment,
            dec!(500),
            dec!(1200),
            None,
        );
        assert_eq!(credit.balance_after, dec!(1700));

        let debit = WalletTransaction::stamp(
            wallet_id,
            WalletTransactionType::Withdrawal,
            dec!(-300),
            dec!(1700),
            None,
        );
        assert_eq!(debit.balance_after, dec!(1400));
    }

    #[test]
    fn test_sufficient_funds() {
        let mut wallet = Wallet::new(Uuid::new_v4(), Currency::USD);
        wallet.balance = dec!(100);

        assert!(wallet.has_sufficient_funds(dec!(100)));
        assert!(!wallet.has_sufficient_funds(dec!(100.01)));
    }

    #[test]
    fn test_inflow_types() {
        assert!(WalletTransactionType::Deposit.is_inflow());
        assert!(WalletTransactionType::LoanPayment.is_inflow());
        assert!(!WalletTransactionType::Withdrawal.is_inflow());
        assert!(!WalletTransactionType::LoanDisbursement.is_inflow());
    }
}
