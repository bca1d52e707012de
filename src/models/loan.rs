use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Currency;

/// How often installments fall due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_frequency", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentFrequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl PaymentFrequency {
    /// Due date of the `n`-th installment (1-based) for a loan starting on
    /// `start`.
    pub fn due_date(&self, start: NaiveDate, n: u32) -> NaiveDate {
        match self {
            PaymentFrequency::Daily => start + Days::new(n as u64),
            PaymentFrequency::Weekly => start + Days::new(7 * n as u64),
            PaymentFrequency::Biweekly => start + Days::new(14 * n as u64),
            PaymentFrequency::Monthly => start + Months::new(n),
        }
    }
}

/// A disbursed loan. Installment totals are fixed here at issuance and only
/// ever mutated through the payment engine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: Uuid,
    pub client_id: Uuid,
    /// Manager whose wallets absorb disbursements and collections for this
    /// loan, independent of who performs the registration.
    pub manager_id: Uuid,
    pub tracking_code: String,
    pub original_amount: Decimal,
    /// Principal plus interest; the sum of all installment totals.
    pub total_amount: Decimal,
    pub currency: Currency,
    pub interest_rate: Decimal,
    pub payment_frequency: PaymentFrequency,
    pub total_payments: i32,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Splits `total_amount` into `total_payments` installments rounded to
    /// the currency scale, with the rounding remainder folded into the last
    /// installment so the parts sum exactly.
    pub fn installment_amounts(&self) -> Vec<Decimal> {
        split_installments(
            self.total_amount,
            self.total_payments as u32,
            self.currency.decimal_places(),
        )
    }

    /// Due dates for payment numbers `1..=total_payments`.
    pub fn installment_due_dates(&self) -> Vec<NaiveDate> {
        (1..=self.total_payments as u32)
            .map(|n| self.payment_frequency.due_date(self.start_date, n))
            .collect()
    }
}

/// Even split with the remainder on the final part.
pub fn split_installments(total: Decimal, parts: u32, scale: u32) -> Vec<Decimal> {
    assert!(parts > 0, "a loan needs at least one installment");

    let base = (total / Decimal::from(parts)).trunc_with_scale(scale);
    let mut amounts = vec![base; parts as usize];
    let allocated = base * Decimal::from(parts - 1);
    amounts[parts as usize - 1] = total - allocated;
    amounts
}
