use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Currency;

/// One registered cash collection against an installment.
///
/// Immutable once written; full reversal deletes the row, partial reversal of
/// cascaded excess reduces `amount`. The row always carries the full amount
/// the collector handed in, including any part cascaded to earlier
/// installments.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub sub_loan_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_date: DateTime<Utc>,
    pub description: Option<String>,
    /// Acting user who performed the registration (not necessarily the
    /// loan's assigned manager).
    pub registered_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        sub_loan_id: Uuid,
        amount: Decimal,
        currency: Currency,
        payment_date: DateTime<Utc>,
        description: Option<String>,
        registered_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sub_loan_id,
            amount,
            currency,
            payment_date,
            description,
            registered_by,
            created_at: Utc::now(),
        }
    }
}
