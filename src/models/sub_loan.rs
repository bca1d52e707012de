use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Collection state of one installment.
///
/// PENDING, PARTIAL and PAID are a pure function of `paid_amount` vs
/// `total_amount`. OVERDUE is a time-driven side-state that replaces PENDING
/// once the due date has passed with nothing collected; it is applied by a
/// scheduled maintenance pass, never by the payment engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sub_loan_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubLoanStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
}

impl SubLoanStatus {
    /// Derives the status from the collected amount alone.
    pub fn from_amounts(paid_amount: Decimal, total_amount: Decimal) -> Self {
        if paid_amount <= Decimal::ZERO {
            SubLoanStatus::Pending
        } else if paid_amount < total_amount {
            SubLoanStatus::Partial
        } else {
            SubLoanStatus::Paid
        }
    }

    /// Same as [`from_amounts`], with the OVERDUE override for unpaid
    /// installments past their due date.
    pub fn from_amounts_at(
        paid_amount: Decimal,
        total_amount: Decimal,
        due_date: NaiveDate,
        today: NaiveDate,
    ) -> Self {
        match Self::from_amounts(paid_amount, total_amount) {
            SubLoanStatus::Pending if due_date < today => SubLoanStatus::Overdue,
            status => status,
        }
    }

    /// Whether this installment can still absorb cascaded excess.
    pub fn accepts_cascade(&self) -> bool {
        matches!(self, SubLoanStatus::Partial)
    }
}

/// Marker discriminant for reset entries in the payment history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetMarker {
    #[serde(rename = "RESET")]
    Reset,
}

/// One allocation applied to this installment. Serialized shape is
/// `{date, amount, balance}` where `balance` is the amount still owed on the
/// installment after the allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub date: DateTime<Utc>,
    pub amount: Decimal,
    pub balance: Decimal,
}

/// Signed audit marker appended by a bulk reset instead of deleting entries.
/// Serialized shape is `{type: "RESET", date, amount, balance, description}`
/// with a negative `amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetEntry {
    #[serde(rename = "type")]
    pub marker: ResetMarker,
    pub date: DateTime<Utc>,
    pub amount: Decimal,
    pub balance: Decimal,
    pub description: String,
}

/// Entry in an installment's append-only payment history.
///
/// Untagged on the wire: reset markers carry a `type` field, allocations do
/// not. The Reset variant must stay first so deserialization tries it before
/// the field-subset Allocation shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryEntry {
    Reset(ResetEntry),
    Allocation(AllocationEntry),
}

impl HistoryEntry {
    pub fn allocation(date: DateTime<Utc>, amount: Decimal, balance: Decimal) -> Self {
        HistoryEntry::Allocation(AllocationEntry {
            date,
            amount,
            balance,
        })
    }

    pub fn reset(date: DateTime<Utc>, amount_reversed: Decimal, description: String) -> Self {
        HistoryEntry::Reset(ResetEntry {
            marker: ResetMarker::Reset,
            date,
            amount: -amount_reversed.abs(),
            balance: Decimal::ZERO,
            description,
        })
    }

    pub fn as_allocation(&self) -> Option<&AllocationEntry> {
        match self {
            HistoryEntry::Allocation(entry) => Some(entry),
            HistoryEntry::Reset(_) => None,
        }
    }
}

/// Returns the date of the most recent allocation entry, skipping markers.
pub fn last_allocation_date(history: &[HistoryEntry]) -> Option<DateTime<Utc>> {
    history
        .iter()
        .rev()
        .find_map(|entry| entry.as_allocation().map(|a| a.date))
}

/// One scheduled repayment slice of a loan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubLoan {
    pub id: Uuid,
    pub loan_id: Uuid,
    /// 1-based position in the schedule; defines waterfall order.
    pub payment_number: i32,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub status: SubLoanStatus,
    pub due_date: NaiveDate,
    pub paid_date: Option<DateTime<Utc>>,
    pub payment_history: Json<Vec<HistoryEntry>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SubLoan {
    /// Amount still owed on this installment.
    pub fn remaining(&self) -> Decimal {
        self.total_amount - self.paid_amount
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Most recent allocation recorded in the history, if any.
    pub fn last_allocation(&self) -> Option<&AllocationEntry> {
        self.payment_history
            .iter()
            .rev()
            .find_map(HistoryEntry::as_allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_from_amounts() {
        assert_eq!(
            SubLoanStatus::from_amounts(dec!(0), dec!(1000)),
            SubLoanStatus::Pending
        );
        assert_eq!(
            SubLoanStatus::from_amounts(dec!(0.01), dec!(1000)),
            SubLoanStatus::Partial
        );
        assert_eq!(
            SubLoanStatus::from_amounts(dec!(1000), dec!(1000)),
            SubLoanStatus::Paid
        );
    }

    #[test]
    fn test_overdue_overrides_pending_only() {
        let due = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let later = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();

        assert_eq!(
            SubLoanStatus::from_amounts_at(dec!(0), dec!(500), due, later),
            SubLoanStatus::Overdue
        );
        // A partially collected installment never flips to OVERDUE.
        assert_eq!(
            SubLoanStatus::from_amounts_at(dec!(100), dec!(500), due, later),
            SubLoanStatus::Partial
        );
        // Not yet due.
        assert_eq!(
            SubLoanStatus::from_amounts_at(dec!(0), dec!(500), due, due),
            SubLoanStatus::Pending
        );
    }

    #[test]
    fn test_allocation_entry_wire_shape() {
        let entry = HistoryEntry::allocation(Utc::now(), dec!(150), dec!(350));
        let value = serde_json::to_value(&entry).unwrap();

        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("date"));
        assert!(obj.contains_key("amount"));
        assert!(obj.contains_key("balance"));
        assert!(!obj.contains_key("type"));
    }

    #[test]
    fn test_reset_entry_wire_shape() {
        let entry = HistoryEntry::reset(Utc::now(), dec!(500), "full reset".to_string());
        let value = serde_json::to_value(&entry).unwrap();

        let obj = value.as_object().unwrap();
        assert_eq!(obj["type"], "RESET");
        assert_eq!(obj["balance"], serde_json::json!("0"));
        // Reversed amounts are recorded signed.
        let amount: Decimal = serde_json::from_value(obj["amount"].clone()).unwrap();
        assert_eq!(amount, dec!(-500));
    }

    #[test]
    fn test_history_roundtrip_mixed() {
        let history = vec![
            HistoryEntry::allocation(Utc::now(), dec!(100), dec!(400)),
            HistoryEntry::reset(Utc::now(), dec!(100), "undo".to_string()),
            HistoryEntry::allocation(Utc::now(), dec!(250), dec!(250)),
        ];

        let json = serde_json::to_string(&history).unwrap();
        let parsed: Vec<HistoryEntry> = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, history);
        assert!(matches!(parsed[1], HistoryEntry::Reset(_)));
    }

    #[test]
    fn test_last_allocation_date_skips_markers() {
        let first = Utc::now();
        let history = vec![
            HistoryEntry::allocation(first, dec!(100), dec!(400)),
            HistoryEntry::reset(Utc::now(), dec!(100), "undo".to_string()),
        ];

        assert_eq!(last_allocation_date(&history), Some(first));
        assert_eq!(last_allocation_date(&[]), None);
    }
}
