//! Reversal paths of the payment engine: the single-payment revert primitive
//! behind same-day corrections, the time-boxed full reset, and edit-replace.
//!
//! Each path undoes ledger entries and waterfall effects exactly: wallets
//! move back by the reversed totals, cascaded excess is clawed back from
//! predecessors most-recently-touched first, payment rows are deleted or
//! shrunk, and installment state is recomputed from the reduced amounts.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgConnection;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::sub_loan::last_allocation_date;
use crate::models::{
    CollectorTransactionType, Currency, HistoryEntry, Loan, Payment, SubLoan, SubLoanStatus,
    WalletTransactionType,
};
use crate::observability::{get_metrics, LatencyTimer};
use crate::repositories::{LoanRepository, PaymentRepository, RouteRepository, SubLoanRepository};

use super::allocation::{plan_cascade_unwind, revert_attribution, UndoCandidate};
use super::payment_engine::{PaymentEngine, PaymentOutcome};
use super::wallet_ledger;

/// Request to replace an installment's collected total as if the new amount
/// had been the first and only payment.
#[derive(Debug, Clone)]
pub struct EditPaymentRequest {
    pub actor_id: Uuid,
    pub sub_loan_id: Uuid,
    pub new_amount: Decimal,
    pub currency: Currency,
    /// Defaults to now.
    pub date: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

/// Result of a full payment reset.
#[derive(Debug, Clone, Serialize)]
pub struct ResetOutcome {
    pub sub_loan: SubLoan,
    pub reversed_total: Decimal,
    pub payments_deleted: u64,
    pub wallet_balance: Decimal,
    pub collector_balance: Decimal,
    /// Active routes whose derived totals were recomputed.
    pub reconciled_routes: Vec<Uuid>,
}

impl PaymentEngine {
    /// Fully reverses every payment on an installment.
    ///
    /// Allowed only while the most recent payment is inside the reset
    /// window. Both wallets move back by the summed total in one shot (the
    /// collector entry typed PAYMENT_RESET, signed negative), cascaded
    /// excess is unwound from predecessors, every payment row is deleted,
    /// and a signed RESET marker is appended to the history instead of
    /// erasing it. Active collection routes referencing the installment get
    /// their collected amounts and totals recomputed.
    pub async fn reset_sub_loan_payments(
        &self,
        sub_loan_id: Uuid,
        actor_id: Uuid,
    ) -> Result<ResetOutcome> {
        let timer = LatencyTimer::new();
        let mut tx = self.begin_waterfall_tx().await?;

        let target = SubLoanRepository::lock(&mut *tx, sub_loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("sub-loan '{}'", sub_loan_id)))?;

        let loan = LoanRepository::fetch(&mut *tx, target.loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("loan '{}'", target.loan_id)))?;

        self.check_management(&mut *tx, actor_id, &loan).await?;

        let payments = PaymentRepository::lock_all(&mut *tx, target.id).await?;
        let latest = payments.first().ok_or(AppError::NoPaymentsToReset)?;

        let age = Utc::now() - latest.payment_date;
        if age > self.settings.reset_window() {
            return Err(AppError::ResetWindowExpired {
                hours_since_last: age.num_hours(),
                window_hours: self.settings.reset_window_hours,
            });
        }

        let total: Decimal = payments.iter().map(|p| p.amount).sum();

        let (wallet, _) = wallet_ledger::debit_wallet(
            &mut *tx,
            loan.manager_id,
            total,
            WalletTransactionType::LoanPayment,
            &format!("payment reset on {}", loan.tracking_code),
        )
        .await?;

        let (collector, _) = wallet_ledger::debit_collector_wallet(
            &mut *tx,
            loan.manager_id,
            total,
            CollectorTransactionType::PaymentReset,
            &format!("payment reset on {}", loan.tracking_code),
        )
        .await?;

        let cascaded = total - target.paid_amount;
        if cascaded > Decimal::ZERO {
            self.unwind_cascade(&mut *tx, &loan, target.payment_number, cascaded, None, false)
                .await?;
        }

        let deleted = PaymentRepository::delete_all_for_sub_loan(&mut *tx, target.id).await?;

        let mut history = target.payment_history.0.clone();
        history.push(HistoryEntry::reset(
            Utc::now(),
            total,
            format!("reset of {} payment(s)", deleted),
        ));

        let sub_loan = SubLoanRepository::persist_state(
            &mut *tx,
            target.id,
            Decimal::ZERO,
            SubLoanStatus::Pending,
            None,
            &history,
        )
        .await?;

        // Derived-data repair: active routes referencing this installment
        // re-sync their collected amounts, then their totals.
        let route_ids = RouteRepository::sync_items_for_sub_loan(&mut *tx, target.id).await?;
        for route_id in &route_ids {
            RouteRepository::recompute_totals(&mut *tx, *route_id).await?;
        }

        tx.commit().await?;

        get_metrics().record_payment_reversed("reset");
        get_metrics().record_waterfall_latency(timer.elapsed_ms());
        info!(
            sub_loan_id = %sub_loan_id,
            tracking_code = %loan.tracking_code,
            payments_deleted = deleted,
            "installment payments reset"
        );

        Ok(ResetOutcome {
            sub_loan,
            reversed_total: total,
            payments_deleted: deleted,
            wallet_balance: wallet.balance,
            collector_balance: collector.balance,
            reconciled_routes: route_ids,
        })
    }

    /// Replaces an installment's entire collected total with `new_amount`,
    /// as if it had been the first payment.
    ///
    /// Allowed only on a PAID installment whose most recent payment falls on
    /// today or yesterday in the business timezone. The whole history is
    /// reversed exactly as a reset (wallets, cascade unwind, payment
    /// deletion) but wiped rather than marked, then the new amount re-runs
    /// the waterfall with one deliberate deviation: the target is always
    /// left PARTIAL, even when covered in full. Cascaded predecessors derive
    /// their status normally and can end PAID. Route totals are not
    /// reconciled on this path.
    pub async fn edit_payment(&self, request: EditPaymentRequest) -> Result<PaymentOutcome> {
        if request.new_amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "edited amount must be positive".to_string(),
            ));
        }

        let mut tx = self.begin_waterfall_tx().await?;

        let target = SubLoanRepository::lock(&mut *tx, request.sub_loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("sub-loan '{}'", request.sub_loan_id)))?;

        let loan = LoanRepository::fetch(&mut *tx, target.loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("loan '{}'", target.loan_id)))?;

        if request.currency != loan.currency {
            return Err(AppError::CurrencyMismatch {
                expected: loan.currency.to_string(),
                actual: request.currency.to_string(),
            });
        }

        self.check_management(&mut *tx, request.actor_id, &loan).await?;

        let payments = PaymentRepository::lock_all(&mut *tx, target.id).await?;
        let latest = payments.first().ok_or(AppError::NoPaymentsToEdit)?;

        if target.status != SubLoanStatus::Paid {
            return Err(AppError::Validation(
                "only fully collected installments can be edited".to_string(),
            ));
        }

        let today = self.business_date(Utc::now());
        let last_day = self.business_date(latest.payment_date);
        let still_editable = last_day == today
            || today.pred_opt().map(|y| last_day == y).unwrap_or(false);
        if !still_editable {
            return Err(AppError::EditWindowExpired {
                last_paid_on: last_day,
            });
        }

        let total: Decimal = payments.iter().map(|p| p.amount).sum();

        wallet_ledger::debit_wallet(
            &mut *tx,
            loan.manager_id,
            total,
            WalletTransactionType::LoanPayment,
            &format!("payment edit on {}", loan.tracking_code),
        )
        .await?;

        wallet_ledger::debit_collector_wallet(
            &mut *tx,
            loan.manager_id,
            total,
            CollectorTransactionType::PaymentReset,
            &format!("payment edit on {}", loan.tracking_code),
        )
        .await?;

        let cascaded = total - target.paid_amount;
        if cascaded > Decimal::ZERO {
            self.unwind_cascade(&mut *tx, &loan, target.payment_number, cascaded, None, false)
                .await?;
        }

        PaymentRepository::delete_all_for_sub_loan(&mut *tx, target.id).await?;

        // Replace-as-if-first: the old history is wiped, not marked.
        let cleared = SubLoanRepository::persist_state(
            &mut *tx,
            target.id,
            Decimal::ZERO,
            SubLoanStatus::Pending,
            None,
            &[],
        )
        .await?;

        let date = request.date.unwrap_or_else(Utc::now);
        let outcome = self
            .apply_payment(
                &mut *tx,
                &loan,
                &cleared,
                request.new_amount,
                date,
                request.description,
                request.actor_id,
                true,
            )
            .await?;

        tx.commit().await?;

        get_metrics().record_payment_reversed("edit");
        info!(
            sub_loan_id = %request.sub_loan_id,
            tracking_code = %loan.tracking_code,
            "installment payment edited"
        );

        Ok(outcome)
    }

    /// Undoes the most recent payment on `target` inside the caller's
    /// transaction and returns the refreshed installment.
    ///
    /// The split between the amount attributed to the target and the part
    /// cascaded onward is recomputed from the last history entry (ground
    /// truth), falling back to `min(payment, paid)` when absent. Cascaded
    /// excess is clawed back from predecessors most-recently-touched first,
    /// shrinking or removing their same-day payment rows.
    pub(super) async fn revert_last_payment(
        &self,
        conn: &mut PgConnection,
        loan: &Loan,
        target: &SubLoan,
        last: &Payment,
    ) -> Result<SubLoan> {
        wallet_ledger::debit_wallet(
            conn,
            loan.manager_id,
            last.amount,
            WalletTransactionType::LoanPayment,
            &format!("revert payment on {}", loan.tracking_code),
        )
        .await?;

        // Negative-amount COLLECTION entry encodes the reversal without
        // deleting float history.
        wallet_ledger::debit_collector_wallet(
            conn,
            loan.manager_id,
            last.amount,
            CollectorTransactionType::Collection,
            &format!("revert collection on {}", loan.tracking_code),
        )
        .await?;

        let last_entry_amount = match target.payment_history.0.last() {
            Some(HistoryEntry::Allocation(entry)) => Some(entry.amount),
            _ => None,
        };
        let split = revert_attribution(last.amount, last_entry_amount, target.paid_amount);

        if split.cascaded_excess > Decimal::ZERO {
            self.unwind_cascade(
                conn,
                loan,
                target.payment_number,
                split.cascaded_excess,
                Some(self.business_date(last.payment_date)),
                true,
            )
            .await?;
        }

        PaymentRepository::delete(conn, last.id).await?;

        let mut history = target.payment_history.0.clone();
        if matches!(history.last(), Some(HistoryEntry::Allocation(_))) {
            history.pop();
        }

        let paid = target.paid_amount - split.target_portion;
        let status = SubLoanStatus::from_amounts(paid, target.total_amount);
        let paid_date = if paid > Decimal::ZERO {
            last_allocation_date(&history)
        } else {
            None
        };

        get_metrics().record_payment_reversed("revert");

        SubLoanRepository::persist_state(conn, target.id, paid, status, paid_date, &history).await
    }

    /// Claws back `excess` from predecessors of `target_payment_number`,
    /// most recently touched first, using one batched locked fetch.
    ///
    /// `same_day` restricts the walk to allocations on that business date
    /// (the single-payment revert case). `shrink_same_day_payments`
    /// additionally shrinks or removes each touched predecessor's most
    /// recent same-day payment row. Returns the amount actually unwound.
    pub(super) async fn unwind_cascade(
        &self,
        conn: &mut PgConnection,
        loan: &Loan,
        target_payment_number: i32,
        excess: Decimal,
        same_day: Option<NaiveDate>,
        shrink_same_day_payments: bool,
    ) -> Result<Decimal> {
        let touched =
            SubLoanRepository::lock_touched_predecessors(conn, loan.id, target_payment_number)
                .await?;

        let mut rows: HashMap<Uuid, &SubLoan> = HashMap::with_capacity(touched.len());
        let mut candidates = Vec::with_capacity(touched.len());

        for sub_loan in &touched {
            let entry = match sub_loan.payment_history.0.last() {
                Some(HistoryEntry::Allocation(entry)) => entry,
                _ => continue,
            };
            if let Some(day) = same_day {
                if self.business_date(entry.date) != day {
                    continue;
                }
            }
            rows.insert(sub_loan.id, sub_loan);
            candidates.push(UndoCandidate {
                sub_loan_id: sub_loan.id,
                last_entry_amount: entry.amount,
                paid_amount: sub_loan.paid_amount,
            });
        }

        let undos = plan_cascade_unwind(&candidates, excess);
        let mut unwound = Decimal::ZERO;

        for undo in &undos {
            let row = rows.get(&undo.sub_loan_id).ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "cascade unwind planned for an unfetched installment"
                ))
            })?;

            let mut history = row.payment_history.0.clone();
            if undo.pops_entry {
                history.pop();
            } else if let Some(HistoryEntry::Allocation(entry)) = history.last_mut() {
                entry.amount -= undo.amount;
                entry.balance += undo.amount;
            }

            let paid = row.paid_amount - undo.amount;
            let status = SubLoanStatus::from_amounts(paid, row.total_amount);
            let paid_date = if paid > Decimal::ZERO {
                last_allocation_date(&history)
            } else {
                None
            };

            SubLoanRepository::persist_state(conn, undo.sub_loan_id, paid, status, paid_date, &history)
                .await?;

            if shrink_same_day_payments {
                if let Some(payment) = PaymentRepository::lock_latest(conn, undo.sub_loan_id).await? {
                    let matches_day = same_day
                        .map(|day| self.business_date(payment.payment_date) == day)
                        .unwrap_or(false);
                    if matches_day {
                        let reduced = payment.amount - undo.amount;
                        if reduced <= Decimal::ZERO {
                            PaymentRepository::delete(conn, payment.id).await?;
                        } else {
                            PaymentRepository::shrink_amount(conn, payment.id, reduced).await?;
                        }
                    }
                }
            }

            unwound += undo.amount;
        }

        Ok(unwound)
    }
}
