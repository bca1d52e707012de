use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::error::{AppError, Result};
use crate::models::{
    CollectorTransactionType, Currency, HistoryEntry, Loan, Payment, SubLoan, SubLoanStatus,
    WalletTransactionType,
};
use crate::observability::{get_metrics, mask_amount};
use crate::repositories::{LoanRepository, PaymentRepository, SubLoanRepository};

use super::allocation::{allocate, InstallmentSnapshot};
use super::wallet_ledger;

/// Request to register one collected payment against an installment.
#[derive(Debug, Clone)]
pub struct RegisterPaymentRequest {
    /// Acting user. Authorization and wallet attribution are decoupled: the
    /// actor must manage the client, but collections always land on the
    /// loan's assigned manager.
    pub actor_id: Uuid,
    pub sub_loan_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    /// Defaults to now.
    pub date: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

/// Per-installment share of a registered amount.
#[derive(Debug, Clone, Serialize)]
pub struct DistributedPayment {
    pub sub_loan_id: Uuid,
    pub payment_number: i32,
    pub amount: Decimal,
    pub status: SubLoanStatus,
}

/// Result of a registration or an edit-replace.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub payment: Payment,
    /// The target installment after the waterfall ran.
    pub sub_loan: SubLoan,
    /// Every installment touched, target first, then cascaded predecessors
    /// in ascending payment-number order.
    pub distributed: Vec<DistributedPayment>,
    /// Excess beyond the target and all PARTIAL predecessors; kept, not
    /// refunded.
    pub absorbed_excess: Decimal,
    pub wallet_balance: Decimal,
    pub collector_balance: Decimal,
}

/// Per-item result inside a bulk registration.
#[derive(Debug, Serialize)]
pub struct BulkItemResult {
    pub sub_loan_id: Uuid,
    pub success: bool,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub outcome: Option<PaymentOutcome>,
}

/// Aggregate of a best-effort bulk registration.
#[derive(Debug, Serialize)]
pub struct BulkRegisterOutcome {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

/// Read-only payment history view of one installment.
#[derive(Debug, Clone, Serialize)]
pub struct SubLoanPaymentsView {
    pub sub_loan: SubLoan,
    pub payments: Vec<Payment>,
    pub history: Vec<HistoryEntry>,
}

/// The installment payment waterfall and reconciliation engine.
///
/// Every mutating operation runs inside one transaction spanning the target
/// installment, any cascaded predecessors, the payment record and both
/// wallets; partial application is never observable. Serialization of
/// concurrent registrations against the same installment relies on the row
/// locks taken by the engine, not on any application-level lock.
pub struct PaymentEngine {
    pub(super) pool: PgPool,
    pub(super) settings: EngineSettings,
    sub_loans: SubLoanRepository,
    payments: PaymentRepository,
}

impl PaymentEngine {
    pub fn new(pool: PgPool, settings: EngineSettings) -> Self {
        Self {
            sub_loans: SubLoanRepository::new(pool.clone()),
            payments: PaymentRepository::new(pool.clone()),
            pool,
            settings,
        }
    }

    /// Registers one collected amount against an installment, cascading any
    /// excess into PARTIAL predecessors.
    ///
    /// If the installment is already PAID and its most recent payment falls
    /// on the same business date as the incoming one, that payment is fully
    /// reverted first and the registration proceeds fresh; on any other date
    /// the call fails with `AlreadyPaid`.
    pub async fn register_payment(
        &self,
        request: RegisterPaymentRequest,
    ) -> Result<PaymentOutcome> {
        if request.amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "payment amount must be positive".to_string(),
            ));
        }

        let started = Instant::now();
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

        let date = request.date.unwrap_or_else(Utc::now);

        let target = if target.status == SubLoanStatus::Paid {
            let last = PaymentRepository::lock_latest(&mut *tx, target.id)
                .await?
                .ok_or_else(|| AppError::AlreadyPaid {
                    last_paid_on: self.business_date(target.paid_date.unwrap_or(date)),
                })?;

            if self.business_date(last.payment_date) != self.business_date(date) {
                return Err(AppError::AlreadyPaid {
                    last_paid_on: self.business_date(last.payment_date),
                });
            }

            // Same-day correction: undo the most recent payment, then apply
            // the incoming amount as a fresh allocation.
            self.revert_last_payment(&mut *tx, &loan, &target, &last)
                .await?
        } else {
            target
        };

        let outcome = self
            .apply_payment(
                &mut *tx,
                &loan,
                &target,
                request.amount,
                date,
                request.description,
                request.actor_id,
                false,
            )
            .await?;

        tx.commit().await?;

        get_metrics().record_payment_registered(loan.currency.code());
        get_metrics().record_waterfall_latency(started.elapsed().as_secs_f64() * 1000.0);
        get_metrics().record_waterfall_touched(outcome.distributed.len() as u64);
        info!(
            sub_loan_id = %request.sub_loan_id,
            tracking_code = %loan.tracking_code,
            amount = %mask_amount(&outcome.payment.amount),
            installments_touched = outcome.distributed.len(),
            "payment registered"
        );

        Ok(outcome)
    }

    /// Sequential best-effort loop over [`register_payment`]: failures are
    /// isolated per item and the batch never aborts.
    pub async fn register_bulk_payments(
        &self,
        requests: Vec<RegisterPaymentRequest>,
    ) -> BulkRegisterOutcome {
        let total = requests.len();
        let mut results = Vec::with_capacity(total);
        let mut successful = 0;

        for request in requests {
            let sub_loan_id = request.sub_loan_id;
            match self.register_payment(request).await {
                Ok(outcome) => {
                    successful += 1;
                    results.push(BulkItemResult {
                        sub_loan_id,
                        success: true,
                        error_code: None,
                        error: None,
                        outcome: Some(outcome),
                    });
                }
                Err(err) => {
                    get_metrics().record_payment_failed(err.code());
                    results.push(BulkItemResult {
                        sub_loan_id,
                        success: false,
                        error_code: Some(err.code().to_string()),
                        error: Some(err.to_string()),
                        outcome: None,
                    });
                }
            }
        }

        BulkRegisterOutcome {
            total,
            successful,
            failed: total - successful,
            results,
        }
    }

    /// Read-only view of an installment's payment rows and history log.
    pub async fn get_sub_loan_payments(&self, sub_loan_id: Uuid) -> Result<SubLoanPaymentsView> {
        let sub_loan = self
            .sub_loans
            .find_by_id(sub_loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("sub-loan '{}'", sub_loan_id)))?;

        let payments = self.payments.list_by_sub_loan(sub_loan_id).await?;
        let history = sub_loan.payment_history.0.clone();

        Ok(SubLoanPaymentsView {
            sub_loan,
            payments,
            history,
        })
    }

    /// Applies one amount through the waterfall and books it on the payment
    /// record and both ledgers. Shared by registration and edit-replace;
    /// `force_partial_target` is the edit quirk.
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn apply_payment(
        &self,
        conn: &mut PgConnection,
        loan: &Loan,
        target: &SubLoan,
        amount: Decimal,
        date: DateTime<Utc>,
        description: Option<String>,
        actor_id: Uuid,
        force_partial_target: bool,
    ) -> Result<PaymentOutcome> {
        let target_snapshot = InstallmentSnapshot::from(target);

        // The batched predecessor fetch is only needed once the target would
        // be filled completely.
        let predecessors = if amount >= target_snapshot.remaining() {
            SubLoanRepository::lock_partial_predecessors(conn, loan.id, target.payment_number)
                .await?
        } else {
            Vec::new()
        };

        let snapshots: Vec<InstallmentSnapshot> = predecessors.iter().map(Into::into).collect();
        let plan = allocate(&target_snapshot, &snapshots, amount, force_partial_target);

        let mut rows: HashMap<Uuid, &SubLoan> = HashMap::with_capacity(1 + predecessors.len());
        rows.insert(target.id, target);
        for predecessor in &predecessors {
            rows.insert(predecessor.id, predecessor);
        }

        let mut updated_target = target.clone();
        for slice in &plan.slices {
            let row = rows.get(&slice.sub_loan_id).ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "allocation produced a slice for an unfetched installment"
                ))
            })?;

            let mut history = row.payment_history.0.clone();
            history.push(HistoryEntry::allocation(
                date,
                slice.amount,
                slice.remaining_after,
            ));

            let updated = SubLoanRepository::persist_state(
                conn,
                slice.sub_loan_id,
                slice.paid_amount_after,
                slice.status_after,
                Some(date),
                &history,
            )
            .await?;

            if slice.sub_loan_id == target.id {
                updated_target = updated;
            }
        }

        // One payment row for the full handed-in amount, on the target.
        let payment = PaymentRepository::insert(
            conn,
            &Payment::new(
                target.id,
                amount,
                loan.currency,
                date,
                description,
                actor_id,
            ),
        )
        .await?;

        // Both ledgers credit the loan's assigned manager, independent of
        // which user performed the registration.
        let (wallet, _) = wallet_ledger::credit_wallet(
            conn,
            loan.manager_id,
            amount,
            WalletTransactionType::LoanPayment,
            &format!("loan payment on {}", loan.tracking_code),
        )
        .await?;

        let (collector, _) = wallet_ledger::credit_collector_wallet(
            conn,
            loan.manager_id,
            amount,
            CollectorTransactionType::Collection,
            &format!("collection on {}", loan.tracking_code),
        )
        .await?;

        Ok(PaymentOutcome {
            payment,
            sub_loan: updated_target,
            distributed: plan
                .slices
                .iter()
                .map(|slice| DistributedPayment {
                    sub_loan_id: slice.sub_loan_id,
                    payment_number: slice.payment_number,
                    amount: slice.amount,
                    status: slice.status_after,
                })
                .collect(),
            absorbed_excess: plan.absorbed_excess,
            wallet_balance: wallet.balance,
            collector_balance: collector.balance,
        })
    }

    pub(super) async fn check_management(
        &self,
        conn: &mut PgConnection,
        actor_id: Uuid,
        loan: &Loan,
    ) -> Result<()> {
        let allowed = LoanRepository::has_management_relationship(
            conn,
            actor_id,
            loan.manager_id,
            loan.client_id,
        )
        .await?;

        if !allowed {
            return Err(AppError::Forbidden(format!(
                "user '{}' does not manage client '{}'",
                actor_id, loan.client_id
            )));
        }
        Ok(())
    }

    /// Opens a transaction with the extended statement timeout waterfalls
    /// need: cascades over many PARTIAL predecessors hold locks longer than
    /// ordinary single-row work.
    pub(super) async fn begin_waterfall_tx(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.settings.waterfall_timeout_secs * 1000
        ))
        .execute(&mut *tx)
        .await?;

        Ok(tx)
    }

    /// Calendar date of `ts` in the ledger's fixed business timezone.
    pub(super) fn business_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.settings.business_offset()).date_naive()
    }
}
