use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    CollectorTransactionType, Currency, Loan, PaymentFrequency, SubLoan, SubLoanStatus,
    WalletTransactionType,
};
use crate::repositories::{LoanRepository, SubLoanRepository};

use super::sequence::{self, TrackingCode};
use super::wallet_ledger;

/// Request to issue a loan and its installment schedule.
#[derive(Debug, Clone)]
pub struct CreateLoanRequest {
    pub client_id: Uuid,
    pub manager_id: Uuid,
    pub original_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: Currency,
    pub interest_rate: Decimal,
    pub payment_frequency: PaymentFrequency,
    pub total_payments: i32,
    /// Defaults to today (UTC).
    pub start_date: Option<NaiveDate>,
    /// Caller-supplied code; bypasses the counter but must be globally
    /// unique. Collisions fail the issuance outright.
    pub custom_tracking_code: Option<String>,
    /// Prefix for generated codes. Defaults to `LN`.
    pub tracking_prefix: Option<String>,
}

/// Result of a loan issuance.
#[derive(Debug, Clone, Serialize)]
pub struct LoanIssuance {
    pub loan: Loan,
    pub sub_loans: Vec<SubLoan>,
    /// Present when the code came from the sequence generator.
    pub tracking: Option<TrackingCode>,
    pub wallet_balance: Decimal,
    pub collector_balance: Decimal,
}

/// Issues loans: schedule creation plus the disbursement entries on both
/// ledgers, in one transaction.
pub struct LoanService {
    pool: PgPool,
    loans: LoanRepository,
    sub_loans: SubLoanRepository,
}

impl LoanService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            loans: LoanRepository::new(pool.clone()),
            sub_loans: SubLoanRepository::new(pool.clone()),
            pool,
        }
    }

    /// Creates the loan, its full installment schedule, and the
    /// LOAN_DISBURSEMENT entries on the manager's wallet and collector
    /// float. The manager wallet must cover the principal; the collector
    /// float may go negative.
    pub async fn create_loan(&self, request: CreateLoanRequest) -> Result<LoanIssuance> {
        self.validate(&request)?;

        let mut tx = self.pool.begin().await?;

        let (tracking_code, tracking) = match &request.custom_tracking_code {
            Some(code) => {
                let code = code.trim().to_uppercase();
                sequence::ensure_code_available(&mut *tx, &code).await?;
                (code, None)
            }
            None => {
                let prefix = request.tracking_prefix.as_deref().unwrap_or("LN");
                let tracking = sequence::next_tracking_code(&mut *tx, prefix).await?;
                (tracking.code.clone(), Some(tracking))
            }
        };

        let now = Utc::now();
        let loan = Loan {
            id: Uuid::new_v4(),
            client_id: request.client_id,
            manager_id: request.manager_id,
            tracking_code,
            original_amount: request.original_amount,
            total_amount: request.total_amount,
            currency: request.currency,
            interest_rate: request.interest_rate,
            payment_frequency: request.payment_frequency,
            total_payments: request.total_payments,
            start_date: request.start_date.unwrap_or_else(|| now.date_naive()),
            created_at: now,
            deleted_at: None,
        };

        let loan = LoanRepository::insert(&mut *tx, &loan).await?;

        let amounts = loan.installment_amounts();
        let due_dates = loan.installment_due_dates();
        let schedule: Vec<SubLoan> = amounts
            .into_iter()
            .zip(due_dates)
            .enumerate()
            .map(|(i, (total_amount, due_date))| SubLoan {
                id: Uuid::new_v4(),
                loan_id: loan.id,
                payment_number: i as i32 + 1,
                total_amount,
                paid_amount: Decimal::ZERO,
                status: SubLoanStatus::Pending,
                due_date,
                paid_date: None,
                payment_history: Json(Vec::new()),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            })
            .collect();

        let sub_loans = SubLoanRepository::insert_batch(&mut *tx, &schedule).await?;

        let (wallet, _) = wallet_ledger::debit_wallet(
            &mut *tx,
            loan.manager_id,
            loan.original_amount,
            WalletTransactionType::LoanDisbursement,
            &format!("disbursement of {}", loan.tracking_code),
        )
        .await?;

        let (collector, _) = wallet_ledger::debit_collector_wallet(
            &mut *tx,
            loan.manager_id,
            loan.original_amount,
            CollectorTransactionType::LoanDisbursement,
            &format!("disbursement of {}", loan.tracking_code),
        )
        .await?;

        tx.commit().await?;

        info!(
            loan_id = %loan.id,
            tracking_code = %loan.tracking_code,
            installments = sub_loans.len(),
            "loan issued"
        );

        Ok(LoanIssuance {
            loan,
            sub_loans,
            tracking,
            wallet_balance: wallet.balance,
            collector_balance: collector.balance,
        })
    }

    pub async fn get_loan(&self, id: Uuid) -> Result<Loan> {
        self.loans
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("loan '{}'", id)))
    }

    pub async fn get_schedule(&self, loan_id: Uuid) -> Result<Vec<SubLoan>> {
        self.sub_loans.list_by_loan(loan_id).await
    }

    /// Grants an additional user a management relationship over a client.
    pub async fn assign_client_manager(&self, manager_id: Uuid, client_id: Uuid) -> Result<()> {
        self.loans.assign_client_manager(manager_id, client_id).await
    }

    fn validate(&self, request: &CreateLoanRequest) -> Result<()> {
        if request.original_amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "loan principal must be positive".to_string(),
            ));
        }
        if request.total_amount < request.original_amount {
            return Err(AppError::Validation(
                "total amount cannot be below the principal".to_string(),
            ));
        }
        if request.total_payments < 1 {
            return Err(AppError::Validation(
                "a loan needs at least one installment".to_string(),
            ));
        }
        if request.interest_rate < Decimal::ZERO {
            return Err(AppError::Validation(
                "interest rate cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}
