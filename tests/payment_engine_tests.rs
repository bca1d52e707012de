mod common;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use uuid::Uuid;

use collections_ledger::config::EngineSettings;
use collections_ledger::error::AppError;
use collections_ledger::models::{Currency, PaymentFrequency, SubLoanStatus};
use collections_ledger::services::{
    CollectorWalletService, CreateLoanRequest, LoanIssuance, LoanService, PaymentEngine,
    RegisterPaymentRequest, WalletService,
};

fn engine(pool: &PgPool) -> PaymentEngine {
    PaymentEngine::new(pool.clone(), EngineSettings::default())
}

async fn setup_manager(pool: &PgPool, initial_capital: Decimal) -> Uuid {
    let manager_id = Uuid::new_v4();
    let wallets = WalletService::new(pool.clone());
    let collectors = CollectorWalletService::new(pool.clone());

    wallets
        .open_wallet(manager_id, Currency::USD)
        .await
        .expect("Failed to open wallet");
    collectors
        .open_wallet(manager_id, Currency::USD)
        .await
        .expect("Failed to open collector wallet");

    if initial_capital > Decimal::ZERO {
        wallets
            .deposit(manager_id, initial_capital, "initial capital")
            .await
            .expect("Failed to deposit");
    }

    manager_id
}

async fn issue_loan(
    pool: &PgPool,
    manager_id: Uuid,
    total_amount: Decimal,
    total_payments: i32,
) -> LoanIssuance {
    LoanService::new(pool.clone())
        .create_loan(CreateLoanRequest {
            client_id: Uuid::new_v4(),
            manager_id,
            original_amount: total_amount,
            total_amount,
            currency: Currency::USD,
            interest_rate: dec!(0.10),
            payment_frequency: PaymentFrequency::Weekly,
            total_payments,
            start_date: None,
            custom_tracking_code: None,
            tracking_prefix: Some("TST".to_string()),
        })
        .await
        .expect("Failed to issue loan")
}

fn register(
    manager_id: Uuid,
    sub_loan_id: Uuid,
    amount: Decimal,
) -> RegisterPaymentRequest {
    RegisterPaymentRequest {
        actor_id: manager_id,
        sub_loan_id,
        amount,
        currency: Currency::USD,
        date: None,
        description: None,
    }
}

#[tokio::test]
async fn test_partial_payment_leaves_target_partial() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let issuance = issue_loan(&pool, manager_id, dec!(1000), 2).await;
    let target = &issuance.sub_loans[1]; // 500 due, PENDING

    let wallet_before = WalletService::new(pool.clone())
        .get_wallet(manager_id)
        .await
        .expect("Failed to get wallet")
        .balance;

    let outcome = engine(&pool)
        .register_payment(register(manager_id, target.id, dec!(400)))
        .await
        .expect("Failed to register payment");

    // 400 < 500: PARTIAL, no cascade even though installment #1 is unpaid.
    assert_eq!(outcome.sub_loan.paid_amount, dec!(400));
    assert_eq!(outcome.sub_loan.status, SubLoanStatus::Partial);
    assert_eq!(outcome.distributed.len(), 1);
    assert_eq!(outcome.distributed[0].amount, dec!(400));
    assert_eq!(outcome.absorbed_excess, Decimal::ZERO);
    assert_eq!(outcome.payment.amount, dec!(400));
    assert_eq!(outcome.wallet_balance, wallet_before + dec!(400));
}

#[tokio::test]
async fn test_overpayment_without_predecessors_is_absorbed() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let issuance = issue_loan(&pool, manager_id, dec!(1000), 1).await;
    let target = &issuance.sub_loans[0];

    let collector_before = CollectorWalletService::new(pool.clone())
        .get_wallet(manager_id)
        .await
        .expect("Failed to get collector wallet")
        .balance;

    let outcome = engine(&pool)
        .register_payment(register(manager_id, target.id, dec!(1200)))
        .await
        .expect("Failed to register payment");

    assert_eq!(outcome.sub_loan.paid_amount, dec!(1000));
    assert_eq!(outcome.sub_loan.status, SubLoanStatus::Paid);
    assert_eq!(outcome.absorbed_excess, dec!(200));
    // The payment row still carries the full handed-in amount and both
    // ledgers move by it.
    assert_eq!(outcome.payment.amount, dec!(1200));
    assert_eq!(outcome.collector_balance, collector_before + dec!(1200));
}

#[tokio::test]
async fn test_excess_cascades_to_partial_predecessor() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let issuance = issue_loan(&pool, manager_id, dec!(1000), 2).await;
    let first = &issuance.sub_loans[0];
    let second = &issuance.sub_loans[1];

    // Leave installment #1 PARTIAL at 300/500.
    engine(&pool)
        .register_payment(register(manager_id, first.id, dec!(300)))
        .await
        .expect("Failed to register partial payment");

    // 700 on #2: 500 fills it, 200 cascades back to #1 which ends PAID.
    let outcome = engine(&pool)
        .register_payment(register(manager_id, second.id, dec!(700)))
        .await
        .expect("Failed to register cascading payment");

    assert_eq!(outcome.distributed.len(), 2);
    assert_eq!(outcome.distributed[0].sub_loan_id, second.id);
    assert_eq!(outcome.distributed[0].amount, dec!(500));
    assert_eq!(outcome.distributed[0].status, SubLoanStatus::Paid);
    assert_eq!(outcome.distributed[1].sub_loan_id, first.id);
    assert_eq!(outcome.distributed[1].amount, dec!(200));
    assert_eq!(outcome.distributed[1].status, SubLoanStatus::Paid);

    let distributed_total: Decimal = outcome.distributed.iter().map(|d| d.amount).sum();
    assert_eq!(distributed_total + outcome.absorbed_excess, dec!(700));

    let view = engine(&pool)
        .get_sub_loan_payments(first.id)
        .await
        .expect("Failed to load history");
    assert_eq!(view.sub_loan.paid_amount, dec!(500));
    assert_eq!(view.sub_loan.status, SubLoanStatus::Paid);
    // Own allocation plus the cascaded slice.
    assert_eq!(view.history.len(), 2);
}

#[tokio::test]
async fn test_currency_mismatch_is_rejected() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let issuance = issue_loan(&pool, manager_id, dec!(1000), 2).await;
    let target = &issuance.sub_loans[0];

    let mut request = register(manager_id, target.id, dec!(100));
    request.currency = Currency::DOP;

    let err = engine(&pool)
        .register_payment(request)
        .await
        .expect_err("Mismatched currency must fail");
    assert!(matches!(err, AppError::CurrencyMismatch { .. }));

    // Nothing was written.
    let view = engine(&pool)
        .get_sub_loan_payments(target.id)
        .await
        .expect("Failed to load history");
    assert_eq!(view.payments.len(), 0);
    assert_eq!(view.sub_loan.paid_amount, Decimal::ZERO);
}

#[tokio::test]
async fn test_unrelated_actor_is_forbidden() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let issuance = issue_loan(&pool, manager_id, dec!(1000), 2).await;

    let request = RegisterPaymentRequest {
        actor_id: Uuid::new_v4(),
        ..register(manager_id, issuance.sub_loans[0].id, dec!(100))
    };

    let err = engine(&pool)
        .register_payment(request)
        .await
        .expect_err("Unrelated actor must be rejected");
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_delegated_actor_credits_assigned_manager() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let issuance = issue_loan(&pool, manager_id, dec!(1000), 2).await;

    // A subadmin with a management relationship registers; the collection
    // still lands on the assigned manager's wallets.
    let subadmin_id = Uuid::new_v4();
    LoanService::new(pool.clone())
        .assign_client_manager(subadmin_id, issuance.loan.client_id)
        .await
        .expect("Failed to assign manager");

    let collector_before = CollectorWalletService::new(pool.clone())
        .get_wallet(manager_id)
        .await
        .expect("Failed to get collector wallet")
        .balance;

    let request = RegisterPaymentRequest {
        actor_id: subadmin_id,
        ..register(manager_id, issuance.sub_loans[0].id, dec!(250))
    };

    let outcome = engine(&pool)
        .register_payment(request)
        .await
        .expect("Failed to register via subadmin");

    assert_eq!(outcome.payment.registered_by, subadmin_id);
    assert_eq!(outcome.collector_balance, collector_before + dec!(250));
}

#[tokio::test]
async fn test_unknown_sub_loan_is_not_found() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;

    let err = engine(&pool)
        .register_payment(register(manager_id, Uuid::new_v4(), dec!(100)))
        .await
        .expect_err("Unknown installment must fail");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_non_positive_amount_is_rejected() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let issuance = issue_loan(&pool, manager_id, dec!(1000), 2).await;

    let err = engine(&pool)
        .register_payment(register(manager_id, issuance.sub_loans[0].id, dec!(0)))
        .await
        .expect_err("Zero amount must fail");
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_same_day_repayment_reverts_then_applies() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let issuance = issue_loan(&pool, manager_id, dec!(1000), 1).await;
    let target = &issuance.sub_loans[0];

    let wallet_before = WalletService::new(pool.clone())
        .get_wallet(manager_id)
        .await
        .expect("Failed to get wallet")
        .balance;

    engine(&pool)
        .register_payment(register(manager_id, target.id, dec!(1000)))
        .await
        .expect("Failed to register full payment");

    // Registering again the same day undoes the 1000 and applies 300 fresh.
    let outcome = engine(&pool)
        .register_payment(register(manager_id, target.id, dec!(300)))
        .await
        .expect("Failed to re-register same day");

    assert_eq!(outcome.sub_loan.paid_amount, dec!(300));
    assert_eq!(outcome.sub_loan.status, SubLoanStatus::Partial);

    let view = engine(&pool)
        .get_sub_loan_payments(target.id)
        .await
        .expect("Failed to load history");
    assert_eq!(view.payments.len(), 1);
    assert_eq!(view.payments[0].amount, dec!(300));
    assert_eq!(view.history.len(), 1);

    let wallet_after = WalletService::new(pool.clone())
        .get_wallet(manager_id)
        .await
        .expect("Failed to get wallet")
        .balance;
    assert_eq!(wallet_after, wallet_before + dec!(300));
}

#[tokio::test]
async fn test_repayment_on_other_day_fails_already_paid() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let issuance = issue_loan(&pool, manager_id, dec!(1000), 1).await;
    let target = &issuance.sub_loans[0];

    let mut paid_yesterday = register(manager_id, target.id, dec!(1000));
    paid_yesterday.date = Some(Utc::now() - Duration::days(1));
    engine(&pool)
        .register_payment(paid_yesterday)
        .await
        .expect("Failed to register yesterday's payment");

    let err = engine(&pool)
        .register_payment(register(manager_id, target.id, dec!(300)))
        .await
        .expect_err("Cross-day re-payment must fail");
    assert!(matches!(err, AppError::AlreadyPaid { .. }));

    // The original payment is untouched.
    let view = engine(&pool)
        .get_sub_loan_payments(target.id)
        .await
        .expect("Failed to load history");
    assert_eq!(view.payments.len(), 1);
    assert_eq!(view.payments[0].amount, dec!(1000));
    assert_eq!(view.sub_loan.status, SubLoanStatus::Paid);
}

#[tokio::test]
async fn test_bulk_registration_isolates_failures() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let issuance = issue_loan(&pool, manager_id, dec!(1000), 2).await;

    let requests = vec![
        register(manager_id, issuance.sub_loans[0].id, dec!(100)),
        register(manager_id, Uuid::new_v4(), dec!(100)), // unknown installment
        register(manager_id, issuance.sub_loans[1].id, dec!(200)),
    ];

    let outcome = engine(&pool).register_bulk_payments(requests).await;

    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.successful, 2);
    assert_eq!(outcome.failed, 1);
    assert!(outcome.results[0].success);
    assert!(!outcome.results[1].success);
    assert_eq!(outcome.results[1].error_code.as_deref(), Some("NOT_FOUND"));
    // The failure did not abort the rest of the batch.
    assert!(outcome.results[2].success);
}

#[tokio::test]
async fn test_history_entries_record_remaining_balance() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let issuance = issue_loan(&pool, manager_id, dec!(1000), 2).await;
    let target = &issuance.sub_loans[0];

    engine(&pool)
        .register_payment(register(manager_id, target.id, dec!(150)))
        .await
        .expect("Failed to register payment");
    engine(&pool)
        .register_payment(register(manager_id, target.id, dec!(250)))
        .await
        .expect("Failed to register payment");

    let view = engine(&pool)
        .get_sub_loan_payments(target.id)
        .await
        .expect("Failed to load history");

    assert_eq!(view.history.len(), 2);
    let first = view.history[0].as_allocation().expect("allocation entry");
    let second = view.history[1].as_allocation().expect("allocation entry");
    assert_eq!(first.amount, dec!(150));
    assert_eq!(first.balance, dec!(350));
    assert_eq!(second.amount, dec!(250));
    assert_eq!(second.balance, dec!(100));
}
