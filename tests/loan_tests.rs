mod common;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use uuid::Uuid;

use collections_ledger::error::AppError;
use collections_ledger::models::{Currency, PaymentFrequency, SubLoanStatus};
use collections_ledger::repositories::SubLoanRepository;
use collections_ledger::services::{
    CollectorWalletService, CreateLoanRequest, LoanService, WalletService,
};

async fn setup_manager(pool: &PgPool, initial_capital: Decimal) -> Uuid {
    let manager_id = Uuid::new_v4();
    WalletService::new(pool.clone())
        .open_wallet(manager_id, Currency::USD)
        .await
        .expect("Failed to open wallet");
    CollectorWalletService::new(pool.clone())
        .open_wallet(manager_id, Currency::USD)
        .await
        .expect("Failed to open collector wallet");
    if initial_capital > Decimal::ZERO {
        WalletService::new(pool.clone())
            .deposit(manager_id, initial_capital, "initial capital")
            .await
            .expect("Failed to deposit");
    }
    manager_id
}

fn loan_request(manager_id: Uuid, total: Decimal, parts: i32) -> CreateLoanRequest {
    CreateLoanRequest {
        client_id: Uuid::new_v4(),
        manager_id,
        original_amount: total,
        total_amount: total,
        currency: Currency::USD,
        interest_rate: dec!(0.15),
        payment_frequency: PaymentFrequency::Weekly,
        total_payments: parts,
        start_date: None,
        custom_tracking_code: None,
        tracking_prefix: Some("TST".to_string()),
    }
}

fn unique_prefix() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("T{}", &id[..8]).to_uppercase()
}

#[tokio::test]
async fn test_issuance_creates_exact_schedule() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(5000)).await;
    let service = LoanService::new(pool.clone());

    let issuance = service
        .create_loan(loan_request(manager_id, dec!(1000), 3))
        .await
        .expect("Failed to issue loan");

    assert_eq!(issuance.sub_loans.len(), 3);

    // Rounded split with the remainder on the last installment; the parts
    // sum exactly to the loan total.
    let amounts: Vec<Decimal> = issuance.sub_loans.iter().map(|s| s.total_amount).collect();
    assert_eq!(amounts, vec![dec!(333.33), dec!(333.33), dec!(333.34)]);
    let sum: Decimal = amounts.iter().copied().sum();
    assert_eq!(sum, dec!(1000));

    // Payment numbers are 1-based and due dates advance weekly.
    for (i, sub_loan) in issuance.sub_loans.iter().enumerate() {
        assert_eq!(sub_loan.payment_number, i as i32 + 1);
        assert_eq!(sub_loan.status, SubLoanStatus::Pending);
        assert_eq!(
            sub_loan.due_date,
            issuance.loan.start_date + Duration::days(7 * (i as i64 + 1))
        );
    }
}

#[tokio::test]
async fn test_issuance_disburses_from_both_ledgers() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(5000)).await;
    let service = LoanService::new(pool.clone());

    let issuance = service
        .create_loan(loan_request(manager_id, dec!(2000), 4))
        .await
        .expect("Failed to issue loan");

    // Working capital funds the principal; the street float goes negative
    // by the same amount.
    assert_eq!(issuance.wallet_balance, dec!(3000));
    assert_eq!(issuance.collector_balance, dec!(-2000));
}

#[tokio::test]
async fn test_issuance_requires_working_capital() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(100)).await;
    let service = LoanService::new(pool.clone());

    let err = service
        .create_loan(loan_request(manager_id, dec!(2000), 4))
        .await
        .expect_err("Uncovered disbursement must fail");
    assert!(matches!(err, AppError::InsufficientFunds { .. }));

    // The whole issuance rolled back: no loan, schedule or ledger entries.
    let wallet = WalletService::new(pool.clone())
        .get_wallet(manager_id)
        .await
        .expect("Failed to get wallet");
    assert_eq!(wallet.balance, dec!(100));
}

#[tokio::test]
async fn test_generated_tracking_codes_are_sequential() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let service = LoanService::new(pool.clone());
    let prefix = unique_prefix();

    let mut request = loan_request(manager_id, dec!(500), 1);
    request.tracking_prefix = Some(prefix.clone());
    let first = service
        .create_loan(request)
        .await
        .expect("Failed to issue first loan");

    let mut request = loan_request(manager_id, dec!(500), 1);
    request.tracking_prefix = Some(prefix.clone());
    let second = service
        .create_loan(request)
        .await
        .expect("Failed to issue second loan");

    let year = Utc::now().format("%Y").to_string();
    let first_tracking = first.tracking.expect("generated code");
    let second_tracking = second.tracking.expect("generated code");

    assert_eq!(first_tracking.code, format!("{}-{}-00001", prefix, year));
    assert_eq!(second_tracking.code, format!("{}-{}-00002", prefix, year));
    assert_eq!(second_tracking.sequence, first_tracking.sequence + 1);
}

#[tokio::test]
async fn test_custom_tracking_code_collision_fails() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let service = LoanService::new(pool.clone());
    let id = Uuid::new_v4().simple().to_string();
    let code = format!("CUST-{}", &id[..12]);

    let mut request = loan_request(manager_id, dec!(500), 1);
    request.custom_tracking_code = Some(code.clone());
    let issuance = service
        .create_loan(request)
        .await
        .expect("Failed to issue loan with custom code");
    assert_eq!(issuance.loan.tracking_code, code.to_uppercase());
    assert!(issuance.tracking.is_none());

    // Same code again: validation error, no auto-retry.
    let mut request = loan_request(manager_id, dec!(500), 1);
    request.custom_tracking_code = Some(code);
    let err = service
        .create_loan(request)
        .await
        .expect_err("Duplicate custom code must fail");
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_issuance_validation() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let service = LoanService::new(pool.clone());

    let mut request = loan_request(manager_id, dec!(500), 0);
    let err = service
        .create_loan(request.clone())
        .await
        .expect_err("Zero installments must fail");
    assert!(matches!(err, AppError::Validation(_)));

    request.total_payments = 2;
    request.total_amount = dec!(400); // below principal
    let err = service
        .create_loan(request)
        .await
        .expect_err("Total below principal must fail");
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_mark_overdue_flips_only_unpaid_past_due() {
    let pool = common::setup_test_db().await;
    let manager_id = setup_manager(&pool, dec!(10000)).await;
    let service = LoanService::new(pool.clone());

    let mut request = loan_request(manager_id, dec!(1000), 2);
    request.start_date = Some(Utc::now().date_naive() - Duration::days(30));
    let issuance = service
        .create_loan(request)
        .await
        .expect("Failed to issue back-dated loan");

    let repo = SubLoanRepository::new(pool.clone());
    let flipped = repo
        .mark_overdue(Utc::now().date_naive())
        .await
        .expect("Failed to mark overdue");
    assert!(flipped >= 2);

    let schedule = service
        .get_schedule(issuance.loan.id)
        .await
        .expect("Failed to load schedule");
    for sub_loan in &schedule {
        assert_eq!(sub_loan.status, SubLoanStatus::Overdue);
    }
}
