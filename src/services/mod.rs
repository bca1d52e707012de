pub mod allocation;
pub mod collector_wallet_service;
pub mod loan_service;
pub mod payment_engine;
pub mod reversal;
pub mod sequence;
pub mod wallet_ledger;
pub mod wallet_service;

pub use collector_wallet_service::CollectorWalletService;
pub use loan_service::{CreateLoanRequest, LoanIssuance, LoanService};
pub use payment_engine::{
    BulkItemResult, BulkRegisterOutcome, DistributedPayment, PaymentEngine, PaymentOutcome,
    RegisterPaymentRequest, SubLoanPaymentsView,
};
pub use reversal::{EditPaymentRequest, ResetOutcome};
pub use sequence::TrackingCode;
pub use wallet_service::{StampRepairReport, WalletService};
