pub mod collector_wallet_repository;
pub mod loan_repository;
pub mod payment_repository;
pub mod route_repository;
pub mod sub_loan_repository;
pub mod wallet_repository;

pub use collector_wallet_repository::CollectorWalletRepository;
pub use loan_repository::LoanRepository;
pub use payment_repository::PaymentRepository;
pub use route_repository::RouteRepository;
pub use sub_loan_repository::SubLoanRepository;
pub use wallet_repository::WalletRepository;

use sqlx::PgPool;

/// Database connection pool type alias.
pub type DbPool = PgPool;
