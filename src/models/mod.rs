pub mod collector_wallet;
pub mod currency;
pub mod loan;
pub mod payment;
pub mod route;
pub mod sub_loan;
pub mod wallet;

pub use collector_wallet::{CollectorTransactionType, CollectorWallet, CollectorWalletTransaction};
pub use currency::Currency;
pub use loan::{Loan, PaymentFrequency};
pub use payment::Payment;
pub use route::{CollectionRoute, CollectionRouteItem, RouteExpense, RouteStatus};
pub use sub_loan::{
    AllocationEntry, HistoryEntry, ResetEntry, ResetMarker, SubLoan, SubLoanStatus,
};
pub use wallet::{Wallet, WalletTransaction, WalletTransactionType};
