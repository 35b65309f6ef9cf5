mod account;
mod billing;
mod business;
mod catalog;
mod sale;
mod user;

pub use account::{Account, AccountClaims, PasswordReset};
pub use billing::{BillingTransaction, BillingTransactionStatus};
pub use business::{Business, BusinessSettings, Subscription};
pub use catalog::{Category, Product};
pub use sale::{LineItem, Sale, SaleStatus};
pub use user::{Role, User};

/// Status shared by businesses, categories, products and users.
pub const STATUS_ACTIVE: &str = "active";
