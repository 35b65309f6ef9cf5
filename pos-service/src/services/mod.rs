pub mod access;
pub mod accounts;
pub mod billing;
pub mod business;
pub mod catalog;
pub mod email;
pub mod error;
pub mod identity;
pub mod jwt;
pub mod metrics;
pub mod quota;
pub mod sales;

pub use access::{OwnershipRule, TenantOwned, TenantScope};
pub use accounts::{AccountService, Registration};
pub use billing::{BillingProvider, BillingService, MockBillingProvider, PolarClient};
pub use business::BusinessService;
pub use catalog::CatalogService;
pub use email::{EmailProvider, MockEmailService, SentEmail, SmtpEmailService};
pub use error::ServiceError;
pub use identity::{IdentityProvider, Principal, PrincipalUpdate, SignIn, StoreIdentityProvider};
pub use jwt::{JwtService, TokenClaims, TokenPair, TokenUse};
pub use quota::{QuotaGate, ResourceKind};
pub use sales::{NewSale, SaleEngine, SaleFilter};
