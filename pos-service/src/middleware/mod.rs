pub mod auth;
pub mod tenant;

pub use auth::{auth_middleware, optional_auth_middleware, AuthUser, MaybeAuthUser};
pub use tenant::TenantContext;
