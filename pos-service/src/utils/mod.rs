mod html;
mod password;
mod token;
mod validation;

pub use html::escape_html;
pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use token::{digest_token, generate_token};
pub use validation::ValidatedJson;
