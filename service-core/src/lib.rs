//! Shared infrastructure for the POS backend: HTTP errors, configuration,
//! request middleware, observability, retries and webhook signatures.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod retry;
pub mod utils;
