use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct PosConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub mongodb: MongoConfig,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
    pub password_reset: PasswordResetConfig,
    pub security: SecurityConfig,
    pub billing: BillingConfig,
    pub sales: SalesConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("Invalid ENVIRONMENT: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: Secret<String>,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetConfig {
    /// Frontend page that receives `?token=...`.
    pub url: String,
    pub expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    pub api_url: String,
    /// Base of hosted checkout links; the link id is appended as a path segment.
    pub checkout_url: String,
    pub access_token: Secret<String>,
    /// Standard Webhooks secret; signature checks are skipped when unset.
    pub webhook_secret: Option<Secret<String>>,
    /// Plan id offered to clients -> provider checkout link id.
    pub plan_links: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SalesConfig {
    pub max_transaction_attempts: u32,
    pub total_mismatch: TotalMismatchPolicy,
}

/// What to do when a client-supplied sale total disagrees with the line items.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TotalMismatchPolicy {
    Reject,
    Override,
}

impl FromStr for TotalMismatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(TotalMismatchPolicy::Reject),
            "override" => Ok(TotalMismatchPolicy::Override),
            other => Err(format!("Invalid SALES_TOTAL_MISMATCH: {}", other)),
        }
    }
}

impl PosConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let mut common = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        if let Ok(port) = env::var("PORT") {
            common.port = parse(&port, "PORT")?;
        }

        let config = PosConfig {
            common,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("pos-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: optional_env("OTLP_ENDPOINT"),
            mongodb: MongoConfig {
                uri: Secret::new(get_env(
                    "MONGODB_URI",
                    Some("mongodb://localhost:27017/?replicaSet=rs0"),
                    is_prod,
                )?),
                database: get_env("MONGODB_DATABASE", Some("pos"), is_prod)?,
            },
            jwt: JwtConfig {
                secret: Secret::new(get_env("JWT_SECRET", Some("dev-only-jwt-secret"), is_prod)?),
                access_token_expiry_minutes: parse(
                    &get_env("JWT_ACCESS_TOKEN_EXPIRY_MINUTES", Some("60"), is_prod)?,
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                )?,
                refresh_token_expiry_days: parse(
                    &get_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", Some("30"), is_prod)?,
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                )?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                port: parse(&get_env("SMTP_PORT", Some("587"), is_prod)?, "SMTP_PORT")?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: Secret::new(get_env("SMTP_PASSWORD", Some(""), is_prod)?),
                from_email: get_env("SMTP_FROM_EMAIL", Some("no-reply@localhost"), is_prod)?,
            },
            password_reset: PasswordResetConfig {
                url: get_env(
                    "PASSWORD_RESET_URL",
                    Some("http://localhost:3000/reset-password"),
                    is_prod,
                )?,
                expiry_minutes: parse(
                    &get_env("PASSWORD_RESET_EXPIRY_MINUTES", Some("60"), is_prod)?,
                    "PASSWORD_RESET_EXPIRY_MINUTES",
                )?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            billing: BillingConfig {
                api_url: get_env("BILLING_API_URL", Some("https://api.polar.sh"), is_prod)?,
                checkout_url: get_env("BILLING_CHECKOUT_URL", Some("https://buy.polar.sh"), is_prod)?,
                access_token: Secret::new(get_env("BILLING_ACCESS_TOKEN", Some(""), is_prod)?),
                webhook_secret: optional_env("BILLING_WEBHOOK_SECRET").map(Secret::new),
                plan_links: parse_plan_links(&get_env("BILLING_PLAN_LINKS", Some(""), is_prod)?)?,
            },
            sales: SalesConfig {
                max_transaction_attempts: parse(
                    &get_env("SALES_MAX_TRANSACTION_ATTEMPTS", Some("5"), false)?,
                    "SALES_MAX_TRANSACTION_ATTEMPTS",
                )?,
                total_mismatch: get_env("SALES_TOTAL_MISMATCH", Some("reject"), false)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.sales.max_transaction_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SALES_MAX_TRANSACTION_ATTEMPTS must be at least 1"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.billing.webhook_secret.is_none() {
                tracing::warn!("BILLING_WEBHOOK_SECRET is not set; webhook signatures are not verified");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse<T>(value: &str, key: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

/// Parse `plan=link,plan=link`.
fn parse_plan_links(raw: &str) -> Result<HashMap<String, String>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(plan, link)| (plan.trim().to_string(), link.trim().to_string()))
                .filter(|(plan, link)| !plan.is_empty() && !link.is_empty())
                .ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "BILLING_PLAN_LINKS entry '{}' is not plan=link",
                        pair
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_links_parse_and_reject_malformed_pairs() {
        let links = parse_plan_links("starter=lnk_1, growth = lnk_2").unwrap();
        assert_eq!(links.get("starter").map(String::as_str), Some("lnk_1"));
        assert_eq!(links.get("growth").map(String::as_str), Some("lnk_2"));

        assert!(parse_plan_links("").unwrap().is_empty());
        assert!(parse_plan_links("starter").is_err());
        assert!(parse_plan_links("=lnk").is_err());
    }

    #[test]
    fn mismatch_policy_parses_case_insensitively() {
        assert_eq!("Override".parse(), Ok(TotalMismatchPolicy::Override));
        assert_eq!("reject".parse(), Ok(TotalMismatchPolicy::Reject));
        assert!("ignore".parse::<TotalMismatchPolicy>().is_err());
    }
}
