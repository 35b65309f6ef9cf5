use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const SALE_DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Install the global Prometheus recorder. Safe to call more than once.
pub fn init_metrics() -> Result<(), AppError> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("pos_sale_transaction_duration_seconds".to_string()),
            SALE_DURATION_BUCKETS,
        )
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("invalid histogram buckets: {}", e)))?
        .install_recorder()
        .map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("failed to install Prometheus recorder: {}", e))
        })?;

    if METRICS_HANDLE.set(handle).is_err() {
        tracing::warn!("Metrics handle already initialized");
    }

    describe();
    Ok(())
}

fn describe() {
    ::metrics::describe_counter!("pos_sales_total", "Sale attempts by outcome");
    ::metrics::describe_histogram!(
        "pos_sale_transaction_duration_seconds",
        ::metrics::Unit::Seconds,
        "Time spent committing a sale, retries included"
    );
    ::metrics::describe_counter!(
        "pos_sale_conflict_retries_total",
        "Sale transactions retried after a write conflict"
    );
    ::metrics::describe_counter!(
        "pos_quota_denials_total",
        "Creations refused by the subscription limit"
    );
    ::metrics::describe_counter!("pos_billing_webhooks_total", "Billing webhooks by event type");
    ::metrics::describe_counter!("pos_accounts_registered_total", "Accounts registered by role");
    ::metrics::describe_counter!("pos_login_failures_total", "Rejected sign-ins");
    ::metrics::describe_counter!("pos_businesses_created_total", "Businesses created");
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}
