pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::PosConfig;
use db::DocumentStore;
use services::{
    AccountService, BillingProvider, BillingService, BusinessService, CatalogService,
    IdentityProvider, QuotaGate, SaleEngine,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PosConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub accounts: AccountService,
    pub businesses: BusinessService,
    pub catalog: CatalogService,
    pub sales: SaleEngine,
    pub billing: BillingService,
}

impl AppState {
    /// Wire every service onto the given store and providers.
    pub fn new(
        config: PosConfig,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        billing_provider: Arc<dyn BillingProvider>,
    ) -> Self {
        let quota = QuotaGate::new(store.clone());

        Self {
            accounts: AccountService::new(store.clone(), identity.clone()),
            businesses: BusinessService::new(store.clone(), identity.clone()),
            catalog: CatalogService::new(store.clone(), quota),
            sales: SaleEngine::new(
                store.clone(),
                config.sales.max_transaction_attempts,
                config.sales.total_mismatch,
            ),
            billing: BillingService::new(store.clone(), billing_provider, &config.billing),
            config: Arc::new(config),
            store,
            identity,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/update", put(handlers::auth::update_profile))
        .route("/auth/delete", delete(handlers::auth::delete_account))
        .route(
            "/business",
            post(handlers::business::create_business).get(handlers::business::list_businesses),
        )
        .route("/business/profile", get(handlers::business::business_profile))
        .route(
            "/business/:id",
            get(handlers::business::get_business)
                .put(handlers::business::update_business)
                .delete(handlers::business::delete_business),
        )
        .route(
            "/categories",
            post(handlers::categories::create_category).get(handlers::categories::list_categories),
        )
        .route(
            "/categories/bulk-delete",
            delete(handlers::categories::bulk_delete_categories),
        )
        .route(
            "/categories/:id",
            get(handlers::categories::get_category)
                .put(handlers::categories::update_category)
                .delete(handlers::categories::delete_category),
        )
        .route(
            "/products",
            post(handlers::products::create_product).get(handlers::products::list_products),
        )
        .route(
            "/products/bulk-delete",
            delete(handlers::products::bulk_delete_products),
        )
        .route(
            "/products/:id",
            get(handlers::products::get_product)
                .put(handlers::products::update_product)
                .delete(handlers::products::delete_product),
        )
        .route(
            "/sales",
            post(handlers::sales::create_sale).get(handlers::sales::list_sales),
        )
        .route("/sales/:id", get(handlers::sales::get_sale))
        .route(
            "/subscription/create-checkout",
            post(handlers::subscription::create_checkout),
        )
        .route(
            "/subscription/cancel-subscription",
            post(handlers::subscription::cancel_subscription),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let registration = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::optional_auth_middleware,
        ));

    let public = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/forgot-password", post(handlers::auth::forgot_password))
        .route("/auth/reset-password", post(handlers::auth::reset_password))
        .route("/subscription/webhook", post(handlers::subscription::webhook))
        .route(
            "/subscription/payment-success",
            get(handlers::subscription::payment_success),
        );

    let cors = cors_layer(&state.config.security.allowed_origins);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .nest("/api", authenticated.merge(registration).merge(public))
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                    user_id = tracing::field::Empty,
                    business_id = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
}
