use axum::Router;
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

use crate::config::PosConfig;
use crate::db::MongoStore;
use crate::services::{
    EmailProvider, JwtService, PolarClient, ServiceError, SmtpEmailService, StoreIdentityProvider,
};
use crate::{build_router, AppState};

pub struct Application {
    addr: SocketAddr,
    router: Router,
}

impl Application {
    pub async fn build(config: PosConfig) -> Result<Self, AppError> {
        let store = MongoStore::connect(
            config.mongodb.uri.expose_secret(),
            &config.mongodb.database,
        )
        .await
        .map_err(ServiceError::from)?;
        store
            .initialize_indexes()
            .await
            .map_err(ServiceError::from)?;
        tracing::info!("Database initialized successfully");

        let email: Arc<dyn EmailProvider> = Arc::new(SmtpEmailService::new(&config.smtp)?);
        tracing::info!("Email service initialized");

        let jwt = JwtService::new(&config.jwt);
        let store = Arc::new(store);
        let identity = Arc::new(StoreIdentityProvider::new(
            store.clone(),
            jwt,
            email,
            config.password_reset.clone(),
        ));

        if config.billing.plan_links.is_empty() {
            tracing::warn!("BILLING_PLAN_LINKS is empty; checkout is unavailable");
        }
        let billing = Arc::new(PolarClient::new(&config.billing));

        let addr = config.common.socket_addr();
        let state = AppState::new(config, store, identity, billing);

        Ok(Self {
            addr,
            router: build_router(state),
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(address = %self.addr, "Listening");

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
