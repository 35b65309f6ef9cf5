//! Shared setup for pos-service integration tests.
//!
//! Every test gets its own router over a fresh `MemoryStore`, the store-backed
//! identity provider, a recording e-mail provider and a mock billing provider.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use pos_service::{
    build_router,
    config::{
        BillingConfig, Environment, JwtConfig, MongoConfig, PasswordResetConfig, PosConfig,
        SalesConfig, SecurityConfig, SmtpConfig, TotalMismatchPolicy,
    },
    db::MemoryStore,
    services::{JwtService, MockBillingProvider, MockEmailService, StoreIdentityProvider},
    AppState,
};
use secrecy::Secret;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const PASSWORD: &str = "correct-horse";
pub const WEBHOOK_SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";

pub fn test_config() -> PosConfig {
    PosConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "pos-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        mongodb: MongoConfig {
            uri: Secret::new("mongodb://unused".to_string()),
            database: "unused".to_string(),
        },
        jwt: JwtConfig {
            secret: Secret::new("integration-test-secret".to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            user: String::new(),
            password: Secret::new(String::new()),
            from_email: "no-reply@pos.test".to_string(),
        },
        password_reset: PasswordResetConfig {
            url: "http://pos.test/reset-password".to_string(),
            expiry_minutes: 30,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://pos.test".to_string()],
        },
        billing: BillingConfig {
            api_url: "http://billing.test".to_string(),
            checkout_url: "https://checkout.test".to_string(),
            access_token: Secret::new("billing-token".to_string()),
            webhook_secret: None,
            plan_links: HashMap::from([
                ("pro".to_string(), "lnk_pro".to_string()),
                ("starter".to_string(), "lnk_starter".to_string()),
            ]),
        },
        sales: SalesConfig {
            max_transaction_attempts: 50,
            total_mismatch: TotalMismatchPolicy::Reject,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub email: Arc<MockEmailService>,
    pub billing: Arc<MockBillingProvider>,
}

/// A business owner holding a token that already carries the business claim.
pub struct Owner {
    pub uid: String,
    pub email: String,
    pub token: String,
    pub refresh_token: String,
    pub business_id: String,
}

pub struct Response {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(test_config(), MockBillingProvider::new())
    }

    pub fn with_config(configure: impl FnOnce(&mut PosConfig)) -> Self {
        let mut config = test_config();
        configure(&mut config);
        Self::build(config, MockBillingProvider::new())
    }

    pub fn with_billing(billing: MockBillingProvider) -> Self {
        Self::build(test_config(), billing)
    }

    fn build(config: PosConfig, billing: MockBillingProvider) -> Self {
        let store = Arc::new(MemoryStore::new());
        let email = Arc::new(MockEmailService::new());
        let billing = Arc::new(billing);
        let identity = Arc::new(StoreIdentityProvider::new(
            store.clone(),
            JwtService::new(&config.jwt),
            email.clone(),
            config.password_reset.clone(),
        ));

        let state = AppState::new(config, store.clone(), identity, billing.clone());
        Self {
            router: build_router(state.clone()),
            state,
            store,
            email,
            billing,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Response { status, body, text }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response {
        self.call(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> Response {
        self.call(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str, body: Option<Value>) -> Response {
        self.call(Method::DELETE, uri, Some(token), body).await
    }

    pub async fn register(&self, email: &str) -> Value {
        let res = self
            .post(
                "/api/auth/register",
                None,
                json!({ "email": email, "password": PASSWORD, "displayName": "Test User" }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.text);
        res.body
    }

    /// Returns `(access_token, refresh_token, uid)`.
    pub async fn login(&self, email: &str) -> (String, String, String) {
        let res = self
            .post(
                "/api/auth/login",
                None,
                json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.text);
        (
            res.body["accessToken"].as_str().unwrap().to_string(),
            res.body["refreshToken"].as_str().unwrap().to_string(),
            res.body["uid"].as_str().unwrap().to_string(),
        )
    }

    pub async fn refresh(&self, refresh_token: &str) -> (String, String) {
        let res = self
            .post(
                "/api/auth/refresh",
                None,
                json!({ "refreshToken": refresh_token }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.text);
        (
            res.body["accessToken"].as_str().unwrap().to_string(),
            res.body["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    /// Register, create a business and refresh the token so it carries the
    /// owner claims.
    pub async fn owner(&self, email: &str, business_name: &str) -> Owner {
        self.register(email).await;
        let (token, refresh_token, uid) = self.login(email).await;

        let res = self
            .post(
                "/api/business",
                Some(&token),
                json!({ "name": business_name }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.text);
        let business_id = res.body["businessId"].as_str().unwrap().to_string();

        let (token, refresh_token) = self.refresh(&refresh_token).await;
        Owner {
            uid,
            email: email.to_string(),
            token,
            refresh_token,
            business_id,
        }
    }

    pub async fn create_category(&self, token: &str, name: &str) -> String {
        let res = self
            .post("/api/categories", Some(token), json!({ "name": name }))
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.text);
        res.body["id"].as_str().unwrap().to_string()
    }

    pub async fn create_product(&self, token: &str, name: &str, price: f64, stock: i64) -> String {
        let res = self
            .post(
                "/api/products",
                Some(token),
                json!({ "name": name, "price": price, "stock": stock }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.text);
        res.body["id"].as_str().unwrap().to_string()
    }

    pub async fn stock_of(&self, token: &str, product_id: &str) -> i64 {
        let res = self.get(&format!("/api/products/{}", product_id), token).await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.text);
        res.body["stock"].as_i64().unwrap()
    }

    pub async fn sale(&self, token: &str, items: Value) -> Response {
        self.post("/api/sales", Some(token), json!({ "items": items }))
            .await
    }
}
