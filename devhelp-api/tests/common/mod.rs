//! Common test utilities for the HTTP tests
//!
//! Builds the full router over the in-memory database with a cheap Argon2
//! cost and a mailer that keeps sent messages for inspection.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use devhelp_api::{
    app::{build_router, AppState},
    config::Config,
};
use devhelp_shared::{
    mail::MemoryMailer,
    store::memory::MemoryDatabase,
    usecases::seed,
};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const PASSWORD: &str = "Str0ng!Pass";
pub const SUPER_ADMIN_EMAIL: &str = "root@devhelp.app";
pub const SUPER_ADMIN_PASSWORD: &str = "R00t!Password";

/// Parsed response
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn code(&self) -> &str {
        self.body["error"]["code"].as_str().unwrap_or_default()
    }

    pub fn message(&self) -> &str {
        self.body["error"]["message"]
            .as_str()
            .or_else(|| self.body["message"].as_str())
            .unwrap_or_default()
    }

    pub fn token(&self) -> String {
        self.body["data"]["token"].as_str().unwrap().to_string()
    }

    pub fn set_cookie(&self) -> &str {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// `refreshToken=...` pair from `Set-Cookie`, ready for a `Cookie` header
    pub fn refresh_cookie(&self) -> String {
        self.set_cookie()
            .split(';')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

/// Test context containing the router and its collaborators
pub struct TestContext {
    pub app: Router,
    pub state: AppState,
    pub mailer: MemoryMailer,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_env(&[]).await
    }

    /// Context whose configuration is overridden by `extra`
    pub async fn with_env(extra: &[(&str, &str)]) -> Self {
        let mut vars: HashMap<String, String> = [
            ("DATABASE_URL", "memory"),
            ("APP_ENV", "test"),
            ("JWT_SECRET", "http-test-access-secret-at-least-32-bytes"),
            ("JWT_REFRESH_SECRET", "http-test-refresh-secret-at-least-32-bytes"),
            ("FRONTEND_URL", "http://app.test"),
            ("PASSWORD_HASH_MEMORY_KIB", "1024"),
            ("PASSWORD_HASH_ITERATIONS", "1"),
            ("PASSWORD_HASH_PARALLELISM", "1"),
            ("SUPER_ADMIN_EMAIL", SUPER_ADMIN_EMAIL),
            ("SUPER_ADMIN_PASSWORD", SUPER_ADMIN_PASSWORD),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }

        let config = Config::from_map(&vars).expect("test config");
        let super_admin = config.super_admin.clone().expect("super admin configured");

        let mailer = MemoryMailer::new();
        let db = Arc::new(MemoryDatabase::new(config.database.use_transactions));
        let state = AppState::new(config, db, Arc::new(mailer.clone()));

        seed::seed_super_admin(&state.services, &super_admin.email, &super_admin.password)
            .await
            .expect("seed super admin");

        Self {
            app: build_router(state.clone()),
            state,
            mailer,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(request(Method::GET, uri, token, None)).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(request(Method::POST, uri, token, Some(body))).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(request(Method::PATCH, uri, token, Some(body))).await
    }

    /// Signs up `{company}` with admin `admin@{company}.io`
    pub async fn signup(&self, company: &str) -> TestResponse {
        let response = self.post("/api/auth/signup", None, signup_body(company)).await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response
    }

    /// Admin token plus the token of a freshly accepted member
    pub async fn company_with_member(&self, company: &str) -> (String, String) {
        let admin = self.signup(company).await.token();
        let member_email = format!("member@{company}.io");

        let invited = self
            .post(
                "/api/admin/members/invite",
                Some(&admin),
                json!({ "email": member_email, "firstName": "Mia", "lastName": "Member" }),
            )
            .await;
        assert_eq!(invited.status, StatusCode::CREATED, "{}", invited.body);

        let token = self.invite_token(&member_email);
        let accepted = self
            .post(
                "/api/auth/accept-invitation",
                None,
                json!({
                    "token": token,
                    "password": PASSWORD,
                    "confirmPassword": PASSWORD,
                    "agreeToTerms": true
                }),
            )
            .await;
        assert_eq!(accepted.status, StatusCode::CREATED, "{}", accepted.body);

        (admin, accepted.token())
    }

    /// Token from the last link mailed to `to`
    pub fn invite_token(&self, to: &str) -> String {
        let message = self.mailer.last_to(to).expect("no mail sent");
        let start = message.html.find("token=").expect("no token link in email") + "token=".len();
        message.html[start..start + 36].to_string()
    }

    pub async fn super_admin_token(&self) -> String {
        let response = self
            .post(
                "/api/super-admin/login",
                None,
                json!({ "email": SUPER_ADMIN_EMAIL, "password": SUPER_ADMIN_PASSWORD }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.token()
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn signup_body(company: &str) -> Value {
    json!({
        "companyName": format!("{company} Inc"),
        "companyEmail": format!("hq@{company}.io"),
        "adminFirstName": "Ada",
        "adminLastName": "Admin",
        "adminEmail": format!("admin@{company}.io"),
        "password": PASSWORD,
        "agreeToTerms": true
    })
}
