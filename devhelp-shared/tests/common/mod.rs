//! Shared harness for use-case tests
//!
//! Builds [`Services`] over the in-memory database with a cheap password
//! hash cost and an in-memory mailer.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use devhelp_shared::auth::jwt::{TokenConfig, TokenService};
use devhelp_shared::auth::middleware::AuthContext;
use devhelp_shared::auth::password::{HashCost, PasswordService};
use devhelp_shared::mail::MemoryMailer;
use devhelp_shared::store::memory::MemoryDatabase;
use devhelp_shared::store::Database;
use devhelp_shared::usecases::auth::{self, SignupRequest};
use devhelp_shared::usecases::{Services, SessionGrant, Settings};

pub const PASSWORD: &str = "Str0ng!Pass";
pub const FRONTEND_URL: &str = "http://app.test";

pub struct Harness {
    pub services: Services,
    pub db: MemoryDatabase,
    pub mailer: MemoryMailer,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(MemoryDatabase::new(true), MemoryMailer::new())
    }

    pub fn with(db: MemoryDatabase, mailer: MemoryMailer) -> Self {
        let services = services(Arc::new(db.clone()), mailer.clone());
        Self { services, db, mailer }
    }

    /// Signs up `company` with admin `admin@<company>.io`
    pub async fn signup(&self, company: &str) -> SessionGrant {
        auth::signup(&self.services, signup_request(company)).await.unwrap()
    }
}

/// Services over any backend, with test secrets and a cheap hash cost
pub fn services(db: Arc<dyn Database>, mailer: MemoryMailer) -> Services {
    Services {
        db,
        tokens: TokenService::new(TokenConfig {
            access_secret: "usecase-access-secret-at-least-32-bytes".to_string(),
            refresh_secret: "usecase-refresh-secret-at-least-32-bytes".to_string(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        }),
        passwords: PasswordService::new(HashCost {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }),
        mailer: Arc::new(mailer),
        settings: Settings {
            frontend_url: FRONTEND_URL.to_string(),
            refresh_ttl: Duration::days(7),
            remember_me_ttl: Duration::days(30),
        },
    }
}

pub fn signup_request(company: &str) -> SignupRequest {
    serde_json::from_value(serde_json::json!({
        "companyName": company,
        "companyEmail": format!("hq@{company}.io"),
        "adminFirstName": "Ada",
        "adminLastName": "Admin",
        "adminEmail": format!("admin@{company}.io"),
        "password": PASSWORD,
        "agreeToTerms": true
    }))
    .unwrap()
}

/// Auth context of the user a grant was issued to
pub fn context_of(grant: &SessionGrant) -> AuthContext {
    let user = &grant.payload.user;
    AuthContext {
        user_id: user.id,
        email: user.email.clone(),
        role: user.role,
        company_id: user.company.as_ref().map(|c| c.id),
    }
}

/// Pulls the `token=` query value out of an emailed link
pub fn token_in(html: &str) -> String {
    let start = html.find("token=").expect("no token link in email") + "token=".len();
    html[start..start + 36].to_string()
}
