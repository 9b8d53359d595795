/// Application state and router builder
///
/// This module defines the shared application state and builds the Axum
/// router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use devhelp_api::{app::{self, AppState}, config::Config};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::in_memory(config);
/// let router = app::build_router(state);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Router,
};
use devhelp_shared::{
    auth::{jwt::TokenService, password::PasswordService},
    error::AppError,
    mail::{EmailService, LogMailer},
    store::{memory::MemoryDatabase, Database},
    usecases::{Services, Settings},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    config::Config,
    error::{expose_internal_errors, ApiError},
    middleware::{
        auth::{require_admin, require_auth, require_super_admin},
        rate_limit::{limit_by_ip, IpLimit, Limiters, RateLimiter},
        security::with_security_headers,
    },
    routes,
};

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor; every
/// field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Arc<Config>,
    pub limiters: Limiters,
}

impl AppState {
    /// Creates application state over the given database and mailer
    pub fn new(config: Config, db: Arc<dyn Database>, mailer: Arc<dyn EmailService>) -> Self {
        let services = Services {
            db,
            tokens: TokenService::new(config.jwt.token_config()),
            passwords: PasswordService::new(config.password),
            mailer,
            settings: Settings {
                frontend_url: config.api.frontend_url.clone(),
                refresh_ttl: config.jwt.refresh_expires_in,
                remember_me_ttl: config.jwt.remember_me_expires_in,
            },
        };

        Self {
            services,
            limiters: Limiters::new(config.api.trust_proxy),
            config: Arc::new(config),
        }
    }

    /// State backed by the in-memory database, with mail written to the log
    pub fn in_memory(config: Config) -> Self {
        let db = Arc::new(MemoryDatabase::new(config.database.use_transactions));
        Self::new(config, db, Arc::new(LogMailer))
    }

    fn ip_limit(&self, limiter: &Arc<RateLimiter>) -> IpLimit {
        IpLimit {
            limiter: Arc::clone(limiter),
            trust_proxy: self.limiters.trust_proxy,
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = &config.api.cors_origins;

    let allow_origin = if origins.iter().any(|o| o == "*") {
        // Credentials rule out a literal `*`, so echo the caller's origin
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

async fn route_not_found() -> ApiError {
    ApiError(AppError::route_not_found())
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                               # Health check (public)
/// └── /api/
///     ├── /auth/
///     │   ├── POST /signup
///     │   ├── POST /login
///     │   ├── POST /refresh                 # refreshToken cookie
///     │   ├── POST /logout
///     │   ├── POST /forgot-password         # rate limited (IP + email)
///     │   ├── POST /reset-password          # rate limited (IP)
///     │   ├── GET  /validate-invite         # rate limited (IP)
///     │   └── POST /accept-invitation
///     ├── /admin/members/invite             # auth + admin
///     ├── /company/users                    # auth
///     │   └── PATCH /:id/status             # auth + admin
///     └── /super-admin/
///         ├── POST /login                   # rate limited (IP)
///         └── /companies...                 # auth + super admin
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Internal error detail (development only)
/// 5. Authentication, role guards and rate limits (per-route basis)
pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/signup", post(routes::auth::signup))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route("/logout", post(routes::auth::logout))
        .route(
            "/forgot-password",
            post(routes::auth::forgot_password).layer(from_fn_with_state(
                state.ip_limit(&state.limiters.forgot_password_ip),
                limit_by_ip,
            )),
        )
        .route(
            "/reset-password",
            post(routes::auth::reset_password).layer(from_fn_with_state(
                state.ip_limit(&state.limiters.reset_password),
                limit_by_ip,
            )),
        )
        .route(
            "/validate-invite",
            get(routes::invite::validate_invite).layer(from_fn_with_state(
                state.ip_limit(&state.limiters.validate_invite),
                limit_by_ip,
            )),
        )
        .route("/accept-invitation", post(routes::invite::accept_invitation));

    let admin_routes = Router::new()
        .route("/members/invite", post(routes::invite::send_invite))
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let company_routes = Router::new()
        .route("/users", get(routes::company::list_users))
        .route(
            "/users/:id/status",
            patch(routes::company::update_user_status).layer(from_fn(require_admin)),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let super_admin_routes = Router::new()
        .route("/companies", get(routes::super_admin::list_companies))
        .route("/companies/:id", get(routes::super_admin::get_company))
        .route(
            "/companies/:id/status",
            patch(routes::super_admin::update_company_status),
        )
        .route_layer(from_fn(require_super_admin))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .route(
            "/login",
            post(routes::super_admin::login).layer(from_fn_with_state(
                state.ip_limit(&state.limiters.super_admin_login),
                limit_by_ip,
            )),
        );

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/admin", admin_routes)
        .nest("/company", company_routes)
        .nest("/super-admin", super_admin_routes);

    let mut router = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .fallback(route_not_found);

    if state.config.api.environment.is_development() {
        router = router.layer(from_fn(expose_internal_errors));
    }

    let router = router
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config));

    let enable_hsts = state.config.api.environment.is_production();
    with_security_headers(router, enable_hsts).with_state(state)
}
