/// Authentication and role guards
///
/// [`require_auth`] verifies the bearer access token and stores the
/// caller's [`AuthContext`] in the request extensions. The role guards run
/// after it and read that context back.
///
/// # Example
///
/// ```no_run
/// use axum::{middleware, routing::get, Router};
/// use devhelp_api::{app::AppState, middleware::auth};
///
/// # fn example(state: AppState) -> Router {
/// Router::new()
///     .route("/", get(|| async { "ok" }))
///     .layer(middleware::from_fn(auth::require_admin))
///     .layer(middleware::from_fn_with_state(state.clone(), auth::require_auth))
///     .with_state(state)
/// # }
/// ```

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use devhelp_shared::auth::{authorization, middleware::authenticate_bearer, middleware::AuthContext};
use devhelp_shared::error::AppError;

use crate::{app::AppState, error::ApiError};

/// Verifies `Authorization: Bearer <access token>`
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().unwrap_or_default());

    let auth = authenticate_bearer(header, &state.services.tokens)?;

    request.extensions_mut().insert(auth);
    Ok(next.run(request).await)
}

fn context(request: &Request) -> Result<&AuthContext, ApiError> {
    request
        .extensions()
        .get::<AuthContext>()
        .ok_or_else(|| ApiError(AppError::unauthorized()))
}

/// Admits company admins only
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    authorization::require_admin(context(&request)?)?;
    Ok(next.run(request).await)
}

/// Admits platform super admins only
pub async fn require_super_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let auth = context(&request)?;
    if let Err(err) = authorization::require_super_admin(auth) {
        tracing::warn!(user_id = %auth.user_id, role = %auth.role, "Super admin route denied");
        return Err(err.into());
    }
    Ok(next.run(request).await)
}
