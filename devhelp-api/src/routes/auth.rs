/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /api/auth/signup` - Register a company and its first admin
/// - `POST /api/auth/login` - Login and get tokens
/// - `POST /api/auth/refresh` - New access token from the refresh cookie
/// - `POST /api/auth/logout` - Clear the refresh cookie
/// - `POST /api/auth/forgot-password` - Email a reset link
/// - `POST /api/auth/reset-password` - Set a new password with a reset token

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use devhelp_shared::usecases::auth::{
    self, ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest,
};
use serde::Serialize;

use super::{message, session_response, Envelope};
use crate::{
    app::AppState,
    cookies::{self, REFRESH_COOKIE},
    error::{ApiError, ApiResult},
    extract::ValidJson,
};

/// Register a company
///
/// Creates the company and its admin user, then signs the admin in.
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/signup
/// Content-Type: application/json
///
/// {
///   "companyName": "Acme",
///   "companyEmail": "hq@acme.io",
///   "adminFirstName": "Ada",
///   "adminLastName": "Lovelace",
///   "adminEmail": "ada@acme.io",
///   "password": "Str0ng!Pass",
///   "agreeToTerms": true
/// }
/// ```
///
/// # Response
///
/// 201 with the auth payload and a `refreshToken` cookie.
///
/// # Errors
///
/// - 400: Validation failed or `EMAIL_EXISTS`
pub async fn signup(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<SignupRequest>,
) -> ApiResult<Response> {
    let grant = auth::signup(&state.services, req).await?;
    session_response(&state, StatusCode::CREATED, grant)
}

/// Login with email and password
///
/// `rememberMe` extends the refresh cookie to 30 days.
///
/// # Errors
///
/// - 401: `INVALID_CREDENTIALS`
/// - 403: Company or user not allowed to sign in
pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> ApiResult<Response> {
    let grant = auth::login(&state.services, req).await?;
    session_response(&state, StatusCode::OK, grant)
}

/// Issue a new access token from the `refreshToken` cookie
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let token = cookies::read_cookie(&headers, REFRESH_COOKIE);
    let refreshed = auth::refresh(&state.services, token).await?;

    Ok(Envelope::with_message("Token refreshed successfully", refreshed).into_response())
}

/// Clear the refresh cookie; needs no authentication
pub async fn logout(State(state): State<AppState>) -> ApiResult<Response> {
    let cookie = cookies::clear_refresh_cookie(state.config.secure_cookies())?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        message("Logged out successfully"),
    )
        .into_response())
}

/// Start a password reset
///
/// Answers the same way whether or not the email is registered. Limited
/// per client IP by middleware and per email here.
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ForgotPasswordRequest>,
) -> ApiResult<Response> {
    let status = state
        .limiters
        .forgot_password_email
        .check(&req.email)
        .map_err(ApiError)?;

    let text = auth::forgot_password(&state.services, req).await?;

    let mut response = message(text).into_response();
    status.apply(response.headers_mut());
    Ok(response)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub success: bool,
    pub message: &'static str,
    pub redirect_to: String,
}

/// Complete a password reset
pub async fn reset_password(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ResetPasswordRequest>,
) -> ApiResult<Json<ResetResponse>> {
    let outcome = auth::reset_password(&state.services, req).await?;

    Ok(Json(ResetResponse {
        success: true,
        message: outcome.message,
        redirect_to: outcome.redirect_to,
    }))
}
