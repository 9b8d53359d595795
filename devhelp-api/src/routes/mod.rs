/// API route handlers
///
/// Organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Signup, login and the password lifecycle
/// - `invite`: Invitations
/// - `company`: Company user management
/// - `super_admin`: Platform administration
///
/// Successful responses use the [`Envelope`] shape
/// `{ "success": true, "message"?: ..., "data"?: ... }`.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::{app::AppState, cookies, error::ApiResult};
use devhelp_shared::usecases::SessionGrant;

pub mod auth;
pub mod company;
pub mod health;
pub mod invite;
pub mod super_admin;

/// Success envelope
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data: Some(data),
        })
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        })
    }
}

/// Envelope carrying only a message
pub fn message(message: impl Into<String>) -> Json<Envelope<Value>> {
    Json(Envelope {
        success: true,
        message: Some(message.into()),
        data: None,
    })
}

/// Renders a session: the auth payload in the body, the refresh token in
/// the cookie
pub(crate) fn session_response(
    state: &AppState,
    status: StatusCode,
    grant: SessionGrant,
) -> ApiResult<Response> {
    let cookie: HeaderValue = cookies::refresh_cookie(
        &grant.refresh_token,
        grant.refresh_max_age,
        state.config.secure_cookies(),
    )?;

    Ok((
        status,
        [(header::SET_COOKIE, cookie)],
        Envelope::with_message(grant.message, grant.payload),
    )
        .into_response())
}
