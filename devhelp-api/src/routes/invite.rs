/// Invitation endpoints
///
/// - `POST /api/admin/members/invite` - Invite a member (admin only)
/// - `GET /api/auth/validate-invite?token=` - Check an invite link
/// - `POST /api/auth/accept-invitation` - Set a password and join the company

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension,
};
use devhelp_shared::{
    auth::middleware::AuthContext,
    usecases::invite::{self, AcceptInviteRequest, SendInviteRequest},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{session_response, Envelope};
use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ValidJson, ValidQuery},
};

#[derive(Debug, Serialize)]
pub struct InvitationData<T: Serialize> {
    pub invitation: T,
}

/// Send an invitation into the caller's company
///
/// # Errors
///
/// - 400: `CANNOT_INVITE_SELF`, `EMAIL_EXISTS`, `INVITE_EXISTS`, `INVITE_ALREADY_SENT`
/// - 403: Caller is not an admin
pub async fn send_invite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidJson(req): ValidJson<SendInviteRequest>,
) -> ApiResult<Response> {
    let invitation = invite::send_invite(&state.services, &auth, req).await?;

    Ok((
        StatusCode::CREATED,
        Envelope::with_message(
            "Invitation sent successfully",
            InvitationData { invitation },
        ),
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct InviteTokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Check an invite link before the invitee sets a password
pub async fn validate_invite(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<InviteTokenQuery>,
) -> ApiResult<Response> {
    let details = invite::verify_invite(&state.services, query.token.as_deref()).await?;
    Ok(Envelope::data(details).into_response())
}

/// Accept an invitation and sign in
pub async fn accept_invitation(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<AcceptInviteRequest>,
) -> ApiResult<Response> {
    let grant = invite::accept_invite(&state.services, req).await?;
    session_response(&state, StatusCode::CREATED, grant)
}
