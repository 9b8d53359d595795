/// Company user management
///
/// - `GET /api/company/users` - List users (or pending invites) of the caller's company
/// - `PATCH /api/company/users/:id/status` - Block or unblock a user (admin only)

use axum::{
    extract::{rejection::PathRejection, Path, State},
    Extension, Json,
};
use devhelp_shared::{
    auth::middleware::AuthContext,
    usecases::company::{self, ListUsersQuery, UpdateUserStatusRequest, UserList, UserStatusChange},
};
use uuid::Uuid;

use super::Envelope;
use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ValidJson, ValidQuery},
};

/// List the caller's company users
///
/// Query: `page` (default 1), `limit` (1-100, default 10), `search`,
/// `status`, `role`. `status=invited` lists pending invitations.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidQuery(query): ValidQuery<ListUsersQuery>,
) -> ApiResult<Json<Envelope<UserList>>> {
    let users = company::list_users(&state.services, &auth, query).await?;
    Ok(Envelope::data(users))
}

/// Block or unblock a company user
pub async fn update_user_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    id: Result<Path<Uuid>, PathRejection>,
    ValidJson(req): ValidJson<UpdateUserStatusRequest>,
) -> ApiResult<Json<Envelope<UserStatusChange>>> {
    let Path(user_id) = id?;

    let (message, change) =
        company::update_user_status(&state.services, &auth, user_id, req).await?;

    Ok(Envelope::with_message(message, change))
}
