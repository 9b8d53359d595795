/// Platform administration
///
/// # Endpoints
///
/// - `POST /api/super-admin/login` - Super admin login (IP rate limited)
/// - `GET /api/super-admin/companies` - Paginated companies with platform stats
/// - `GET /api/super-admin/companies/:id` - Company detail
/// - `PATCH /api/super-admin/companies/:id/status` - Change a company's status
///
/// Everything but login requires a super admin access token.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use devhelp_shared::usecases::super_admin::{
    self, CompanyDetail, CompanyList, CompanyStatusChange, ListCompaniesQuery,
    SuperAdminLoginRequest, UpdateCompanyStatusRequest,
};
use serde::Serialize;

use super::{session_response, Envelope};
use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ValidJson, ValidQuery},
};

#[derive(Debug, Serialize)]
pub struct CompanyData {
    pub company: CompanyDetail,
}

/// Super admin login
///
/// # Errors
///
/// - 401: `INVALID_SUPER_ADMIN_CREDENTIALS`
/// - 429: More than 5 attempts per 15 minutes from one IP
pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<SuperAdminLoginRequest>,
) -> ApiResult<Response> {
    let grant = super_admin::login(&state.services, req).await?;
    session_response(&state, StatusCode::OK, grant)
}

/// List companies
///
/// Query: `page`, `limit` (1-100, default 20), `search`, `status`,
/// `sortBy` (name | createdAt | lastActive), `sortOrder` (asc | desc).
pub async fn list_companies(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ListCompaniesQuery>,
) -> ApiResult<Json<Envelope<CompanyList>>> {
    let companies = super_admin::list_companies(&state.services, query).await?;
    Ok(Envelope::data(companies))
}

/// Company detail
///
/// The id is validated by the use case so malformed ids get
/// `INVALID_COMPANY_ID` rather than a routing error.
pub async fn get_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<CompanyData>>> {
    let company = super_admin::get_company(&state.services, &id).await?;
    Ok(Envelope::data(CompanyData { company }))
}

/// Change a company's status
pub async fn update_company_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdateCompanyStatusRequest>,
) -> ApiResult<Json<Envelope<CompanyStatusChange>>> {
    let (message, change) = super_admin::update_company_status(&state.services, &id, req).await?;
    Ok(Envelope::with_message(message, change))
}
