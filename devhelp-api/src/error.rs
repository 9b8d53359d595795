/// Error handling for the API server
///
/// All handlers return `Result<T, ApiError>`. [`ApiError`] wraps the shared
/// [`AppError`] and renders it as the JSON error envelope:
///
/// ```json
/// { "success": false, "error": { "code": "EMAIL_EXISTS", "message": "..." } }
/// ```
///
/// Validation failures add a `fields` map of camelCase field name to the
/// first message for that field.
///
/// # Example
///
/// ```
/// use devhelp_api::error::ApiResult;
/// use devhelp_shared::error::AppError;
/// use axum::Json;
/// use serde_json::Value;
///
/// async fn handler() -> ApiResult<Json<Value>> {
///     Err(AppError::forbidden().into())
/// }
/// ```

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Request,
    },
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use devhelp_shared::error::{AppError, FieldErrors};
use serde::Serialize;
use validator::ValidationErrors;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

/// Error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

/// Detail of a 500, kept on the response for [`expose_internal_errors`]
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

fn envelope(err: &AppError, message: String) -> ErrorResponse {
    let fields = match err {
        AppError::Validation { fields, .. } => Some(fields.clone()),
        _ => None,
    };

    ErrorResponse {
        success: false,
        error: ErrorBody {
            code: err.code(),
            message,
            fields,
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = err.status();

        if let AppError::Internal(detail) = &err {
            // Log internal errors but don't expose details to clients
            tracing::error!(error = %detail, "Internal error");
        }

        let mut response = (status, Json(envelope(&err, err.public_message(false)))).into_response();

        match err {
            AppError::TooManyRequests { retry_after_secs, .. } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            }
            AppError::Internal(detail) => {
                response.extensions_mut().insert(InternalDetail(detail));
            }
            _ => {}
        }

        response
    }
}

/// Development-only middleware that puts the real detail of a 500 into the
/// response message
pub async fn expose_internal_errors(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let Some(InternalDetail(detail)) = response.extensions().get::<InternalDetail>().cloned() else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);

    let err = AppError::Internal(detail);
    let body = Json(envelope(&err, err.public_message(true)));
    (parts, body).into_response()
}

/// snake_case Rust field name to the camelCase name clients sent
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();

        for (field, errs) in errors.field_errors() {
            let Some(first) = errs.first() else { continue };
            let message = first
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Invalid {}", camel_case(&field)));
            fields.insert(camel_case(&field), message);
        }

        ApiError(AppError::validation(fields))
    }
}

/// Field named by a serde "missing field `x`" message, if any
fn missing_field(text: &str) -> Option<&str> {
    let rest = &text[text.find("missing field `")? + "missing field `".len()..];
    rest.get(..rest.find('`')?)
}

/// Turns a body or query deserialization failure into a field error
fn rejection_fields(fallback_field: &str, text: &str) -> AppError {
    match missing_field(text) {
        Some(field) => AppError::invalid_field(field, "Required"),
        None => {
            // Strip axum's "Failed to ...: " prefix
            let detail = match text.split_once(": ") {
                Some((prefix, rest)) if prefix.starts_with("Failed to") => rest,
                _ => text,
            };
            AppError::invalid_field(fallback_field, detail)
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(rejection_fields("body", &rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(rejection_fields("query", &rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        ApiError(AppError::invalid_field("id", "Invalid ID format"))
    }
}
