use std::sync::atomic::{AtomicBool, Ordering};

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use leoscope_core::error::{ErrorCode, LeoError};
use leoscope_core::wire::ErrorBody;

static DEBUG_ERRORS: AtomicBool = AtomicBool::new(false);

pub fn set_debug_errors(enabled: bool) {
    DEBUG_ERRORS.store(enabled, Ordering::Relaxed);
}

fn debug_errors_enabled() -> bool {
    DEBUG_ERRORS.load(Ordering::Relaxed)
}

/// Bridges a `LeoError` (or anything convertible to `anyhow::Error`) into
/// an HTTP response whose JSON body matches `wire::ErrorBody`. Handlers
/// return `Result<_, AppError>` and use `?` freely — sqlx, anyhow, and
/// `LeoError` all convert through the blanket impl below.
#[derive(Debug)]
pub struct AppError(LeoError);

impl AppError {
    pub fn code(&self) -> ErrorCode {
        self.0.code
    }
}

fn classify(error: &anyhow::Error) -> Option<LeoError> {
    for cause in error.chain() {
        if let Some(sqlx_error) = cause.downcast_ref::<sqlx::Error>()
            && matches!(sqlx_error, sqlx::Error::RowNotFound)
        {
            return Some(LeoError::not_found("record not found"));
        }

        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return match io.kind() {
                std::io::ErrorKind::NotFound => Some(LeoError::not_found("not found")),
                std::io::ErrorKind::PermissionDenied => {
                    Some(LeoError::forbidden("permission denied"))
                }
                _ => None,
            };
        }
    }
    None
}

fn debug_details(error: &anyhow::Error) -> serde_json::Value {
    let chain: Vec<serde_json::Value> = error
        .chain()
        .take(8)
        .map(|cause| serde_json::Value::String(cause.to_string()))
        .collect();
    serde_json::json!({ "debug_chain": chain })
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(error: E) -> Self {
        let error: anyhow::Error = error.into();

        if let Some(leo) = error.downcast_ref::<LeoError>() {
            return Self(LeoError {
                code: leo.code,
                message: leo.message.clone(),
                details: leo.details.clone(),
            });
        }

        if let Some(classified) = classify(&error) {
            tracing::debug!(error = %error, code = ?classified.code, "request failed");
            return Self(classified);
        }

        tracing::error!(error = %error, "request failed");
        let details = debug_errors_enabled().then(|| debug_details(&error));
        Self(LeoError {
            code: ErrorCode::Unavailable,
            message: "internal error".to_string(),
            details,
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlx_row_not_found_classifies_as_404() {
        let err = anyhow::Error::new(sqlx::Error::RowNotFound);
        let app: AppError = err.into();
        assert_eq!(app.code(), ErrorCode::NotFound);
    }

    #[test]
    fn leo_error_round_trips_its_own_code() {
        let err = LeoError::conflict("overlap", "job-1", 42);
        let app: AppError = err.into();
        assert_eq!(app.code(), ErrorCode::Conflict);
    }

    #[test]
    fn unclassified_error_falls_back_to_unavailable() {
        let err = anyhow::anyhow!("boom");
        let app: AppError = err.into();
        assert_eq!(app.code(), ErrorCode::Unavailable);
    }
}
