use serde::{Deserialize, Serialize};

/// Error codes surfaced to RPC callers. Transport-layer failures live
/// outside this enum (`UNAVAILABLE` is a client-side retry condition,
/// not something a handler returns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Ok,
    Invalid,
    Unauth,
    Forbidden,
    NotFound,
    Conflict,
    Unsupported,
    NoSlot,
    Unavailable,
}

impl ErrorCode {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::Ok => 200,
            ErrorCode::Invalid => 400,
            ErrorCode::Unauth => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::Unsupported => 422,
            ErrorCode::NoSlot => 409,
            ErrorCode::Unavailable => 503,
        }
    }
}

/// The error type library code returns. `anyhow::Error` carries the
/// lower-level cause (sqlx, parse failures); handlers classify it into an
/// `ErrorCode` at the RPC boundary rather than propagating exceptions.
#[derive(Debug)]
pub struct LeoError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl LeoError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Invalid, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>, offender_job_id: &str, instant: i64) -> Self {
        Self::new(ErrorCode::Conflict, message).with_details(serde_json::json!({
            "offending_job_id": offender_job_id,
            "instant": instant,
        }))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn unauth(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauth, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unsupported, message)
    }

    pub fn no_slot(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NoSlot, message)
    }
}

impl std::fmt::Display for LeoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for LeoError {}
