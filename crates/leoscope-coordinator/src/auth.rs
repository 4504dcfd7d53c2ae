use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sqlx::{Row, SqlitePool};

use leoscope_core::auth::constant_time_eq;
use leoscope_core::error::LeoError;
use leoscope_core::model::Role;

use crate::error::AppError;
use crate::AppState;

/// The resolved identity of an authenticated caller, inserted into
/// request extensions by [`auth_middleware`] and extracted by handlers
/// with `Extension<Caller>`.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

impl Caller {
    pub fn require_role(&self, required: Role) -> Result<(), LeoError> {
        if self.role.satisfies(required) {
            Ok(())
        } else {
            Err(LeoError::forbidden(format!(
                "role {} does not satisfy required role {required}",
                self.role
            )))
        }
    }
}

/// Both `x-access-token` and `x-jwt` carry the same kind of opaque
/// bearer secret (the data model treats `static_token` and `signed_token`
/// identically: hashed and compared in constant time) — either header
/// authenticates the same way.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-access-token")
        .or_else(|| headers.get("x-jwt"))
        .and_then(|v| v.to_str().ok())
}

pub async fn authenticate(db: &SqlitePool, headers: &HeaderMap) -> Result<Caller, AppError> {
    let user_id = headers
        .get("x-userid")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| LeoError::unauth("missing x-userid header"))?;
    let token = bearer_token(headers)
        .ok_or_else(|| LeoError::unauth("missing x-access-token or x-jwt header"))?;

    let row = sqlx::query("SELECT role, static_token_hash FROM users WHERE id = ? LIMIT 1")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    let Some(row) = row else {
        return Err(LeoError::unauth("unknown credentials").into());
    };

    let presented_hash = leoscope_core::auth::sha256_urlsafe_token(token)
        .map_err(|_| LeoError::unauth("malformed token"))?;
    let stored_hash: Vec<u8> = row.get("static_token_hash");
    if !constant_time_eq(&presented_hash, &stored_hash) {
        return Err(LeoError::unauth("invalid credentials").into());
    }

    let role: Role = row
        .get::<String, _>("role")
        .parse()
        .map_err(|_| LeoError::unauth("corrupt role"))?;
    Ok(Caller {
        id: user_id.to_string(),
        role,
    })
}

/// Health check aside, every request must carry valid credentials;
/// per-operation role checks (§6 of the RPC surface) are enforced by
/// the handler itself via `Caller::require_role`.
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if req.uri().path() == "/api/health" {
        return next.run(req).await;
    }

    match authenticate(&state.db, req.headers()).await {
        Ok(caller) => {
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leoscope_core::model::Role;
    use tempfile::TempDir;

    #[tokio::test]
    async fn rejects_missing_credentials() {
        let tmp = TempDir::new().unwrap();
        let pool = leoscope_storage::db::init(tmp.path()).await.unwrap();
        let err = authenticate(&pool, &HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.code(), leoscope_core::error::ErrorCode::Unauth);
    }

    #[tokio::test]
    async fn accepts_valid_static_token_and_resolves_role() {
        let tmp = TempDir::new().unwrap();
        let pool = leoscope_storage::db::init(tmp.path()).await.unwrap();

        let token = leoscope_core::auth::generate_token_b64_urlsafe(32);
        let hash = leoscope_core::auth::sha256_urlsafe_token(&token).unwrap();
        leoscope_storage::users_repo::create_user(&pool, "u1", "alice", Role::Admin, None, &hash)
            .await
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-userid", "u1".parse().unwrap());
        headers.insert("x-access-token", token.parse().unwrap());

        let caller = authenticate(&pool, &headers).await.unwrap();
        assert_eq!(caller.id, "u1");
        assert_eq!(caller.role, Role::Admin);
    }

    #[tokio::test]
    async fn rejects_wrong_token() {
        let tmp = TempDir::new().unwrap();
        let pool = leoscope_storage::db::init(tmp.path()).await.unwrap();

        let token = leoscope_core::auth::generate_token_b64_urlsafe(32);
        let hash = leoscope_core::auth::sha256_urlsafe_token(&token).unwrap();
        leoscope_storage::users_repo::create_user(&pool, "u1", "alice", Role::User, None, &hash)
            .await
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-userid", "u1".parse().unwrap());
        headers.insert("x-access-token", "wrong-token".parse().unwrap());

        let err = authenticate(&pool, &headers).await.unwrap_err();
        assert_eq!(err.code(), leoscope_core::error::ErrorCode::Unauth);
    }
}
