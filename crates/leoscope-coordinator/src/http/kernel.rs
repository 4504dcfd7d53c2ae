use axum::Json;
use axum::extract::State;
use axum::Extension;

use leoscope_core::model::Role;
use leoscope_core::wire::{KernelAccessRequest, KernelAccessResponse};
use leoscope_storage::users_repo;

use crate::auth::Caller;
use crate::error::AppError;
use crate::AppState;

/// The kernel-parameter side service is described only at its interface
/// (§1): a node asks whether a user may raise a privileged kernel
/// parameter (e.g. socket buffer sizes) for an in-flight experiment.
/// Decision: allow iff the target user exists and its role carries the
/// privileged tier (`USER_PRIV` or above).
pub async fn kernel_access(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<KernelAccessRequest>,
) -> Result<Json<KernelAccessResponse>, AppError> {
    caller.require_role(Role::Node)?;

    let target = users_repo::get_user(&state.db, &req.target_user_id).await?;
    let allow = target.is_some_and(|u| u.role.satisfies(Role::UserPriv));

    Ok(Json(if allow {
        KernelAccessResponse::Allow
    } else {
        KernelAccessResponse::Deny
    }))
}
