// handlers/children.rs - /api/enfants handlers
//
// Enrollment is the one route with a real invariant: a child bound to a
// garderie always holds exactly one of its slots. All slot accounting is done
// by the ledger; these handlers only translate HTTP in and out.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Extension, Json,
};
use serde_json::{json, Value};

use crate::ledger::{Child, ChildUpdateRequest, ChildWithFacility, EnrollmentRequest};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::AppState;

/**
 * POST /api/enfants - Register a child, reserving a facility slot
 *
 * Expected Input:
 * ```json
 * { "nom": "Léa", "age": 3, "parent_id": 12, "garderie_id": 1 }
 * ```
 *
 * `parent_id` and `garderie_id` are optional. Without `garderie_id` the child
 * is registered without touching any facility.
 *
 * Responses: 201 with the created row, 400 on missing fields or a full
 * facility, 404 when the facility does not exist.
 */
pub async fn create(
    State(state): State<AppState>,
    caller: Option<Extension<AuthUser>>,
    payload: Result<Json<EnrollmentRequest>, JsonRejection>,
) -> ApiResult<Child> {
    let Json(request) = payload?;
    if let Some(Extension(user)) = &caller {
        tracing::debug!(
            user_id = user.id,
            email = %user.email,
            user_type = %user.user_type,
            facility_id = ?request.garderie_id,
            "enrollment requested"
        );
    }

    let child = state.ledger.reserve_and_register(request).await?;
    Ok(ApiResponse::created(child))
}

/// GET /api/enfants
pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<Child>> {
    Ok(ApiResponse::success(state.ledger.children().await?))
}

/// GET /api/enfants/by-parent/:parent_id - with `garderie_nom` / `garderie_adresse`
pub async fn by_parent(
    State(state): State<AppState>,
    parent_id: Result<Path<i32>, PathRejection>,
) -> ApiResult<Vec<ChildWithFacility>> {
    let Path(parent_id) = parent_id?;
    Ok(ApiResponse::success(state.ledger.children_of_parent(parent_id).await?))
}

/// GET /api/enfants/:id
pub async fn show(State(state): State<AppState>, id: Result<Path<i32>, PathRejection>) -> ApiResult<Child> {
    let Path(id) = id?;
    Ok(ApiResponse::success(state.ledger.child(id).await?))
}

/// PUT /api/enfants/:id - rename / change age; the reservation is left alone
pub async fn update(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
    payload: Result<Json<ChildUpdateRequest>, JsonRejection>,
) -> ApiResult<Child> {
    let Path(id) = id?;
    let Json(request) = payload?;
    Ok(ApiResponse::success(state.ledger.update_child(id, request).await?))
}

/// POST /api/enfants/:id/release - give the child's slot back to its facility
pub async fn release(State(state): State<AppState>, id: Result<Path<i32>, PathRejection>) -> ApiResult<Child> {
    let Path(id) = id?;
    Ok(ApiResponse::success(state.ledger.release(id).await?))
}

/// DELETE /api/enfants/:id - remove the child, releasing any held slot
pub async fn delete(State(state): State<AppState>, id: Result<Path<i32>, PathRejection>) -> ApiResult<Value> {
    let Path(id) = id?;
    let removed = state.ledger.withdraw(id).await?;
    Ok(ApiResponse::success(json!({ "message": "Enfant supprimé", "enfant": removed })))
}
