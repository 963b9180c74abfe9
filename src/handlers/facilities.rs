// handlers/facilities.rs - /api/garderies handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Extension, Json,
};
use serde_json::{json, Value};

use crate::ledger::{Child, Facility, FacilityRequest, FacilityUpdateRequest};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::AppState;

/**
 * POST /api/garderies - Open a facility
 *
 * Expected Input:
 * ```json
 * {
 *   "nom": "Les Petits Loups",
 *   "adresse": "12 rue des Lilas",
 *   "tarif": 45.50,
 *   "disponibilite": 20,      // optional when nombre_places is given
 *   "nombre_places": 20,      // optional, defaults to disponibilite
 *   "description": "...",
 *   "directeur_id": 4,
 *   "photo": null
 * }
 * ```
 */
pub async fn create(
    State(state): State<AppState>,
    caller: Option<Extension<AuthUser>>,
    payload: Result<Json<FacilityRequest>, JsonRejection>,
) -> ApiResult<Facility> {
    let Json(request) = payload?;
    if let Some(Extension(user)) = &caller {
        tracing::debug!(user_id = user.id, email = %user.email, user_type = %user.user_type, "facility opening requested");
    }
    Ok(ApiResponse::created(state.ledger.open_facility(request).await?))
}

/// GET /api/garderies - ordered by `nom`
pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<Facility>> {
    Ok(ApiResponse::success(state.ledger.facilities().await?))
}

/// GET /api/garderies/by-directeur/:id - the director's facility, 404 if none
pub async fn by_director(
    State(state): State<AppState>,
    director_id: Result<Path<i32>, PathRejection>,
) -> ApiResult<Facility> {
    let Path(director_id) = director_id?;
    Ok(ApiResponse::success(state.ledger.facility_of_director(director_id).await?))
}

/**
 * PUT /api/garderies/:id - Update descriptive fields
 *
 * Expected Input:
 * ```json
 * { "nom": "...", "adresse": "...", "tarif": 45.50, "description": "..." }
 * ```
 *
 * `disponibilite` and `nombre_places` are ignored; slots only change through
 * enrollment, release and withdrawal.
 */
pub async fn update(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
    payload: Result<Json<FacilityUpdateRequest>, JsonRejection>,
) -> ApiResult<Facility> {
    let Path(id) = id?;
    let Json(request) = payload?;
    Ok(ApiResponse::success(state.ledger.update_facility(id, request).await?))
}

/// GET /api/garderies/:id - live slot counts, read from the store
pub async fn show(State(state): State<AppState>, id: Result<Path<i32>, PathRejection>) -> ApiResult<Facility> {
    let Path(id) = id?;
    Ok(ApiResponse::success(state.ledger.facility(id).await?))
}

/// GET /api/garderies/:id/enfants
pub async fn children(State(state): State<AppState>, id: Result<Path<i32>, PathRejection>) -> ApiResult<Vec<Child>> {
    let Path(id) = id?;
    Ok(ApiResponse::success(state.ledger.enrolled_children(id).await?))
}

/// DELETE /api/garderies/:id - 409 while children are still enrolled
pub async fn delete(State(state): State<AppState>, id: Result<Path<i32>, PathRejection>) -> ApiResult<Value> {
    let Path(id) = id?;
    let closed = state.ledger.close_facility(id).await?;
    Ok(ApiResponse::success(json!({ "message": "Garderie supprimée", "garderie": closed })))
}
