use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use sidelines_types::api::{MeResponse, UpdateProfileRequest};
use sidelines_types::models::AuthorProfile;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::Claims;

/// Public profile fields for a message author.
pub async fn get_author(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let profile = state.db.get_profile(user_id)?.ok_or(ApiError::NotFound("profile"))?;
    Ok(Json(AuthorProfile::from(profile)))
}

/// Identity behind the presented session.
pub async fn me(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    Json(MeResponse {
        user_id: claims.sub,
        email: claims.email,
    })
}

pub async fn get_own_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let profile = state.db.get_profile(claims.sub)?.ok_or(ApiError::NotFound("profile"))?;
    Ok(Json(profile))
}

pub async fn update_own_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let display_name = req.display_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if display_name.is_some_and(|s| s.chars().count() > 64) {
        return Err(ApiError::Validation("display name exceeds 64 characters".into()));
    }
    let avatar_url = req.avatar_url.as_deref().filter(|s| !s.is_empty());

    let profile = state
        .db
        .update_profile(claims.sub, display_name, avatar_url)?
        .ok_or(ApiError::NotFound("profile"))?;
    Ok(Json(profile))
}
