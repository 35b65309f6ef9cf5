use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        business::{
            BusinessResponse, CreateBusinessRequest, CreateBusinessResponse,
            UpdateBusinessRequest,
        },
        MessageResponse,
    },
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

pub async fn create_business(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateBusinessRequest>,
) -> Result<(StatusCode, Json<CreateBusinessResponse>), AppError> {
    let business = state.businesses.create(&principal, req.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateBusinessResponse {
            message: "Business created successfully".to_string(),
            business_id: business.id.clone(),
            business: business.into(),
            note: "Please refresh the ID token on the client to get the new permissions."
                .to_string(),
        }),
    ))
}

pub async fn list_businesses(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<Vec<BusinessResponse>>, AppError> {
    let businesses = state.businesses.list(&principal).await?;
    Ok(Json(businesses.into_iter().map(Into::into).collect()))
}

pub async fn get_business(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<BusinessResponse>, AppError> {
    let business = state.businesses.get(&principal, &id).await?;
    Ok(Json(business.into()))
}

pub async fn business_profile(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<BusinessResponse>, AppError> {
    let business = state.businesses.profile(&principal).await?;
    Ok(Json(business.into()))
}

pub async fn update_business(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateBusinessRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.businesses.update(&principal, &id, req.into()).await?;
    Ok(Json(MessageResponse::new("Business updated successfully")))
}

pub async fn delete_business(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.businesses.delete(&principal, &id).await?;
    Ok(Json(MessageResponse::new("Business deleted successfully")))
}
