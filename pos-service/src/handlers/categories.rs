use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        catalog::{CategoryResponse, CreateCategoryRequest, UpdateCategoryRequest},
        BulkDeleteRequest, BulkDeleteResponse, MessageResponse,
    },
    middleware::TenantContext,
    utils::ValidatedJson,
    AppState,
};

pub async fn create_category(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    ValidatedJson(req): ValidatedJson<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), AppError> {
    let category = state.catalog.create_category(&scope, req.into()).await?;
    Ok((StatusCode::CREATED, Json(category.into())))
}

pub async fn list_categories(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
) -> Result<Json<Vec<CategoryResponse>>, AppError> {
    let categories = state.catalog.list_categories(&scope).await?;
    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

pub async fn get_category(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    Path(id): Path<String>,
) -> Result<Json<CategoryResponse>, AppError> {
    let category = state.catalog.get_category(&scope, &id).await?;
    Ok(Json(category.into()))
}

pub async fn update_category(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateCategoryRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.catalog.update_category(&scope, &id, req.into()).await?;
    Ok(Json(MessageResponse::new("Category updated successfully")))
}

pub async fn delete_category(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.catalog.delete_category(&scope, &id).await?;
    Ok(Json(MessageResponse::new("Category deleted successfully")))
}

pub async fn bulk_delete_categories(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    ValidatedJson(req): ValidatedJson<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, AppError> {
    let deleted = state
        .catalog
        .bulk_delete_categories(&scope, &req.ids)
        .await?;
    Ok(Json(BulkDeleteResponse {
        message: format!("{} categories deleted successfully", deleted),
        deleted,
    }))
}
