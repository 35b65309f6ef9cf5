use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        catalog::{CreateProductRequest, ProductListQuery, ProductResponse, UpdateProductRequest},
        BulkDeleteRequest, BulkDeleteResponse, MessageResponse,
    },
    middleware::TenantContext,
    utils::ValidatedJson,
    AppState,
};

pub async fn create_product(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    ValidatedJson(req): ValidatedJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), AppError> {
    let product = state.catalog.create_product(&scope, req.into()).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

pub async fn list_products(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<Vec<ProductResponse>>, AppError> {
    let products = state
        .catalog
        .list_products(&scope, query.category_id.as_deref())
        .await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

pub async fn get_product(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, AppError> {
    let product = state.catalog.get_product(&scope, &id).await?;
    Ok(Json(product.into()))
}

pub async fn update_product(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateProductRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.catalog.update_product(&scope, &id, req.into()).await?;
    Ok(Json(MessageResponse::new("Product updated successfully")))
}

pub async fn delete_product(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.catalog.delete_product(&scope, &id).await?;
    Ok(Json(MessageResponse::new("Product deleted successfully")))
}

pub async fn bulk_delete_products(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    ValidatedJson(req): ValidatedJson<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, AppError> {
    let deleted = state.catalog.bulk_delete_products(&scope, &req.ids).await?;
    Ok(Json(BulkDeleteResponse {
        message: format!("{} products deleted successfully", deleted),
        deleted,
    }))
}
