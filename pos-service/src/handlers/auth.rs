use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{
            ForgotPasswordRequest, LoginRequest, LoginResponse, RefreshRequest, RegisterRequest,
            RegisterResponse, ResetPasswordRequest, UpdateProfileRequest, UserResponse,
        },
        MessageResponse,
    },
    middleware::{AuthUser, MaybeAuthUser},
    services::Registration,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Register an account. Owners calling with their token may enrol staff.
pub async fn register(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let user = state
        .accounts
        .register(
            caller.as_ref(),
            Registration {
                email: req.email,
                password: Password::new(req.password),
                display_name: req.display_name,
                role: req.role,
                business_id: req.business_id,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user: user.into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let sign_in = state
        .accounts
        .login(&req.email, &Password::new(req.password))
        .await?;
    Ok(Json(sign_in.into()))
}

pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let sign_in = state.accounts.refresh(&req.refresh_token).await?;
    Ok(Json(sign_in.into()))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.accounts.forgot_password(&req.email).await?;
    Ok(Json(MessageResponse::new("Password reset email sent")))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .accounts
        .reset_password(&req.token, &Password::new(req.new_password))
        .await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}

pub async fn me(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.accounts.me(&principal).await?;
    Ok(Json(user.into()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.accounts.update(&principal, req.into()).await?;
    Ok(Json(MessageResponse::new("Profile updated successfully")))
}

pub async fn delete_account(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<MessageResponse>, AppError> {
    state.accounts.delete(&principal).await?;
    Ok(Json(MessageResponse::new("Account deleted successfully")))
}
