use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, EmailRequest, LoginRequest, PublicUser, RegisterRequest, VerifyOtpRequest},
        jwt::AuthUser,
        services,
    },
    error::{ApiJson, ApiResponse, AppError},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/resend-otp", post(resend_otp))
        .route("/auth/login", post(login))
        .route("/auth/login-otp/request", post(request_login_otp))
        .route("/auth/login-otp/verify", post(verify_login_otp))
        .route("/auth/login-otp/resend", post(resend_login_otp))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile))
}

type Message = Json<ApiResponse<()>>;

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<Message, AppError> {
    services::register(&state, payload).await?;
    Ok(ApiResponse::message("OTP sent to your email"))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<VerifyOtpRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), AppError> {
    let auth = services::verify_registration(&state, payload).await?;
    Ok((StatusCode::CREATED, ApiResponse::data(auth)))
}

#[instrument(skip(state, payload))]
pub async fn resend_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> Result<Message, AppError> {
    services::resend_registration(&state, payload).await?;
    Ok(ApiResponse::message("OTP resent to your email"))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AppError> {
    let auth = services::login(&state, payload).await?;
    Ok(ApiResponse::data(auth))
}

#[instrument(skip(state, payload))]
pub async fn request_login_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> Result<Message, AppError> {
    services::request_login_otp(&state, payload).await?;
    Ok(ApiResponse::message("Login code sent to your email"))
}

#[instrument(skip(state, payload))]
pub async fn verify_login_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<VerifyOtpRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AppError> {
    let auth = services::verify_login_otp(&state, payload).await?;
    Ok(ApiResponse::data(auth))
}

#[instrument(skip(state, payload))]
pub async fn resend_login_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> Result<Message, AppError> {
    services::resend_login_otp(&state, payload).await?;
    Ok(ApiResponse::message("Login code resent to your email"))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse<PublicUser>>, AppError> {
    Ok(ApiResponse::data(services::profile(&state, &user).await?))
}
