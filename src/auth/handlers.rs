use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{
            Envelope, ForgotPasswordRequest, LoginRequest, PublicUser, ResetPasswordRequest,
            SignupData, SignupRequest,
        },
        extractors::{AuthUser, SESSION_COOKIE},
    },
    error::AccountError,
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/profile", get(profile))
        .route("/logout", get(logout))
        .route("/verify/", get(missing_verification_token))
        .route("/verify/:verification_token", get(verify_email))
        .route("/forgot", get(forgot_password).post(forgot_password))
        .route("/reset/:token", post(reset_password))
}

/// Turns body rejections into the usual 400 envelope.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AccountError> {
    payload.map(|Json(v)| v).map_err(|e| {
        warn!(error = %e, "rejected request body");
        AccountError::Validation("Request body must be valid JSON.")
    })
}

fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; Max-Age={max_age_secs}; HttpOnly; SameSite=Strict"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn cleared_session_cookie(secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Strict"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<SignupData>>), AccountError> {
    let req = body(payload)?;
    let data = state
        .accounts
        .signup(&req.name, &req.email, &req.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::success(
            "User registered successfully. Please verify your email.",
            Some(data),
        )),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AccountError> {
    let req = body(payload)?;
    let (token, user) = state.accounts.login(&req.email, &req.password).await?;
    let cookie = session_cookie(
        &token,
        state.accounts.keys().session_ttl.as_secs(),
        state.config.production,
    );
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(Envelope::success("Login successful.", Some(user)).with_token(token)),
    ))
}

#[instrument(skip(state, user))]
pub async fn profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Envelope<PublicUser>>, AccountError> {
    let profile = state.accounts.profile(user.id).await?;
    Ok(Json(Envelope::success("Your profile data.", Some(profile))))
}

#[instrument(skip(state, user))]
pub async fn logout(State(state): State<AppState>, AuthUser(user): AuthUser) -> impl IntoResponse {
    tracing::info!(user_id = %user.id, "user logged out");
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cleared_session_cookie(state.config.production))],
        Json(Envelope::<()>::success("Logout successful.", None)),
    )
}

#[instrument(skip(state, token))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Envelope<()>>, AccountError> {
    state.accounts.verify_email(&token).await?;
    Ok(Json(Envelope::success("Verification successful.", None)))
}

pub async fn missing_verification_token() -> AccountError {
    AccountError::Validation("Token not found.")
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<Envelope<()>>, AccountError> {
    let req = body(payload)?;
    state.accounts.forgot_password(&req.email).await?;
    Ok(Json(Envelope::success(
        "Password reset email sent successfully.",
        None,
    )))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<Envelope<()>>, AccountError> {
    let req = body(payload)?;
    state.accounts.reset_password(&token, &req.password).await?;
    Ok(Json(Envelope::success(
        "Password has been reset successfully.",
        None,
    )))
}
