//! Account endpoints: the privileged `/auth/*` routes and the identity
//! provider's own `/identity/*` surface, plus `/health`.

use crate::auth::{bearer_token, AuthUser};
use crate::dto::{
    HealthResponse, MessageResponse, RegisterResponse, RegisteredUser, SessionResponse,
    SignInRequest, VerifiedUser, VerifyRequest, VerifyResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::identity::{AuthErrorKind, IdentityError};
use crate::models::{Registration, Session};
use crate::state::SharedState;
use crate::validation::validate_registration;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};

// ── /auth ──────────────────────────────────────────────────────

pub async fn register(
    State(state): State<SharedState>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let Json(registration) = payload?;
    let validation = validate_registration(&registration);
    if !validation.is_valid() {
        return Err(validation.into());
    }

    let user = state
        .identity()?
        .create_account(&registration)
        .map_err(|e| match e {
            IdentityError::Auth(AuthErrorKind::EmailAlreadyInUse) => ApiError::DuplicateEmail,
            other => other.into(),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "User registered successfully".to_string(),
            user: RegisteredUser {
                uid: user.uid,
                email: user.email,
                display_name: user.display_name,
            },
        }),
    ))
}

pub async fn verify(
    State(state): State<SharedState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<Json<VerifyResponse>> {
    let Json(request) = payload?;
    let token = request
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::TokenRequired)?;

    let user = state.identity()?.verify(token)?;
    Ok(Json(VerifyResponse {
        success: true,
        user: VerifiedUser {
            uid: user.uid,
            email: user.email,
            name: user.display_name,
        },
    }))
}

/// Only the account holder, with a verified credential, may delete.
pub async fn delete_account(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    if !user.verified {
        return Err(ApiError::Forbidden("Account deletion requires a verified credential"));
    }
    if user.uid != uid {
        return Err(ApiError::Forbidden("You can only delete your own account"));
    }

    if !state.identity()?.delete_account(&uid)? {
        return Err(ApiError::Internal(format!("account {uid} vanished before deletion")));
    }
    Ok(Json(MessageResponse::ok("User deleted successfully")))
}

// ── /identity ──────────────────────────────────────────────────

fn session_response(session: Session, message: &str) -> SessionResponse {
    SessionResponse {
        success: true,
        message: message.to_string(),
        token: session.token,
        user: session.user,
    }
}

pub async fn sign_up(
    State(state): State<SharedState>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let Json(registration) = payload?;
    let session = state.identity()?.sign_up(&registration)?;
    Ok((
        StatusCode::CREATED,
        Json(session_response(session, "Account created successfully!")),
    ))
}

pub async fn sign_in(
    State(state): State<SharedState>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let Json(request) = payload?;
    let session = state.identity()?.sign_in(&request.email, &request.password)?;
    Ok(Json(session_response(session, "Signed in successfully!")))
}

pub async fn sign_out(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<Json<MessageResponse>> {
    let token = bearer_token(&headers).ok_or(ApiError::MissingToken)?;
    state.identity()?.sign_out(token)?;
    Ok(Json(MessageResponse::ok("Signed out successfully!")))
}

// ── /health ────────────────────────────────────────────────────

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let persistence = state.store.is_some();
    let verifier = state.identity.is_some();
    Json(HealthResponse {
        success: true,
        status: if persistence && verifier { "ok" } else { "degraded" }.to_string(),
        persistence,
        verifier,
    })
}
