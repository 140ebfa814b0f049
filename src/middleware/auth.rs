//! Identity gate and role guards.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::{
    auth::Identity,
    error::ApiError,
    models::Role,
    telemetry::{record_auth_attempt, AuthOutcome},
    AppState,
};

/// Validates the bearer access token and stores the caller's [`Identity`] in
/// request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            ApiError::unauthorized("Missing authorization header", "MISSING_AUTH_HEADER")
                .into_response()
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::unauthorized("Invalid authorization header format", "INVALID_AUTH_FORMAT")
            .into_response()
    })?;

    let identity = state.sessions.authenticate(token).map_err(|e| {
        debug!(error = %e, "Access token rejected");
        record_auth_attempt("authenticate", AuthOutcome::InvalidToken);
        ApiError::unauthorized("Invalid or expired token", "INVALID_TOKEN").into_response()
    })?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

fn current_identity(req: &Request) -> Result<&Identity, Response> {
    req.extensions().get::<Identity>().ok_or_else(|| {
        ApiError::unauthorized("Authentication required", "MISSING_AUTH_HEADER").into_response()
    })
}

fn forbid_role(identity: &Identity, required: Role) -> Response {
    debug!(user_id = %identity.user_id, role = %identity.role, required = %required, "Role check failed");
    record_auth_attempt("authorize", AuthOutcome::Forbidden);
    ApiError::forbidden(
        format!("This action requires the {required} role"),
        "FORBIDDEN_ROLE",
    )
    .into_response()
}

/// Must run inside [`auth_middleware`].
pub async fn require_admin(req: Request, next: Next) -> Result<Response, Response> {
    let identity = current_identity(&req)?;
    if !identity.has_role(Role::Admin) {
        return Err(forbid_role(identity, Role::Admin));
    }
    Ok(next.run(req).await)
}

/// Claims and releases are made by verified consumers only. Must run inside
/// [`auth_middleware`].
pub async fn require_verified_consumer(req: Request, next: Next) -> Result<Response, Response> {
    let identity = current_identity(&req)?;
    if !identity.has_role(Role::Consumer) {
        return Err(forbid_role(identity, Role::Consumer));
    }
    if !identity.verified {
        return Err(ApiError::forbidden(
            "Account email has not been verified",
            "ACCOUNT_NOT_VERIFIED",
        )
        .into_response());
    }
    Ok(next.run(req).await)
}
