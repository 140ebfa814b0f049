//! OpenAPI document served at `/api-docs/openapi.json` with Swagger UI at
//! `/swagger-ui`.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::auth::{
    AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, UserResponse,
    VerifyTokenRequest, VerifyTokenResponse,
};
use crate::handlers::slots::{GenerateSlotsRequest, GenerateSlotsResponse, ReservationResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Office Hours API",
        version = "1.0.0",
        description = "Reservation of office-hour slots with rotating session tokens.\n\n\
        ## Slots\n\
        Admins publish availability windows that are expanded into 15 minute slots.\n\
        Verified consumers claim up to a configurable number of consecutive slots per owner\n\
        on a single day, and may release them until the release cutoff.\n\n\
        ## Authentication\n\
        1. Login to get an access token and a refresh token\n\
        2. Include the access token in requests: `Authorization: Bearer <token>`\n\
        3. Exchange the refresh token at `/auth/refresh`; each refresh token works once",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Authentication", description = "Login and session token management"),
        (name = "Slots", description = "Slot generation, listing and reservation")
    ),
    paths(
        crate::handlers::health::health_check_simple,
        crate::handlers::health::health_check,
        crate::handlers::health::ready_check,
        crate::handlers::health::live_check,

        crate::handlers::auth::login,
        crate::handlers::auth::refresh_token,
        crate::handlers::auth::logout,
        crate::handlers::auth::logout_all,
        crate::handlers::auth::verify_token,
        crate::handlers::auth::get_current_user,

        crate::handlers::slots::generate_slots,
        crate::handlers::slots::list_slots,
        crate::handlers::slots::claim_slot,
        crate::handlers::slots::release_slot,
    ),
    components(
        schemas(
            crate::error::ApiError,
            crate::auth::Identity,
            crate::models::Role,
            crate::models::Slot,
            crate::reservation::SlotView,

            LoginRequest,
            RefreshRequest,
            RefreshResponse,
            AuthResponse,
            UserResponse,
            VerifyTokenRequest,
            VerifyTokenResponse,

            GenerateSlotsRequest,
            GenerateSlotsResponse,
            ReservationResponse,

            crate::handlers::health::HealthResponse,
            crate::handlers::health::ReadinessResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token obtained from /auth/login or /auth/refresh.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
