//! Office Hours - slot reservation with rotating session tokens.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod reservation;
pub mod schema;
pub mod store;
pub mod telemetry;

use axum::{
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use mockable::{Clock, DefaultClock};
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use auth::{jwt::JwtConfig, SessionEngine};
use middleware::{metrics::metrics_middleware, request_id::request_id_middleware};
use reservation::{ReservationManager, ReservationPolicy};
use store::{
    CredentialStore, MemoryCredentialStore, MemorySlotStore, MemoryUserStore, PgCredentialStore,
    PgSlotStore, PgUserStore, SlotStore, UserStore,
};
use telemetry::MetricsState;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Storage adapters backing one application instance.
#[derive(Clone)]
pub struct Stores {
    pub slots: Arc<dyn SlotStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    pub fn postgres(db_pool: DbPool) -> Self {
        Self {
            slots: Arc::new(PgSlotStore::new(db_pool.clone())),
            credentials: Arc::new(PgCredentialStore::new(db_pool.clone())),
            users: Arc::new(PgUserStore::new(db_pool)),
        }
    }

    /// In-memory stores sharing `users`, so callers can seed accounts.
    pub fn in_memory(users: Arc<MemoryUserStore>) -> Self {
        Self {
            slots: Arc::new(MemorySlotStore::new()),
            credentials: Arc::new(MemoryCredentialStore::new()),
            users,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationManager>,
    pub sessions: Arc<SessionEngine>,
    pub users: Arc<dyn UserStore>,
    pub metrics: MetricsState,
}

impl AppState {
    /// PostgreSQL-backed state with the signing key from `JWT_PRIVATE_KEY`.
    pub fn new(db_pool: DbPool, config: &Config) -> Self {
        Self::with_stores(
            Stores::postgres(db_pool),
            JwtConfig::from_env(&config.jwt),
            config,
            Arc::new(DefaultClock),
        )
    }

    pub fn with_stores(
        stores: Stores,
        jwt_config: JwtConfig,
        config: &Config,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let reservations = ReservationManager::new(
            stores.slots,
            ReservationPolicy::from(&config.reservation),
            clock,
        );
        let sessions = SessionEngine::new(
            Arc::new(jwt_config),
            stores.credentials,
            stores.users.clone(),
        );

        Self {
            reservations: Arc::new(reservations),
            sessions: Arc::new(sessions),
            users: stores.users,
            metrics: MetricsState::new(config.telemetry.metrics_enabled),
        }
    }
}

pub fn create_router(state: AppState, config: &config::Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let metrics_state = state.metrics.clone();
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check_simple))
        .route("/health/status", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::ready_check))
        .route("/health/live", get(handlers::health::live_check))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(metrics_state),
        )
        .with_state(state.clone());

    let session_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh_token))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/verify", post(handlers::auth::verify_token))
        .with_state(state.clone());

    let identity_gate =
        axum_middleware::from_fn_with_state(state.clone(), middleware::auth::auth_middleware);

    let protected_routes = Router::new()
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .route("/auth/me", get(handlers::auth::get_current_user))
        .route("/slots", get(handlers::slots::list_slots))
        .layer(identity_gate.clone())
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/slots/generate", post(handlers::slots::generate_slots))
        .layer(axum_middleware::from_fn(middleware::auth::require_admin))
        .layer(identity_gate.clone())
        .with_state(state.clone());

    let consumer_routes = Router::new()
        .route("/slots/{slot_id}/claim", post(handlers::slots::claim_slot))
        .route("/slots/{slot_id}/release", post(handlers::slots::release_slot))
        .layer(axum_middleware::from_fn(
            middleware::auth::require_verified_consumer,
        ))
        .layer(identity_gate)
        .with_state(state);

    Router::new()
        .merge(openapi::swagger_router())
        .merge(public_routes)
        .merge(session_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .merge(consumer_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    error::ApiError::not_found("Not found", "NOT_FOUND")
}

fn build_cors_layer(config: &config::Config) -> CorsLayer {
    use axum::http::header::HeaderName;
    use axum::http::{HeaderValue, Method};

    let cors = &config.cors;
    let is_wildcard_origin =
        cors.allowed_origins.is_empty() || cors.allowed_origins.iter().any(|o| o == "*");

    let methods: Vec<Method> = cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    let headers: Vec<HeaderName> = cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();
    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(cors.max_age_secs));

    // A literal `*` cannot be combined with credentials, so mirror the origin.
    match (is_wildcard_origin, cors.allow_credentials) {
        (true, true) => layer
            .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
            .allow_credentials(true),
        (true, false) => layer.allow_origin(Any),
        (false, credentials) => layer.allow_origin(origins).allow_credentials(credentials),
    }
}

pub fn create_db_pool(config: &config::Config) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(&config.database.url);
    r2d2::Pool::builder()
        .max_size(config.database.max_connections)
        .min_idle(Some(config.database.min_connections))
        .connection_timeout(Duration::from_secs(config.database.connection_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.database.idle_timeout_secs)))
        .build(manager)
        .expect("Failed to create database pool")
}

pub fn init_tracing(config: &config::Config) {
    telemetry::init_telemetry(config);
}

pub use telemetry::tracing::shutdown_telemetry;

pub use config::Config;
