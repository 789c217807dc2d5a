pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod projects;
pub mod response;

use std::sync::Arc;
use actix_web::{http::StatusCode, web, HttpResponse};
use tracing::{info, warn};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AccessGuard, RateLimiter, RateLimitConfig, SessionStore, TokenService};
pub use db::{Project, ProjectRepo, Repository};

use auth::{KeyValueStore, MemoryStore, RedisStore};
use response::ApiResponse;

/// Health check endpoint handler
/// Reports whether the session store answers.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let store = match state.guard.sessions().ping().await {
        Ok(()) => "ok",
        Err(_) => "unavailable",
    };

    HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        "server up",
        serde_json::json!({
            "session_store": store,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

/// Route table shared by the binary and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .service(
            web::scope("/auth")
                .route("/logout", web::post().to(auth::handlers::logout))
                .route("/refresh", web::post().to(auth::handlers::refresh))
                .service(
                    web::resource("/otp/{reference}")
                        .route(web::post().to(auth::handlers::put_reference))
                        .route(web::get().to(auth::handlers::check_reference)),
                ),
        )
        .service(
            web::scope("/projects")
                .route("/{uid}", web::post().to(projects::handlers::create_project))
                .service(
                    web::resource("/{uid}/{id}")
                        .route(web::put().to(projects::handlers::update_project))
                        .route(web::delete().to(projects::handlers::delete_project)),
                ),
        );
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub guard: Arc<AccessGuard>,
    pub rate_limiter: Arc<RateLimiter>,
    pub projects: Arc<dyn Repository<Project>>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let backend: Arc<dyn KeyValueStore> = if config.redis.url.is_empty() {
            warn!("No Redis URL configured, sessions are kept in process memory");
            Arc::new(MemoryStore::new())
        } else {
            info!("Connecting session store to {}", auth::redis_endpoint(&config.redis.url));
            Arc::new(RedisStore::connect(
                &config.redis.url,
                config.redis.pool_size,
                config.redis.timeout(),
            )?)
        };

        let projects = ProjectRepo::connect_lazy(&config.database.url, config.database.max_connections)?;

        Ok(Self::from_parts(config, backend, Arc::new(projects)))
    }

    /// Wires the components around already-built collaborators.
    pub fn from_parts(
        config: Settings,
        store: Arc<dyn KeyValueStore>,
        projects: Arc<dyn Repository<Project>>,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(config.auth.access_secret.clone()));
        let sessions = Arc::new(SessionStore::new(store, config.redis.timeout()));
        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            rate_per_second: config.rate_limit.rate_per_second,
            burst: config.rate_limit.burst,
        }));

        Self {
            config: Arc::new(config),
            guard: Arc::new(AccessGuard::new(tokens, sessions)),
            rate_limiter,
            projects,
        }
    }
}
