use actix_cors::Cors;
use actix_web::{middleware::from_fn, web, App, HttpServer};
use dotenv::dotenv;
use project_gate::{auth::middleware::rate_limit, configure, AppError, AppState, Settings};
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn cors(settings: &Settings) -> Cors {
    if !settings.cors.enabled {
        return Cors::default();
    }

    Cors::default()
        .allow_any_origin()
        .supports_credentials()
        .allowed_methods(vec!["POST", "OPTIONS", "GET", "PUT", "PATCH", "DELETE"])
        .allowed_headers(vec![
            "Content-Type",
            "Content-Length",
            "Accept-Encoding",
            "X-CSRF-Token",
            "Authorization",
            "Accept",
            "Origin",
            "Cache-Control",
            "X-Requested-With",
        ])
        .max_age(settings.cors.max_age as usize)
}

#[actix_web::main]
async fn main() -> project_gate::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .init();

    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    let state = AppState::new(config.clone()).await?;
    let state = web::Data::new(state);

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    info!("Starting server at {}:{}", config.server.host, config.server.port);

    let app_config = config.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(from_fn(rate_limit))
            .wrap(cors(&app_config))
            .app_data(state.clone())
            .configure(configure)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(())
}
