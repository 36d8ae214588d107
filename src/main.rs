// src/main.rs

use dotenvy::dotenv;
use lostfound::config::Config;
use lostfound::routes;
use lostfound::state::AppState;
use lostfound::store::{self, PostStore};
use lostfound::upload::UploadManager;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Open database and run migrations
    let pool = store::connect(&config.database_url)
        .await
        .expect("Failed to open database");
    tracing::info!("Database ready: {}", config.database_url);

    // Prepare upload area
    let uploads = UploadManager::new(&config.upload_dir, &config.public_url)
        .expect("Failed to configure upload directory");
    uploads
        .ensure_dir()
        .await
        .expect("Failed to create upload directory");
    tracing::info!("Uploads stored in {}", uploads.dir().display());

    // Create AppState
    let state = AppState {
        posts: PostStore::new(pool),
        uploads,
        config: config.clone(),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listening address");
    tracing::info!("Listening on {}", config.bind_addr);

    // Start the server
    axum::serve(listener, app).await.expect("Server error");
}
