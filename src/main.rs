/// thumbserve entry point
/// Starts the HTTP file browser

use tokio::net::TcpListener;
use tracing::{error, info};

use thumbserve::config::ServerConfig;
use thumbserve::server::{serve, shutdown_signal};
use thumbserve::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match ServerConfig::from_env()
        .with_args(std::env::args().skip(1))
        .and_then(ServerConfig::validate)
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    };

    let addr = config.bind_address();
    println!("🚀 Server running on http://{}", addr);
    println!("📂 Serving files from: {}", config.root.display());
    println!(
        "📊 Cache size limit: {} thumbnails | Items per page: {}",
        config.cache_capacity, config.items_per_page
    );
    println!(
        "🎬 Frame extractor: {} (timeout {:?})",
        config.ffmpeg_path.display(),
        config.extraction_timeout
    );
    println!("⏹️  Press Ctrl+C to stop");

    let state = AppState::new(config);

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("❌ Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("✅ listening on http://{}", addr);

    if let Err(e) = serve(listener, state, shutdown_signal()).await {
        error!("server error: {}", e);
        std::process::exit(1);
    }
}
