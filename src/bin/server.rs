use log::{error, info, warn};
use std::convert::Infallible;
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::{self, Filter};

use pairlink::config::AppConfig;
use pairlink::constants::WS_PATH;
use pairlink::core::{CoreServer, EventDispatcher};
use pairlink::handlers::websocket::handle_ws_client;

#[tokio::main]
async fn main() {
    // Initialize env
    match dotenv::dotenv() {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("No .env file loaded: {}", e),
    };

    // Load config before logging so the log settings apply
    let config = match AppConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(
        "Configuration: host={}, port={}, environment={}",
        config.host, config.port, config.environment
    );

    // Build the core and wire the dispatcher to the match loop
    let (core, match_rx) = CoreServer::new(config.clone());
    core.start_maintenance();

    let dispatcher = Arc::new(EventDispatcher::new(core.clone()));
    {
        let consumer = dispatcher.clone();
        tokio::spawn(async move {
            consumer.run_match_consumer(match_rx).await;
        });
    }

    // Create WebSocket route
    let ws_route = warp::path(WS_PATH)
        .and(warp::ws())
        .and(with_dispatcher(dispatcher))
        .map(|ws: warp::ws::Ws, dispatcher: Arc<EventDispatcher>| {
            ws.on_upgrade(move |socket| handle_ws_client(socket, dispatcher))
        });

    // Admin surface with CORS from the configured origins
    let admin = pairlink::handlers::admin::admin_routes(core.clone());
    let cors = if config.allowed_origins.is_empty() {
        warp::cors().allow_any_origin().allow_methods(vec!["GET"])
    } else {
        warp::cors()
            .allow_origins(config.allowed_origins.iter().map(|s| s.as_str()))
            .allow_methods(vec!["GET"])
    };

    let routes = ws_route.or(admin.with(cors));

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Pairlink server on {}", addr);
    warp::serve(routes).run(addr).await;
}

fn init_logging(config: &AppConfig) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&config.log_level);
    if let Some(path) = &config.log_path {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("Cannot open log file {}: {}; logging to stderr", path, e);
            }
        }
    }
    builder.init();
}

// Helper function to include the dispatcher in request handling
fn with_dispatcher(
    dispatcher: Arc<EventDispatcher>,
) -> impl Filter<Extract = (Arc<EventDispatcher>,), Error = Infallible> + Clone {
    warp::any().map(move || dispatcher.clone())
}
