//! Trust Registry Service: a local ledger node for the identity, reputation
//! and validation registries.
//!
//! Every registry operation is exposed as a JSON RPC route. State-changing
//! calls name their caller in a `from` field, like an unlocked dev node.
//! Default: http://127.0.0.1:9110/

mod convert;
mod routes;

use std::sync::Arc;
use std::time::Instant;

use routes::AppState;
use trust_registry::{ContractSigners, Ledger, RegistryConfig};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = RegistryConfig::from_env();

    log::info!("Opening ledger database at: {}", config.db_path);
    let ledger = match Ledger::open(&config, Arc::new(ContractSigners::new())) {
        Ok(ledger) => Arc::new(ledger),
        Err(e) => {
            log::error!("Failed to open ledger database: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("Agent registry: {}", config.agent_registry_string());

    let state = Arc::new(AppState {
        ledger,
        start_time: Instant::now(),
    });

    let cors = tower_http::cors::CorsLayer::permissive();
    let app = routes::build_router(state).layer(cors);

    let addr = format!("127.0.0.1:{}", config.port);
    log::info!("Trust Registry Service listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        log::error!("Server error: {}", e);
    }
}
