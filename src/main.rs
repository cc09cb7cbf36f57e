use std::sync::Arc;

use tracing::info;

use crm_seeder::api::{create_router, AppState};
use crm_seeder::config::AppConfig;
use crm_seeder::orchestrator::GenerationOrchestrator;
use crm_seeder::remote::HttpBatchClient;
use crm_seeder::session::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "crm_seeder=info,tower_http=debug".to_string()),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();
    info!(
        contacts = config.num_contacts,
        companies = config.num_companies,
        "Loaded configuration"
    );

    let client = Arc::new(HttpBatchClient::new(config.webhook_url.as_str())?);
    let registry = SessionRegistry::new();
    let orchestrator = GenerationOrchestrator::new(
        registry.clone(),
        client,
        config.num_contacts,
        config.num_companies,
    );
    let state = AppState {
        registry,
        orchestrator,
    };

    let app = create_router(state, &config.allowed_origins);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
