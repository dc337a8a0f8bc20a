use financial_copilot::{
    api::start_server,
    llm::GeminiClient,
    store::{InMemoryRecordStore, PostgresRecordStore, RecordStore},
    workflow::Orchestrator,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        warn!("GEMINI_API_KEY not set; model calls will fail over to fallback answers");
        String::new()
    });

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Financial copilot - API server");
    info!("Port: {}", api_port);

    let store: Arc<dyn RecordStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => Arc::new(PostgresRecordStore::connect_lazy(&url)?),
        Err(_) => {
            info!("DATABASE_URL not set, using in-memory record store");
            Arc::new(InMemoryRecordStore::new())
        }
    };

    let llm = Arc::new(GeminiClient::new(gemini_api_key)?);
    let orchestrator = Arc::new(Orchestrator::new(store, llm));

    info!("Orchestrator initialized");

    start_server(orchestrator, api_port).await?;

    Ok(())
}
