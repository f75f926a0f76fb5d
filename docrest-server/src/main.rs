use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use docrest::{
    backend::{StoreBackend, StoreBackendBuilder},
    memory::InMemoryStore,
    mongodb::MongoDbStore,
    router::RestRouter,
};

mod cli;

use cli::{Backend, Cli};

async fn create_backend(cli: &Cli) -> Result<Arc<dyn StoreBackend>, Box<dyn std::error::Error>> {
    let backend: Arc<dyn StoreBackend> = match cli.backend {
        Backend::Memory => Arc::new(InMemoryStore::builder().build().await?),
        Backend::Mongodb => {
            let uri = cli
                .mongodb_uri
                .as_deref()
                .ok_or("--mongodb-uri is required when the backend is mongodb")?;
            Arc::new(MongoDbStore::builder(uri, &cli.database).build().await?)
        }
    };

    Ok(backend)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cli.log_filter)?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let backend = create_backend(&cli).await?;
    tracing::info!(backend = ?cli.backend, collections = ?cli.collections, "Backend ready");

    let app = RestRouter::builder(backend)
        .collections(cli.collections.iter().cloned())
        .build();

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("docrest listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down");
    Ok(())
}
