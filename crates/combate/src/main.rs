use combate::{CombateError, CombateServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), CombateError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = CombateServer::builder()
        .config(ServerConfig::from_env())
        .build()
        .await?;
    server.run().await
}
