//! Crawler entrypoint.

use tracing::info;
use tracing_subscriber::EnvFilter;

use tharc_client::{BiliClient, ClientConfig};
use tharc_crawler::{Config, Crawler};
use tharc_store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    info!(db_path = %config.db_path.display(), "starting archive run");

    let store = Store::connect(&config.db_path).await?;
    store.init_schema().await?;
    for &mid in &config.seed_mids {
        store.add_uploader(mid).await?;
    }

    let client = BiliClient::new(ClientConfig::from_env())?;
    let crawler = Crawler::new(config, client, store);
    crawler.run().await?;

    Ok(())
}
