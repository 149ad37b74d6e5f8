//! Apply the inventory schema to the database named by `DATABASE_URL`.

use anyhow::{Context, Result};
use tracing::info;

use stockflow_infra::{InventoryConfig, PostgresInventoryStore};

#[tokio::main]
async fn main() -> Result<()> {
    stockflow_observability::init();

    let config = InventoryConfig::from_env().context("failed to load configuration")?;
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;

    let store = PostgresInventoryStore::connect(database_url, config.db_max_connections, config.tx_timeout)
        .await
        .context("failed to connect to Postgres")?;
    store.migrate().await.context("migration failed")?;

    info!("inventory schema is up to date");
    Ok(())
}
