use mongodb::{Client, Database};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::Result;

pub async fn get_db_client(config: &AppConfig) -> Result<Database> {
    let client = Client::with_uri_str(&config.database_url).await?;
    let db = client.database(&config.database_name);

    // Connection errors surface lazily; probe once so startup logs say where we are.
    match db.list_collection_names().await {
        Ok(collections) => {
            info!(
                "Connected to database '{}' ({} collections)",
                config.database_name,
                collections.len()
            );
        }
        Err(e) => {
            warn!("Database '{}' may be inaccessible: {}", config.database_name, e);
        }
    }

    Ok(db)
}
