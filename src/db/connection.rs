//! Queue pool for the `media_jobs` table

use crate::config::AppConfig;
use crate::error::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Type alias for the database pool
pub type DbPool = PgPool;

/// One connection for the claim/update cycle, the rest for `/health` counts during a batch
const QUEUE_POOL_SIZE: u32 = 3;

/// Claims are short statements; a pool that cannot hand one out this fast is unhealthy
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connections idle longer than this are closed between polls
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Open the queue pool for the configured database
pub async fn create_pool(config: &AppConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(QUEUE_POOL_SIZE)
        .min_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .connect(&config.database_url)
        .await?;

    info!(
        target_db = %redacted_target(&config.database_url),
        max_connections = QUEUE_POOL_SIZE,
        "Queue pool ready"
    );
    Ok(pool)
}

/// `host:port/dbname` of a connection string, with credentials left out
pub fn redacted_target(database_url: &str) -> String {
    match Url::parse(database_url) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("localhost");
            let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
            format!("{}{}{}", host, port, url.path())
        }
        Err(_) => "<unparsable database url>".to_string(),
    }
}
