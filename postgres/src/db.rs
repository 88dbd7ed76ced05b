use std::time::Duration;

use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Duration after which idle connections are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum time spent waiting for a pooled connection before the attempt is reported as failed.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates a lazily connected pool for one of the two databases.
///
/// No connection is opened here. The service must be able to start while a database is down,
/// so reachability problems surface on the first query and are handled by the connectivity
/// state machine instead of failing startup.
pub fn create_lazy_pool(config: &PgConnectionConfig, application_name: &str) -> PgPool {
    let options = config.with_db().application_name(application_name);

    PgPoolOptions::new()
        .min_connections(0)
        .max_connections(config.max_connections)
        .idle_timeout(Some(IDLE_TIMEOUT))
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_lazy_with(options)
}

/// Checks that the database answers a trivial query.
pub async fn probe(pool: &PgPool) -> sqlx::Result<()> {
    sqlx::query("select 1").execute(pool).await?;

    Ok(())
}
