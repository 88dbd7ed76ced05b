use sqlx::PgPool;
use tracing::info;

/// Creates or upgrades the Optimizer database schema.
///
/// The Adapter database belongs to the upstream feed and is never migrated from here.
pub async fn migrate_optimizer_database(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    let migrator = sqlx::migrate!("./migrations");
    migrator.run(pool).await?;

    info!(
        migrations = migrator.iter().count(),
        "optimizer database schema is up to date"
    );

    Ok(())
}
