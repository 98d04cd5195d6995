/// Embedded schema migrations
///
/// SQL files under `profilehub-shared/migrations/` are compiled into the
/// binary with `sqlx::migrate!` and applied at startup.

use sqlx::postgres::PgPool;
use tracing::{info, warn};

/// Applies every pending migration.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Running database migrations");

    match sqlx::migrate!("./migrations").run(pool).await {
        Ok(()) => {
            info!("Database schema is up to date");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Migration failed");
            Err(e)
        }
    }
}
