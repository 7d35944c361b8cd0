use std::time::Duration;

use futures::future::BoxFuture;
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, TransactionTrait,
};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool to the database.
pub async fn establish_connection(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let mut options = ConnectOptions::new(cfg.database_url.clone());
    options
        .max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_connections)
        .connect_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug);

    let pool = Database::connect(options).await.map_err(|e| {
        error!("Failed to connect to database: {}", e);
        ServiceError::db_error(e)
    })?;

    info!("Database connection established");
    Ok(pool)
}

/// Runs one unit of work inside a savepoint on an open transaction.
///
/// In bulk item loops each iteration runs under its own savepoint: a failure
/// rolls back that iteration alone while siblings already committed at the
/// savepoint boundary survive the enclosing transaction.
pub async fn with_savepoint<T, F>(txn: &DatabaseTransaction, op: F) -> Result<T, ServiceError>
where
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, ServiceError>>,
{
    let savepoint = txn.begin().await.map_err(ServiceError::db_error)?;
    match op(&savepoint).await {
        Ok(value) => {
            savepoint.commit().await.map_err(ServiceError::db_error)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = savepoint.rollback().await {
                warn!("Savepoint rollback failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}
