//! `JSONB`-backed [`DocumentStore`].
//!
//! All collections share one table keyed by `(collection, id)`:
//!
//! ```sql
//! CREATE TABLE documents (
//!     collection TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     data JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     PRIMARY KEY (collection, id)
//! );
//! ```
//!
//! [`PostgresDocumentStore::migrate`] creates the default `documents` table.
//! A custom table set with [`PostgresDocumentStore::with_table_name`] must
//! have the same shape.
//!
//! Batches run inside one transaction, which gives the all-or-nothing
//! semantics the trait requires.

use crate::config::{DEFAULT_TABLE_NAME, PostgresConfig};
use crate::filter;
use docquery_core::constraint::{Constraint, OrderSpec};
use docquery_core::document::{Document, DocumentId, StoredDocument};
use docquery_core::store::{DEFAULT_MAX_BATCH_SIZE, DocumentStore, StoreError, StoreFuture};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};

/// `PostgreSQL` document store.
///
/// # Example
///
/// ```ignore
/// use docquery_postgres::{PostgresConfig, PostgresDocumentStore};
/// use docquery_runtime::Client;
///
/// let store = PostgresDocumentStore::connect(&PostgresConfig::from_env()).await?;
/// store.migrate().await?;
///
/// let client = Client::new(store);
/// let events = client.collection("events").eq("status", "published").resolve().await?;
/// ```
#[derive(Clone, Debug)]
pub struct PostgresDocumentStore {
    pool: PgPool,
    table_name: String,
    max_batch_size: usize,
}

impl PostgresDocumentStore {
    /// Create a store over an existing connection pool and the default table.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    /// Connect a new pool using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to database: {e}")))?;

        tracing::info!(
            max_connections = config.max_connections,
            table = %config.table_name,
            "Connected to PostgreSQL document store"
        );

        Ok(Self::new(pool)
            .with_table_name(config.table_name.clone())
            .with_max_batch_size(config.max_batch_size))
    }

    /// Use a different table.
    ///
    /// The name is interpolated into SQL as-is; it must be a trusted
    /// identifier.
    #[must_use]
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Cap the number of rows one batch transaction may touch.
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Run the embedded migrations (creates the `documents` table).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to run migrations: {e}")))
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn check_batch(&self, size: usize) -> Result<(), StoreError> {
        if size > self.max_batch_size {
            return Err(StoreError::BatchTooLarge {
                size,
                max: self.max_batch_size,
            });
        }
        Ok(())
    }
}

fn decode_row(row: &PgRow) -> Result<StoredDocument, StoreError> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let Json(data): Json<Document> = row.try_get("data").map_err(map_sqlx_error)?;
    Ok(StoredDocument::new(DocumentId::new(id), data))
}

/// Map a sqlx error onto the driver error taxonomy.
///
/// Connection loss and pool exhaustion are transient; SQLSTATE classes
/// decide the rest.
#[must_use]
pub fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::PoolTimedOut => StoreError::Timeout("connection pool timed out".to_string()),
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::Unavailable(error.to_string())
        }
        sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => {
            StoreError::Serialization(error.to_string())
        }
        sqlx::Error::Database(ref db) => {
            let message = db.message().to_string();
            db.code()
                .map_or(StoreError::Backend(message.clone()), |code| {
                    map_sqlstate(&code, message)
                })
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn map_sqlstate(code: &str, message: String) -> StoreError {
    match code {
        "42501" => StoreError::PermissionDenied(message),
        "57014" => StoreError::Timeout(message),
        "40001" | "40P01" => StoreError::FailedPrecondition(message),
        "22P02" | "2202E" => StoreError::InvalidArgument(message),
        code if code.starts_with("08") || code.starts_with("53") || code.starts_with("57P") => {
            StoreError::Unavailable(message)
        }
        _ => StoreError::Backend(message),
    }
}

impl DocumentStore for PostgresDocumentStore {
    fn get<'a>(&'a self, collection: &'a str, id: &'a DocumentId) -> StoreFuture<'a, StoredDocument> {
        Box::pin(async move {
            let sql = format!(
                "SELECT id, data FROM {} WHERE collection = $1 AND id = $2",
                self.table_name
            );
            let row = sqlx::query(&sql)
                .bind(collection)
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            match row {
                Some(row) => decode_row(&row),
                None => Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.clone(),
                }),
            }
        })
    }

    fn query<'a>(
        &'a self,
        collection: &'a str,
        constraints: &'a [Constraint],
        order: Option<&'a OrderSpec>,
        limit: Option<usize>,
    ) -> StoreFuture<'a, Vec<StoredDocument>> {
        Box::pin(async move {
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
                "SELECT id, data FROM {} WHERE collection = ",
                self.table_name
            ));
            builder.push_bind(collection.to_string());
            filter::push_constraints(&mut builder, constraints)?;
            filter::push_order(&mut builder, order);
            if let Some(limit) = limit {
                builder.push(" LIMIT ");
                builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
            }

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            tracing::debug!(collection, rows = rows.len(), "Queried documents");
            rows.iter().map(decode_row).collect()
        })
    }

    fn set<'a>(
        &'a self,
        collection: &'a str,
        id: &'a DocumentId,
        document: Document,
        merge: bool,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let data = if merge {
                format!("{}.data || EXCLUDED.data", self.table_name)
            } else {
                "EXCLUDED.data".to_string()
            };
            let sql = format!(
                "INSERT INTO {table} (collection, id, data) VALUES ($1, $2, $3) \
                 ON CONFLICT (collection, id) DO UPDATE SET data = {data}, updated_at = now()",
                table = self.table_name
            );
            sqlx::query(&sql)
                .bind(collection)
                .bind(id.as_str())
                .bind(Json(document))
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            Ok(())
        })
    }

    fn create<'a>(
        &'a self,
        collection: &'a str,
        id: &'a DocumentId,
        document: Document,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO {} (collection, id, data) VALUES ($1, $2, $3) \
                 ON CONFLICT (collection, id) DO NOTHING",
                self.table_name
            );
            let result = sqlx::query(&sql)
                .bind(collection)
                .bind(id.as_str())
                .bind(Json(document))
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::AlreadyExists {
                    collection: collection.to_string(),
                    id: id.clone(),
                });
            }
            Ok(())
        })
    }

    fn batch_delete<'a>(&'a self, collection: &'a str, ids: Vec<DocumentId>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_batch(ids.len())?;
            let sql = format!(
                "DELETE FROM {} WHERE collection = $1 AND id = ANY($2)",
                self.table_name
            );
            let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
            let result = sqlx::query(&sql)
                .bind(collection)
                .bind(ids)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            tracing::debug!(collection, deleted = result.rows_affected(), "Deleted batch");
            Ok(())
        })
    }

    fn batch_update<'a>(
        &'a self,
        collection: &'a str,
        updates: Vec<(DocumentId, Document)>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_batch(updates.len())?;
            let sql = format!(
                "UPDATE {} SET data = data || $3, updated_at = now() \
                 WHERE collection = $1 AND id = $2",
                self.table_name
            );

            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
            for (id, patch) in updates {
                let result = sqlx::query(&sql)
                    .bind(collection)
                    .bind(id.as_str())
                    .bind(Json(patch))
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;

                // Dropping the transaction rolls back earlier rows.
                if result.rows_affected() == 0 {
                    return Err(StoreError::NotFound {
                        collection: collection.to_string(),
                        id,
                    });
                }
            }
            tx.commit().await.map_err(map_sqlx_error)?;
            Ok(())
        })
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_transient() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(map_sqlx_error(sqlx::Error::PoolClosed).is_transient());
    }

    #[test]
    fn row_not_found_is_a_backend_error() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
    }

    #[test]
    fn sqlstate_classes() {
        assert_eq!(
            map_sqlstate("42501", "denied".into()),
            StoreError::PermissionDenied("denied".into())
        );
        assert_eq!(
            map_sqlstate("57014", "cancelled".into()),
            StoreError::Timeout("cancelled".into())
        );
        assert_eq!(
            map_sqlstate("40P01", "deadlock".into()),
            StoreError::FailedPrecondition("deadlock".into())
        );
        assert!(map_sqlstate("08006", "gone".into()).is_transient());
        assert!(map_sqlstate("53300", "too many connections".into()).is_transient());
        assert_eq!(
            map_sqlstate("23505", "dup".into()),
            StoreError::Backend("dup".into())
        );
    }
}
