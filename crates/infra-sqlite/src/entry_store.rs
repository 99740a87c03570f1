// SQLite EntryStore Implementation

use async_trait::async_trait;
use requeue_core::domain::{DomainError, NewEntry, QueueEntry, RequestSnapshot};
use requeue_core::error::{AppError, Result};
use requeue_core::port::EntryStore;
use sqlx::SqlitePool;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

/// Durable entry store backed by a shared SQLite database.
///
/// All queues in the process share one physical `requests` table,
/// partitioned by `queue_name`. `id` is AUTOINCREMENT, so ids are
/// strictly increasing and never reused even after deletion.
pub struct SqliteEntryStore {
    pool: SqlitePool,
}

impl SqliteEntryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntryStore for SqliteEntryStore {
    async fn push_entry(&self, entry: NewEntry) -> Result<i64> {
        if !entry.request_data.is_valid() {
            return Err(DomainError::InvalidEntry(
                "entry request data must have a method and url".to_string(),
            )
            .into());
        }

        let headers = serde_json::to_string(&entry.request_data.headers)?;
        let metadata = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO requests (
                queue_name, url, method, headers, mode, credentials,
                body, timestamp, metadata
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.queue_name)
        .bind(&entry.request_data.url)
        .bind(&entry.request_data.method)
        .bind(&headers)
        .bind(&entry.request_data.mode)
        .bind(&entry.request_data.credentials)
        .bind(&entry.request_data.body)
        .bind(entry.timestamp)
        .bind(&metadata)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn shift_entry(&self, queue_name: &str) -> Result<Option<QueueEntry>> {
        // Atomic pop of the oldest entry in the partition
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            DELETE FROM requests
            WHERE id = (
                SELECT id FROM requests WHERE queue_name = ? ORDER BY id ASC LIMIT 1
            )
            RETURNING id, queue_name, url, method, headers, mode, credentials,
                      body, timestamp, metadata
            "#,
        )
        .bind(queue_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|r| r.into_entry()).transpose()
    }

    async fn get_all(&self, queue_name: &str) -> Result<Vec<QueueEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT id, queue_name, url, method, headers, mode, credentials,
                   body, timestamp, metadata
            FROM requests
            WHERE queue_name = ?
            ORDER BY id ASC
            "#,
        )
        .bind(queue_name)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(|r| r.into_entry()).collect()
    }

    async fn delete_entry(&self, id: i64) -> Result<()> {
        // No-op (not an error) if the id is absent
        sqlx::query("DELETE FROM requests WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: i64,
    queue_name: String,
    url: String,
    method: String,
    headers: String,
    mode: Option<String>,
    credentials: Option<String>,
    body: Option<Vec<u8>>,
    timestamp: i64,
    metadata: Option<String>,
}

impl EntryRow {
    fn into_entry(self) -> Result<QueueEntry> {
        let headers: Vec<(String, String)> = serde_json::from_str(&self.headers)?;
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(QueueEntry {
            id: self.id,
            queue_name: self.queue_name,
            request_data: RequestSnapshot {
                url: self.url,
                method: self.method,
                headers,
                mode: self.mode,
                credentials: self.credentials,
                body: self.body,
            },
            timestamp: self.timestamp,
            metadata,
        })
    }
}
