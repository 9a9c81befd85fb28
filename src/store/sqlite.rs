//! SQLite-backed [`VectorStore`] implementation.
//!
//! All collections share one `entries` table keyed by `(collection, id)`.
//! Vectors are stored as little-endian `f32` BLOBs (see
//! [`vec_to_blob`](crate::embedding::vec_to_blob)) and searched brute-force;
//! `seq` records insertion order for stable tie-breaking.
//!
//! The store is a blocking facade: it owns a small tokio runtime and drives
//! every `sqlx` call with `block_on`, so the watcher thread and the query
//! loop can both use it without an async context of their own.

use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::runtime::Runtime;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, ChunkMetadata, RetrievedChunk};

use super::{MetadataFilter, StoreEntry, VectorStore};

pub struct SqliteStore {
    runtime: Runtime,
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("ragwatch-sqlite")
            .enable_all()
            .build()
            .context("Failed to start SQLite runtime")?;

        let pool = runtime.block_on(connect(path))?;
        runtime.block_on(migrate(&pool))?;
        Ok(Self { runtime, pool })
    }

    fn run<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        self.runtime.block_on(fut)
    }

    async fn require_collection(&self, collection: &str) -> Result<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(())
        } else {
            Err(anyhow!("collection '{}' does not exist", collection))
        }
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        self.runtime.block_on(async move { pool.close().await });
    }
}

async fn connect(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open vector database: {}", path.display()))?;

    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            text TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            filetype TEXT NOT NULL,
            upload_time TEXT NOT NULL,
            start_offset INTEGER NOT NULL,
            unit INTEGER NOT NULL,
            vector BLOB NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_doc_id ON entries(collection, doc_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_seq ON entries(collection, seq)")
        .execute(pool)
        .await?;

    Ok(())
}

fn row_metadata(row: &sqlx::sqlite::SqliteRow) -> ChunkMetadata {
    ChunkMetadata {
        doc_id: row.get("doc_id"),
        filename: row.get("filename"),
        filetype: row.get("filetype"),
        upload_time: row.get("upload_time"),
        start_offset: row.get::<i64, _>("start_offset") as usize,
        unit: row.get::<i64, _>("unit") as usize,
    }
}

impl VectorStore for SqliteStore {
    fn create_collection(&self, collection: &str) -> Result<()> {
        self.run(async {
            sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
                .bind(collection)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn has_collection(&self, collection: &str) -> Result<bool> {
        self.run(async {
            let exists: bool =
                sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                    .bind(collection)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        })
    }

    fn add_texts(&self, collection: &str, entries: &[StoreEntry]) -> Result<()> {
        self.run(async {
            self.require_collection(collection).await?;
            let mut tx = self.pool.begin().await?;

            for entry in entries {
                let m = &entry.metadata;
                sqlx::query(
                    r#"
                    INSERT INTO entries (collection, id, seq, text, doc_id, filename, filetype,
                                         upload_time, start_offset, unit, vector)
                    VALUES (?, ?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM entries WHERE collection = ?),
                            ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(collection, id) DO UPDATE SET
                        text = excluded.text,
                        doc_id = excluded.doc_id,
                        filename = excluded.filename,
                        filetype = excluded.filetype,
                        upload_time = excluded.upload_time,
                        start_offset = excluded.start_offset,
                        unit = excluded.unit,
                        vector = excluded.vector
                    "#,
                )
                .bind(collection)
                .bind(&entry.id)
                .bind(collection)
                .bind(&entry.text)
                .bind(&m.doc_id)
                .bind(&m.filename)
                .bind(&m.filetype)
                .bind(&m.upload_time)
                .bind(m.start_offset as i64)
                .bind(m.unit as i64)
                .bind(vec_to_blob(&entry.vector))
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        })
    }

    fn similarity_search(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        self.run(async {
            self.require_collection(collection).await?;
            let rows = sqlx::query(
                r#"
                SELECT id, text, doc_id, filename, filetype, upload_time, start_offset, unit, vector
                FROM entries
                WHERE collection = ?
                ORDER BY seq
                "#,
            )
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

            let mut scored: Vec<RetrievedChunk> = rows
                .iter()
                .map(|row| {
                    let blob: Vec<u8> = row.get("vector");
                    RetrievedChunk {
                        score: cosine_similarity(vector, &blob_to_vec(&blob)),
                        chunk: Chunk {
                            id: row.get("id"),
                            text: row.get("text"),
                            metadata: row_metadata(row),
                        },
                    }
                })
                .collect();
            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            scored.truncate(k);
            Ok(scored)
        })
    }

    fn delete(&self, collection: &str, filter: &MetadataFilter) -> Result<usize> {
        if filter.values.is_empty() {
            return Ok(0);
        }
        self.run(async {
            self.require_collection(collection).await?;
            let placeholders = vec!["?"; filter.values.len()].join(", ");
            // Column names come from the closed MetadataField set.
            let sql = format!(
                "DELETE FROM entries WHERE collection = ? AND {} IN ({})",
                filter.field.name(),
                placeholders
            );
            let mut query = sqlx::query(&sql).bind(collection);
            for value in &filter.values {
                query = query.bind(value);
            }
            let result = query.execute(&self.pool).await?;
            Ok(result.rows_affected() as usize)
        })
    }

    fn refresh(&self, collection: &str) -> Result<()> {
        self.run(async {
            self.require_collection(collection).await?;
            sqlx::query("PRAGMA wal_checkpoint(PASSIVE)")
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn drop_collection(&self, collection: &str) -> Result<bool> {
        self.run(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM entries WHERE collection = ?")
                .bind(collection)
                .execute(&mut *tx)
                .await?;
            let removed = sqlx::query("DELETE FROM collections WHERE name = ?")
                .bind(collection)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            tx.commit().await?;
            Ok(removed > 0)
        })
    }

    fn count(&self, collection: &str) -> Result<usize> {
        self.run(async {
            self.require_collection(collection).await?;
            let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE collection = ?")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
            Ok(n as usize)
        })
    }

    fn list_metadata(&self, collection: &str) -> Result<Vec<ChunkMetadata>> {
        self.run(async {
            self.require_collection(collection).await?;
            let rows = sqlx::query(
                r#"
                SELECT doc_id, filename, filetype, upload_time, start_offset, unit
                FROM entries
                WHERE collection = ?
                ORDER BY seq
                "#,
            )
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.iter().map(row_metadata).collect())
        })
    }
}
