//! SQLite-backed [`VectorCollection`] implementation.
//!
//! Collections live in one database file:
//!
//! | Table | Contents |
//! |-------|----------|
//! | `collections` | one row per collection: name, embedding dims, description |
//! | `entities` | one row per chunk: auto id, collection, source, page, chunk index, text, embedding BLOB |
//!
//! Embeddings are stored as little-endian `f32` BLOBs and searched by
//! brute-force cosine similarity. Inserts and per-source replacement run in a
//! single transaction. Every call is bounded by a timeout; timeouts and
//! connection failures surface as [`IndexError::StoreUnavailable`].

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use cardio_rag_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use cardio_rag_core::error::IndexError;
use cardio_rag_core::models::{EmbeddedChunk, ScoredChunk};
use cardio_rag_core::retrieve::rank;
use cardio_rag_core::store::{source_key, CollectionSchema, VectorCollection};

pub struct SqliteCollection {
    pool: SqlitePool,
    schema: CollectionSchema,
    timeout: Duration,
}

/// Map a sqlx error to the index taxonomy: connectivity problems and lock
/// contention are "unavailable", everything else is a store error.
fn store_error(op: &'static str) -> impl Fn(sqlx::Error) -> IndexError {
    move |e| {
        let unavailable = match &e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
            sqlx::Error::Database(db) => {
                let msg = db.message();
                msg.contains("locked") || msg.contains("busy")
            }
            _ => false,
        };
        if unavailable {
            IndexError::StoreUnavailable(format!("{op}: {e}"))
        } else {
            IndexError::Store(format!("{op}: {e}"))
        }
    }
}

impl SqliteCollection {
    /// Wrap a pool and create the backing tables if needed. The collection
    /// itself is only created by [`VectorCollection::ensure_collection`].
    pub async fn open(
        pool: SqlitePool,
        schema: CollectionSchema,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let store = Self {
            pool,
            schema,
            timeout,
        };
        store.bounded("migrate", store.migrate()).await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), IndexError> {
        let err = store_error("migrate");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dims INTEGER NOT NULL,
                description TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(&err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                source TEXT NOT NULL,
                page_num INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(&err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entities_collection_source ON entities(collection, source)",
        )
        .execute(&self.pool)
        .await
        .map_err(&err)?;

        Ok(())
    }

    async fn bounded<T>(
        &self,
        op: &str,
        fut: impl Future<Output = Result<T, IndexError>>,
    ) -> Result<T, IndexError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(IndexError::StoreUnavailable(format!(
                "{op} timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    /// Recorded dimensionality of this collection, or `None` if it does not
    /// exist.
    async fn stored_dims<'e, E>(&self, executor: E) -> Result<Option<usize>, IndexError>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query("SELECT dims FROM collections WHERE name = ?")
            .bind(&self.schema.name)
            .fetch_optional(executor)
            .await
            .map_err(store_error("describe collection"))?;
        match row {
            Some(row) => {
                let dims: i64 = row.try_get("dims").map_err(store_error("describe collection"))?;
                Ok(Some(dims as usize))
            }
            None => Ok(None),
        }
    }

    fn missing(&self) -> IndexError {
        IndexError::Store(format!("collection '{}' does not exist", self.schema.name))
    }

    async fn insert_rows(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize, IndexError> {
        let err = store_error("insert");
        for c in chunks {
            sqlx::query(
                r#"
                INSERT INTO entities (collection, source, page_num, chunk_index, text, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&self.schema.name)
            .bind(source_key(&c.chunk.source))
            .bind(i64::from(c.chunk.page_num))
            .bind(i64::from(c.chunk.chunk_index))
            .bind(&c.chunk.text)
            .bind(vec_to_blob(&c.embedding))
            .execute(&mut **tx)
            .await
            .map_err(&err)?;
        }
        Ok(chunks.len())
    }

    async fn replace_tx(
        &self,
        source: Option<&Path>,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize, IndexError> {
        let err = store_error("replace");
        let mut tx = self.pool.begin().await.map_err(&err)?;
        if self.stored_dims(&mut *tx).await?.is_none() {
            return Err(self.missing());
        }
        if let Some(source) = source {
            sqlx::query("DELETE FROM entities WHERE collection = ? AND source = ?")
                .bind(&self.schema.name)
                .bind(source_key(source))
                .execute(&mut *tx)
                .await
                .map_err(&err)?;
        }
        let inserted = self.insert_rows(&mut tx, chunks).await?;
        tx.commit().await.map_err(&err)?;
        Ok(inserted)
    }

    async fn search_rows(
        &self,
        query: &[f32],
        limit: usize,
        source: Option<&Path>,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let err = store_error("search");
        let rows: Vec<SqliteRow> = match source {
            Some(src) => sqlx::query(
                "SELECT id, source, page_num, chunk_index, text, embedding FROM entities WHERE collection = ? AND source = ?",
            )
            .bind(&self.schema.name)
            .bind(source_key(src))
            .fetch_all(&self.pool)
            .await
            .map_err(&err)?,
            None => sqlx::query(
                "SELECT id, source, page_num, chunk_index, text, embedding FROM entities WHERE collection = ?",
            )
            .bind(&self.schema.name)
            .fetch_all(&self.pool)
            .await
            .map_err(&err)?,
        };

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.try_get("embedding").map_err(&err)?;
            let id: i64 = row.try_get("id").map_err(&err)?;
            let page_num: i64 = row.try_get("page_num").map_err(&err)?;
            let chunk_index: i64 = row.try_get("chunk_index").map_err(&err)?;
            candidates.push(ScoredChunk {
                id: id as u64,
                text: row.try_get("text").map_err(&err)?,
                source: row.try_get("source").map_err(&err)?,
                page_num: page_num as u32,
                chunk_index: chunk_index as u32,
                score: cosine_similarity(query, &blob_to_vec(&blob)),
            });
        }
        Ok(rank(candidates, limit))
    }
}

#[async_trait]
impl VectorCollection for SqliteCollection {
    fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    async fn ensure_collection(&self) -> Result<bool, IndexError> {
        self.bounded("ensure collection", async {
            match self.stored_dims(&self.pool).await? {
                Some(dims) if dims != self.schema.dims => Err(IndexError::DimensionMismatch {
                    expected: dims,
                    actual: self.schema.dims,
                }),
                Some(_) => Ok(false),
                None => {
                    sqlx::query(
                        "INSERT OR IGNORE INTO collections (name, dims, description, created_at) VALUES (?, ?, ?, ?)",
                    )
                    .bind(&self.schema.name)
                    .bind(self.schema.dims as i64)
                    .bind(&self.schema.description)
                    .bind(chrono::Utc::now().timestamp())
                    .execute(&self.pool)
                    .await
                    .map_err(store_error("create collection"))?;
                    Ok(true)
                }
            }
        })
        .await
    }

    async fn insert(&self, chunks: &[EmbeddedChunk]) -> Result<usize, IndexError> {
        self.schema.check_batch(chunks)?;
        self.bounded("insert", self.replace_tx(None, chunks)).await
    }

    async fn delete_by_source(&self, source: &Path) -> Result<usize, IndexError> {
        self.bounded("delete", async {
            let result = sqlx::query("DELETE FROM entities WHERE collection = ? AND source = ?")
                .bind(&self.schema.name)
                .bind(source_key(source))
                .execute(&self.pool)
                .await
                .map_err(store_error("delete"))?;
            Ok(result.rows_affected() as usize)
        })
        .await
    }

    async fn replace_source(
        &self,
        source: &Path,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize, IndexError> {
        self.schema.check_batch(chunks)?;
        self.bounded("replace", self.replace_tx(Some(source), chunks))
            .await
    }

    async fn load(&self) -> Result<(), IndexError> {
        // Rows are searchable as soon as they are committed; loading only
        // checks that the collection exists.
        let dims = self.bounded("load", self.stored_dims(&self.pool)).await?;
        dims.map(|_| ()).ok_or_else(|| self.missing())
    }

    async fn count(&self) -> Result<u64, IndexError> {
        self.bounded("count", async {
            let row = sqlx::query("SELECT COUNT(*) AS n FROM entities WHERE collection = ?")
                .bind(&self.schema.name)
                .fetch_one(&self.pool)
                .await
                .map_err(store_error("count"))?;
            let n: i64 = row.try_get("n").map_err(store_error("count"))?;
            Ok(n as u64)
        })
        .await
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        source: Option<&Path>,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        self.schema.check_dims(query)?;
        self.bounded("search", self.search_rows(query, limit, source))
            .await
    }

    async fn drop_collection(&self) -> Result<(), IndexError> {
        self.bounded("drop collection", async {
            let err = store_error("drop collection");
            let mut tx = self.pool.begin().await.map_err(&err)?;
            sqlx::query("DELETE FROM entities WHERE collection = ?")
                .bind(&self.schema.name)
                .execute(&mut *tx)
                .await
                .map_err(&err)?;
            sqlx::query("DELETE FROM collections WHERE name = ?")
                .bind(&self.schema.name)
                .execute(&mut *tx)
                .await
                .map_err(&err)?;
            tx.commit().await.map_err(&err)?;
            Ok(())
        })
        .await
    }
}
