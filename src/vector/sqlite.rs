//! SQLite-backed vector store.
//!
//! Rows hold the chunk scalar fields plus the embedding as a little-endian
//! `f32` BLOB. Equality filters run in SQL; similarity ranking is a
//! brute-force cosine pass over the filtered candidates, which is ample for
//! corpus-sized collections.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{Connection, params};
use tracing::debug;

use crate::core::text::truncate_chars;
use crate::core::{ChunkMetadata, DocChunk};
use crate::embedding::cosine_similarity;
use crate::error::{Error, Result, StoreError};
use crate::vector::{
    ChunkFilter, MAX_CONTENT_CHARS, SearchParams, StoreStats, VectorHit, VectorStore,
};

/// SQLite-backed chunk collection.
pub struct SqliteVectorStore {
    path: PathBuf,
    conn: tokio::sync::Mutex<Option<Connection>>,
}

impl SqliteVectorStore {
    /// Creates a store over a database file. The connection opens lazily at
    /// first use.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            conn: tokio::sync::Mutex::new(None),
        }
    }

    /// Opens the connection and creates the schema when absent.
    fn open(path: &Path) -> Result<Connection> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Store(StoreError::Database(format!(
                    "cannot create {}: {e}",
                    parent.display()
                )))
            })?;
        }
        let conn = Connection::open(path).map_err(StoreError::from)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id          TEXT PRIMARY KEY,
                content     TEXT NOT NULL,
                embedding   BLOB NOT NULL,
                file        TEXT NOT NULL,
                "release"   TEXT NOT NULL,
                doc_type    TEXT NOT NULL,
                service     TEXT NOT NULL DEFAULT '',
                heading     TEXT NOT NULL,
                line_start  INTEGER NOT NULL,
                line_end    INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                tokens      INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_release ON chunks("release");
            CREATE INDEX IF NOT EXISTS idx_chunks_doc_type ON chunks(doc_type);
            CREATE INDEX IF NOT EXISTS idx_chunks_service ON chunks(service);
            CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file);
            "#,
        )
        .map_err(StoreError::from)?;
        Ok(conn)
    }

    async fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(Self::open(&self.path)?);
            debug!(path = %self.path.display(), "opened vector store");
        }
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(Error::Store(StoreError::NotConnected)),
        }
    }
}

/// Encodes an embedding as a little-endian `f32` BLOB.
fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decodes a little-endian `f32` BLOB.
fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

/// Builds the conjunctive `WHERE` clause for a filter.
fn filter_clause(filter: &ChunkFilter) -> (String, Vec<String>) {
    let mut predicates = Vec::new();
    let mut values = Vec::new();
    if let Some(release) = &filter.release {
        predicates.push(r#""release" = ?"#);
        values.push(release.clone());
    }
    if let Some(doc_type) = &filter.doc_type {
        predicates.push("doc_type = ?");
        values.push(doc_type.clone());
    }
    if let Some(service) = &filter.service {
        predicates.push("service = ?");
        values.push(service.clone());
    }
    if let Some(file) = &filter.file {
        predicates.push("file = ?");
        values.push(file.clone());
    }
    if predicates.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", predicates.join(" AND ")), values)
    }
}

#[allow(clippy::cast_sign_loss)]
fn row_to_hit(row: &rusqlite::Row<'_>, query: &[f32]) -> rusqlite::Result<VectorHit> {
    let id: String = row.get(0)?;
    let content: String = row.get(1)?;
    let blob: Vec<u8> = row.get(2)?;
    let metadata = ChunkMetadata {
        file: row.get(3)?,
        release: row.get(4)?,
        doc_type: row.get(5)?,
        service: row.get(6)?,
        heading: row.get(7)?,
        line_start: row.get::<_, i64>(8)? as usize,
        line_end: row.get::<_, i64>(9)? as usize,
        chunk_index: row.get::<_, i64>(10)? as usize,
        // Not persisted by the row schema.
        total_chunks: 0,
    };
    let tokens = row.get::<_, i64>(11)? as usize;
    let embedding = decode_embedding(&blob);
    Ok(VectorHit {
        chunk: DocChunk {
            id,
            content,
            metadata,
            tokens,
        },
        score: cosine_similarity(query, &embedding),
    })
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn connect(&self) -> Result<()> {
        self.with_conn(|_| Ok(())).await
    }

    async fn upsert(&self, chunks: &[DocChunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(Error::Store(StoreError::UpsertMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            }));
        }
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(StoreError::from)?;
            {
                let mut statement = tx
                    .prepare_cached(
                        r#"
                        INSERT OR REPLACE INTO chunks
                            (id, content, embedding, file, "release", doc_type,
                             service, heading, line_start, line_end, chunk_index, tokens)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                        "#,
                    )
                    .map_err(StoreError::from)?;
                for (chunk, embedding) in chunks.iter().zip(embeddings) {
                    let content = truncate_chars(&chunk.content, MAX_CONTENT_CHARS);
                    statement
                        .execute(params![
                            chunk.id,
                            content,
                            encode_embedding(embedding),
                            chunk.metadata.file,
                            chunk.metadata.release,
                            chunk.metadata.doc_type,
                            chunk.metadata.service,
                            chunk.metadata.heading,
                            i64::try_from(chunk.metadata.line_start).unwrap_or(0),
                            i64::try_from(chunk.metadata.line_end).unwrap_or(0),
                            i64::try_from(chunk.metadata.chunk_index).unwrap_or(0),
                            i64::try_from(chunk.tokens).unwrap_or(0),
                        ])
                        .map_err(StoreError::from)?;
                }
            }
            tx.commit().map_err(StoreError::from)?;
            Ok(())
        })
        .await
    }

    async fn search(
        &self,
        vector: &[f32],
        params: SearchParams,
        filter: &ChunkFilter,
    ) -> Result<Vec<VectorHit>> {
        let (clause, values) = filter_clause(filter);
        let query: Vec<f32> = vector.to_vec();
        self.with_conn(move |conn| {
            let sql = format!(
                r#"
                SELECT id, content, embedding, file, "release", doc_type,
                       service, heading, line_start, line_end, chunk_index, tokens
                FROM chunks{clause}
                "#
            );
            let mut statement = conn.prepare_cached(&sql).map_err(StoreError::from)?;
            let refs: Vec<&dyn rusqlite::ToSql> =
                values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
            let mut hits: Vec<VectorHit> = statement
                .query_map(refs.as_slice(), |row| row_to_hit(row, &query))
                .map_err(StoreError::from)?
                .collect::<rusqlite::Result<_>>()
                .map_err(StoreError::from)?;
            hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            hits.truncate(params.top_k);
            Ok(hits)
        })
        .await
    }

    async fn delete(&self, filter: &ChunkFilter) -> Result<usize> {
        if filter.is_empty() {
            return Err(Error::Store(StoreError::DeleteWithoutFilter));
        }
        let (clause, values) = filter_clause(filter);
        self.with_conn(move |conn| {
            let sql = format!("DELETE FROM chunks{clause}");
            let refs: Vec<&dyn rusqlite::ToSql> =
                values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
            let removed = conn
                .execute(&sql, refs.as_slice())
                .map_err(StoreError::from)?;
            Ok(removed)
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                .map_err(StoreError::from)?;
            Ok(StoreStats {
                count: usize::try_from(count).unwrap_or(0),
            })
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        guard.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id_file: &str, release: &str, index: usize, content: &str) -> DocChunk {
        DocChunk::new(
            content.to_string(),
            ChunkMetadata {
                file: id_file.to_string(),
                release: release.to_string(),
                doc_type: "NOTES".to_string(),
                service: String::new(),
                heading: "H".to_string(),
                line_start: 1,
                line_end: 3,
                chunk_index: index,
                total_chunks: 2,
            },
        )
    }

    fn service_chunk(id_file: &str, service: &str, content: &str) -> DocChunk {
        let mut chunk = chunk(id_file, "R1", 0, content);
        chunk.metadata.service = service.to_string();
        chunk
    }

    fn store() -> (SqliteVectorStore, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let store = SqliteVectorStore::new(dir.path().join("vectors.db"));
        (store, dir)
    }

    #[tokio::test]
    async fn test_upsert_search_roundtrip() {
        let (store, _dir) = store();
        let chunks = vec![
            chunk("R1-A.md", "R1", 0, "alpha"),
            chunk("R1-B.md", "R1", 0, "beta"),
        ];
        let embeddings = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]];
        store.upsert(&chunks, &embeddings).await.expect("upsert");

        let hits = store
            .search(&[1.0, 0.0, 0.0], SearchParams::for_top_k(2), &ChunkFilter::default())
            .await
            .expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, chunks[0].id);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].chunk.metadata.total_chunks, 0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let (store, _dir) = store();
        let first = vec![chunk("R1-A.md", "R1", 0, "old")];
        store
            .upsert(&first, &[vec![1.0, 0.0]])
            .await
            .expect("upsert");
        let second = vec![chunk("R1-A.md", "R1", 0, "new")];
        store
            .upsert(&second, &[vec![0.0, 1.0]])
            .await
            .expect("upsert");
        assert_eq!(store.stats().await.expect("stats").count, 1);
        let hits = store
            .search(&[0.0, 1.0], SearchParams::for_top_k(1), &ChunkFilter::default())
            .await
            .expect("search");
        assert_eq!(hits[0].chunk.content, "new");
    }

    #[tokio::test]
    async fn test_filtered_search() {
        let (store, _dir) = store();
        let chunks = vec![
            chunk("R1-A.md", "R1", 0, "alpha"),
            chunk("R2-B.md", "R2", 0, "beta"),
        ];
        store
            .upsert(&chunks, &[vec![1.0, 0.0], vec![1.0, 0.0]])
            .await
            .expect("upsert");
        let filter = ChunkFilter::default().with_release("R2");
        let hits = store
            .search(&[1.0, 0.0], SearchParams::for_top_k(5), &filter)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.metadata.release, "R2");
    }

    #[tokio::test]
    async fn test_service_filter_roundtrips() {
        let (store, _dir) = store();
        let chunks = vec![
            service_chunk("R1-A.md", "gateway", "routing rules"),
            service_chunk("R1-B.md", "billing", "invoice flow"),
        ];
        store
            .upsert(&chunks, &[vec![1.0, 0.0], vec![1.0, 0.0]])
            .await
            .expect("upsert");
        let hits = store
            .search(
                &[1.0, 0.0],
                SearchParams::for_top_k(5),
                &ChunkFilter::default().with_service("gateway"),
            )
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.metadata.service, "gateway");
        assert_eq!(hits[0].chunk.metadata.file, "R1-A.md");
    }

    #[tokio::test]
    async fn test_delete_requires_filter() {
        let (store, _dir) = store();
        let err = store
            .delete(&ChunkFilter::default())
            .await
            .expect_err("should fail");
        assert!(matches!(
            err,
            Error::Store(StoreError::DeleteWithoutFilter)
        ));
    }

    #[tokio::test]
    async fn test_delete_by_file() {
        let (store, _dir) = store();
        let chunks = vec![
            chunk("R1-A.md", "R1", 0, "alpha"),
            chunk("R1-A.md", "R1", 1, "beta"),
            chunk("R1-B.md", "R1", 0, "gamma"),
        ];
        store
            .upsert(&chunks, &[vec![1.0], vec![1.0], vec![1.0]])
            .await
            .expect("upsert");
        let removed = store
            .delete(&ChunkFilter::default().with_file("R1-A.md"))
            .await
            .expect("delete");
        assert_eq!(removed, 2);
        assert_eq!(store.stats().await.expect("stats").count, 1);
    }

    #[tokio::test]
    async fn test_upsert_mismatch_rejected() {
        let (store, _dir) = store();
        let err = store
            .upsert(&[chunk("R1-A.md", "R1", 0, "x")], &[])
            .await
            .expect_err("should fail");
        assert!(matches!(
            err,
            Error::Store(StoreError::UpsertMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_content_truncated_on_upsert() {
        let (store, _dir) = store();
        let long = "y".repeat(MAX_CONTENT_CHARS + 100);
        let chunks = vec![chunk("R1-A.md", "R1", 0, &long)];
        store
            .upsert(&chunks, &[vec![1.0]])
            .await
            .expect("upsert");
        let hits = store
            .search(&[1.0], SearchParams::for_top_k(1), &ChunkFilter::default())
            .await
            .expect("search");
        assert_eq!(hits[0].chunk.content.len(), MAX_CONTENT_CHARS);
    }

    #[tokio::test]
    async fn test_embedding_blob_roundtrip() {
        let original = vec![0.25f32, -1.5, 3.75];
        assert_eq!(decode_embedding(&encode_embedding(&original)), original);
    }

    #[tokio::test]
    async fn test_close_then_reuse_reopens() {
        let (store, _dir) = store();
        store.connect().await.expect("connect");
        store.close().await.expect("close");
        assert_eq!(store.stats().await.expect("stats").count, 0);
    }
}
