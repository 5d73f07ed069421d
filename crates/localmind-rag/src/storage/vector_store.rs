//! Persistent vector index backed by SQLite with an in-memory read mirror
//!
//! Everything lives in `index.sqlite3` under the persist directory: an
//! `index_meta` table (dimensions, distance metric) and a `chunks` table
//! holding text, JSON metadata and little-endian `f32` embedding blobs.
//!
//! Writers are serialized on the connection lock. Searches only read the
//! mirror, which changes after a commit, so a reader never observes part of
//! a batch or a half-cleared index.

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::DistanceMetric;
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::types::Chunk;

/// Index file name inside the persist directory
pub const INDEX_FILE: &str = "index.sqlite3";

/// A search hit
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Higher is more similar
    pub score: f32,
}

/// Persistent, embedding-aware chunk index
pub struct VectorStore {
    persist_dir: PathBuf,
    dimensions: usize,
    metric: DistanceMetric,
    embedder: Arc<dyn EmbeddingProvider>,
    /// `None` only while `clear` swaps directories
    conn: Mutex<Option<Connection>>,
    /// Committed chunks in insertion order
    records: RwLock<Vec<Chunk>>,
}

impl VectorStore {
    /// Open or create the index at `persist_dir`
    ///
    /// Fails with `EmbeddingProviderUnavailable` when the embedding model is
    /// missing and with `DimensionMismatch` when an existing index was built
    /// with a different dimensionality.
    pub async fn initialize(
        persist_dir: impl Into<PathBuf>,
        expected_dimensions: usize,
        metric: DistanceMetric,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let persist_dir = persist_dir.into();

        match embedder.health_check().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(Error::EmbeddingProviderUnavailable(format!(
                    "embedding model '{}' is not installed (try `ollama pull {}`)",
                    embedder.model(),
                    embedder.model()
                )))
            }
            Err(Error::EmbeddingProviderUnavailable(message)) => {
                return Err(Error::EmbeddingProviderUnavailable(message))
            }
            Err(e) => return Err(Error::EmbeddingProviderUnavailable(e.to_string())),
        }

        if embedder.dimensions() != expected_dimensions {
            return Err(Error::DimensionMismatch {
                expected: expected_dimensions,
                actual: embedder.dimensions(),
            });
        }

        let (conn, metric, records) = open_index(&persist_dir, expected_dimensions, metric)?;

        tracing::info!(
            "Opened vector index at {} ({} chunks, {} dims, {})",
            persist_dir.display(),
            records.len(),
            expected_dimensions,
            metric.as_str()
        );

        Ok(Self {
            persist_dir,
            dimensions: expected_dimensions,
            metric,
            embedder,
            conn: Mutex::new(Some(conn)),
            records: RwLock::new(records),
        })
    }

    pub fn persist_dir(&self) -> &Path {
        &self.persist_dir
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn distance_metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Number of committed chunks
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Embed and persist a batch as one unit
    ///
    /// Returns the number of chunks newly stored; chunks whose id is already
    /// indexed are skipped. On any error nothing from the batch is kept.
    pub async fn insert_batch(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| match e {
                Error::DimensionMismatch { .. } => e,
                other => Error::BatchInsertFailed(other.to_string()),
            })?;

        if embeddings.len() != chunks.len() {
            return Err(Error::BatchInsertFailed(format!(
                "provider returned {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.len(),
            });
        }

        let records: Vec<Chunk> = chunks
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(chunk, embedding)| chunk.with_embedding(embedding))
            .collect();

        self.commit(records).map_err(|e| match e {
            Error::BatchInsertFailed(_) => e,
            other => Error::BatchInsertFailed(other.to_string()),
        })
    }

    fn commit(&self, records: Vec<Chunk>) -> Result<usize> {
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::vector_db("index is closed"))?;

        let tx = conn.transaction()?;
        let mut fresh = Vec::with_capacity(records.len());
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO chunks (id, text, metadata, embedding) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in records {
                let metadata = serde_json::to_string(&record.metadata)?;
                let changed = stmt.execute(params![
                    record.id,
                    record.text,
                    metadata,
                    encode_embedding(&record.embedding),
                ])?;
                if changed > 0 {
                    fresh.push(record);
                }
            }
        }
        tx.commit()?;

        let inserted = fresh.len();
        self.records.write().extend(fresh);
        tracing::debug!("Committed {} chunk(s)", inserted);
        Ok(inserted)
    }

    /// The `k` chunks most similar to `query`, best first
    ///
    /// Equal scores keep insertion order. An empty index returns no hits
    /// without calling the embedder.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let empty = self.is_empty();
        if k == 0 || empty {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| Error::SimilaritySearchFailed(e.to_string()))?;
        if query_vec.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vec.len(),
            });
        }

        let records = self.records.read();
        let mut scored: Vec<(usize, f32)> = records
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i, similarity(self.metric, &query_vec, &chunk.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredChunk {
                chunk: records[i].clone(),
                score,
            })
            .collect())
    }

    /// Remove every chunk, keeping dimensionality and metric
    ///
    /// An empty index is built next to the live one and swapped in by
    /// renaming. If any step fails the prior index stays in place.
    pub fn clear(&self) -> Result<()> {
        let mut guard = self.conn.lock();
        let staging = sibling(&self.persist_dir, "staging")?;
        let trash = sibling(&self.persist_dir, "trash")?;

        if let Err(e) = build_empty_index(&staging, self.dimensions, self.metric) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(Error::ClearFailed(e.to_string()));
        }

        if let Some(conn) = guard.take() {
            if let Err((conn, e)) = conn.close() {
                *guard = Some(conn);
                let _ = std::fs::remove_dir_all(&staging);
                return Err(Error::ClearFailed(format!("cannot close index: {}", e)));
            }
        }

        if let Err(e) = swap_dirs(&self.persist_dir, &staging, &trash) {
            let _ = std::fs::remove_dir_all(&staging);
            *guard = reopen(&self.persist_dir);
            return Err(Error::ClearFailed(e.to_string()));
        }

        match open_connection(&self.persist_dir) {
            Ok(conn) => {
                *guard = Some(conn);
                self.records.write().clear();
            }
            Err(e) => {
                // Put the prior index back
                if std::fs::rename(&self.persist_dir, &staging).is_ok() {
                    let _ = std::fs::rename(&trash, &self.persist_dir);
                }
                let _ = std::fs::remove_dir_all(&staging);
                *guard = reopen(&self.persist_dir);
                return Err(Error::ClearFailed(e.to_string()));
            }
        }

        if let Err(e) = std::fs::remove_dir_all(&trash) {
            tracing::warn!("Failed to remove old index at {}: {}", trash.display(), e);
        }

        tracing::info!("Cleared vector index at {}", self.persist_dir.display());
        Ok(())
    }
}

/// Open (creating if needed) and validate an index directory
fn open_index(
    dir: &Path,
    dimensions: usize,
    metric: DistanceMetric,
) -> Result<(Connection, DistanceMetric, Vec<Chunk>)> {
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::vector_db(format!("cannot create {}: {}", dir.display(), e)))?;
    let conn = open_connection(dir)?;

    let metric = match read_meta(&conn, "dimensions")? {
        Some(stored) => {
            let stored: usize = stored
                .parse()
                .map_err(|_| Error::vector_db(format!("corrupt dimensions entry '{}'", stored)))?;
            if stored != dimensions {
                return Err(Error::DimensionMismatch {
                    expected: stored,
                    actual: dimensions,
                });
            }

            let stored_metric = read_meta(&conn, "distance_metric")?
                .as_deref()
                .and_then(DistanceMetric::parse)
                .unwrap_or(metric);
            if stored_metric != metric {
                tracing::warn!(
                    "Index was built with {} distance, ignoring configured {}",
                    stored_metric.as_str(),
                    metric.as_str()
                );
            }
            stored_metric
        }
        None => {
            write_meta(&conn, dimensions, metric)?;
            metric
        }
    };

    let records = load_records(&conn, dimensions)?;
    Ok((conn, metric, records))
}

fn open_connection(dir: &Path) -> Result<Connection> {
    let conn = Connection::open(dir.join(INDEX_FILE))?;
    migrate(&conn)?;
    Ok(conn)
}

fn reopen(dir: &Path) -> Option<Connection> {
    match open_connection(dir) {
        Ok(conn) => Some(conn),
        Err(e) => {
            tracing::error!("Failed to reopen index at {}: {}", dir.display(), e);
            None
        }
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=FULL;

        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            text TEXT NOT NULL,
            metadata TEXT NOT NULL,
            embedding BLOB NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

fn write_meta(conn: &Connection, dimensions: usize, metric: DistanceMetric) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('dimensions', ?1), ('distance_metric', ?2)",
        params![dimensions.to_string(), metric.as_str()],
    )?;
    Ok(())
}

fn load_records(conn: &Connection, dimensions: usize) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare("SELECT id, text, metadata, embedding FROM chunks ORDER BY seq")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Vec<u8>>(3)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, text, metadata, blob) = row?;
        let embedding = decode_embedding(&blob)
            .filter(|v| v.len() == dimensions)
            .ok_or_else(|| Error::vector_db(format!("chunk {} has a corrupt embedding", id)))?;
        records.push(Chunk {
            id,
            text,
            metadata: serde_json::from_str(&metadata)?,
            embedding,
        });
    }
    Ok(records)
}

fn build_empty_index(dir: &Path, dimensions: usize, metric: DistanceMetric) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let conn = open_connection(dir)?;
    write_meta(&conn, dimensions, metric)?;
    conn.close().map_err(|(_, e)| Error::from(e))
}

/// Move `live` aside to `trash` and `staging` into its place
fn swap_dirs(live: &Path, staging: &Path, trash: &Path) -> std::io::Result<()> {
    std::fs::rename(live, trash)?;
    if let Err(e) = std::fs::rename(staging, live) {
        if let Err(restore) = std::fs::rename(trash, live) {
            tracing::error!(
                "Failed to restore index from {}: {}",
                trash.display(),
                restore
            );
        }
        return Err(e);
    }
    Ok(())
}

fn sibling(dir: &Path, tag: &str) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .ok_or_else(|| Error::ClearFailed(format!("invalid index directory {}", dir.display())))?;
    let mut sibling_name = name.to_os_string();
    sibling_name.push(format!(".{}-{}", tag, Uuid::new_v4().simple()));
    Ok(dir.with_file_name(sibling_name))
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

fn similarity(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => cosine_similarity(a, b),
        DistanceMetric::Euclidean => {
            let distance: f32 = a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt();
            1.0 / (1.0 + distance)
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
