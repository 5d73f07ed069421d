//! Ingestion pipeline: load, split, then embed and store in batches

use chrono::Utc;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::knowledge::KnowledgeBase;
use crate::types::{
    meta, Chunk, FailedBatch, IngestProgress, IngestionSummary, SkipReason, SkippedFile, Upload,
};

use super::loader::DocumentLoader;
use super::splitter::TextSplitter;

/// Turns uploads into indexed chunks
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    loader: DocumentLoader,
    splitter: TextSplitter,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(loader: DocumentLoader, splitter: TextSplitter, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than 0".into()));
        }
        Ok(Self {
            loader,
            splitter,
            batch_size,
        })
    }

    /// Create from config
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(
            DocumentLoader::new(config.ingestion.temp_dir.clone()),
            TextSplitter::from_config(&config.chunking)?,
            config.ingestion.batch_size,
        )
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Ingest uploads into the knowledge base
    ///
    /// Per-file and per-batch failures are collected in the summary and do
    /// not stop the run. A dimensionality mismatch stops the remaining
    /// batches and is reported through `IngestionSummary::aborted`.
    pub async fn ingest<F>(
        &self,
        kb: &KnowledgeBase,
        uploads: &[Upload],
        mut progress: F,
    ) -> IngestionSummary
    where
        F: FnMut(IngestProgress) + Send,
    {
        let (chunks, mut summary) = self.prepare(uploads, &mut progress).await;

        if chunks.is_empty() {
            tracing::info!("No chunks to index");
            return summary;
        }

        let total = chunks.len();
        let total_batches = total.div_ceil(self.batch_size);
        summary.batches_total = total_batches;
        tracing::info!(
            "Indexing {} chunks in {} batch(es) of up to {}",
            total,
            total_batches,
            self.batch_size
        );

        let mut processed = 0usize;
        for (index, batch) in chunks.chunks(self.batch_size).enumerate() {
            match kb.store().insert_batch(batch).await {
                Ok(inserted) => summary.chunks_inserted += inserted,
                Err(e) if e.is_fatal_config() => {
                    tracing::error!("Aborting ingestion at batch {}: {}", index + 1, e);
                    summary.aborted = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        "Batch {}/{} failed ({} chunks): {}",
                        index + 1,
                        total_batches,
                        batch.len(),
                        e
                    );
                    summary.failed_batches.push(FailedBatch {
                        index,
                        chunk_count: batch.len(),
                        message: e.to_string(),
                    });
                }
            }

            processed += batch.len();
            progress(IngestProgress::Embedding {
                batch: index + 1,
                total_batches,
                fraction: processed as f32 / total as f32,
            });
        }

        tracing::info!(
            "Ingestion finished: {} of {} chunks stored, {} failed batch(es), {} skipped file(s)",
            summary.chunks_inserted,
            total,
            summary.failed_batches.len(),
            summary.skipped.len()
        );
        summary
    }

    /// Load and split every upload, in input order
    pub async fn prepare<F>(&self, uploads: &[Upload], progress: &mut F) -> (Vec<Chunk>, IngestionSummary)
    where
        F: FnMut(IngestProgress) + Send,
    {
        let mut summary = IngestionSummary::default();
        let mut chunks = Vec::new();
        let ingested_at = Utc::now().to_rfc3339();

        for (i, upload) in uploads.iter().enumerate() {
            let loader = self.loader.clone();
            let staged = upload.clone();
            let loaded = tokio::task::spawn_blocking(move || loader.load(&staged))
                .await
                .map_err(|e| Error::internal(format!("loader task failed: {}", e)))
                .and_then(|result| result);

            match loaded {
                Ok(file) => {
                    let mut file_chunks = self.splitter.split_documents(&file.documents);
                    for chunk in &mut file_chunks {
                        chunk
                            .metadata
                            .insert(meta::INGESTED_AT.to_string(), ingested_at.clone());
                    }
                    tracing::info!("Loaded {}: {} chunk(s)", file.filename, file_chunks.len());

                    summary.files_loaded.push(file.filename);
                    summary.warnings.extend(file.warnings);
                    chunks.extend(file_chunks);
                }
                Err(e) => {
                    let reason = match e {
                        Error::UnsupportedFileType(tag) => SkipReason::UnsupportedFileType(tag),
                        other => SkipReason::FileLoadFailed(other.to_string()),
                    };
                    tracing::warn!("Skipping {}: {}", upload.filename, reason);
                    summary.skipped.push(SkippedFile {
                        filename: upload.filename.clone(),
                        reason,
                    });
                }
            }

            progress(IngestProgress::Loading {
                done: i + 1,
                total: uploads.len(),
            });
        }

        summary.chunks_total = chunks.len();
        (chunks, summary)
    }
}
