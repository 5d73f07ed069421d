//! Document ingestion: loading, splitting and batched indexing

pub mod loader;
pub mod pipeline;
pub mod splitter;

pub use loader::{DocumentLoader, LoadedFile};
pub use pipeline::IngestionPipeline;
pub use splitter::{TextSpan, TextSplitter};
