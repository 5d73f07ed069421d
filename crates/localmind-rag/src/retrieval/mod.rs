//! Retrieval: top-k passages joined into a context block

mod context;

pub use context::{ContextAssembler, RetrievedContext};
