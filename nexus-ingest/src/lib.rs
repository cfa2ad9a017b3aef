//! Asynchronous document ingestion: enqueue, deterministic chunking +
//! embedding, and the worker loop that drives documents to a terminal status.

pub mod chunker;
pub mod pipeline;
pub mod worker;

pub use chunker::{chunk_text, normalize_to_text, CHUNK_OVERLAP_CHARS, CHUNK_SIZE_CHARS};
pub use pipeline::{IngestPipeline, JOB_TYPE};
pub use worker::Worker;
