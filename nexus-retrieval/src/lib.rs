//! Retrieval provider router: corpus config drives adapter dispatch across
//! the local pgvector store and cloud knowledge-base adapters.

pub mod aws_bedrock;
pub mod embed;
pub mod gcp_vertex;
pub mod local;
pub mod provider;
pub mod router;

pub use aws_bedrock::AwsBedrockKbProvider;
pub use embed::{DeterministicEmbedder, Embedder};
pub use gcp_vertex::GcpVertexProvider;
pub use local::LocalPgvectorProvider;
pub use provider::{RetrievalProvider, RetrievedChunk};
pub use router::RetrievalRouter;
