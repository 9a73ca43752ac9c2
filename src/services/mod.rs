pub mod embedding;
pub mod rag;
pub mod splitter;
pub mod vector_store;

pub use embedding::{EmbeddingProvider, create_provider};
pub use rag::{CancellationFlag, RagDriver, RagStatus};
pub use splitter::{ChunkSplitter, SplitterConfig, SplitterFactory};
pub use vector_store::{IndexInfo, VectorStore, create_store};
