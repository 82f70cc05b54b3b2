//! Chunked embedding index for gofr-iq.
//!
//! Documents are split into overlapping, sentence-aware chunks and stored
//! with their embeddings and flattened metadata. [`VectorStore`] is the
//! capability seam: [`ChromaIndex`] talks to a ChromaDB server,
//! [`MemoryIndex`] backs embedded mode and tests. Embedding generation is
//! itself a seam ([`Embedder`]) so the OpenRouter model and the
//! deterministic test embedder are interchangeable.

pub mod chroma;
pub mod chunker;
pub mod memory;
pub mod vector_store;

pub use chroma::ChromaIndex;
pub use chunker::{Chunk, ChunkConfig};
pub use memory::MemoryIndex;
pub use vector_store::{
    cosine_similarity, DeterministicEmbedder, Embedder, SimilarityResult, VectorFilter,
    VectorStore,
};
