pub mod splitter;

// Re-export the main chunking types for external use
pub use splitter::{Chunk, TextSplitter, DEFAULT_CHUNK_OVERLAP, DEFAULT_MAX_CHUNK_SIZE};
