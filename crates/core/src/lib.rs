pub mod chunking;
pub mod completion;
pub mod documents;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod ranking;
pub mod sessions;

#[cfg(test)]
mod test_support;

pub use chunking::{
    chunk_documents, chunk_text, normalize_whitespace, split_paragraphs, ChunkingConfig,
};
pub use completion::{
    build_prompt, ChatTurn, CompletionProvider, ContextEchoCompletion, HttpCompletionClient,
    DEFAULT_CHAT_MODEL,
};
pub use documents::{discover_pdf_files, DirectoryDocumentStore, DocumentStore};
pub use embeddings::{
    CharacterNgramEmbedder, EmbeddingProvider, HttpEmbeddingClient, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBED_CONCURRENCY,
};
pub use error::{ChatError, ExtractError, PipelineError, ProviderError, StoreError};
pub use extractor::{LopdfExtractor, OcrEndpointConfig, OcrFallbackExtractor, TextExtractor};
pub use models::{
    ChatOptions, ChatSession, DocumentRef, Message, Role, StoredDocument, SubjectFilters,
    TextChunk, DEFAULT_SYSTEM_PROMPT,
};
pub use orchestrator::ChatOrchestrator;
pub use provider::ProviderEndpoint;
pub use ranking::{build_context, cosine_similarity, rank_top_k, DEFAULT_TOP_K};
pub use sessions::{FileSessionStore, InMemorySessionStore, SessionStore};
