use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("pdf parse error: {0}")]
    Pdf(String),

    #[error("pdf had no readable page text: {0}")]
    EmptyDocument(String),

    #[error("multimodal OCR failed: {0}")]
    Ocr(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("invalid response from {provider}: {details}")]
    InvalidResponse { provider: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("session {session_id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        session_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("document {location} changed since the session started (expected {expected}, found {actual})")]
    DocumentChanged {
        location: String,
        expected: String,
        actual: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failure of an external collaborator while serving a chat operation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("document store failed: {0}")]
    DocumentStore(#[source] StoreError),

    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("model provider failed: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("session store failed: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for ChatError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(what) => ChatError::NotFound(what),
            conflict @ StoreError::Conflict { .. } => ChatError::Conflict(conflict.to_string()),
            other => ChatError::Store(other),
        }
    }
}

impl From<ExtractError> for ChatError {
    fn from(error: ExtractError) -> Self {
        ChatError::Pipeline(PipelineError::Extraction(error))
    }
}

impl From<ProviderError> for ChatError {
    fn from(error: ProviderError) -> Self {
        ChatError::Pipeline(PipelineError::Provider(error))
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
