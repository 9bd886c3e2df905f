use crate::chunking::chunk_documents;
use crate::completion::{build_prompt, CompletionProvider};
use crate::documents::DocumentStore;
use crate::embeddings::EmbeddingProvider;
use crate::error::{ChatError, PipelineError, ProviderError};
use crate::extractor::TextExtractor;
use crate::models::{ChatOptions, ChatSession, Message, SubjectFilters, TextChunk};
use crate::ranking::{build_context, rank_top_k};
use crate::sessions::SessionStore;
use chrono::Duration;
use tracing::{debug, info};

/// Entry point for subject chats: opens sessions and answers questions
/// against the PDFs captured when the session started.
pub struct ChatOrchestrator<D, X, E, C, S>
where
    D: DocumentStore,
    X: TextExtractor,
    E: EmbeddingProvider,
    C: CompletionProvider,
    S: SessionStore,
{
    documents: D,
    extractor: X,
    embedder: E,
    completion: C,
    sessions: S,
    options: ChatOptions,
}

impl<D, X, E, C, S> ChatOrchestrator<D, X, E, C, S>
where
    D: DocumentStore,
    X: TextExtractor,
    E: EmbeddingProvider,
    C: CompletionProvider,
    S: SessionStore,
{
    pub fn new(documents: D, extractor: X, embedder: E, completion: C, sessions: S) -> Self {
        Self::with_options(
            documents,
            extractor,
            embedder,
            completion,
            sessions,
            ChatOptions::default(),
        )
    }

    pub fn with_options(
        documents: D,
        extractor: X,
        embedder: E,
        completion: C,
        sessions: S,
        options: ChatOptions,
    ) -> Self {
        Self {
            documents,
            extractor,
            embedder,
            completion,
            sessions,
            options,
        }
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    pub async fn start_chat(&self, filters: SubjectFilters) -> Result<String, ChatError> {
        let missing = filters.missing_fields();
        if !missing.is_empty() {
            return Err(ChatError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let found = self
            .documents
            .find(&filters)
            .await
            .map_err(PipelineError::DocumentStore)?;

        if found.is_empty() {
            return Err(ChatError::NotFound(format!(
                "no documents for {} / {} / {} / {}",
                filters.year, filters.semester, filters.subject, filters.unit
            )));
        }

        let references = found.into_iter().map(|doc| doc.reference).collect();
        let session = ChatSession::new(filters, references);
        let document_count = session.documents.len();
        let session_id = self.sessions.create(session).await?;

        info!(session_id = %session_id, documents = document_count, "chat session started");
        Ok(session_id)
    }

    pub async fn ask_question(&self, session_id: &str, question: &str) -> Result<String, ChatError> {
        if session_id.trim().is_empty() || question.trim().is_empty() {
            return Err(ChatError::Validation(
                "session id and question are required".to_string(),
            ));
        }

        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("session {session_id}")))?;

        let chunks = self.collect_chunks(&session).await?;
        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();

        let chunk_vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(PipelineError::Provider)?;
        if chunk_vectors.len() != chunks.len() {
            return Err(PipelineError::Provider(ProviderError::InvalidResponse {
                provider: "embeddings".to_string(),
                details: format!(
                    "expected {} embeddings, received {}",
                    chunks.len(),
                    chunk_vectors.len()
                ),
            })
            .into());
        }

        let question_vector = self
            .embedder
            .embed(question)
            .await
            .map_err(PipelineError::Provider)?;

        let selected = rank_top_k(&chunks, &chunk_vectors, &question_vector, self.options.top_k);
        debug!(
            session_id = %session_id,
            chunks = chunks.len(),
            selected = selected.len(),
            "ranked context chunks"
        );

        let context = build_context(&selected);
        let prompt = build_prompt(&self.options.system_prompt, &context, question);
        let answer = self
            .completion
            .complete(&prompt)
            .await
            .map_err(PipelineError::Provider)?;

        let version = self
            .sessions
            .append_messages(
                session_id,
                session.version,
                vec![Message::user(question), Message::assistant(answer.clone())],
            )
            .await?;

        info!(session_id = %session_id, version, "question answered");
        Ok(answer)
    }

    pub async fn get_history(&self, session_id: &str) -> Result<Vec<Message>, ChatError> {
        self.sessions
            .get(session_id)
            .await?
            .map(|session| session.messages)
            .ok_or_else(|| ChatError::NotFound(format!("session {session_id}")))
    }

    pub async fn purge_idle_sessions(&self, max_idle: Duration) -> Result<usize, ChatError> {
        let removed = self.sessions.purge_idle(max_idle).await?;
        info!(removed, "purged idle chat sessions");
        Ok(removed)
    }

    async fn collect_chunks(&self, session: &ChatSession) -> Result<Vec<TextChunk>, ChatError> {
        let mut extracted = Vec::with_capacity(session.documents.len());
        for reference in &session.documents {
            let document = self
                .documents
                .fetch(reference)
                .await
                .map_err(PipelineError::DocumentStore)?;
            let text = self.extractor.extract(&document).await?;
            extracted.push((document.reference, text));
        }

        Ok(chunk_documents(&extracted, self.options.chunking))
    }
}
