//! Chat session persistence.
//!
//! Appends use optimistic concurrency: the caller passes the version it
//! loaded and the store refuses the write with [`StoreError::Conflict`] when
//! another append landed in between.

use crate::error::StoreError;
use crate::models::{ChatSession, Message};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: ChatSession) -> Result<String, StoreError>;

    async fn get(&self, session_id: &str) -> Result<Option<ChatSession>, StoreError>;

    /// Appends `messages` in order and returns the new version.
    async fn append_messages(
        &self,
        session_id: &str,
        expected_version: u64,
        messages: Vec<Message>,
    ) -> Result<u64, StoreError>;

    /// Deletes sessions not updated within `max_idle`; returns how many.
    async fn purge_idle(&self, max_idle: Duration) -> Result<usize, StoreError>;
}

#[async_trait]
impl<T> SessionStore for Arc<T>
where
    T: SessionStore + ?Sized,
{
    async fn create(&self, session: ChatSession) -> Result<String, StoreError> {
        (**self).create(session).await
    }

    async fn get(&self, session_id: &str) -> Result<Option<ChatSession>, StoreError> {
        (**self).get(session_id).await
    }

    async fn append_messages(
        &self,
        session_id: &str,
        expected_version: u64,
        messages: Vec<Message>,
    ) -> Result<u64, StoreError> {
        (**self)
            .append_messages(session_id, expected_version, messages)
            .await
    }

    async fn purge_idle(&self, max_idle: Duration) -> Result<usize, StoreError> {
        (**self).purge_idle(max_idle).await
    }
}

/// `None` when the cutoff would fall before the earliest representable time,
/// in which case no session can be idle for that long.
fn idle_cutoff(max_idle: Duration) -> Option<DateTime<Utc>> {
    Utc::now().checked_sub_signed(max_idle)
}

fn check_version(session: &ChatSession, expected_version: u64) -> Result<(), StoreError> {
    if session.version != expected_version {
        return Err(StoreError::Conflict {
            session_id: session.id.clone(),
            expected: expected_version,
            actual: session.version,
        });
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, ChatSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: ChatSession) -> Result<String, StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::InvalidArgument(format!(
                "session {} already exists",
                session.id
            )));
        }
        let id = session.id.clone();
        sessions.insert(id.clone(), session);
        Ok(id)
    }

    async fn get(&self, session_id: &str) -> Result<Option<ChatSession>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn append_messages(
        &self,
        session_id: &str,
        expected_version: u64,
        messages: Vec<Message>,
    ) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(format!("session {session_id}")))?;

        check_version(session, expected_version)?;
        Ok(session.apply_append(messages))
    }

    async fn purge_idle(&self, max_idle: Duration) -> Result<usize, StoreError> {
        let Some(cutoff) = idle_cutoff(max_idle) else {
            return Ok(0);
        };
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.updated_at >= cutoff);
        Ok(before - sessions.len())
    }
}

/// One JSON file per session under a directory.
///
/// ```text
/// dir/
/// ├── 0b6f...-uuid.json
/// └── 9c21...-uuid.json
/// ```
///
/// Writes go through a temp file and a rename. The version check and the
/// write happen under one process-wide lock, so concurrent appends from a
/// single process are serialised; separate processes sharing a directory are
/// not coordinated.
pub struct FileSessionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `None` for ids that are not UUIDs, which can never name a stored file.
    fn session_path(&self, session_id: &str) -> Option<PathBuf> {
        let id = Uuid::parse_str(session_id).ok()?;
        Some(self.dir.join(format!("{}.json", id.hyphenated())))
    }

    async fn read_session(path: &Path) -> Result<Option<ChatSession>, StoreError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(StoreError::Io(error)),
        }
    }

    async fn write_session(path: &Path, session: &ChatSession) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(session)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, encoded).await?;
        if let Err(error) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::Io(error));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, session: ChatSession) -> Result<String, StoreError> {
        let path = self.session_path(&session.id).ok_or_else(|| {
            StoreError::InvalidArgument(format!("session id {} is not a uuid", session.id))
        })?;

        let _guard = self.write_lock.lock().await;
        if fs::try_exists(&path).await? {
            return Err(StoreError::InvalidArgument(format!(
                "session {} already exists",
                session.id
            )));
        }
        Self::write_session(&path, &session).await?;
        Ok(session.id)
    }

    async fn get(&self, session_id: &str) -> Result<Option<ChatSession>, StoreError> {
        match self.session_path(session_id) {
            Some(path) => Self::read_session(&path).await,
            None => Ok(None),
        }
    }

    async fn append_messages(
        &self,
        session_id: &str,
        expected_version: u64,
        messages: Vec<Message>,
    ) -> Result<u64, StoreError> {
        let not_found = || StoreError::NotFound(format!("session {session_id}"));
        let path = self.session_path(session_id).ok_or_else(not_found)?;

        let _guard = self.write_lock.lock().await;
        let mut session = Self::read_session(&path).await?.ok_or_else(not_found)?;
        check_version(&session, expected_version)?;

        let version = session.apply_append(messages);
        Self::write_session(&path, &session).await?;
        Ok(version)
    }

    async fn purge_idle(&self, max_idle: Duration) -> Result<usize, StoreError> {
        let Some(cutoff) = idle_cutoff(max_idle) else {
            return Ok(0);
        };
        let _guard = self.write_lock.lock().await;

        let mut entries = fs::read_dir(&self.dir).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let session = match Self::read_session(&path).await {
                Ok(Some(session)) => session,
                Ok(None) => continue,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable session file");
                    continue;
                }
            };
            if session.updated_at < cutoff {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}
