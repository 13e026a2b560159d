//! Conversation state persistence
//!
//! The application keeps one [`State`] per chat. Without a persistent store
//! conversations restart from `/start` after a process restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::core::error::AppResult;
use crate::routing::{SessionKey, State};

/// Storage for the current state of each conversation
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, session: SessionKey) -> AppResult<Option<State>>;

    async fn set(&self, session: SessionKey, state: State) -> AppResult<()>;

    async fn remove(&self, session: SessionKey) -> AppResult<()>;
}

/// Process-local store, the default
#[derive(Debug, Default)]
pub struct InMemoryStore {
    states: DashMap<SessionKey, State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get(&self, session: SessionKey) -> AppResult<Option<State>> {
        Ok(self.states.get(&session).map(|entry| *entry.value()))
    }

    async fn set(&self, session: SessionKey, state: State) -> AppResult<()> {
        self.states.insert(session, state);
        Ok(())
    }

    async fn remove(&self, session: SessionKey) -> AppResult<()> {
        self.states.remove(&session);
        Ok(())
    }
}

/// Store backed by a JSON object `{ "<chat id>": <state>, ... }`
///
/// The whole file is rewritten after every change, which is fine for the
/// number of chats a single bot process serves. A change that fails to reach
/// the disk is not applied in memory either.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    states: Mutex<BTreeMap<SessionKey, State>>,
}

impl JsonFileStore {
    /// Opens `path`, loading existing sessions. A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let states = match fs_err::tokio::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        log::info!("Loaded {} conversation(s) from {}", states.len(), path.display());
        Ok(Self {
            path,
            states: Mutex::new(states),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, states: &BTreeMap<SessionKey, State>) -> AppResult<()> {
        let raw = serde_json::to_string_pretty(states)?;
        let tmp = self.path.with_extension("json.tmp");
        fs_err::tokio::write(&tmp, raw).await?;
        fs_err::tokio::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn get(&self, session: SessionKey) -> AppResult<Option<State>> {
        Ok(self.states.lock().await.get(&session).copied())
    }

    async fn set(&self, session: SessionKey, state: State) -> AppResult<()> {
        let mut states = self.states.lock().await;
        if states.get(&session) == Some(&state) {
            return Ok(());
        }
        let mut next = states.clone();
        next.insert(session, state);
        self.flush(&next).await?;
        *states = next;
        Ok(())
    }

    async fn remove(&self, session: SessionKey) -> AppResult<()> {
        let mut states = self.states.lock().await;
        if !states.contains_key(&session) {
            return Ok(());
        }
        let mut next = states.clone();
        next.remove(&session);
        self.flush(&next).await?;
        *states = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryStore::new();
        assert_eq!(store.get(1).await.unwrap(), None);
        store.set(1, State(2)).await.unwrap();
        assert_eq!(store.get(1).await.unwrap(), Some(State(2)));
        store.remove(1).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        store.set(-100, State(3)).await.unwrap();
        store.set(42, State(1)).await.unwrap();
        store.remove(42).await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get(-100).await.unwrap(), Some(State(3)));
        assert_eq!(reopened.get(42).await.unwrap(), None);

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["-100"], 3);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sessions_dir = dir.path().join("sessions");
        std::fs::create_dir(&sessions_dir).unwrap();
        let path = sessions_dir.join("sessions.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        store.set(5, State(1)).await.unwrap();

        // Nothing can be written once the directory is gone.
        std::fs::remove_dir_all(&sessions_dir).unwrap();

        assert!(store.set(5, State(2)).await.is_err());
        assert_eq!(store.get(5).await.unwrap(), Some(State(1)));

        assert!(store.set(6, State(3)).await.is_err());
        assert_eq!(store.get(6).await.unwrap(), None);

        assert!(store.remove(5).await.is_err());
        assert_eq!(store.get(5).await.unwrap(), Some(State(1)));
    }

    #[tokio::test]
    async fn test_json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(JsonFileStore::open(&path).await.is_err());
    }
}
