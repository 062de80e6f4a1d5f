use crate::record::ConversationRecord;
use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult};
use std::path::PathBuf;
use tracing::debug;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn save(&self, record: &ConversationRecord) -> ConductorResult<()>;
    async fn load(&self, conversation_id: &str) -> ConductorResult<Option<ConversationRecord>>;
    async fn delete(&self, conversation_id: &str) -> ConductorResult<()>;
    async fn list(&self) -> ConductorResult<Vec<String>>;
}

/// File-based conversation store (one JSON file per conversation).
pub struct FileConversationStore {
    dir: PathBuf,
}

impl FileConversationStore {
    pub async fn new(dir: PathBuf) -> ConductorResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Conversation ids come from callers, so only plain names map to files.
    fn conversation_path(&self, conversation_id: &str) -> ConductorResult<PathBuf> {
        let valid = !conversation_id.is_empty()
            && conversation_id.len() <= 128
            && conversation_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ConductorError::Persistence(format!(
                "invalid conversation id '{conversation_id}'"
            )));
        }
        Ok(self.dir.join(format!("{conversation_id}.json")))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn save(&self, record: &ConversationRecord) -> ConductorResult<()> {
        let path = self.conversation_path(&record.conversation_id)?;
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            ConductorError::Persistence(format!("failed to write {}: {e}", path.display()))
        })?;
        debug!(conversation_id = %record.conversation_id, turns = record.turns.len(), "Conversation saved");
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> ConductorResult<Option<ConversationRecord>> {
        let path = self.conversation_path(conversation_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let record: ConversationRecord = serde_json::from_str(&data).map_err(|e| {
            ConductorError::Persistence(format!("Failed to parse conversation: {e}"))
        })?;
        Ok(Some(record))
    }

    async fn delete(&self, conversation_id: &str) -> ConductorResult<()> {
        let path = self.conversation_path(conversation_id)?;
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn list(&self) -> ConductorResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
