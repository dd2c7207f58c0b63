use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ sort_by_timestamp, HistoryError, HistoryStore };
use crate::models::chat::{ format_user_key, ChatMessage };

/// Process-local history, used for offline runs and tests.
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, message: &ChatMessage) -> Result<(), HistoryError> {
        let key = format_user_key(&message.user_id);
        self.records.write().await.entry(key).or_default().push(message.clone());
        Ok(())
    }

    async fn list(&self, user_key: &str) -> Result<Vec<ChatMessage>, HistoryError> {
        let key = format_user_key(user_key);
        let mut messages = self.records.read().await.get(&key).cloned().unwrap_or_default();
        sort_by_timestamp(&mut messages);
        Ok(messages)
    }

    async fn delete_all(&self, user_key: &str) -> Result<usize, HistoryError> {
        let key = format_user_key(user_key);
        let removed = self.records.write().await.remove(&key).map(|v| v.len()).unwrap_or(0);
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
