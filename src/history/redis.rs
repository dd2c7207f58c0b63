use async_trait::async_trait;
use crate::models::chat::{ format_user_key, ChatMessage };
use crate::history::{ sort_by_timestamp, HistoryError, HistoryStore };
use log::error;
use redis::{ Client, AsyncCommands };

/// One Redis list per user key; each entry is a JSON-encoded record.
pub struct RedisHistoryStore {
    client: Client,
    key_prefix: String,
}

impl RedisHistoryStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, HistoryError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn key_for(&self, user_key: &str) -> String {
        format!("{}{}", self.key_prefix, format_user_key(user_key))
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn append(&self, message: &ChatMessage) -> Result<(), HistoryError> {
        let mut conn = self.get_connection().await?;
        let key = self.key_for(&message.user_id);
        let json_msg = serde_json::to_string(message)?;
        let _: i64 = conn.rpush(&key, &json_msg).await?;
        Ok(())
    }

    async fn list(&self, user_key: &str) -> Result<Vec<ChatMessage>, HistoryError> {
        let mut conn = self.get_connection().await?;
        let key = self.key_for(user_key);
        let json_entries: Vec<String> = conn.lrange(&key, 0, -1).await?;

        let mut messages = Vec::with_capacity(json_entries.len());
        for json_entry in &json_entries {
            match serde_json::from_str::<ChatMessage>(json_entry) {
                Ok(msg) => messages.push(msg),
                Err(e) => error!("Error parsing history entry: {}", e),
            }
        }
        sort_by_timestamp(&mut messages);
        Ok(messages)
    }

    async fn delete_all(&self, user_key: &str) -> Result<usize, HistoryError> {
        let mut conn = self.get_connection().await?;
        let key = self.key_for(user_key);
        let count: usize = conn.llen(&key).await?;
        let _: i64 = conn.del(&key).await?;
        Ok(count)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
