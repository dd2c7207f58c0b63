mod firestore;
mod memory;
mod redis;

pub use self::firestore::{ FirestoreHistoryStore, TokenSource };
pub use self::memory::MemoryHistoryStore;
pub use self::redis::RedisHistoryStore;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use crate::cli::Args;
use crate::models::chat::{ ChatMessage, ChatSession, Role };

/// Gap after which consecutive messages belong to different chat sessions.
pub const SESSION_GAP_MILLIS: i64 = 30 * 60 * 1000;
const TITLE_MAX_CHARS: usize = 30;
const PREVIEW_MAX_CHARS: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history backend request failed: {0}")]
    Backend(String),
    #[error("history backend returned HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("history record could not be encoded or decoded: {0}")]
    Codec(String),
    #[error("history store configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for HistoryError {
    fn from(err: reqwest::Error) -> Self {
        HistoryError::Backend(err.to_string())
    }
}

impl From<::redis::RedisError> for HistoryError {
    fn from(err: ::redis::RedisError) -> Self {
        HistoryError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        HistoryError::Codec(err.to_string())
    }
}

/// Remote mirror of the chat log, keyed by the normalised user key.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, message: &ChatMessage) -> Result<(), HistoryError>;

    /// All records for `user_key`, ordered by timestamp ascending.
    async fn list(&self, user_key: &str) -> Result<Vec<ChatMessage>, HistoryError>;

    /// Removes every record for `user_key` and returns how many were deleted.
    async fn delete_all(&self, user_key: &str) -> Result<usize, HistoryError>;

    fn backend_name(&self) -> &'static str;
}

pub async fn create_history_store(
    args: &Args,
    bearer_override: Option<String>
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "firestore" => {
            let project_id = args.firestore_project_id
                .clone()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(||
                    HistoryError::Config(
                        "FIRESTORE_PROJECT_ID is required for the firestore history store".to_string()
                    )
                )?;
            let token_source = match bearer_override {
                Some(token) => TokenSource::Static(token),
                None => TokenSource::from_args(args),
            };
            let store = FirestoreHistoryStore::new(
                args.firestore_base_url.clone(),
                project_id,
                args.history_collection.clone(),
                token_source
            )?;
            Ok(Arc::new(store))
        }
        "redis" => {
            let store = RedisHistoryStore::new(&args.history_host, &args.history_redis_prefix)?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryHistoryStore::new())),
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub async fn initialize_history_store(
    args: &Args,
    bearer_override: Option<String>
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    info!("Chat history will be stored in: {}", args.history_type);
    create_history_store(args, bearer_override).await
}

/// Stable sort so records sharing a timestamp keep their stored order.
pub fn sort_by_timestamp(messages: &mut [ChatMessage]) {
    messages.sort_by_key(|m| m.timestamp);
}

fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    let truncated = chars.next().is_some();
    (head, truncated)
}

/// Groups an ordered history into chat sessions, starting a new session
/// whenever two consecutive messages are more than thirty minutes apart.
pub fn summarize_sessions(messages: &[ChatMessage]) -> Vec<ChatSession> {
    let mut groups: Vec<&[ChatMessage]> = Vec::new();
    let mut start = 0;
    for i in 1..messages.len() {
        if messages[i].timestamp - messages[i - 1].timestamp > SESSION_GAP_MILLIS {
            groups.push(&messages[start..i]);
            start = i;
        }
    }
    if start < messages.len() {
        groups.push(&messages[start..]);
    }

    groups
        .into_iter()
        .map(|group| {
            let title = match group.iter().find(|m| m.role == Role::User) {
                Some(first_user) => {
                    let (head, truncated) = truncate_chars(&first_user.text, TITLE_MAX_CHARS);
                    if truncated {
                        format!("{}...", head)
                    } else {
                        head
                    }
                }
                None => "New Chat".to_string(),
            };
            let preview = group
                .iter()
                .take(2)
                .map(|m| format!("{}...", truncate_chars(&m.text, PREVIEW_MAX_CHARS).0))
                .collect::<Vec<_>>()
                .join(" ");

            ChatSession {
                title,
                timestamp: group[0].timestamp,
                message_count: group.len(),
                preview,
            }
        })
        .collect()
}
