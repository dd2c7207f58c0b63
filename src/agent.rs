use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig, PromptError, SharedPrompts };
use crate::config::settings::{ SettingsManager, SharedSettings };
use crate::conversation::Conversation;
use crate::history::{ initialize_history_store, summarize_sessions, HistoryStore };
use crate::llm::assistant::LawAssistant;
use crate::llm::chat::{ new_client as new_chat_client, ChatClient };
use crate::llm::{ GenerationParams, LlmConfig };
use crate::models::chat::{ format_user_key, ChatMessage, ChatSession, Role };

use log::{ debug, error, info, warn };
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("message is empty")]
    EmptyPrompt,
    #[error("prompt configuration error: {0}")]
    Prompt(#[from] PromptError),
}

/// Drives the chat flow: records the user's message, asks the model, and
/// mirrors both sides of the exchange to the history store.
pub struct ChatAgent {
    assistant: LawAssistant,
    history_store: Arc<dyn HistoryStore>,
    settings: SharedSettings,
    prompts: SharedPrompts,
    prompts_path: Option<String>,
}

impl ChatAgent {
    fn llm_config(args: &Args) -> LlmConfig {
        let api_key = if !args.chat_api_key.is_empty() {
            Some(args.chat_api_key.clone())
        } else {
            None
        };
        LlmConfig {
            api_key,
            base_url: args.chat_base_url.clone(),
            params: GenerationParams {
                max_tokens: args.chat_max_tokens,
                temperature: args.chat_temperature,
                top_p: args.chat_top_p,
            },
        }
    }

    /// `bearer_override` replaces the configured Firestore credentials, e.g.
    /// with the ID token of the signed-in console user.
    pub async fn new(
        args: &Args,
        bearer_override: Option<String>
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let llm_config = Self::llm_config(args);
        let chat_client = new_chat_client(&llm_config)?;
        let history_store = initialize_history_store(args, bearer_override).await?;
        let prompt_config = prompt::load_prompts_or_default(Some(&args.prompts_path))?;
        let settings = SettingsManager::open(&args.settings_path)?.shared();

        let mut agent = Self::from_parts(
            chat_client,
            history_store,
            settings,
            prompt_config,
            llm_config.params
        );
        agent.prompts_path = Some(args.prompts_path.clone());
        Ok(agent)
    }

    pub fn from_parts(
        chat_client: Arc<dyn ChatClient>,
        history_store: Arc<dyn HistoryStore>,
        settings: SharedSettings,
        prompt_config: Arc<PromptConfig>,
        params: GenerationParams
    ) -> Self {
        let prompts: SharedPrompts = Arc::new(RwLock::new(prompt_config));
        Self {
            assistant: LawAssistant::new(chat_client, Arc::clone(&prompts), params),
            history_store,
            settings,
            prompts,
            prompts_path: None,
        }
    }

    pub fn settings(&self) -> SharedSettings {
        Arc::clone(&self.settings)
    }

    pub fn history_backend(&self) -> &'static str {
        self.history_store.backend_name()
    }

    pub async fn prompt_config(&self) -> Arc<PromptConfig> {
        Arc::clone(&*self.prompts.read().await)
    }

    /// Writes one record to the history store. Failures are logged and
    /// reported as `false`; the local log is never rolled back.
    pub async fn persist(&self, message: &ChatMessage) -> bool {
        if !message.is_persistable() {
            warn!("Not persisting incomplete chat record for '{}'", message.user_id);
            return false;
        }
        match self.history_store.append(message).await {
            Ok(()) => true,
            Err(e) => {
                error!("Error saving chat message: {}", e);
                false
            }
        }
    }

    /// Stored history for `user_id`, oldest first. Errors read as empty.
    pub async fn history(&self, user_id: &str) -> Vec<ChatMessage> {
        let user_key = format_user_key(user_id);
        match self.history_store.list(&user_key).await {
            Ok(messages) => messages,
            Err(e) => {
                error!("Error fetching chat history for {}: {}", user_key, e);
                Vec::new()
            }
        }
    }

    pub async fn sessions(&self, user_id: &str) -> Vec<ChatSession> {
        summarize_sessions(&self.history(user_id).await)
    }

    /// Fills `conversation` with the stored history, or the welcome message
    /// when there is none or it cannot be fetched.
    pub async fn load_history(&self, conversation: &mut Conversation) {
        match self.history_store.list(conversation.user_key()).await {
            Ok(history) if !history.is_empty() => {
                info!("Loaded {} messages for {}", history.len(), conversation.user_key());
                conversation.replace_history(history);
            }
            Ok(_) => {
                debug!("No stored history for {}", conversation.user_key());
                self.show_welcome(conversation).await;
            }
            Err(e) => {
                error!("Error loading chat history for {}: {}", conversation.user_key(), e);
                self.show_welcome(conversation).await;
            }
        }
    }

    async fn show_welcome(&self, conversation: &mut Conversation) {
        let welcome = self.prompts.read().await.welcome_message.clone();
        conversation.reset(&welcome);
    }

    /// Sends one user message through the full exchange and returns the
    /// assistant record that ended up in the log. Inference failures still
    /// produce a record, holding the user-facing error text.
    pub async fn submit(
        &self,
        conversation: &mut Conversation,
        prompt: &str,
        model: Option<&str>
    ) -> Result<ChatMessage, AgentError> {
        let text = prompt.trim();
        if text.is_empty() {
            return Err(AgentError::EmptyPrompt);
        }

        let user_message = conversation.push(Role::User, text);
        self.persist(&user_message).await;

        let placeholder = self.prompts.read().await.thinking_placeholder.clone();
        conversation.begin_reply(&placeholder);

        let model_id = match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => m.to_string(),
            None => self.settings.read().await.selected_model(),
        };
        let reply = self.assistant.ask(text, &model_id).await;

        let reply_message = conversation.finish_reply(&reply);
        self.persist(&reply_message).await;
        Ok(reply_message)
    }

    /// Starts over locally. Stored history is left alone.
    pub async fn new_chat(&self, conversation: &mut Conversation) {
        self.show_welcome(conversation).await;
    }

    /// Clears the local log and removes every stored record of the user.
    pub async fn delete_all_chats(&self, conversation: &mut Conversation) -> bool {
        self.show_welcome(conversation).await;
        self.delete_history(conversation.user_key()).await
    }

    pub async fn delete_history(&self, user_id: &str) -> bool {
        let user_key = format_user_key(user_id);
        match self.history_store.delete_all(&user_key).await {
            Ok(count) => {
                info!("Deleted {} stored messages for {}", count, user_key);
                true
            }
            Err(e) => {
                error!("Error deleting chat history for {}: {}", user_key, e);
                false
            }
        }
    }

    /// Re-reads the prompt file when it changed since the last load.
    pub async fn reload_prompts_if_changed(&self) -> Result<bool, AgentError> {
        let path = match &self.prompts_path {
            Some(p) if Path::new(p).exists() => p,
            _ => {
                return Ok(false);
            }
        };
        let current = self.prompt_config().await;
        match prompt::reload_prompts_if_changed(path, &current)? {
            Some(new_config) => {
                *self.prompts.write().await = new_config;
                info!("Prompts successfully reloaded");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
