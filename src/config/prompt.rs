use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use log::{ info, warn };
use tokio::sync::RwLock;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are LawAssist, an AI assistant that provides quick, clear, and easy-to-understand answers about laws and government schemes and accessibility services in India.
  - Keep responses under 50 words.
  - Prioritize clarity and efficiency.
  - Mention key schemes like Ayushman Bharat and Sugamya Bharat Abhiyan.
  - Ensure responses are actionable and useful for Indian users.
  - Use simple language, avoiding unnecessary details.
  - If the user makes a spelling mistake, assume the correct spelling and respond accordingly.";

pub const DEFAULT_WELCOME_MESSAGE: &str =
    "I'm LawAssist, your AI assistant for laws, government schemes, and services in India.";

pub const DEFAULT_THINKING_PLACEHOLDER: &str = "Thinking...";

pub type SharedPrompts = Arc<RwLock<Arc<PromptConfig>>>;

#[derive(Debug)]
pub enum PromptError {
    EmptyTemplate(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptyTemplate(key) => write!(f, "Prompt template '{}' is empty", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_welcome_message() -> String {
    DEFAULT_WELCOME_MESSAGE.to_string()
}

fn default_thinking_placeholder() -> String {
    DEFAULT_THINKING_PLACEHOLDER.to_string()
}

/// Fixed texts the assistant speaks with. Every field falls back to the
/// built-in LawAssist wording when the file omits it.
#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
    #[serde(default = "default_thinking_placeholder")]
    pub thinking_placeholder: String,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            welcome_message: default_welcome_message(),
            thinking_placeholder: default_thinking_placeholder(),
            last_loaded: None,
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if self.system_prompt.trim().is_empty() {
            return Err(PromptError::EmptyTemplate("system_prompt".to_string()));
        }
        if self.welcome_message.trim().is_empty() {
            return Err(PromptError::EmptyTemplate("welcome_message".to_string()));
        }
        if self.thinking_placeholder.trim().is_empty() {
            return Err(PromptError::EmptyTemplate("thinking_placeholder".to_string()));
        }
        Ok(())
    }
}

pub fn load_prompts_from_str(json: &str) -> Result<Arc<PromptConfig>, PromptError> {
    let mut config: PromptConfig = serde_json::from_str(json)?;
    config.validate()?;
    config.last_loaded = Some(SystemTime::now());
    Ok(Arc::new(config))
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(path.as_ref())?;
    load_prompts_from_str(&file_content)
}

/// Loads the prompt file if one exists, otherwise the built-in texts.
/// A file that exists but fails to parse is an error.
pub fn load_prompts_or_default(path: Option<&str>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(p) if Path::new(p).exists() => {
            info!("Loading prompts from: {}", p);
            load_prompts(p)
        }
        Some(p) => {
            warn!("Prompts file '{}' not found, using built-in prompts", p);
            Ok(Arc::new(PromptConfig::default()))
        }
        None => Ok(Arc::new(PromptConfig::default())),
    }
}

pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current_config: &Arc<PromptConfig>
) -> Result<Option<Arc<PromptConfig>>, PromptError> {
    let metadata = fs::metadata(&path)?;

    if let Ok(modified) = metadata.modified() {
        let stale = match current_config.last_loaded {
            Some(last_loaded) => modified > last_loaded,
            None => true,
        };
        if stale {
            info!("Prompts file changed, reloading...");
            return load_prompts(path).map(Some);
        }
    }
    Ok(None)
}
