use log::{ error, info, warn };
use std::sync::Arc;

use super::catalog::resolve_model_id;
use super::chat::{ ChatClient, ChatError, CompletionRequest };
use super::GenerationParams;
use crate::config::prompt::SharedPrompts;

pub const BLANK_PROMPT_REPLY: &str =
    "I couldn't understand your message. Please try again with a more detailed question.";
pub const EMPTY_REPLY: &str = "No response from AI. Please try again.";
pub const HTTP_ERROR_REPLY: &str = "Error: Unable to fetch response. Please try again.";
pub const NETWORK_ERROR_REPLY: &str = "Network Error: Please check your connection and try again.";
pub const UNEXPECTED_ERROR_REPLY: &str = "An unexpected error occurred. Please try again.";

/// The user-facing sentence shown in place of a reply for each failure kind.
pub fn reply_for_error(err: &ChatError) -> &'static str {
    match err {
        ChatError::Status { .. } => HTTP_ERROR_REPLY,
        ChatError::Network(_) => NETWORK_ERROR_REPLY,
        ChatError::EmptyResponse => EMPTY_REPLY,
        ChatError::Decode(_) | ChatError::Config(_) | ChatError::Unexpected(_) =>
            UNEXPECTED_ERROR_REPLY,
    }
}

/// Inference client for the chat flow: pairs the LawAssist system prompt
/// with the user's text and always comes back with something to show.
#[derive(Clone)]
pub struct LawAssistant {
    client: Arc<dyn ChatClient>,
    prompts: SharedPrompts,
    params: GenerationParams,
}

impl LawAssistant {
    pub fn new(client: Arc<dyn ChatClient>, prompts: SharedPrompts, params: GenerationParams) -> Self {
        Self { client, prompts, params }
    }

    /// Sends `prompt` to the completion endpoint with `model_id` (or the
    /// default model when the id is not in the catalog). Never fails: every
    /// error is logged and mapped to a fixed reply.
    pub async fn ask(&self, prompt: &str, model_id: &str) -> String {
        if prompt.trim().is_empty() {
            warn!("Blank prompt rejected before inference");
            return BLANK_PROMPT_REPLY.to_string();
        }

        match self.try_ask(prompt, model_id).await {
            Ok(reply) => reply,
            Err(e) => {
                match &e {
                    ChatError::EmptyResponse => warn!("Empty response from AI"),
                    ChatError::Network(msg) => error!("Network Error: {}", msg),
                    other => error!("Inference failed: {}", other),
                }
                reply_for_error(&e).to_string()
            }
        }
    }

    /// Same request as [`ask`](Self::ask) but with the typed error kept.
    pub async fn try_ask(&self, prompt: &str, model_id: &str) -> Result<String, ChatError> {
        let model = resolve_model_id(model_id);
        let system_prompt = self.prompts.read().await.system_prompt.clone();

        let request = CompletionRequest {
            model: model.to_string(),
            system_prompt,
            prompt: prompt.to_string(),
            params: self.params,
        };

        info!("Querying {} with model {}", self.client.get_base_url(), model);
        let resp = self.client.complete(request).await?;
        Ok(resp.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::PromptConfig;
    use crate::llm::catalog::DEFAULT_MODEL;
    use crate::llm::chat::CompletionResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::RwLock;

    struct ScriptedClient {
        outcome: Mutex<Option<Result<String, ChatError>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        fn new(outcome: Result<String, ChatError>) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(Some(outcome)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ChatError> {
            self.seen.lock().unwrap().push(request);
            let outcome = self.outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(ChatError::Unexpected("called twice".into())));
            outcome.map(|response| CompletionResponse { response, model: None, usage: None })
        }

        fn get_base_url(&self) -> String {
            "scripted".to_string()
        }
    }

    fn assistant(client: Arc<ScriptedClient>) -> LawAssistant {
        let prompts = Arc::new(RwLock::new(Arc::new(PromptConfig::default())));
        LawAssistant::new(client, prompts, GenerationParams::default())
    }

    #[tokio::test]
    async fn blank_prompt_never_reaches_the_client() {
        let client = ScriptedClient::new(Ok("unused".into()));
        let reply = assistant(client.clone()).ask("   \n", DEFAULT_MODEL).await;
        assert_eq!(reply, BLANK_PROMPT_REPLY);
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_model_is_replaced_by_default() {
        let client = ScriptedClient::new(Ok("Apply at the nearest CSC.".into()));
        let reply = assistant(client.clone()).ask("How do I get an Ayushman card?", "gpt-4o").await;
        assert_eq!(reply, "Apply at the nearest CSC.");

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].model, DEFAULT_MODEL);
        assert!(seen[0].system_prompt.contains("LawAssist"));
        assert_eq!(seen[0].prompt, "How do I get an Ayushman card?");
    }

    #[tokio::test]
    async fn failures_collapse_into_fixed_replies() {
        let cases = vec![
            (ChatError::Status { status: 500, body: "boom".into() }, HTTP_ERROR_REPLY),
            (ChatError::Network("timed out".into()), NETWORK_ERROR_REPLY),
            (ChatError::Decode("expected value".into()), UNEXPECTED_ERROR_REPLY),
            (ChatError::EmptyResponse, EMPTY_REPLY)
        ];
        for (err, expected) in cases {
            let reply = assistant(ScriptedClient::new(Err(err))).ask("hello", DEFAULT_MODEL).await;
            assert_eq!(reply, expected);
        }
    }
}
