use async_trait::async_trait;
use log::{ debug, error, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ ChatClient, ChatError, CompletionRequest, CompletionResponse, Usage };
use crate::llm::{ LlmConfig, DEFAULT_GROQ_BASE_URL };

const COMPLETIONS_ROUTE: &str = "/chat/completions";

pub struct GroqChatClient {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct GroqMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub(crate) struct GroqRequest {
    pub model: String,
    pub messages: Vec<GroqMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Deserialize, Debug)]
pub(crate) struct GroqResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Option<Vec<GroqChoice>>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct GroqChoice {
    pub message: GroqChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct GroqChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl GroqRequest {
    pub(crate) fn from_completion(request: &CompletionRequest) -> Self {
        Self {
            model: request.model.clone(),
            messages: vec![
                GroqMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                GroqMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                }
            ],
            max_tokens: request.params.max_tokens,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
        }
    }
}

impl GroqResponse {
    /// Text of the first choice, if it carries any non-blank content.
    pub(crate) fn first_content(&self) -> Option<&str> {
        self.choices
            .as_ref()?
            .first()?
            .message.content.as_deref()
            .filter(|c| !c.trim().is_empty())
    }
}

impl GroqChatClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self, ChatError> {
        let api_url = base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                ChatError::Config(format!("Invalid API key format: {}", e))
            )?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ChatError::Config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ChatError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ChatError::Config("Groq API key is required".to_string()))?;

        Self::new(api_key, config.base_url.clone())
    }

    fn completions_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), COMPLETIONS_ROUTE)
    }
}

#[async_trait]
impl ChatClient for GroqChatClient {
    async fn complete(
        &self,
        request: CompletionRequest
    ) -> Result<CompletionResponse, ChatError> {
        let url = self.completions_url();
        let req = GroqRequest::from_completion(&request);

        info!("Sending request to Groq API with model: {}", req.model);
        let resp = self.http.post(&url).json(&req).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("HTTP Error: {} - {}", status.as_u16(), body);
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let parsed: GroqResponse = serde_json
            ::from_str(&body)
            .map_err(|e| ChatError::Decode(e.to_string()))?;

        let choice_count = parsed.choices.as_ref().map(|c| c.len()).unwrap_or(0);
        info!("Received response from Groq: {} choices", choice_count);
        if let Some(usage) = &parsed.usage {
            debug!(
                "Groq usage: prompt={:?} completion={:?} total={:?}",
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens
            );
        }
        if let Some(reason) = parsed.choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.finish_reason.as_deref())
        {
            debug!("Groq finish reason: {}", reason);
        }

        let content = parsed.first_content().ok_or(ChatError::EmptyResponse)?.to_string();

        Ok(CompletionResponse {
            response: content,
            model: parsed.model,
            usage: parsed.usage,
        })
    }

    fn get_base_url(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GenerationParams;

    fn sample_request() -> CompletionRequest {
        CompletionRequest {
            model: "llama3-70b-8192".to_string(),
            system_prompt: "be brief".to_string(),
            prompt: "What is RTI?".to_string(),
            params: GenerationParams::default(),
        }
    }

    #[test]
    fn request_carries_system_then_user_message() {
        let body = serde_json::to_value(GroqRequest::from_completion(&sample_request())).unwrap();
        assert_eq!(body["model"], "llama3-70b-8192");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "What is RTI?");
        assert_eq!(body["max_tokens"], 200);
        assert!((body["temperature"].as_f64().unwrap() - 0.5).abs() < 1e-6);
        assert!((body["top_p"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn first_choice_content_is_extracted() {
        let parsed: GroqResponse = serde_json
            ::from_str(
                r#"{
                    "id": "chatcmpl-1",
                    "object": "chat.completion",
                    "model": "llama3-70b-8192",
                    "choices": [
                        {"index": 0, "message": {"role": "assistant", "content": "File an RTI online."}, "finish_reason": "stop"},
                        {"index": 1, "message": {"role": "assistant", "content": "ignored"}}
                    ],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
                }"#
            )
            .unwrap();
        assert_eq!(parsed.first_content(), Some("File an RTI online."));
        assert_eq!(parsed.usage.unwrap().total_tokens, Some(15));
    }

    #[test]
    fn missing_or_blank_choices_have_no_content() {
        let none: GroqResponse = serde_json::from_str(r#"{"choices": null}"#).unwrap();
        assert_eq!(none.first_content(), None);
        let empty: GroqResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(empty.first_content(), None);
        let blank: GroqResponse = serde_json
            ::from_str(r#"{"choices": [{"message": {"content": "  "}}]}"#)
            .unwrap();
        assert_eq!(blank.first_content(), None);
    }

    #[test]
    fn api_key_is_required() {
        let err = GroqChatClient::from_config(&LlmConfig::default()).err().unwrap();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn completions_url_joins_base_and_route() {
        let client = GroqChatClient::new("k".into(), Some("http://localhost:9/openai/v1/".into())).unwrap();
        assert_eq!(client.completions_url(), "http://localhost:9/openai/v1/chat/completions");
        let default = GroqChatClient::new("k".into(), None).unwrap();
        assert_eq!(default.get_base_url(), DEFAULT_GROQ_BASE_URL);
    }
}
