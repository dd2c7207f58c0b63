mod common;

use std::sync::Arc;

use lawassist::config::prompt::PromptConfig;
use lawassist::llm::assistant::{
    LawAssistant,
    EMPTY_REPLY,
    HTTP_ERROR_REPLY,
    NETWORK_ERROR_REPLY,
    UNEXPECTED_ERROR_REPLY,
};
use lawassist::llm::chat::groq::GroqChatClient;
use lawassist::llm::chat::{ ChatClient, ChatError, CompletionRequest };
use lawassist::llm::GenerationParams;
use tokio::sync::RwLock;

fn request(model: &str, prompt: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        system_prompt: "You are LawAssist".to_string(),
        prompt: prompt.to_string(),
        params: GenerationParams::default(),
    }
}

fn assistant(base_url: String) -> LawAssistant {
    let client = GroqChatClient::new("gsk_test".into(), Some(base_url)).unwrap();
    let prompts = Arc::new(RwLock::new(Arc::new(PromptConfig::default())));
    LawAssistant::new(Arc::new(client), prompts, GenerationParams::default())
}

#[tokio::test]
async fn completion_request_has_expected_shape() {
    let (base, mock) = common::spawn_groq(200, common::groq_reply("Visit the nearest CSC.")).await;
    let client = GroqChatClient::new("gsk_test".into(), Some(base)).unwrap();

    let resp = client.complete(request("gemma2-9b-it", "How do I get a UDID card?")).await.unwrap();
    assert_eq!(resp.response, "Visit the nearest CSC.");
    assert_eq!(resp.usage.unwrap().total_tokens, Some(62));

    let mock = mock.lock().unwrap();
    assert_eq!(mock.auth_headers, vec!["Bearer gsk_test".to_string()]);
    let body = &mock.requests[0];
    assert_eq!(body["model"], "gemma2-9b-it");
    assert_eq!(body["max_tokens"], 200);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["messages"][1]["content"], "How do I get a UDID card?");
    assert!((body["temperature"].as_f64().unwrap() - 0.5).abs() < 1e-6);
    assert!((body["top_p"].as_f64().unwrap() - 0.7).abs() < 1e-6);
}

#[tokio::test]
async fn error_status_is_typed_then_mapped() {
    let (base, _mock) = common::spawn_groq(500, r#"{"error":"overloaded"}"#.to_string()).await;
    let client = GroqChatClient::new("gsk_test".into(), Some(base.clone())).unwrap();
    let err = client.complete(request("llama3-70b-8192", "hi")).await.unwrap_err();
    assert!(matches!(err, ChatError::Status { status: 500, .. }));

    assert_eq!(assistant(base).ask("hi", "llama3-70b-8192").await, HTTP_ERROR_REPLY);
}

#[tokio::test]
async fn malformed_and_empty_bodies() {
    let (base, _mock) = common::spawn_groq(200, "not json".to_string()).await;
    assert_eq!(assistant(base).ask("hi", "llama3-70b-8192").await, UNEXPECTED_ERROR_REPLY);

    let (base, _mock) = common::spawn_groq(200, r#"{"choices":[]}"#.to_string()).await;
    assert_eq!(assistant(base).ask("hi", "llama3-70b-8192").await, EMPTY_REPLY);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_network_error() {
    let reply = assistant("http://127.0.0.1:1/openai/v1".to_string()).ask(
        "hi",
        "llama3-70b-8192"
    ).await;
    assert_eq!(reply, NETWORK_ERROR_REPLY);
}

#[tokio::test]
async fn unknown_model_is_sent_as_default() {
    let (base, mock) = common::spawn_groq(200, common::groq_reply("ok")).await;
    assert_eq!(assistant(base).ask("hi", "mixtral-8x7b").await, "ok");
    assert_eq!(mock.lock().unwrap().requests[0]["model"], "llama3-70b-8192");
}
