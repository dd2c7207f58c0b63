#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{ Path, Query, State },
    http::{ HeaderMap, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ delete, post },
    Json,
    Router,
};
use serde_json::{ json, Value };
use std::collections::HashMap;
use std::sync::{ Arc, Mutex };

use lawassist::agent::ChatAgent;
use lawassist::config::prompt::PromptConfig;
use lawassist::config::settings::SettingsManager;
use lawassist::history::HistoryStore;
use lawassist::llm::chat::{ ChatClient, ChatError, CompletionRequest, CompletionResponse };
use lawassist::llm::GenerationParams;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

// --- Groq ---

#[derive(Default)]
pub struct GroqMock {
    pub status: u16,
    pub body: String,
    pub requests: Vec<Value>,
    pub auth_headers: Vec<String>,
}

pub type SharedGroq = Arc<Mutex<GroqMock>>;

pub fn groq_reply(content: &str) -> String {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "llama3-70b-8192",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 50, "completion_tokens": 12, "total_tokens": 62 }
    }).to_string()
}

async fn groq_completions(
    State(mock): State<SharedGroq>,
    headers: HeaderMap,
    Json(body): Json<Value>
) -> Response {
    let mut mock = mock.lock().unwrap();
    mock.requests.push(body);
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        mock.auth_headers.push(auth.to_string());
    }
    let status = StatusCode::from_u16(mock.status).unwrap();
    (status, [("content-type", "application/json")], mock.body.clone()).into_response()
}

/// A Groq-compatible endpoint answering every request with `status`/`body`.
/// Returns the base URL to hand to the client (`.../openai/v1`).
pub async fn spawn_groq(status: u16, body: String) -> (String, SharedGroq) {
    let mock = Arc::new(
        Mutex::new(GroqMock {
            status,
            body,
            ..Default::default()
        })
    );
    let router = Router::new()
        .route("/openai/v1/chat/completions", post(groq_completions))
        .with_state(mock.clone());
    let base = spawn_server(router).await;
    (format!("{}/openai/v1", base), mock)
}

// --- Firestore ---

#[derive(Default)]
pub struct FirestoreMock {
    pub documents: Vec<Value>,
    pub next_id: usize,
    pub auth_headers: Vec<String>,
    pub fail_queries: bool,
}

pub type SharedFirestore = Arc<Mutex<FirestoreMock>>;

fn record_auth(mock: &mut FirestoreMock, headers: &HeaderMap) {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        mock.auth_headers.push(auth.to_string());
    }
}

async fn create_document(
    State(mock): State<SharedFirestore>,
    Path((project, database, collection)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>
) -> Json<Value> {
    let mut mock = mock.lock().unwrap();
    record_auth(&mut mock, &headers);
    mock.next_id += 1;
    let name = format!(
        "projects/{}/databases/{}/documents/{}/doc{}",
        project,
        database,
        collection,
        mock.next_id
    );
    let doc =
        json!({
        "name": name,
        "fields": body["fields"].clone(),
        "createTime": "2024-01-01T00:00:00Z",
        "updateTime": "2024-01-01T00:00:00Z"
    });
    mock.documents.push(doc.clone());
    Json(doc)
}

async fn run_query(
    State(mock): State<SharedFirestore>,
    headers: HeaderMap,
    Json(body): Json<Value>
) -> Response {
    let mut mock = mock.lock().unwrap();
    record_auth(&mut mock, &headers);
    if mock.fail_queries {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": { "code": 403, "status": "PERMISSION_DENIED" } })),
        ).into_response();
    }
    let wanted = body["structuredQuery"]["where"]["fieldFilter"]["value"]["stringValue"].clone();
    let mut results: Vec<Value> = mock.documents
        .iter()
        .filter(|d| d["fields"]["userId"]["stringValue"] == wanted)
        .map(|d| json!({ "document": d, "readTime": "2024-01-01T00:00:00Z" }))
        .collect();
    if results.is_empty() {
        results.push(json!({ "readTime": "2024-01-01T00:00:00Z" }));
    }
    Json(Value::Array(results)).into_response()
}

async fn upsert_document(
    State(mock): State<SharedFirestore>,
    Path((project, database, collection, id)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>
) -> Json<Value> {
    let mut mock = mock.lock().unwrap();
    record_auth(&mut mock, &headers);
    let name = format!("projects/{}/databases/{}/documents/{}/{}", project, database, collection, id);
    let doc = json!({ "name": name, "fields": body["fields"].clone() });
    mock.documents.retain(|d| d["name"] != doc["name"]);
    mock.documents.push(doc.clone());
    Json(doc)
}

async fn delete_document(
    State(mock): State<SharedFirestore>,
    Path((project, database, collection, id)): Path<(String, String, String, String)>
) -> Json<Value> {
    let name = format!("projects/{}/databases/{}/documents/{}/{}", project, database, collection, id);
    mock.lock().unwrap().documents.retain(|d| d["name"] != Value::String(name.clone()));
    Json(json!({}))
}

/// A minimal Firestore REST emulator: create, upsert by id, runQuery on
/// `userId`, delete.
pub async fn spawn_firestore() -> (String, SharedFirestore) {
    let mock: SharedFirestore = Arc::new(Mutex::new(FirestoreMock::default()));
    let router = Router::new()
        .route("/v1/projects/{project}/databases/{database}/documents:runQuery", post(run_query))
        .route(
            "/v1/projects/{project}/databases/{database}/documents/{collection}",
            post(create_document)
        )
        .route(
            "/v1/projects/{project}/databases/{database}/documents/{collection}/{id}",
            delete(delete_document).patch(upsert_document)
        )
        .with_state(mock.clone());
    (spawn_server(router).await, mock)
}

// --- Firebase Auth ---

pub struct AuthAccount {
    pub uid: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Default)]
pub struct AuthMock {
    pub accounts: Vec<AuthAccount>,
    pub api_keys: Vec<String>,
}

pub type SharedAuth = Arc<Mutex<AuthMock>>;

fn auth_error(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": { "code": 400, "message": message } })),
    ).into_response()
}

fn auth_success(account: &AuthAccount) -> Response {
    Json(
        json!({
        "kind": "identitytoolkit#VerifyPasswordResponse",
        "localId": account.uid,
        "email": account.email,
        "idToken": format!("id-token-{}", account.uid),
        "refreshToken": "refresh",
        "expiresIn": "3600"
    })
    ).into_response()
}

async fn sign_up(
    State(mock): State<SharedAuth>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>
) -> Response {
    let mut mock = mock.lock().unwrap();
    mock.api_keys.push(query.get("key").cloned().unwrap_or_default());
    let email = body["email"].as_str().unwrap_or_default().to_string();
    if mock.accounts.iter().any(|a| a.email == email) {
        return auth_error("EMAIL_EXISTS");
    }
    let account = AuthAccount {
        uid: format!("uid{}", mock.accounts.len() + 1),
        email,
        password: body["password"].as_str().unwrap_or_default().to_string(),
        display_name: body["displayName"].as_str().map(str::to_string),
    };
    let response = auth_success(&account);
    mock.accounts.push(account);
    response
}

async fn sign_in_with_password(
    State(mock): State<SharedAuth>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>
) -> Response {
    let mut mock = mock.lock().unwrap();
    mock.api_keys.push(query.get("key").cloned().unwrap_or_default());
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    match mock.accounts.iter().find(|a| a.email == email) {
        None => auth_error("EMAIL_NOT_FOUND"),
        Some(account) if account.password != password => auth_error("INVALID_PASSWORD"),
        Some(account) => auth_success(account),
    }
}

/// Identity Toolkit `accounts:signUp` and `accounts:signInWithPassword`
/// backed by an in-memory account list.
pub async fn spawn_identity_toolkit() -> (String, SharedAuth) {
    let mock: SharedAuth = Arc::new(Mutex::new(AuthMock::default()));
    let router = Router::new()
        .route("/v1/accounts:signUp", post(sign_up))
        .route("/v1/accounts:signInWithPassword", post(sign_in_with_password))
        .with_state(mock.clone());
    (spawn_server(router).await, mock)
}

// --- Agent ---

/// Completion client that echoes the prompt back.
pub struct EchoClient;

#[async_trait]
impl ChatClient for EchoClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ChatError> {
        Ok(CompletionResponse {
            response: format!("Answer to: {}", request.prompt),
            model: Some(request.model),
            usage: None,
        })
    }

    fn get_base_url(&self) -> String {
        "echo".to_string()
    }
}

pub fn build_agent(
    client: Arc<dyn ChatClient>,
    store: Arc<dyn HistoryStore>,
    settings_dir: &tempfile::TempDir
) -> ChatAgent {
    let settings = SettingsManager::open(settings_dir.path().join("settings.json"))
        .unwrap()
        .shared();
    ChatAgent::from_parts(
        client,
        store,
        settings,
        Arc::new(PromptConfig::default()),
        GenerationParams::default()
    )
}
