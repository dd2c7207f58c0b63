use async_trait::async_trait;
use chrono::{ DateTime, SecondsFormat, Utc };
use log::{ debug, info, warn };
use reqwest::{ Client as HttpClient, RequestBuilder, header::AUTHORIZATION };
use serde::{ Deserialize, Serialize };
use serde_json::{ json, Value as JsonValue };
use std::collections::HashMap;
use std::path::Path;
use std::time::{ Duration, Instant };
use tokio::sync::Mutex;
use yup_oauth2::{ read_service_account_key, ServiceAccountAuthenticator };

use super::{ sort_by_timestamp, HistoryError, HistoryStore };
use crate::cli::Args;
use crate::models::chat::{ format_user_key, ChatMessage, Role };
use crate::models::user::{ UserProfile, USERS_COLLECTION };

const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const TOKEN_REFRESH_AFTER: Duration = Duration::from_secs(50 * 60);

/// Where the bearer token for Firestore requests comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// No authorization header; for the local emulator.
    None,
    /// A fixed bearer token, e.g. a signed-in user's Firebase ID token.
    Static(String),
    /// Path to a service-account key exchanged for OAuth2 access tokens.
    ServiceAccount(String),
}

impl TokenSource {
    pub fn from_args(args: &Args) -> Self {
        if let Some(token) = args.firestore_token.as_ref().filter(|t| !t.trim().is_empty()) {
            return TokenSource::Static(token.clone());
        }
        if let Some(path) = args.firestore_sa_key_path.as_ref().filter(|p| !p.trim().is_empty()) {
            return TokenSource::ServiceAccount(path.clone());
        }
        TokenSource::None
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FirestoreValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integer_value: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_value: Option<String>,
}

impl FirestoreValue {
    fn string(value: &str) -> Self {
        Self {
            string_value: Some(value.to_string()),
            ..Default::default()
        }
    }

    fn integer(value: i64) -> Self {
        Self {
            integer_value: Some(JsonValue::String(value.to_string())),
            ..Default::default()
        }
    }

    fn timestamp(millis: i64) -> Self {
        let ts = DateTime::<Utc>
            ::from_timestamp_millis(millis)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            timestamp_value: Some(ts),
            ..Default::default()
        }
    }

    /// Epoch millis from either a `timestampValue` or an `integerValue`.
    fn as_millis(&self) -> Option<i64> {
        if let Some(ts) = &self.timestamp_value {
            return DateTime::parse_from_rfc3339(ts)
                .ok()
                .map(|dt| dt.timestamp_millis());
        }
        match self.integer_value.as_ref()? {
            JsonValue::String(s) => s.parse().ok(),
            JsonValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub(crate) struct FirestoreDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, FirestoreValue>,
}

#[derive(Deserialize, Debug)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<FirestoreDocument>,
}

impl FirestoreDocument {
    pub(crate) fn from_message(message: &ChatMessage) -> Self {
        let mut fields = HashMap::new();
        fields.insert("userId".to_string(), FirestoreValue::string(&message.user_id));
        fields.insert("role".to_string(), FirestoreValue::string(message.role.as_str()));
        fields.insert("text".to_string(), FirestoreValue::string(&message.text));
        fields.insert("timestamp".to_string(), FirestoreValue::timestamp(message.timestamp));
        Self { name: None, fields }
    }

    pub(crate) fn from_profile(profile: &UserProfile) -> Self {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), FirestoreValue::string(&profile.name));
        fields.insert("email".to_string(), FirestoreValue::string(&profile.email));
        fields.insert("createdAt".to_string(), FirestoreValue::integer(profile.created_at));
        Self { name: None, fields }
    }

    fn string_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key)?.string_value.as_deref()
    }

    /// Documents missing an owner, role or text are skipped; a missing
    /// timestamp reads as zero.
    pub(crate) fn to_message(&self) -> Option<ChatMessage> {
        let user_id = self.string_field("userId")?;
        let role = match self.string_field("role")?.parse::<Role>() {
            Ok(role) => role,
            Err(e) => {
                warn!("Skipping history document {:?}: {}", self.name, e);
                return None;
            }
        };
        let text = self.string_field("text")?;
        let timestamp = self.fields
            .get("timestamp")
            .and_then(|v| v.as_millis())
            .unwrap_or(0);

        Some(ChatMessage {
            user_id: user_id.to_string(),
            role,
            text: text.to_string(),
            timestamp,
        })
    }
}

/// Chat history in a Cloud Firestore collection, accessed through the v1
/// REST API.
pub struct FirestoreHistoryStore {
    http: HttpClient,
    base_url: String,
    project_id: String,
    collection: String,
    token_source: TokenSource,
    cached_token: Mutex<Option<(String, Instant)>>,
}

impl FirestoreHistoryStore {
    pub fn new(
        base_url: String,
        project_id: String,
        collection: String,
        token_source: TokenSource
    ) -> Result<Self, HistoryError> {
        if collection.trim().is_empty() {
            return Err(HistoryError::Config("history collection name is empty".to_string()));
        }
        let http = HttpClient::builder().build()?;
        info!(
            "Firestore history store: project={}, collection={}, base={}",
            project_id,
            collection,
            base_url
        );
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
            collection,
            token_source,
            cached_token: Mutex::new(None),
        })
    }

    fn documents_root(&self) -> String {
        format!("{}/v1/projects/{}/databases/(default)/documents", self.base_url, self.project_id)
    }

    async fn access_token(&self) -> Result<Option<String>, HistoryError> {
        match &self.token_source {
            TokenSource::None => Ok(None),
            TokenSource::Static(token) => Ok(Some(token.clone())),
            TokenSource::ServiceAccount(path) => {
                let mut cached = self.cached_token.lock().await;
                if let Some((token, fetched_at)) = cached.as_ref() {
                    if fetched_at.elapsed() < TOKEN_REFRESH_AFTER {
                        return Ok(Some(token.clone()));
                    }
                }
                let token = fetch_service_account_token(path).await?;
                *cached = Some((token.clone(), Instant::now()));
                Ok(Some(token))
            }
        }
    }

    async fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, HistoryError> {
        Ok(match self.access_token().await? {
            Some(token) => req.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => req,
        })
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response, HistoryError> {
        let resp = self.authorized(req).await?.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HistoryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    /// Writes (or overwrites) the `users/{uid}` profile document.
    pub async fn save_user_profile(&self, profile: &UserProfile) -> Result<(), HistoryError> {
        if profile.user_id.trim().is_empty() {
            return Err(HistoryError::Config("profile has no user id".to_string()));
        }
        let url = format!("{}/{}/{}", self.documents_root(), USERS_COLLECTION, profile.user_id);
        let doc = FirestoreDocument::from_profile(profile);
        self.send(self.http.patch(&url).json(&doc)).await?;
        info!("Stored profile for user {}", profile.user_id);
        Ok(())
    }

    async fn query_user_documents(
        &self,
        user_key: &str
    ) -> Result<Vec<FirestoreDocument>, HistoryError> {
        let url = format!("{}:runQuery", self.documents_root());
        let body =
            json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "userId" },
                        "op": "EQUAL",
                        "value": { "stringValue": format_user_key(user_key) }
                    }
                }
            }
        });

        let resp = self.send(self.http.post(&url).json(&body)).await?;
        let items: Vec<RunQueryItem> = resp.json().await.map_err(|e|
            HistoryError::Codec(e.to_string())
        )?;
        Ok(
            items
                .into_iter()
                .filter_map(|item| item.document)
                .collect()
        )
    }
}

async fn fetch_service_account_token(sa_key_path: &str) -> Result<String, HistoryError> {
    let key = read_service_account_key(Path::new(sa_key_path)).await.map_err(|e|
        HistoryError::Config(format!("Failed to load SA key from {}: {}", sa_key_path, e))
    )?;

    let auth = ServiceAccountAuthenticator::builder(key)
        .build().await
        .map_err(|e| HistoryError::Backend(e.to_string()))?;

    let token = auth
        .token(&[DATASTORE_SCOPE]).await
        .map_err(|e| HistoryError::Backend(e.to_string()))?;

    token
        .token()
        .map(|t| t.to_string())
        .ok_or_else(|| HistoryError::Backend("OAuth token was None".to_string()))
}

#[async_trait]
impl HistoryStore for FirestoreHistoryStore {
    async fn append(&self, message: &ChatMessage) -> Result<(), HistoryError> {
        let url = format!("{}/{}", self.documents_root(), self.collection);
        let doc = FirestoreDocument::from_message(message);
        let resp = self.send(self.http.post(&url).json(&doc)).await?;
        let created: FirestoreDocument = resp.json().await.map_err(|e|
            HistoryError::Codec(e.to_string())
        )?;
        debug!("History document created: {:?}", created.name);
        Ok(())
    }

    async fn list(&self, user_key: &str) -> Result<Vec<ChatMessage>, HistoryError> {
        let docs = self.query_user_documents(user_key).await?;
        let mut messages: Vec<ChatMessage> = docs
            .iter()
            .filter_map(|d| d.to_message())
            .collect();
        sort_by_timestamp(&mut messages);
        debug!("Found {} chat messages for {}", messages.len(), user_key);
        Ok(messages)
    }

    async fn delete_all(&self, user_key: &str) -> Result<usize, HistoryError> {
        let docs = self.query_user_documents(user_key).await?;
        let mut deleted = 0;
        for name in docs.iter().filter_map(|d| d.name.as_deref()) {
            let url = format!("{}/v1/{}", self.base_url, name);
            self.send(self.http.delete(&url)).await?;
            deleted += 1;
        }
        info!("Deleted {} history documents for {}", deleted, user_key);
        Ok(deleted)
    }

    fn backend_name(&self) -> &'static str {
        "firestore"
    }
}
