use log::{ info, warn };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use crate::history::{ FirestoreHistoryStore, HistoryError, TokenSource };
use crate::models::chat::now_millis;
use crate::models::user::{ UserProfile, USERS_COLLECTION };

pub const DEFAULT_AUTH_BASE_URL: &str = "https://identitytoolkit.googleapis.com";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("email and password are required")]
    MissingCredentials,
    #[error("FIREBASE_API_KEY is not configured")]
    MissingApiKey,
    #[error("authentication rejected: {0}")]
    Rejected(String),
    #[error("authentication request failed: {0}")]
    Network(String),
    #[error("unexpected authentication response: {0}")]
    Decode(String),
    #[error("user profile could not be stored: {0}")]
    Profile(#[from] HistoryError),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AuthError::Decode(err.to_string())
        } else {
            AuthError::Network(err.to_string())
        }
    }
}

/// A signed-in Firebase user. `id_token` doubles as the Firestore bearer.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub user_id: String,
    pub id_token: String,
    pub email: String,
}

impl AuthSession {
    pub fn profile(&self, name: &str) -> UserProfile {
        UserProfile {
            user_id: self.user_id.clone(),
            name: name.trim().to_string(),
            email: self.email.clone(),
            created_at: now_millis(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    id_token: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Email/password accounts through the Identity Toolkit REST API.
pub struct FirebaseAuthClient {
    http: HttpClient,
    api_key: String,
    base_url: String,
}

impl FirebaseAuthClient {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Result<Self, AuthError> {
        let api_key = api_key.filter(|k| !k.trim().is_empty()).ok_or(AuthError::MissingApiKey)?;
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_AUTH_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http: HttpClient::new(),
            api_key,
            base_url,
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/v1/accounts:{}?key={}", self.base_url, action, self.api_key)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>
    ) -> Result<AuthSession, AuthError> {
        let session = self.password_call("signUp", email, password, display_name).await?;
        info!("Registered Firebase user {}", session.user_id);
        Ok(session)
    }

    /// Creates the account, then writes its `users/{uid}` profile to
    /// Firestore authorised by the new account's own ID token.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        firestore_base_url: &str,
        project_id: &str
    ) -> Result<AuthSession, AuthError> {
        let session = self.sign_up(email, password, Some(name)).await?;
        let profiles = FirestoreHistoryStore::new(
            firestore_base_url.to_string(),
            project_id.to_string(),
            USERS_COLLECTION.to_string(),
            TokenSource::Static(session.id_token.clone())
        )?;
        profiles.save_user_profile(&session.profile(name)).await?;
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let session = self.password_call("signInWithPassword", email, password, None).await?;
        info!("Signed in Firebase user {}", session.user_id);
        Ok(session)
    }

    async fn password_call(
        &self,
        action: &str,
        email: &str,
        password: &str,
        display_name: Option<&str>
    ) -> Result<AuthSession, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let body = PasswordRequest {
            email,
            password,
            display_name: display_name.filter(|n| !n.trim().is_empty()),
            return_secure_token: true,
        };
        let resp = self.http.post(self.endpoint(action)).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let reason = serde_json
                ::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            warn!("Firebase {} failed: {}", action, reason);
            return Err(AuthError::Rejected(reason));
        }

        let parsed: PasswordResponse = serde_json
            ::from_str(&text)
            .map_err(|e| AuthError::Decode(e.to_string()))?;
        Ok(AuthSession {
            user_id: parsed.local_id,
            id_token: parsed.id_token,
            email: parsed.email.unwrap_or_else(|| email.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_required() {
        assert!(matches!(FirebaseAuthClient::new(None, None), Err(AuthError::MissingApiKey)));
        assert!(matches!(FirebaseAuthClient::new(Some(" ".into()), None), Err(AuthError::MissingApiKey)));
    }

    #[test]
    fn endpoint_carries_action_and_key() {
        let client = FirebaseAuthClient::new(
            Some("k1".into()),
            Some("http://localhost:9099/identitytoolkit.googleapis.com/".into())
        ).unwrap();
        assert_eq!(
            client.endpoint("signUp"),
            "http://localhost:9099/identitytoolkit.googleapis.com/v1/accounts:signUp?key=k1"
        );
    }

    #[tokio::test]
    async fn blank_credentials_fail_without_a_request() {
        let client = FirebaseAuthClient::new(Some("k".into()), Some("http://127.0.0.1:1".into())).unwrap();
        let err = client.sign_in("  ", "secret").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));
    }

    #[test]
    fn sign_up_body_uses_identity_toolkit_names() {
        let body = PasswordRequest {
            email: "a@b.in",
            password: "pw",
            display_name: Some("Asha"),
            return_secure_token: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["displayName"], "Asha");
        assert_eq!(json["returnSecureToken"], true);
    }
}
