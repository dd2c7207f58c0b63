use serde::{ Deserialize, Serialize };

/// Collection holding one profile document per registered account.
pub const USERS_COLLECTION: &str = "users";

/// Profile stored at `users/{uid}` when an account is registered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(skip)]
    pub user_id: String,
    pub name: String,
    pub email: String,
    /// Epoch milliseconds.
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}
