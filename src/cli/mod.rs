use clap::{ Parser, Subcommand };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    // --- History Store Args ---
    /// History chat store type (firestore, redis, memory)
    #[arg(long, env = "HISTORY_TYPE", default_value = "firestore")]
    pub history_type: String,

    /// Redis endpoint for the redis history store (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis history keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "history:")]
    pub history_redis_prefix: String,

    /// Collection holding one document per chat message.
    #[arg(long, env = "HISTORY_COLLECTION", default_value = "chat_history")]
    pub history_collection: String,

    // --- Firestore Args ---
    #[arg(long, env = "FIRESTORE_PROJECT_ID")]
    pub firestore_project_id: Option<String>,

    /// Firestore REST root; point it at the emulator for local runs.
    #[arg(long, env = "FIRESTORE_BASE_URL", default_value = "https://firestore.googleapis.com")]
    pub firestore_base_url: String,

    /// Static bearer token for Firestore requests.
    #[arg(long, env = "FIRESTORE_TOKEN")]
    pub firestore_token: Option<String>,

    /// Path to a service-account key used to mint Firestore access tokens.
    #[arg(long, env = "FIRESTORE_SA_KEY_PATH")]
    pub firestore_sa_key_path: Option<String>,

    // --- Chat LLM Provider Args ---
    /// API Key for the Groq completion endpoint
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Base URL of the OpenAI-compatible completion API (default: https://api.groq.com/openai/v1)
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "200")]
    pub chat_max_tokens: u32,

    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.5")]
    pub chat_temperature: f32,

    #[arg(long, env = "CHAT_TOP_P", default_value = "0.7")]
    pub chat_top_p: f32,

    // --- Firebase Auth Args ---
    /// Web API key of the Firebase project, used for email/password sign-in.
    #[arg(long, env = "FIREBASE_API_KEY")]
    pub firebase_api_key: Option<String>,

    #[arg(
        long,
        env = "FIREBASE_AUTH_BASE_URL",
        default_value = "https://identitytoolkit.googleapis.com"
    )]
    pub firebase_auth_base_url: String,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Path to the JSON file holding font size and selected model.
    #[arg(long, env = "SETTINGS_PATH", default_value = "lawassist_settings.json")]
    pub settings_path: String,

    /// Path to the prompt configuration file.
    #[arg(long, env = "PROMPTS_PATH", default_value = "json/prompts.json")]
    pub prompts_path: String,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Port for the HTTP API. The API is not started when unset.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Optional shared secret. When set, WebSocket clients and API callers must sign requests with it.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the WebSocket server (and the HTTP API when --http-port is set)
    Serve,
    /// Interactive chat in the terminal
    Chat {
        /// Chat as this user id without signing in
        #[arg(long, env = "LAWASSIST_USER_ID")]
        user_id: Option<String>,

        /// Sign in (or register) with email and password through Firebase Auth
        #[arg(long, env = "LAWASSIST_EMAIL")]
        email: Option<String>,

        #[arg(long, env = "LAWASSIST_PASSWORD")]
        password: Option<String>,

        /// Create the account instead of signing in
        #[arg(long, default_value = "false")]
        register: bool,

        /// Display name stored on a newly registered account
        #[arg(long)]
        name: Option<String>,
    },
    /// Print the model catalog
    Models,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    pub fn tls_requested(&self) -> bool {
        self.enable_tls && self.tls_cert_path.is_some() && self.tls_key_path.is_some()
    }

    pub fn server_secret(&self) -> Option<String> {
        self.server_api_key.clone().filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_the_server_against_firestore() {
        let args = Args::try_parse_from(["lawassist"]).unwrap();
        assert_eq!(args.command(), Command::Serve);
        assert_eq!(args.history_collection, "chat_history");
        assert_eq!(args.chat_max_tokens, 200);
        assert!(!args.tls_requested());
    }

    #[test]
    fn chat_subcommand_takes_credentials() {
        let args = Args::try_parse_from([
            "lawassist",
            "--history-type",
            "memory",
            "chat",
            "--user-id",
            "u1",
        ]).unwrap();
        assert_eq!(args.history_type, "memory");
        match args.command() {
            Command::Chat { user_id, register, .. } => {
                assert_eq!(user_id.as_deref(), Some("u1"));
                assert!(!register);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn empty_secret_disables_signing() {
        let args = Args::try_parse_from(["lawassist", "--server-api-key", ""]).unwrap();
        assert!(args.server_secret().is_none());
    }
}
