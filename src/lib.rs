pub mod agent;
pub mod auth;
pub mod cli;
pub mod config;
pub mod console;
pub mod conversation;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;

use agent::ChatAgent;
use auth::FirebaseAuthClient;
use cli::{ Args, Command };
use log::{ info, warn };
use server::Server;
use std::error::Error;
use std::sync::Arc;
use tokio::io::BufReader;

fn log_configuration(args: &Args) {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("HTTP Port: {:?}", args.http_port);
    info!("History Store Type: {}", args.history_type);
    info!("History Collection: {}", args.history_collection);
    if args.history_type.eq_ignore_ascii_case("redis") {
        info!("History Store Host: {}", args.history_host);
    }
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or(llm::DEFAULT_GROQ_BASE_URL));
    info!("Settings Path: {}", args.settings_path);
    info!("Prompts Path: {}", args.prompts_path);
    info!("Request Signing: {}", args.server_secret().is_some());
    info!("TLS: {}", args.tls_requested());
    info!("-------------------------");
}

/// Resolves who the console chats as: an explicit user id, or a Firebase
/// account signed in (or registered) with email and password. The returned
/// token, when present, authorises Firestore requests.
async fn console_identity(
    args: &Args,
    user_id: Option<String>,
    email: Option<String>,
    password: Option<String>,
    register: bool,
    name: Option<String>
) -> Result<(String, Option<String>), Box<dyn Error + Send + Sync>> {
    if let Some(uid) = user_id.filter(|u| !u.trim().is_empty()) {
        return Ok((uid, None));
    }
    let (email, password) = match (email, password) {
        (Some(e), Some(p)) => (e, p),
        _ => {
            return Err("chat needs --user-id, or --email and --password".into());
        }
    };
    let auth = FirebaseAuthClient::new(
        args.firebase_api_key.clone(),
        Some(args.firebase_auth_base_url.clone())
    )?;
    let project_id = args.firestore_project_id.as_deref().filter(|p| !p.trim().is_empty());
    let session = if register {
        let name = name.unwrap_or_default();
        match project_id {
            Some(project_id) =>
                auth.register(
                    &email,
                    &password,
                    &name,
                    &args.firestore_base_url,
                    project_id
                ).await?,
            None => {
                warn!("FIRESTORE_PROJECT_ID not set, registering without a user profile");
                auth.sign_up(&email, &password, Some(&name)).await?
            }
        }
    } else {
        auth.sign_in(&email, &password).await?
    };
    Ok((session.user_id, Some(session.id_token)))
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match args.command() {
        Command::Models => {
            print!("{}", console::render_catalog());
            Ok(())
        }
        Command::Chat { user_id, email, password, register, name } => {
            let (uid, token) = console_identity(
                &args,
                user_id,
                email,
                password,
                register,
                name
            ).await?;
            let agent = ChatAgent::new(&args, token).await?;
            info!("Chatting as {} (history: {})", uid, agent.history_backend());
            let stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = tokio::io::stdout();
            console::run_console(&agent, &uid, stdin, &mut stdout).await?;
            Ok(())
        }
        Command::Serve => {
            log_configuration(&args);
            let agent = Arc::new(ChatAgent::new(&args, None).await?);
            let addr = args.server_addr.clone();
            info!("Starting server on: {}", addr);
            let server = Server::new(addr, agent, args.clone());
            server.run().await
        }
    }
}
