use crate::agent::ChatAgent;
use crate::conversation::Conversation;
use crate::models::websocket::{ ClientMessage, ServerMessage };
use crate::server::signing;

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::net::TcpListener;

use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ ErrorResponse, Request, Response };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };

use futures::{ Sink, SinkExt, StreamExt };
use governor::{ clock::DefaultClock, state::{ InMemoryState, NotKeyed }, Quota, RateLimiter };
use lazy_static::lazy_static;
use log::{ debug, error, info, warn };
use rustls::ServerConfig;
use url::form_urlencoded;
use uuid::Uuid;

const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
const CONNECTIONS_PER_SECOND: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(CONNECTIONS_PER_SECOND));
}

/// Checks the upgrade request's query string and returns the user id the
/// connection chats as.
pub fn authorize_handshake(
    query: &str,
    secret: Option<&str>
) -> Result<String, (StatusCode, &'static str)> {
    let params: HashMap<String, String> = form_urlencoded
        ::parse(query.as_bytes())
        .into_owned()
        .collect();

    if let Some(secret) = secret.filter(|s| !s.is_empty()) {
        let ts = params
            .get("ts")
            .or_else(|| params.get("X-Api-Ts"))
            .map(|s| s.as_str());
        let sig = params
            .get("sig")
            .or_else(|| params.get("X-Api-Sign"))
            .map(|s| s.as_str());
        signing::verify(secret, ts, sig).map_err(|e| (StatusCode::UNAUTHORIZED, e.reason()))?;
    }

    params
        .get("user_id")
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or((StatusCode::BAD_REQUEST, "missing user_id"))
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut res = ErrorResponse::new(Some(reason.to_string()));
    *res.status_mut() = status;
    res
}

pub async fn start_ws_server(
    addr: &str,
    agent: Arc<ChatAgent>,
    api_key: Option<String>,
    tls_config: Option<Arc<ServerConfig>>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    let protocol = if tls_config.is_some() { "wss" } else { "ws" };
    info!("{} server listening on: {}", protocol.to_uppercase(), addr);

    let tls_acceptor = tls_config.map(TlsAcceptor::from);

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let agent_clone = Arc::clone(&agent);
        let required_api_key = api_key.clone();
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, agent_clone, required_api_key).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, agent_clone, required_api_key).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    agent: Arc<ChatAgent>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let mut user_id: Option<String> = None;
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let query = req.uri().query().unwrap_or("");
        match authorize_handshake(query, required_api_key.as_deref()) {
            Ok(uid) => {
                user_id = Some(uid);
                Ok(response)
            }
            Err((status, reason)) => {
                warn!("Rejected handshake from {}: {}", peer, reason);
                Err(reject(status, reason))
            }
        }
    };

    let ws = match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            return Err(Box::new(e));
        }
    };

    match user_id {
        Some(uid) => {
            handle_connection(peer, ws, agent, uid).await;
            Ok(())
        }
        None => Err("handshake completed without a user id".into()),
    }
}

async fn send_message<S>(tx: &mut S, peer: SocketAddr, message: &ServerMessage) -> bool
    where S: Sink<Message> + Unpin, S::Error: Display
{
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to encode message for {}: {}", peer, e);
            return false;
        }
    };
    match tx.send(Message::Text(json)).await {
        Ok(()) => true,
        Err(e) => {
            error!("Error sending message to {}: {}", peer, e);
            false
        }
    }
}

fn history_message(conversation: &Conversation) -> ServerMessage {
    ServerMessage::History {
        messages: conversation.messages().to_vec(),
    }
}

/// Runs one chat client to completion. The connection owns its
/// conversation, so its messages are answered strictly in arrival order.
pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    agent: Arc<ChatAgent>,
    user_id: String
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    let connection_id = Uuid::new_v4();
    info!("New WebSocket connection {} from {} as {}", connection_id, peer, user_id);

    let (mut tx, mut rx) = websocket.split();
    let mut conversation = Conversation::new(&user_id);
    agent.load_history(&mut conversation).await;
    if !send_message(&mut tx, peer, &history_message(&conversation)).await {
        return;
    }

    while let Some(msg) = rx.next().await {
        let message = match msg {
            Ok(message) => message,
            Err(e) => {
                match e {
                    | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::Protocol(_)
                    | tokio_tungstenite::tungstenite::Error::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                        io_err.kind() == std::io::ErrorKind::ConnectionReset
                    => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    tokio_tungstenite::tungstenite::Error::Capacity(ref cap_err) => {
                        error!("WebSocket capacity error for {}: {}", peer, cap_err);
                        let error_msg = ServerMessage::Error {
                            message: "Server capacity error".to_string(),
                        };
                        send_message(&mut tx, peer, &error_msg).await;
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        };

        if message.len() > MAX_MESSAGE_SIZE {
            warn!(
                "Message from {} exceeds size limit ({} > {})",
                peer,
                message.len(),
                MAX_MESSAGE_SIZE
            );
            let error_msg = ServerMessage::Error {
                message: "Message too large".to_string(),
            };
            send_message(&mut tx, peer, &error_msg).await;
            break;
        }

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => {
                info!("Received close frame from {}", peer);
                break;
            }
            Message::Ping(ping_data) => {
                if tx.send(Message::Pong(ping_data)).await.is_err() {
                    error!("Failed to send pong to {}", peer);
                    break;
                }
                continue;
            }
            Message::Binary(_) => {
                warn!("Ignoring binary message from {}", peer);
                continue;
            }
            Message::Pong(_) | Message::Frame(_) => {
                continue;
            }
        };

        let replies = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(client_message) => {
                dispatch(&agent, &mut conversation, client_message, &mut tx, peer).await
            }
            Err(e) => {
                error!("Failed to parse message from {}: {}", peer, e);
                vec![ServerMessage::Error {
                    message: format!("Failed to parse message: {}", e),
                }]
            }
        };

        for reply in &replies {
            if !send_message(&mut tx, peer, reply).await {
                info!("WebSocket connection closed for {}", peer);
                return;
            }
        }
    }
    info!("WebSocket connection {} closed for {} ({})", connection_id, peer, user_id);
}

async fn dispatch<S>(
    agent: &ChatAgent,
    conversation: &mut Conversation,
    message: ClientMessage,
    tx: &mut S,
    peer: SocketAddr
) -> Vec<ServerMessage>
    where S: Sink<Message> + Unpin, S::Error: Display
{
    match message {
        ClientMessage::Chat { content, model } => {
            if content.trim().is_empty() {
                return vec![ServerMessage::Error {
                    message: "Message is empty".to_string(),
                }];
            }
            send_message(tx, peer, &ServerMessage::Processing).await;
            debug!("Chat message from {} ({} chars)", peer, content.len());
            match agent.submit(conversation, &content, model.as_deref()).await {
                Ok(reply) =>
                    vec![ServerMessage::Response {
                        content: reply.text,
                        timestamp: reply.timestamp,
                    }],
                Err(e) => vec![ServerMessage::Error { message: e.to_string() }],
            }
        }
        ClientMessage::History => {
            agent.load_history(conversation).await;
            vec![history_message(conversation)]
        }
        ClientMessage::NewChat => {
            agent.new_chat(conversation).await;
            vec![history_message(conversation)]
        }
        ClientMessage::DeleteAll => {
            let success = agent.delete_all_chats(conversation).await;
            vec![ServerMessage::Deleted { success }, history_message(conversation)]
        }
    }
}
