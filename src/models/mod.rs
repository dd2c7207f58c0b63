pub mod chat;
pub mod user;
pub mod websocket;
