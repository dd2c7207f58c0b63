pub mod api;
pub mod signing;
pub mod tls;
pub mod websocket;

use crate::agent::ChatAgent;
use crate::cli::Args;
use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    agent: Arc<ChatAgent>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, agent: Arc<ChatAgent>, args: Args) -> Self {
        Self { addr, agent, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let tls_config = tls::tls_from_args(&self.args)?;
        if tls_config.is_some() &&
            rustls::crypto::ring::default_provider().install_default().is_err()
        {
            warn!("A rustls crypto provider was already installed");
        }

        if let Some(http_port) = self.args.http_port {
            self.start_http_server(http_port).await?;
        } else {
            info!("HTTP_PORT not set; HTTP API disabled");
        }

        websocket::start_ws_server(
            &self.addr,
            self.agent.clone(),
            self.args.server_secret(),
            tls_config
        ).await
    }

    async fn start_http_server(&self, http_port: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        let tls_paths = match (&self.args.tls_cert_path, &self.args.tls_key_path) {
            (Some(cert), Some(key)) if self.args.tls_requested() => Some((cert.clone(), key.clone())),
            _ => None,
        };
        api::start_http_server(
            http_port,
            self.agent.clone(),
            self.args.server_secret(),
            tls_paths
        ).await
    }
}
