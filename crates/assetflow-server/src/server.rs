//! Static file server with a live reload channel.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::{
    body::{to_bytes, Body},
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::services::ServeDir;

use crate::websocket::{reload_client_script, ReloadHub, ReloadMessage};

const RELOAD_PATH: &str = "/__reload";
const SCRIPT_PATH: &str = "/__reload.js";

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory to serve
    pub dist_root: PathBuf,

    /// Port to listen on; 0 picks a free one
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            dist_root: PathBuf::from("dist"),
            port: 3000,
            host: "127.0.0.1".to_string(),
            open: true,
        }
    }
}

/// Errors that can occur with the server or its watchers.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(std::io::Error),

    #[error("file watch error: {0}")]
    Watch(String),

    #[error("invalid watch pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

/// A bound development server, ready to serve.
pub struct DevServer {
    listener: TcpListener,
    addr: SocketAddr,
    router: Router,
    open: bool,
}

impl DevServer {
    /// Bind the listening socket. With port 0 the OS picks one; see
    /// [`DevServer::local_addr`].
    pub async fn bind(config: DevServerConfig, hub: ReloadHub) -> Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            addr,
            router: router(&config.dist_root, hub),
            open: config.open,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let url = self.url();
        tracing::info!("Serving at {}", url);

        if self.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Could not open browser: {}", e);
            }
        }

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)
    }
}

/// Routes: the reload socket, its client script, and `dist_root` for
/// everything else. HTML pages get the client script injected.
pub fn router(dist_root: &Path, hub: ReloadHub) -> Router {
    Router::new()
        .route(RELOAD_PATH, get(ws_handler))
        .route(SCRIPT_PATH, get(script_handler))
        .fallback_service(ServeDir::new(dist_root))
        .layer(middleware::from_fn(inject_reload_script))
        .with_state(hub)
}

/// Insert the client script tag before the last `</body>`, or append it
/// when the page has none.
pub fn inject_script(html: &str) -> String {
    let tag = format!("<script src=\"{}\"></script>", SCRIPT_PATH);

    match html.rfind("</body>") {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..index]);
            out.push_str(&tag);
            out.push_str(&html[index..]);
            out
        }
        None => format!("{}{}", html, tag),
    }
}

async fn inject_reload_script(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));

    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read response body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);

    Response::from_parts(parts, Body::from(html))
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<ReloadHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

async fn handle_ws(mut socket: WebSocket, hub: ReloadHub) {
    let mut rx = hub.subscribe();

    if send(&mut socket, ReloadMessage::Connected).await.is_err() {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(msg) => {
                if send(&mut socket, msg).await.is_err() {
                    break;
                }
            }
            // Missed messages were all reloads; one more covers them.
            Err(RecvError::Lagged(_)) => {
                if send(&mut socket, ReloadMessage::Reload).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn send(socket: &mut WebSocket, msg: ReloadMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(&msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        reload_client_script(RELOAD_PATH),
    )
}
