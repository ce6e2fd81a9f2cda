//! WebSocket routes.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests
//! - Run the optional header checker before accepting
//! - Complete the handshake and hand the socket to the route's handler
//!
//! # Data Flow
//! ```text
//! GET + Upgrade: websocket
//!     → route lookup (websocket registry)
//!     → header checker (reject with its status)
//!     → 101 Switching Protocols
//!     → spawned task: upgraded IO → WebSocketStream → handler
//! ```
//!
//! # Design Decisions
//! - Upgraded connections are never counted by the connection tracker
//! - Handlers own the socket; closing it is up to them

use std::future::Future;
use std::sync::Arc;

use hyper::header::{
    HeaderMap, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper::{Method, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use crate::environment::{Env, Environment};
use crate::error::BoxError;
use crate::http::handler::BoxFuture;
use crate::http::response::Response;
use crate::pool::Pooled;
use crate::routing::{HandlerRegistry, PathVars};

/// Server side of an accepted WebSocket.
pub type WebSocket = WebSocketStream<TokioIo<Upgraded>>;

/// Checks handshake headers; `Err(status)` rejects the upgrade.
pub type HeaderChecker = Arc<dyn Fn(&HeaderMap) -> Result<(), StatusCode> + Send + Sync>;

/// An accepted WebSocket with the context of its handshake request.
pub struct WebSocketConn {
    pub socket: WebSocket,
    uri: Uri,
    headers: HeaderMap,
    vars: Pooled<PathVars>,
    env: Env,
}

impl WebSocketConn {
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Headers of the handshake request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn vars(&self) -> &PathVars {
        &self.vars
    }

    pub fn env(&self) -> &Env {
        &self.env
    }
}

/// Handler for a WebSocket route.
pub trait WebSocketHandler: Send + Sync {
    fn init(&self, _env: &dyn Environment) -> Result<(), BoxError> {
        Ok(())
    }

    fn serve<'a>(&'a self, conn: WebSocketConn) -> BoxFuture<'a, ()>;

    fn destroy(&self) {}
}

/// WebSocket handler built from an async closure. See [`websocket_fn`].
pub struct WebSocketFn<F> {
    f: F,
}

/// Wrap an async closure as a [`WebSocketHandler`].
pub fn websocket_fn<F, Fut>(f: F) -> WebSocketFn<F>
where
    F: Fn(WebSocketConn) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    WebSocketFn { f }
}

impl<F, Fut> WebSocketHandler for WebSocketFn<F>
where
    F: Fn(WebSocketConn) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn serve<'a>(&'a self, conn: WebSocketConn) -> BoxFuture<'a, ()> {
        Box::pin((self.f)(conn))
    }
}

/// WebSocket handlers keyed by path pattern.
pub type WebSocketRegistry = HandlerRegistry<dyn WebSocketHandler>;

impl Default for HandlerRegistry<dyn WebSocketHandler> {
    fn default() -> Self {
        Self::new("WEBSOCKET")
    }
}

/// Whether the request asks for a WebSocket upgrade.
pub fn is_upgrade_request(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::GET
        && header_has_token(headers, CONNECTION, "upgrade")
        && header_has_token(headers, UPGRADE, "websocket")
        && headers.contains_key(SEC_WEBSOCKET_KEY)
}

fn header_has_token(headers: &HeaderMap, name: hyper::header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Validate the handshake and build the `101 Switching Protocols` response.
pub(crate) fn handshake(
    headers: &HeaderMap,
    checker: Option<&HeaderChecker>,
) -> Result<Response, StatusCode> {
    if headers
        .get(SEC_WEBSOCKET_VERSION)
        .map_or(true, |v| v.as_bytes() != b"13")
    {
        return Err(StatusCode::BAD_REQUEST);
    }
    let key = headers
        .get(SEC_WEBSOCKET_KEY)
        .ok_or(StatusCode::BAD_REQUEST)?;
    if let Some(checker) = checker {
        checker(headers)?;
    }

    let accept = derive_accept_key(key.as_bytes());
    Ok(Response::new(StatusCode::SWITCHING_PROTOCOLS)
        .with_header(CONNECTION, "Upgrade")
        .with_header(UPGRADE, "websocket")
        .with_header(SEC_WEBSOCKET_ACCEPT, &accept))
}

/// Finish the upgrade in the background and run `handler` on the socket.
pub(crate) fn spawn_session(
    handler: Arc<dyn WebSocketHandler>,
    on_upgrade: OnUpgrade,
    uri: Uri,
    headers: HeaderMap,
    vars: Pooled<PathVars>,
    env: Env,
) {
    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                warn!(error = %e, path = %uri.path(), "WebSocket upgrade failed");
                return;
            }
        };
        let socket = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
        debug!(path = %uri.path(), "WebSocket session started");

        let conn = WebSocketConn {
            socket,
            uri,
            headers,
            vars,
            env,
        };
        handler.serve(conn).await;
    });
}
