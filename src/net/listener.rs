//! TCP listener setup.
//!
//! # Responsibilities
//! - Bind to the configured address, resolving host names
//! - Apply per-connection socket options (keep-alive, no-delay)

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::config::ListenerConfig;
use crate::error::ServerError;

/// Bind to the configured address.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ServerError> {
    let bind_error = |source: std::io::Error| ServerError::Bind {
        address: config.bind_address.clone(),
        source,
    };

    // Host names go through the resolver; the first address that binds wins.
    let listener = TcpListener::bind(config.bind_address.as_str())
        .await
        .map_err(bind_error)?;
    let local_addr = listener.local_addr()?;

    tracing::info!(address = %local_addr, "Listener bound");
    Ok(listener)
}

/// Apply socket options to an accepted stream.
pub fn configure_stream(stream: &TcpStream, keep_alive: Option<Duration>) -> std::io::Result<()> {
    stream.set_nodelay(true)?;

    if let Some(period) = keep_alive {
        let socket = socket2::SockRef::from(stream);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(period)
            .with_interval(period);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            ..Default::default()
        };
        let listener = bind(&config).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn binds_host_name() {
        let config = ListenerConfig {
            bind_address: "localhost:0".into(),
            ..Default::default()
        };
        let listener = bind(&config).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn invalid_address_is_a_bind_error() {
        let config = ListenerConfig {
            bind_address: "not-an-address".into(),
            ..Default::default()
        };
        assert!(matches!(
            bind(&config).await,
            Err(ServerError::Bind { .. })
        ));
    }

    #[tokio::test]
    async fn keep_alive_applies_to_accepted_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await });
        let (stream, _) = listener.accept().await.unwrap();
        configure_stream(&stream, Some(Duration::from_secs(30))).unwrap();
        assert!(socket2::SockRef::from(&stream).keepalive().unwrap());
        client.await.unwrap().unwrap();
    }
}
