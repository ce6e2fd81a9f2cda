//! WebSocket routes through a running server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hyper::StatusCode;
use switchyard::websocket_fn;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

mod common;
use common::{builder, spawn};

fn echo_server() -> switchyard::ServerBuilder {
    let mut b = builder();
    b.websocket(
        "/ws/:room",
        websocket_fn(|mut conn| async move {
            let room = conn.vars().get("room").unwrap_or_default().to_string();
            while let Some(Ok(message)) = conn.socket.next().await {
                match message {
                    Message::Text(text) => {
                        let reply = format!("{room}: {}", text.as_str());
                        if conn.socket.send(Message::text(reply)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }),
    )
    .unwrap();
    b
}

#[tokio::test]
async fn websocket_echo_with_path_vars() {
    let server = spawn(echo_server()).await;

    let url = format!("ws://{}/ws/lobby", server.addr);
    let (mut socket, response) = connect_async(url).await.unwrap();
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

    socket.send(Message::text("hi")).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(1), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply.into_text().unwrap().as_str(), "lobby: hi");

    // Upgraded connections do not count against shutdown.
    assert_eq!(server.server.tracked_connections(), 0);
    assert!(server.server.shutdown(Duration::ZERO).await);
}

#[tokio::test]
async fn header_checker_rejects_handshake() {
    let mut b = echo_server();
    b.websocket_checker(|headers| {
        if headers.contains_key("authorization") {
            Ok(())
        } else {
            Err(StatusCode::FORBIDDEN)
        }
    });
    let server = spawn(b).await;

    let url = format!("ws://{}/ws/lobby", server.addr);
    match connect_async(url.as_str()).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::FORBIDDEN),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }

    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("authorization", "Bearer t".parse().unwrap());
    assert!(connect_async(request).await.is_ok());
}

#[tokio::test]
async fn upgrade_on_plain_route_is_served_as_http() {
    let mut b = builder();
    b.get(
        "/plain",
        switchyard::handler_fn(|_req| async { switchyard::Response::text("plain") }),
    )
    .unwrap();
    let server = spawn(b).await;

    let url = format!("ws://{}/plain", server.addr);
    match connect_async(url).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::OK),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}
