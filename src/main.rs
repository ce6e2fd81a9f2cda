//! Switchyard demo server.
//!
//! Serves a handful of routes that exercise the library: path variables,
//! a lazily initialized component, JSON bodies, a background task and a
//! websocket echo. Stops on Ctrl+C or SIGTERM, draining in-flight requests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use switchyard::config::{load_config, ServerConfig};
use switchyard::filter::{AccessLogFilter, RequestIdFilter};
use switchyard::observability::init_logging;
use switchyard::{
    handler_fn, shutdown_signal, task_fn, websocket_fn, Component, Request, Response, Server,
};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Pattern-routed HTTP application server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(short, long)]
    listen: Option<String>,

    /// Seconds to wait for in-flight requests at shutdown (0 waits forever)
    #[arg(long, default_value_t = 30)]
    shutdown_timeout: u64,
}

/// Counts greetings served.
#[derive(Default)]
struct Visits {
    count: AtomicU64,
}

impl Component for Visits {}

#[derive(Deserialize, Serialize)]
struct Note {
    text: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listener.bind_address = listen;
    }
    init_logging(&config.logging)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    let mut builder = Server::builder(config);
    builder
        .global_filter(RequestIdFilter)
        .global_filter(AccessLogFilter)
        .component("visits", Visits::default())
        .get(
            "/hello/:name",
            handler_fn(|req: Request| async move {
                if let Ok(visits) = req.env().resolve_as::<Visits>("visits") {
                    visits.count.fetch_add(1, Ordering::Relaxed);
                }
                Response::text(format!("hello, {}\n", req.var("name").unwrap_or("stranger")))
            }),
        )?
        .get(
            "/visits",
            handler_fn(|req: Request| async move {
                match req.env().resolve_as::<Visits>("visits") {
                    Ok(visits) => Response::json(&serde_json::json!({
                        "visits": visits.count.load(Ordering::Relaxed)
                    })),
                    Err(e) => Response::text(e.to_string())
                        .with_status(hyper::StatusCode::INTERNAL_SERVER_ERROR),
                }
            }),
        )?
        .post(
            "/notes",
            handler_fn(|req: Request| async move {
                match req.decode::<Note>() {
                    Ok(note) => {
                        req.env().start_task("/audit/notes", Box::new(note.text.clone()));
                        Response::json(&note).with_status(hyper::StatusCode::CREATED)
                    }
                    Err(e) => Response::text(e.to_string())
                        .with_status(hyper::StatusCode::BAD_REQUEST),
                }
            }),
        )?
        .get(
            "/static/*path",
            handler_fn(|req: Request| async move {
                Response::text(format!("would serve {}\n", req.var("path").unwrap_or_default()))
            }),
        )?
        .task(
            "/audit/:kind",
            task_fn(|value| async move {
                if let Ok(text) = value.downcast::<String>() {
                    tracing::info!(bytes = text.len(), "Audited note");
                }
            }),
        )?
        .websocket(
            "/ws/echo",
            websocket_fn(|mut conn| async move {
                while let Some(Ok(message)) = conn.socket.next().await {
                    if message.is_close() {
                        break;
                    }
                    if conn.socket.send(message).await.is_err() {
                        break;
                    }
                }
            }),
        )?;

    let server = builder.build()?;

    tokio::select! {
        result = server.start() => result?,
        _ = shutdown_signal() => {}
    }

    let drained = server
        .shutdown(Duration::from_secs(cli.shutdown_timeout))
        .await;
    tracing::info!(drained, "Shutdown complete");
    Ok(())
}
