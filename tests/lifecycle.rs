//! Startup, graceful shutdown and teardown.

use std::time::{Duration, Instant};

use hyper::StatusCode;
use switchyard::error::{ServerError, StartupStage, TaskError};
use switchyard::http::{BoxFuture, TaskValue, WebSocketConn};
use switchyard::{
    handler_fn, task_fn, BoxError, Component, ComponentError, ComponentStatus, Environment,
    Filter, Handler, LifecycleState, Next, Request, Response, TaskHandler, WebSocketHandler,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

mod common;
use common::{builder, client, raw_request, spawn, wait_until, Recorder};

/// Records its own init and destroy calls under every role it can play.
#[derive(Clone)]
struct Hooked {
    name: &'static str,
    recorder: Recorder,
}

impl Hooked {
    fn new(name: &'static str, recorder: &Recorder) -> Self {
        Self {
            name,
            recorder: recorder.clone(),
        }
    }
}

impl Filter for Hooked {
    fn init(&self, _env: &dyn Environment) -> Result<(), BoxError> {
        self.recorder.push(format!("init:{}", self.name));
        Ok(())
    }

    fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        next.run(req)
    }

    fn destroy(&self) {
        self.recorder.push(format!("destroy:{}", self.name));
    }
}

impl Handler for Hooked {
    fn init(&self, _env: &dyn Environment) -> Result<(), BoxError> {
        self.recorder.push(format!("init:{}", self.name));
        Ok(())
    }

    fn handle<'a>(&'a self, _req: Request) -> BoxFuture<'a, Response> {
        Box::pin(async { Response::text("hooked") })
    }

    fn destroy(&self) {
        self.recorder.push(format!("destroy:{}", self.name));
    }
}

impl TaskHandler for Hooked {
    fn init(&self, _env: &dyn Environment) -> Result<(), BoxError> {
        self.recorder.push(format!("init:{}", self.name));
        Ok(())
    }

    fn run<'a>(&'a self, _env: &'a dyn Environment, _value: TaskValue) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn destroy(&self) {
        self.recorder.push(format!("destroy:{}", self.name));
    }
}

impl WebSocketHandler for Hooked {
    fn init(&self, _env: &dyn Environment) -> Result<(), BoxError> {
        self.recorder.push(format!("init:{}", self.name));
        Ok(())
    }

    fn serve<'a>(&'a self, _conn: WebSocketConn) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn destroy(&self) {
        self.recorder.push(format!("destroy:{}", self.name));
    }
}

/// Component that resolves its dependencies during init.
struct Service {
    name: &'static str,
    deps: Vec<&'static str>,
    fail: bool,
    recorder: Recorder,
}

impl Service {
    fn new(name: &'static str, deps: &[&'static str], recorder: &Recorder) -> Self {
        Self {
            name,
            deps: deps.to_vec(),
            fail: false,
            recorder: recorder.clone(),
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl Component for Service {
    fn init(&self, env: &dyn Environment) -> Result<(), BoxError> {
        for dep in &self.deps {
            env.resolve(dep)?;
        }
        if self.fail {
            return Err(format!("{} refused to start", self.name).into());
        }
        self.recorder.push(format!("init:{}", self.name));
        Ok(())
    }

    fn destroy(&self) {
        self.recorder.push(format!("destroy:{}", self.name));
    }
}

fn slow_handler(delay: Duration) -> impl Handler + 'static {
    handler_fn(move |_req| async move {
        tokio::time::sleep(delay).await;
        Response::text("slow")
    })
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_requests() {
    let mut b = builder();
    b.get("/slow", slow_handler(Duration::from_millis(300)))
        .unwrap();
    let server = spawn(b).await;

    let request = tokio::spawn({
        let url = server.url("/slow");
        async move { client().get(url).send().await.unwrap() }
    });
    assert!(wait_until(|| server.server.tracked_connections() == 1).await);

    let started = Instant::now();
    assert!(server.server.shutdown(Duration::ZERO).await);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(server.server.state(), LifecycleState::Destroyed);

    let res = request.await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["connection"], "close");

    tokio::time::timeout(Duration::from_secs(1), server.accept_loop)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn shutdown_timeout_reports_undrained() {
    let mut b = builder();
    b.get("/slow", slow_handler(Duration::from_secs(3)))
        .unwrap();
    let server = spawn(b).await;

    tokio::spawn({
        let url = server.url("/slow");
        async move {
            let _ = client().get(url).send().await;
        }
    });
    assert!(wait_until(|| server.server.tracked_connections() == 1).await);

    assert!(!server.server.shutdown(Duration::from_millis(100)).await);
    assert_eq!(server.server.tracked_connections(), 1);
}

#[tokio::test]
async fn second_shutdown_is_refused() {
    let server = spawn(builder()).await;
    assert!(server.server.shutdown(Duration::from_secs(1)).await);
    assert!(!server.server.shutdown(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn hijacked_connections_are_not_waited_for() {
    let mut b = builder();
    b.get(
        "/hijack",
        handler_fn(|mut req: Request| async move {
            let Some(upgrade) = req.hijack() else {
                return Response::status_page(StatusCode::BAD_REQUEST);
            };
            tokio::spawn(async move {
                if let Ok(upgraded) = upgrade.await {
                    // Hold the raw connection well past the shutdown below.
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    drop(upgraded);
                }
            });
            Response::new(StatusCode::SWITCHING_PROTOCOLS)
                .with_header(hyper::header::CONNECTION, "upgrade")
                .with_header(hyper::header::UPGRADE, "raw")
        }),
    )
    .unwrap();
    let server = spawn(b).await;

    let (mut stream, head) = raw_request(
        server.addr,
        "GET /hijack HTTP/1.1\r\nHost: localhost\r\nConnection: upgrade\r\nUpgrade: raw\r\n\r\n",
    )
    .await;
    assert!(head.starts_with("HTTP/1.1 101"), "{head}");
    assert!(wait_until(|| server.server.tracked_connections() == 0).await);

    let drained = tokio::time::timeout(
        Duration::from_secs(1),
        server.server.shutdown(Duration::ZERO),
    )
    .await
    .unwrap();
    assert!(drained);

    // Shutdown left the hijacked socket open: a read stalls instead of seeing EOF.
    stream.write_all(b"still here").await.unwrap();
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await;
    assert!(read.is_err(), "hijacked connection was closed: {read:?}");
}

#[tokio::test]
async fn teardown_runs_in_reverse_order() {
    let recorder = Recorder::default();
    let mut b = builder();
    b.eager_component("db", Service::new("db", &[], &recorder))
        .eager_component("cache", Service::new("cache", &["db"], &recorder))
        .global_filter(Hooked::new("global", &recorder))
        .get("/a", Hooked::new("handler", &recorder))
        .unwrap()
        .route_filters(
            "/a",
            [std::sync::Arc::new(Hooked::new("route", &recorder)) as std::sync::Arc<dyn Filter>],
        )
        .unwrap()
        .task("/jobs/:id", Hooked::new("task", &recorder))
        .unwrap()
        .websocket("/ws", Hooked::new("websocket", &recorder))
        .unwrap()
        .on_start("ready", {
            let recorder = recorder.clone();
            move |_env| {
                recorder.push("init:ready");
                Ok(())
            }
        });
    let server = spawn(b).await;

    assert_eq!(
        recorder.events(),
        [
            "init:db",
            "init:cache",
            "init:global",
            "init:route",
            "init:handler",
            "init:task",
            "init:websocket",
            "init:ready",
        ]
    );

    assert!(server.server.shutdown(Duration::from_secs(1)).await);
    let events = recorder.events();
    assert_eq!(
        &events[8..],
        [
            "destroy:global",
            "destroy:handler",
            "destroy:route",
            "destroy:task",
            "destroy:websocket",
            "destroy:cache",
            "destroy:db",
        ]
    );
}

#[tokio::test]
async fn lazy_components_initialize_on_first_use() {
    let recorder = Recorder::default();
    let mut b = builder();
    b.component("db", Service::new("db", &[], &recorder))
        .component("users", Service::new("users", &["db"], &recorder))
        .component("loop-a", Service::new("loop-a", &["loop-b"], &recorder))
        .component("loop-b", Service::new("loop-b", &["loop-a"], &recorder))
        .get(
            "/resolve/:name",
            handler_fn(|req: Request| async move {
                let name = req.var("name").unwrap_or_default().to_string();
                match req.env().resolve(&name) {
                    Ok(_) => Response::text("ok"),
                    Err(ComponentError::NotFound(_)) => Response::status_page(StatusCode::NOT_FOUND),
                    Err(ComponentError::CyclicDependency(at)) => {
                        Response::text(format!("cycle at {at}")).with_status(StatusCode::CONFLICT)
                    }
                    Err(e) => Response::text(e.to_string())
                        .with_status(StatusCode::INTERNAL_SERVER_ERROR),
                }
            }),
        )
        .unwrap();
    let server = spawn(b).await;
    let client = client();

    assert_eq!(server.server.component_status("users"), ComponentStatus::Registered);
    assert!(recorder.events().is_empty());

    let res = client.get(server.url("/resolve/users")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(recorder.events(), ["init:db", "init:users"]);
    assert_eq!(server.server.component_status("users"), ComponentStatus::Initialized);

    // Second resolve does not init again.
    client.get(server.url("/resolve/users")).send().await.unwrap();
    assert_eq!(recorder.events().len(), 2);

    let res = client.get(server.url("/resolve/ghost")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let res = client.get(server.url("/resolve/loop-a")).send().await.unwrap();
    assert_eq!(res.status(), 409);
}

#[tokio::test]
async fn eager_component_failure_aborts_startup() {
    let recorder = Recorder::default();
    let mut b = builder();
    b.eager_component("db", Service::new("db", &[], &recorder))
        .eager_component("mail", Service::new("mail", &[], &recorder).failing());

    match b.build() {
        Err(ServerError::Startup { stage, name, .. }) => {
            assert_eq!(stage, StartupStage::Components);
            assert_eq!(name, "mail");
        }
        other => panic!("unexpected: {:?}", other.err()),
    }
    // Components that did start are torn down again.
    assert_eq!(recorder.events(), ["init:db", "destroy:db"]);
}

#[tokio::test]
async fn eager_dependency_cycle_aborts_startup() {
    let recorder = Recorder::default();
    let mut b = builder();
    b.eager_component("a", Service::new("a", &["b"], &recorder))
        .eager_component("b", Service::new("b", &["a"], &recorder));

    match b.build() {
        Err(ServerError::Startup { stage, source, .. }) => {
            assert_eq!(stage, StartupStage::Components);
            let cause = source.downcast_ref::<ComponentError>();
            assert!(
                matches!(cause, Some(ComponentError::CyclicDependency(_))),
                "unexpected source: {source}"
            );
        }
        other => panic!("unexpected: {:?}", other.err()),
    }
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn init_func_failure_names_the_func() {
    let mut b = builder();
    b.on_start("migrations", |_env| Err("schema drift".into()));

    match b.build() {
        Err(ServerError::Startup { stage, name, source }) => {
            assert_eq!(stage, StartupStage::InitFuncs);
            assert_eq!(name, "migrations");
            assert_eq!(source.to_string(), "schema drift");
        }
        other => panic!("unexpected: {:?}", other.err()),
    }
}

#[tokio::test]
async fn invalid_config_fails_build() {
    let mut config = common::test_config();
    config.listener.bind_address = "not an address".to_string();
    assert!(matches!(
        switchyard::Server::builder(config).build(),
        Err(ServerError::Config(_))
    ));
}

#[tokio::test]
async fn tasks_run_by_path() {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut b = builder();
    b.task("/mail/:kind", {
        let tx = tx.clone();
        task_fn(move |value| {
            let tx = tx.clone();
            async move {
                if let Ok(to) = value.downcast::<String>() {
                    let _ = tx.send(*to);
                }
            }
        })
    })
    .unwrap()
    .post(
        "/signup",
        handler_fn(|req: Request| async move {
            req.env()
                .start_task("/mail/welcome", Box::new("ada@example.com".to_string()));
            Response::new(StatusCode::ACCEPTED)
        }),
    )
    .unwrap();
    let server = spawn(b).await;

    let res = client().post(server.url("/signup")).send().await.unwrap();
    assert_eq!(res.status(), 202);
    let sent = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap();
    assert_eq!(sent.as_deref(), Some("ada@example.com"));

    server
        .server
        .run_task("/mail/reset", Box::new("bob@example.com".to_string()))
        .await
        .unwrap();
    assert_eq!(rx.recv().await.as_deref(), Some("bob@example.com"));

    assert_eq!(
        server.server.run_task("/nothing", Box::new(())).await,
        Err(TaskError::NotFound("/nothing".into()))
    );
}
