//! HTTP server setup, dispatch and shutdown.
//!
//! # Responsibilities
//! - Collect routes, filters, components, tasks and websocket routes
//! - Initialize them in a fixed order and fail startup on the first error
//! - Serve HTTP/1.1 (optionally over TLS) with hyper
//! - Dispatch each request through its filter chain
//! - Drain tracked connections on shutdown, then tear everything down
//!
//! # Design Decisions
//! - Startup order: components → global filters → routes → tasks →
//!   websockets → init funcs
//! - Teardown order: global filters → routes → tasks → websockets → components
//! - Panics inside a chain become 500s; a write timeout becomes 503
//! - Bodies over `http.max_body_bytes` are refused with 413 before routing
//! - The server is its own `Environment`; requests carry it as an `Arc`

use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONNECTION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, info_span, warn, Span};

use crate::codec::{Codec, CodecRegistry};
use crate::component::manager::panic_message;
use crate::component::{Activation, Component, ComponentManager, ComponentStatus};
use crate::config::validation::validate_config;
use crate::config::{ConfigError, ServerConfig};
use crate::environment::{Env, Environment};
use crate::error::{
    BoxError, ComponentError, RequestError, RouteError, ServerError, StartupStage, TaskError,
};
use crate::filter::{Filter, FilterChain, Terminal};
use crate::http::handler::Handler;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::task::{TaskHandler, TaskRegistry, TaskValue};
use crate::http::websocket::{
    self, HeaderChecker, WebSocketHandler, WebSocketRegistry,
};
use crate::lifecycle::{ConnState, ConnectionId, ConnectionTracker, Disposition, LifecycleState};
use crate::net;
use crate::pool::{Pool, Pooled};
use crate::routing::{PathVars, Router};

/// Init routine run after everything else is initialized.
type InitFn = Box<dyn FnOnce(&dyn Environment) -> Result<(), BoxError> + Send>;

/// Collects the server's parts before it is built.
pub struct ServerBuilder {
    config: ServerConfig,
    router: Router,
    global_filters: Vec<Arc<dyn Filter>>,
    components: ComponentManager,
    tasks: TaskRegistry,
    websockets: WebSocketRegistry,
    websocket_checker: Option<HeaderChecker>,
    codecs: CodecRegistry,
    init_funcs: Vec<(String, InitFn)>,
    tls: Option<Arc<rustls::ServerConfig>>,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            global_filters: Vec::new(),
            components: ComponentManager::new(),
            tasks: TaskRegistry::default(),
            websockets: WebSocketRegistry::default(),
            websocket_checker: None,
            codecs: CodecRegistry::new(),
            init_funcs: Vec::new(),
            tls: None,
        }
    }

    /// Register `handler` for `method` on `pattern`.
    pub fn route(
        &mut self,
        pattern: &str,
        method: Method,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RouteError> {
        let route = self.router.insert(pattern)?;
        if !route.add_handler(method.clone(), Arc::new(handler)) {
            return Err(RouteError::DuplicateHandler {
                pattern: pattern.to_string(),
                method: method.to_string(),
            });
        }
        Ok(self)
    }

    pub fn get(
        &mut self,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RouteError> {
        self.route(pattern, Method::GET, handler)
    }

    pub fn post(
        &mut self,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RouteError> {
        self.route(pattern, Method::POST, handler)
    }

    pub fn put(
        &mut self,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RouteError> {
        self.route(pattern, Method::PUT, handler)
    }

    pub fn delete(
        &mut self,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RouteError> {
        self.route(pattern, Method::DELETE, handler)
    }

    pub fn patch(
        &mut self,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RouteError> {
        self.route(pattern, Method::PATCH, handler)
    }

    /// Attach filters to the route for `pattern`, after any attached earlier.
    pub fn route_filters(
        &mut self,
        pattern: &str,
        filters: impl IntoIterator<Item = Arc<dyn Filter>>,
    ) -> Result<&mut Self, RouteError> {
        self.router.insert(pattern)?.add_filters(filters);
        Ok(self)
    }

    /// Add a filter that wraps every request, including unmatched ones.
    pub fn global_filter(&mut self, filter: impl Filter + 'static) -> &mut Self {
        self.global_filters.push(Arc::new(filter));
        self
    }

    /// Register a lazily initialized component.
    pub fn component(&mut self, name: &str, component: impl Component + 'static) -> &mut Self {
        self.components
            .register(name, Arc::new(component), Activation::Lazy);
        self
    }

    /// Register a component initialized at startup.
    pub fn eager_component(&mut self, name: &str, component: impl Component + 'static) -> &mut Self {
        self.components
            .register(name, Arc::new(component), Activation::Eager);
        self
    }

    /// Register a component that is initialized at startup but cannot be resolved.
    pub fn anonymous_component(&mut self, component: impl Component + 'static) -> &mut Self {
        self.components.register_anonymous(Arc::new(component));
        self
    }

    /// Register a background task handler.
    pub fn task(
        &mut self,
        pattern: &str,
        handler: impl TaskHandler + 'static,
    ) -> Result<&mut Self, RouteError> {
        self.tasks.register(pattern, Arc::new(handler))?;
        Ok(self)
    }

    /// Register a websocket route.
    pub fn websocket(
        &mut self,
        pattern: &str,
        handler: impl WebSocketHandler + 'static,
    ) -> Result<&mut Self, RouteError> {
        self.websockets.register(pattern, Arc::new(handler))?;
        Ok(self)
    }

    /// Check handshake headers of every websocket upgrade.
    pub fn websocket_checker(
        &mut self,
        checker: impl Fn(&hyper::HeaderMap) -> Result<(), StatusCode> + Send + Sync + 'static,
    ) -> &mut Self {
        self.websocket_checker = Some(Arc::new(checker));
        self
    }

    /// Register a content codec. The first one registered is the default.
    pub fn codec(&mut self, codec: impl Codec + 'static) -> &mut Self {
        self.codecs.register(codec);
        self
    }

    /// Run `f` once at startup, after all other initialization.
    pub fn on_start(
        &mut self,
        name: &str,
        f: impl FnOnce(&dyn Environment) -> Result<(), BoxError> + Send + 'static,
    ) -> &mut Self {
        self.init_funcs.push((name.to_string(), Box::new(f)));
        self
    }

    /// Use an externally built TLS configuration instead of the configured files.
    pub fn tls_config(&mut self, config: Arc<rustls::ServerConfig>) -> &mut Self {
        self.tls = Some(config);
        self
    }

    /// Validate, initialize everything and return a server ready to accept.
    pub fn build(self) -> Result<Server, ServerError> {
        let ServerBuilder {
            config,
            router,
            global_filters,
            components,
            tasks,
            websockets,
            websocket_checker,
            mut codecs,
            init_funcs,
            tls,
        } = self;

        validate_config(&config).map_err(ConfigError::Validation)?;
        codecs.ensure_default();

        let tls = match (tls, &config.listener.tls) {
            (Some(external), _) => Some(external),
            (None, Some(files)) => Some(net::load_tls_config(files)?),
            (None, None) => None,
        };

        let default_content_type = config
            .http
            .default_content_type()
            .and_then(|ct| HeaderValue::from_str(ct).ok());
        let vars_pool = {
            let capacity = config.pooling.path_var_count;
            Pool::new(config.pooling.max_idle, move || PathVars::with_capacity(capacity))
        };
        let links_pool = {
            let capacity = global_filters.len() + config.pooling.filter_count;
            Pool::new(config.pooling.max_idle, move || Vec::with_capacity(capacity))
        };

        let core = Arc::new_cyclic(|this| Core {
            config,
            router,
            global_filters,
            components,
            tasks,
            websockets,
            websocket_checker,
            codecs,
            default_content_type,
            tls: tls.map(TlsAcceptor::from),
            tracker: ConnectionTracker::new(),
            vars_pool,
            links_pool,
            span: info_span!("server"),
            this: this.clone(),
            torn_down: AtomicBool::new(false),
        });

        if let Err(e) = core.initialize(init_funcs) {
            error!(error = %e, "Startup failed");
            core.components.destroy();
            return Err(e);
        }
        Ok(Server { core })
    }
}

/// Shared server state, also the `Environment` handed to application code.
struct Core {
    config: ServerConfig,
    router: Router,
    global_filters: Vec<Arc<dyn Filter>>,
    components: ComponentManager,
    tasks: TaskRegistry,
    websockets: WebSocketRegistry,
    websocket_checker: Option<HeaderChecker>,
    codecs: CodecRegistry,
    default_content_type: Option<HeaderValue>,
    tls: Option<TlsAcceptor>,
    tracker: ConnectionTracker,
    vars_pool: Pool<PathVars>,
    links_pool: Pool<Vec<Arc<dyn Filter>>>,
    span: Span,
    this: Weak<Core>,
    torn_down: AtomicBool,
}

impl Environment for Core {
    fn resolve(&self, name: &str) -> Result<Arc<dyn Component>, ComponentError> {
        self.components.resolve(self, name)
    }

    fn logger(&self) -> &Span {
        &self.span
    }

    fn start_task(&self, path: &str, value: TaskValue) {
        let handler = match self.tasks.task(path) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(error = %e, "Task not started");
                return;
            }
        };
        let (Some(core), Ok(runtime)) = (self.this.upgrade(), tokio::runtime::Handle::try_current())
        else {
            warn!(task = %path, "Task not started: server or runtime unavailable");
            return;
        };

        let path = path.to_string();
        runtime.spawn(async move {
            handler.run(&*core, value).await;
            debug!(task = %path, "Task finished");
        });
    }

    fn codec(&self, content_type: &str) -> Option<Arc<dyn Codec>> {
        self.codecs.lookup(content_type)
    }

    fn default_codec(&self) -> Arc<dyn Codec> {
        self.codecs.default_codec()
    }
}

fn startup_error(stage: StartupStage, name: impl Into<String>, source: BoxError) -> ServerError {
    ServerError::Startup {
        stage,
        name: name.into(),
        source,
    }
}

impl Core {
    fn initialize(&self, init_funcs: Vec<(String, InitFn)>) -> Result<(), ServerError> {
        let _enter = self.span.enter();
        let env: &dyn Environment = self;

        self.components
            .init_eager(env, |name| info!(component = name, "Initializing component"))
            .map_err(|e| startup_error(StartupStage::Components, e.name().to_string(), Box::new(e)))?;

        for (index, filter) in self.global_filters.iter().enumerate() {
            filter
                .init(env)
                .map_err(|e| startup_error(StartupStage::GlobalFilters, format!("#{index}"), e))?;
        }

        for (pattern, route) in self.router.endpoints() {
            for filter in route.filters() {
                filter
                    .init(env)
                    .map_err(|e| startup_error(StartupStage::Routes, pattern.as_str(), e))?;
            }
            for handler in route.handlers() {
                handler
                    .init(env)
                    .map_err(|e| startup_error(StartupStage::Routes, pattern.as_str(), e))?;
            }
        }

        for (pattern, handler) in self.tasks.handlers() {
            handler
                .init(env)
                .map_err(|e| startup_error(StartupStage::Tasks, pattern, e))?;
        }

        for (pattern, handler) in self.websockets.handlers() {
            handler
                .init(env)
                .map_err(|e| startup_error(StartupStage::WebSockets, pattern, e))?;
        }

        for (name, init) in init_funcs {
            init(env).map_err(|e| startup_error(StartupStage::InitFuncs, name, e))?;
        }

        info!(
            routes = self.router.len(),
            components = self.components.len(),
            tasks = self.tasks.len(),
            websockets = self.websockets.len(),
            "Server initialized"
        );
        Ok(())
    }

    /// Destroy everything that was initialized. Runs at most once.
    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _enter = self.span.enter();

        for filter in &self.global_filters {
            filter.destroy();
        }
        for (_, route) in self.router.endpoints() {
            for handler in route.handlers() {
                handler.destroy();
            }
            for filter in route.filters() {
                filter.destroy();
            }
        }
        for (_, handler) in self.tasks.handlers() {
            handler.destroy();
        }
        for (_, handler) in self.websockets.handlers() {
            handler.destroy();
        }
        self.components.destroy();
        info!("Server torn down");
    }

    /// Entry point for every request hyper reads off a connection.
    async fn handle(
        self: Arc<Self>,
        mut req: hyper::Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> hyper::Response<Full<Bytes>> {
        if websocket::is_upgrade_request(req.method(), req.headers()) {
            let mut vars = self.vars_pool.checkout();
            if let Some(handler) = self.websockets.lookup(req.uri().path(), &mut vars) {
                return self.upgrade(handler, &mut req, vars);
            }
        }

        let Some(tracked) = self.tracker.activate() else {
            return closing_response();
        };

        let (parts, body) = req.into_parts();
        let limit = self.config.http.max_body_bytes;
        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                warn!(limit, path = %parts.uri.path(), "Request body too large");
                return self.finish(Response::status_page(StatusCode::PAYLOAD_TOO_LARGE));
            }
            Err(e) => {
                debug!(error = %e, "Failed to read request body");
                return self.finish(Response::status_page(StatusCode::BAD_REQUEST));
            }
        };

        let hijacked = Arc::new(AtomicBool::new(false));
        let response = self
            .dispatch(parts, body, remote_addr, Arc::clone(&hijacked))
            .await;

        let mut response = self.finish(response);
        if hijacked.load(Ordering::Acquire) {
            tracked.hijack();
        } else if tracked.disposition() == Disposition::Close {
            response
                .headers_mut()
                .insert(CONNECTION, HeaderValue::from_static("close"));
        }
        response
    }

    /// Route the request and run its filter chain.
    async fn dispatch(
        self: &Arc<Self>,
        parts: hyper::http::request::Parts,
        body: Bytes,
        remote_addr: SocketAddr,
        hijacked: Arc<AtomicBool>,
    ) -> Response {
        let mut links = self.links_pool.checkout();
        links.extend(self.global_filters.iter().cloned());

        let mut vars = self.vars_pool.checkout();
        let terminal = match self.router.match_path(parts.uri.path(), &mut vars) {
            Some(found) => {
                links.extend(found.endpoint.filters().iter().cloned());
                match found.endpoint.handler(&parts.method) {
                    Some(handler) => Terminal::Handler(&**handler),
                    None => Terminal::Status(RequestError::MethodNotSupported.status()),
                }
            }
            None => Terminal::Status(RequestError::RouteNotFound.status()),
        };

        let env = Arc::clone(self) as Env;
        let request = Request::from_parts(parts, body, vars, remote_addr, env, hijacked);
        let chain = FilterChain::new(&links, terminal);
        let run = AssertUnwindSafe(chain.run(request)).catch_unwind();
        let outcome = match self.config.timeouts.write() {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(timeout_ms = limit.as_millis() as u64, "Request timed out");
                    return Response::status_page(StatusCode::SERVICE_UNAVAILABLE);
                }
            },
            None => run.await,
        };

        outcome.unwrap_or_else(|panic| {
            error!(panic = %panic_message(&*panic), "Request handler panicked");
            Response::status_page(StatusCode::INTERNAL_SERVER_ERROR)
        })
    }

    fn upgrade(
        self: &Arc<Self>,
        handler: Arc<dyn WebSocketHandler>,
        req: &mut hyper::Request<Incoming>,
        vars: Pooled<PathVars>,
    ) -> hyper::Response<Full<Bytes>> {
        if self.tracker.observe(ConnState::Upgraded) == Disposition::Close {
            return closing_response();
        }
        let response = match websocket::handshake(req.headers(), self.websocket_checker.as_ref()) {
            Ok(response) => response,
            Err(status) => {
                debug!(status = %status, path = %req.uri().path(), "WebSocket upgrade rejected");
                return self.finish(Response::status_page(status));
            }
        };

        websocket::spawn_session(
            handler,
            hyper::upgrade::on(&mut *req),
            req.uri().clone(),
            req.headers().clone(),
            vars,
            Arc::clone(self) as Env,
        );
        response.into_hyper(None)
    }

    fn finish(&self, response: Response) -> hyper::Response<Full<Bytes>> {
        response.into_hyper(self.default_content_type.as_ref())
    }
}

/// Sent when a request arrives after shutdown began.
fn closing_response() -> hyper::Response<Full<Bytes>> {
    let mut response = Response::status_page(StatusCode::SERVICE_UNAVAILABLE).into_hyper(None);
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

/// A built server. Cheap to clone; all clones control the same server.
#[derive(Clone)]
pub struct Server {
    core: Arc<Core>,
}

impl Server {
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    /// The server's environment, as handlers see it.
    pub fn env(&self) -> Env {
        Arc::clone(&self.core) as Env
    }

    pub fn config(&self) -> &ServerConfig {
        &self.core.config
    }

    /// Connections currently serving a request.
    pub fn tracked_connections(&self) -> usize {
        self.core.tracker.tracked()
    }

    pub fn state(&self) -> LifecycleState {
        self.core.tracker.state()
    }

    /// Lifecycle status of a registered component.
    pub fn component_status(&self, name: &str) -> ComponentStatus {
        self.core.components.status(name)
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = net::bind(&self.core.config.listener).await?;
        self.run(listener).await
    }

    /// Serve connections from `listener` until shutdown begins.
    pub async fn run(&self, listener: TcpListener) -> Result<(), ServerError> {
        let address = listener.local_addr()?;
        let mut closing = self.core.tracker.closing();
        if *closing.borrow_and_update() {
            return Ok(());
        }

        info!(
            address = %address,
            tls = self.core.tls.is_some(),
            "Server accepting connections"
        );

        loop {
            tokio::select! {
                _ = closing.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => self.spawn_connection(stream, remote_addr),
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }

        info!(address = %address, "Server stopped accepting connections");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, remote_addr: SocketAddr) {
        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            let id = ConnectionId::new();
            if let Err(e) = net::configure_stream(&stream, core.config.listener.keep_alive()) {
                debug!(connection_id = %id, error = %e, "Failed to set socket options");
            }

            match core.tls.clone() {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => serve_connection(core, TokioIo::new(stream), remote_addr, id).await,
                    Err(e) => debug!(connection_id = %id, error = %e, "TLS handshake failed"),
                },
                None => serve_connection(core, TokioIo::new(stream), remote_addr, id).await,
            }
        });
    }

    /// Run a background task and wait for it to finish.
    pub async fn run_task(&self, path: &str, value: TaskValue) -> Result<(), TaskError> {
        let handler = self.core.tasks.task(path)?;
        handler.run(&*self.core, value).await;
        Ok(())
    }

    /// Stop accepting, wait for tracked connections, then tear down.
    ///
    /// A zero `timeout` waits without bound. Returns `true` if every tracked
    /// connection finished in time, `false` on timeout or if shutdown had
    /// already been requested.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let tracker = &self.core.tracker;
        if !tracker.begin_shutdown() {
            debug!("Shutdown already requested");
            return false;
        }
        info!(
            timeout_ms = timeout.as_millis() as u64,
            tracked = tracker.tracked(),
            "Shutting down"
        );

        let drained = if timeout.is_zero() {
            tracker.drained().await;
            true
        } else {
            tokio::time::timeout(timeout, tracker.drained()).await.is_ok()
        };
        if !drained {
            warn!(
                tracked = tracker.tracked(),
                "Shutdown timed out with requests in flight"
            );
        }

        self.core.teardown();
        drained
    }
}

async fn serve_connection<I>(core: Arc<Core>, io: I, remote_addr: SocketAddr, id: ConnectionId)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let mut builder = http1::Builder::new();
    builder.timer(TokioTimer::new()).keep_alive(true);
    if let Some(read) = core.config.timeouts.read() {
        builder.header_read_timeout(read);
    }
    if let Some(max) = core.config.listener.max_header_bytes {
        // hyper rejects buffers below 8 KiB.
        builder.max_buf_size(max.max(8192));
    }

    let mut closing = core.tracker.closing();
    let service = service_fn(move |req| {
        let core = Arc::clone(&core);
        async move { Ok::<_, Infallible>(core.handle(req, remote_addr).await) }
    });

    let conn = builder.serve_connection(io, service).with_upgrades();
    tokio::pin!(conn);

    if *closing.borrow_and_update() {
        conn.as_mut().graceful_shutdown();
    }

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = closing.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        debug!(connection_id = %id, remote = %remote_addr, error = %e, "Connection closed with error");
    }
}
