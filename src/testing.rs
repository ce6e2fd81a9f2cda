//! Shared helpers for unit tests.

use std::sync::Arc;

use hyper::{Method, Uri};
use parking_lot::Mutex;
use tracing::Span;

use crate::codec::{Codec, CodecRegistry};
use crate::component::Component;
use crate::environment::{Env, Environment};
use crate::error::ComponentError;
use crate::http::request::Request;
use crate::http::task::TaskValue;

/// Environment with no components or tasks and the JSON codec.
pub(crate) struct StubEnv {
    codecs: CodecRegistry,
    span: Span,
}

impl Environment for StubEnv {
    fn resolve(&self, name: &str) -> Result<Arc<dyn Component>, ComponentError> {
        Err(ComponentError::NotFound(name.to_string()))
    }

    fn logger(&self) -> &Span {
        &self.span
    }

    fn start_task(&self, _path: &str, _value: TaskValue) {}

    fn codec(&self, content_type: &str) -> Option<Arc<dyn Codec>> {
        self.codecs.lookup(content_type)
    }

    fn default_codec(&self) -> Arc<dyn Codec> {
        self.codecs.default_codec()
    }
}

pub(crate) fn stub_env() -> Env {
    let mut codecs = CodecRegistry::new();
    codecs.ensure_default();
    Arc::new(StubEnv {
        codecs,
        span: Span::none(),
    })
}

pub(crate) fn request(method: Method, path: &'static str) -> Request {
    Request::new(method, Uri::from_static(path), stub_env())
}

/// Ordered log of events shared between test filters and handlers.
#[derive(Clone, Default)]
pub(crate) struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub(crate) fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}
