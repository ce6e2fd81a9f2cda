//! Per-request filter chain composition.

use std::future;
use std::sync::Arc;

use hyper::StatusCode;

use crate::filter::Filter;
use crate::http::handler::{BoxFuture, Handler};
use crate::http::request::Request;
use crate::http::response::Response;

/// Innermost link of a chain.
#[derive(Clone, Copy)]
pub enum Terminal<'a> {
    Handler(&'a dyn Handler),
    /// No handler; answer with this status (404 or 405).
    Status(StatusCode),
}

impl<'a> Terminal<'a> {
    fn call(&self, req: Request) -> BoxFuture<'a, Response> {
        match *self {
            Terminal::Handler(handler) => handler.handle(req),
            Terminal::Status(status) => Box::pin(future::ready(Response::status_page(status))),
        }
    }
}

/// Handle to the remainder of the chain, passed to each filter.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    links: &'a [Arc<dyn Filter>],
    terminal: &'a Terminal<'a>,
}

impl<'a> Next<'a> {
    /// Run the rest of the chain.
    pub fn run(self, req: Request) -> BoxFuture<'a, Response> {
        match self.links.split_first() {
            Some((filter, rest)) => filter.call(
                req,
                Next {
                    links: rest,
                    terminal: self.terminal,
                },
            ),
            None => self.terminal.call(req),
        }
    }
}

/// Filters composed around a terminal for one request.
pub struct FilterChain<'a> {
    links: &'a [Arc<dyn Filter>],
    terminal: Terminal<'a>,
}

impl<'a> FilterChain<'a> {
    /// `links` holds global filters followed by route filters.
    pub fn new(links: &'a [Arc<dyn Filter>], terminal: Terminal<'a>) -> Self {
        Self { links, terminal }
    }

    pub async fn run(&self, req: Request) -> Response {
        Next {
            links: self.links,
            terminal: &self.terminal,
        }
        .run(req)
        .await
    }
}
