//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled patterns in a segment tree
//! - Look up the endpoint for a request path and capture variables
//! - Reject ambiguous registrations up front
//!
//! # Design Decisions
//! - Immutable after the server is built (thread-safe without locks)
//! - Literal > variable > wildcard at each segment, with backtracking
//! - Explicit no-match (`None`) rather than a silent default
//! - Request segments are percent-decoded one at a time, so `%2F` stays
//!   inside its segment
//! - Generic over the endpoint so HTTP, task and websocket routes share it

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use percent_encoding::percent_decode_str;

use crate::error::RouteError;
use crate::routing::pattern::{split_path, Pattern, Segment};
use crate::routing::vars::PathVars;

#[derive(Debug)]
struct VarEdge {
    name: Arc<str>,
    /// Pattern that introduced the variable, for conflict reports.
    origin: String,
    node: Box<Node>,
}

#[derive(Debug)]
struct WildcardEdge {
    name: Arc<str>,
    endpoint: usize,
}

#[derive(Debug, Default)]
struct Node {
    literals: HashMap<String, Node>,
    var: Option<VarEdge>,
    wildcard: Option<WildcardEdge>,
    endpoint: Option<usize>,
}

/// Result of a successful lookup.
#[derive(Debug)]
pub struct Match<'r, T> {
    pub pattern: &'r Pattern,
    pub endpoint: &'r T,
}

/// Pattern router mapping paths to endpoints of type `T`.
#[derive(Debug)]
pub struct PatternRouter<T> {
    root: Node,
    endpoints: Vec<(Pattern, T)>,
}

impl<T> Default for PatternRouter<T> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            endpoints: Vec::new(),
        }
    }
}

impl<T: Default> PatternRouter<T> {
    /// Find or create the endpoint for `pattern`.
    ///
    /// Registering the same pattern again returns the existing endpoint.
    /// A pattern with the same static shape but different variable names is
    /// rejected with [`RouteError::ConflictingRoute`].
    pub fn insert(&mut self, pattern: &str) -> Result<&mut T, RouteError> {
        let pattern = Pattern::parse(pattern)?;
        let conflict = |existing: &str| RouteError::ConflictingRoute {
            pattern: pattern.as_str().to_string(),
            existing: existing.to_string(),
        };

        let mut node = &mut self.root;
        let mut wildcard = None;
        for segment in pattern.segments() {
            match segment {
                Segment::Literal(lit) => {
                    node = node.literals.entry(lit.clone()).or_default();
                }
                Segment::Var(name) => {
                    let edge = node.var.get_or_insert_with(|| VarEdge {
                        name: Arc::clone(name),
                        origin: pattern.as_str().to_string(),
                        node: Box::default(),
                    });
                    if edge.name != *name {
                        return Err(conflict(&edge.origin));
                    }
                    node = &mut edge.node;
                }
                Segment::Wildcard(name) => {
                    if let Some(edge) = &node.wildcard {
                        if edge.name != *name {
                            return Err(conflict(self.endpoints[edge.endpoint].0.as_str()));
                        }
                    }
                    wildcard = Some(name);
                }
            }
        }

        let existing = match wildcard {
            Some(_) => node.wildcard.as_ref().map(|edge| edge.endpoint),
            None => node.endpoint,
        };
        let index = match existing {
            Some(index) => index,
            None => {
                let index = self.endpoints.len();
                match wildcard {
                    Some(name) => {
                        node.wildcard = Some(WildcardEdge {
                            name: Arc::clone(name),
                            endpoint: index,
                        })
                    }
                    None => node.endpoint = Some(index),
                }
                self.endpoints.push((pattern, T::default()));
                index
            }
        };

        Ok(&mut self.endpoints[index].1)
    }
}

impl<T> PatternRouter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `path`, pushing captured variables into `vars`.
    ///
    /// On `None`, `vars` is left as it was passed in.
    pub fn match_path<'r>(&'r self, path: &str, vars: &mut PathVars) -> Option<Match<'r, T>> {
        let segments: Vec<Cow<'_, str>> = split_path(path)
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy())
            .collect();
        let index = find(&self.root, &segments, vars)?;
        let (pattern, endpoint) = &self.endpoints[index];
        Some(Match { pattern, endpoint })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Registered endpoints in registration order.
    pub fn endpoints(&self) -> impl Iterator<Item = (&Pattern, &T)> {
        self.endpoints.iter().map(|(p, t)| (p, t))
    }
}

fn find(node: &Node, segments: &[Cow<'_, str>], vars: &mut PathVars) -> Option<usize> {
    let Some((first, rest)) = segments.split_first() else {
        return node.endpoint;
    };

    if let Some(child) = node.literals.get(first.as_ref()) {
        if let Some(index) = find(child, rest, vars) {
            return Some(index);
        }
    }

    if let Some(edge) = &node.var {
        if !first.is_empty() {
            let mark = vars.len();
            vars.push(Arc::clone(&edge.name), first.as_ref());
            if let Some(index) = find(&edge.node, rest, vars) {
                return Some(index);
            }
            vars.truncate(mark);
        }
    }

    let edge = node.wildcard.as_ref()?;
    vars.push(Arc::clone(&edge.name), segments.join("/"));
    Some(edge.endpoint)
}
