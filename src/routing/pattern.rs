//! Route pattern parsing.
//!
//! # Syntax
//! - `/users` - literal segments match verbatim (case-sensitive)
//! - `/users/:id` - `:name` captures one non-empty segment
//! - `/files/*path` - trailing `*name` (or bare `*`) captures the rest of the path
//!
//! A single trailing slash is ignored in both patterns and request paths.

use std::sync::Arc;

use crate::error::RouteError;

/// Key used for a wildcard declared without a name.
pub const ANONYMOUS_WILDCARD: &str = "*";

/// One parsed pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Var(Arc<str>),
    Wildcard(Arc<str>),
}

/// A parsed path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse a pattern string.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let invalid = |reason| RouteError::InvalidPattern {
            pattern: raw.to_string(),
            reason,
        };

        if !raw.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let mut segments = Vec::new();
        let parts: Vec<&str> = split_path(raw).collect();

        for (i, part) in parts.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(invalid("variable name must not be empty"));
                }
                Segment::Var(Arc::from(name))
            } else if let Some(name) = part.strip_prefix('*') {
                if i + 1 != parts.len() {
                    return Err(invalid("wildcard must be the last segment"));
                }
                let name = if name.is_empty() { ANONYMOUS_WILDCARD } else { name };
                Segment::Wildcard(Arc::from(name))
            } else if part.is_empty() {
                return Err(invalid("empty segment"));
            } else {
                Segment::Literal((*part).to_string())
            };

            if let Some(name) = segment_name(&segment) {
                if segments.iter().filter_map(segment_name).any(|n| n == name) {
                    return Err(invalid("duplicate variable name"));
                }
            }
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The pattern as registered.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of the capturing segments, in order.
    pub fn var_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(segment_name)
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn segment_name(segment: &Segment) -> Option<&str> {
    match segment {
        Segment::Literal(_) => None,
        Segment::Var(name) | Segment::Wildcard(name) => Some(name),
    }
}

/// Strip a single trailing slash, keeping the root path intact.
pub fn normalize_path(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    }
}

/// Split a path into segments after normalization. The root path has none.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = normalize_path(path).trim_start_matches('/');
    trimmed.split('/').filter(move |_| !trimmed.is_empty())
}
