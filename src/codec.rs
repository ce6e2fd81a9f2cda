//! Content codecs.
//!
//! Handlers reach codecs through [`Environment::codec`](crate::Environment::codec)
//! instead of hard-coding a format. JSON is registered when nothing else is.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::config::schema::CONTENT_TYPE_JSON;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("no codec for content type {0:?}")]
    Unsupported(String),
}

/// Encodes and decodes message bodies for one content type.
pub trait Codec: Send + Sync {
    /// Full content type written on encoded responses.
    fn content_type(&self) -> &str;

    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, CodecError>;

    fn decode(&self, body: &[u8]) -> Result<serde_json::Value, CodecError>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &str {
        CONTENT_TYPE_JSON
    }

    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, CodecError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, body: &[u8]) -> Result<serde_json::Value, CodecError> {
        serde_json::from_slice(body).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Encode a serializable value with `codec`.
pub fn encode_as<T: Serialize>(codec: &dyn Codec, value: &T) -> Result<Bytes, CodecError> {
    let value = serde_json::to_value(value).map_err(|e| CodecError::Encode(e.to_string()))?;
    codec.encode(&value)
}

/// Decode a body into `T` with `codec`.
pub fn decode_as<T: DeserializeOwned>(codec: &dyn Codec, body: &[u8]) -> Result<T, CodecError> {
    let value = codec.decode(body)?;
    serde_json::from_value(value).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Registered codecs, looked up by media type.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec. The first registered codec is the default.
    pub fn register(&mut self, codec: impl Codec + 'static) {
        self.codecs.push(Arc::new(codec));
    }

    /// Register JSON when no codec was registered.
    pub fn ensure_default(&mut self) {
        if self.codecs.is_empty() {
            self.register(JsonCodec);
        }
    }

    /// Codec whose media type matches `content_type`, ignoring parameters and case.
    pub fn lookup(&self, content_type: &str) -> Option<Arc<dyn Codec>> {
        let wanted = media_type(content_type);
        self.codecs
            .iter()
            .find(|codec| media_type(codec.content_type()).eq_ignore_ascii_case(wanted))
            .cloned()
    }

    pub fn default_codec(&self) -> Arc<dyn Codec> {
        self.codecs
            .first()
            .cloned()
            .unwrap_or_else(|| Arc::new(JsonCodec))
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u64,
        name: String,
    }

    #[test]
    fn json_round_trip_through_registry() {
        let mut registry = CodecRegistry::new();
        registry.ensure_default();

        let codec = registry.lookup("Application/JSON").unwrap();
        let user = User {
            id: 7,
            name: "ada".into(),
        };
        let bytes = encode_as(&*codec, &user).unwrap();
        assert_eq!(decode_as::<User>(&*codec, &bytes).unwrap(), user);
    }

    #[test]
    fn unknown_media_type_has_no_codec() {
        let mut registry = CodecRegistry::new();
        registry.ensure_default();
        assert!(registry.lookup("text/xml").is_none());
        assert_eq!(registry.default_codec().content_type(), CONTENT_TYPE_JSON);
    }

    #[test]
    fn decode_reports_bad_input() {
        let err = decode_as::<User>(&JsonCodec, b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
