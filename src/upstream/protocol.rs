use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::init::InitConfig;

/// Track name carrying client audio toward the engine.
pub const AUDIO_TRACK: &str = "aud";

/// Errors surfaced by the engine transport.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("engine target '{0}' is invalid")]
    InvalidTarget(String),
    #[error("failed to connect to engine: {0}")]
    Connect(String),
    #[error("engine stream is no longer writable: {0}")]
    Send(String),
    #[error("engine transport failed: {0}")]
    Transport(String),
    #[error("engine sent an invalid frame: {0}")]
    Decode(String),
}

/// One frame on the engine's bidirectional stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnginePayload {
    #[serde(default)]
    pub track: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunk: Vec<EngineItem>,
}

/// Generic key/value item inside an engine frame. The engine uses `ts`
/// items (timestamp in `d`, optional `la` tag) and `txt` items (text in
/// `s`, optional `la`/`sos` tags); the configuration frame additionally
/// carries string and map items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineItem {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<f64>,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub b: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub m: Vec<EngineItem>,
}

impl EngineItem {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }
}

/// Binary payloads travel base64-encoded inside JSON frames.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            Some(text) => STANDARD
                .decode(text.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Outbound half of an open engine stream.
#[async_trait]
pub trait EngineSink: Send {
    async fn send(&mut self, payload: EnginePayload) -> Result<(), UpstreamError>;

    /// Half-closes the outbound side; the response stream keeps producing
    /// until the engine finishes.
    async fn complete(&mut self) -> Result<(), UpstreamError>;
}

/// Inbound half of an open engine stream. `None` means the engine finished.
#[async_trait]
pub trait EngineSource: Send {
    async fn next(&mut self) -> Option<Result<EnginePayload, UpstreamError>>;
}

/// Opens bidirectional streams against the transcription engine.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn open(
        &self,
        config: &InitConfig,
    ) -> Result<(Box<dyn EngineSink>, Box<dyn EngineSource>), UpstreamError>;
}
