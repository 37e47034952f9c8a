use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::core::init::InitConfig;
use crate::upstream::protocol::{
    EngineConnector, EnginePayload, EngineSink, EngineSource, UpstreamError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production connector: one WebSocket per session carrying JSON-encoded
/// payload frames.
pub struct WsEngineConnector {
    target: String,
}

impl WsEngineConnector {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl EngineConnector for WsEngineConnector {
    async fn open(
        &self,
        config: &InitConfig,
    ) -> Result<(Box<dyn EngineSink>, Box<dyn EngineSource>), UpstreamError> {
        let mut request = self
            .target
            .as_str()
            .into_client_request()
            .map_err(|err| UpstreamError::InvalidTarget(err.to_string()))?;
        let service = HeaderValue::from_str(&config.model)
            .map_err(|err| UpstreamError::InvalidTarget(err.to_string()))?;
        request.headers_mut().insert("service", service);

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|err| UpstreamError::Connect(err.to_string()))?;
        debug!(target = %self.target, model = %config.model, "engine stream opened");
        let (sink, source) = stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsSource { source })))
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl EngineSink for WsSink {
    async fn send(&mut self, payload: EnginePayload) -> Result<(), UpstreamError> {
        let json =
            serde_json::to_string(&payload).map_err(|err| UpstreamError::Send(err.to_string()))?;
        self.sink
            .send(Message::Text(json))
            .await
            .map_err(|err| UpstreamError::Send(err.to_string()))
    }

    async fn complete(&mut self) -> Result<(), UpstreamError> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(|err| UpstreamError::Send(err.to_string()))
    }
}

struct WsSource {
    source: SplitStream<WsStream>,
}

#[async_trait]
impl EngineSource for WsSource {
    async fn next(&mut self) -> Option<Result<EnginePayload, UpstreamError>> {
        loop {
            let message = match self.source.next().await? {
                Ok(message) => message,
                Err(err) => return Some(Err(UpstreamError::Transport(err.to_string()))),
            };
            let parsed = match message {
                Message::Text(text) => serde_json::from_str(&text),
                Message::Binary(bytes) => serde_json::from_slice(&bytes),
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            return Some(parsed.map_err(|err| UpstreamError::Decode(err.to_string())));
        }
    }
}
