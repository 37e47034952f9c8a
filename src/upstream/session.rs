use tracing::warn;

use crate::core::init::InitConfig;
use crate::core::stabilizer::{Stabilizer, TranscriptEvent};
use crate::upstream::mapper;
use crate::upstream::protocol::{EngineConnector, EngineSink, EngineSource, UpstreamError};

/// Opens one engine session: sends the configuration frame and consumes the
/// engine's acknowledgement frame before any transcripts are read. Returns
/// the audio sink and the transcript reader for the selected track.
pub async fn start_session(
    connector: &dyn EngineConnector,
    config: &InitConfig,
    track: &str,
) -> Result<(EngineAudioSink, TranscriptReader), UpstreamError> {
    let (mut sink, mut source) = connector.open(config).await?;
    sink.send(mapper::config_payload(config)).await?;
    match source.next().await {
        Some(Ok(_)) => {}
        Some(Err(err)) => warn!(error = %err, "engine configuration acknowledgement failed"),
        None => warn!("engine closed the stream before acknowledging configuration"),
    }
    Ok((
        EngineAudioSink { sink },
        TranscriptReader {
            source,
            stabilizer: Stabilizer::new(track),
            track: track.to_string(),
            finished: false,
        },
    ))
}

/// Outbound half of an engine session; owned by the audio-forwarding task.
pub struct EngineAudioSink {
    sink: Box<dyn EngineSink>,
}

impl EngineAudioSink {
    pub async fn send_audio(&mut self, audio: Vec<u8>) -> Result<(), UpstreamError> {
        self.sink.send(mapper::audio_payload(audio)).await
    }

    /// Half-closes the outbound side so the engine can flush its remaining
    /// transcripts.
    pub async fn complete(&mut self) -> Result<(), UpstreamError> {
        self.sink.complete().await
    }
}

/// Pull-based transcript sequence for one track. A single owner advances it;
/// events arrive in engine frame order, then the stream-end flush fires once.
pub struct TranscriptReader {
    source: Box<dyn EngineSource>,
    stabilizer: Stabilizer,
    track: String,
    finished: bool,
}

impl TranscriptReader {
    pub async fn next_event(&mut self) -> Option<Result<TranscriptEvent, UpstreamError>> {
        if self.finished {
            return None;
        }
        loop {
            match self.source.next().await {
                Some(Ok(payload)) => {
                    if payload.track != self.track || payload.chunk.is_empty() {
                        continue;
                    }
                    let items = mapper::tagged_items(&payload);
                    return Some(Ok(self.stabilizer.process_frame(items)));
                }
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(err));
                }
                None => {
                    self.finished = true;
                    return self.stabilizer.finish().map(Ok);
                }
            }
        }
    }
}
