use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::errors::{ErrorCode, ProxyError};
use crate::core::init;
use crate::core::messages::{ErrorFrame, FinishedFrame, TranscriptFrame};
use crate::metrics::MetricsStore;
use crate::readiness::UpstreamReadiness;
use crate::upstream::protocol::EngineConnector;
use crate::upstream::session::{start_session, EngineAudioSink, TranscriptReader};

const OUTBOUND_BUFFER: usize = 64;

/// Shared, immutable dependencies handed to every connection.
pub struct SessionContext {
    pub metrics: Arc<MetricsStore>,
    pub readiness: Arc<dyn UpstreamReadiness>,
    pub connector: Arc<dyn EngineConnector>,
    pub audio_buffer_frames: usize,
}

/// Frames funneled through the single socket writer. `Finished` and `Error`
/// are terminal: the writer sends the close frame and stops.
enum Outbound {
    Transcript(TranscriptFrame),
    Finished,
    Error(ProxyError),
}

/// Runs one client connection to completion. Every exit path cancels and
/// awaits the auxiliary flows before the engine session is released.
pub async fn run(socket: WebSocket, ctx: Arc<SessionContext>) {
    ctx.metrics.session_started();

    let (ws_tx, mut ws_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let writer = tokio::spawn(run_writer(ws_tx, out_rx, Arc::clone(&ctx.metrics)));

    let mut session = Session {
        ctx: Arc::clone(&ctx),
        out_tx,
        cancel: CancellationToken::new(),
        streaming: None,
    };
    session.run_receive(&mut ws_rx).await;

    session.cancel.cancel();
    if let Some(streaming) = session.streaming.take() {
        streaming.join().await;
    }
    drop(session);
    if let Err(err) = writer.await {
        warn!(error = ?err, "socket writer join failed");
    }

    ctx.metrics.session_ended();
}

struct Session {
    ctx: Arc<SessionContext>,
    out_tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    streaming: Option<StreamingState>,
}

/// Live once the init message has been accepted and the engine session is up.
struct StreamingState {
    audio_tx: mpsc::Sender<Vec<u8>>,
    audio_task: JoinHandle<()>,
    transcript_task: JoinHandle<()>,
}

impl StreamingState {
    async fn join(self) {
        drop(self.audio_tx);
        if let Err(err) = self.audio_task.await {
            warn!(error = ?err, "audio forwarder join failed");
        }
        if let Err(err) = self.transcript_task.await {
            warn!(error = ?err, "transcript forwarder join failed");
        }
    }
}

impl Session {
    async fn run_receive(&mut self, ws_rx: &mut SplitStream<WebSocket>) {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => return,
                message = ws_rx.next() => message,
            };
            let Some(Ok(message)) = message else {
                // Transport gone; there is nothing left to report to.
                return;
            };
            match message {
                Message::Text(text) => {
                    if self.streaming.is_some() {
                        self.fail(ProxyError::protocol("InitConfig already received"))
                            .await;
                        return;
                    }
                    if !self.handle_init(text.as_bytes()).await {
                        return;
                    }
                }
                Message::Binary(payload) => {
                    self.ctx.metrics.add_bytes_in(payload.len() as u64);
                    let audio_tx = match self.streaming.as_ref() {
                        Some(streaming) => streaming.audio_tx.clone(),
                        None => {
                            self.fail(ProxyError::protocol(
                                "InitConfig must be the first message",
                            ))
                            .await;
                            return;
                        }
                    };
                    if payload.is_empty() {
                        self.finish().await;
                        return;
                    }
                    if !self.ctx.readiness.is_ready() {
                        self.fail(ProxyError::new(
                            ErrorCode::BufferOverflow,
                            "Upstream not ready",
                        ))
                        .await;
                        return;
                    }
                    // Bounded queue: a slow upstream suspends this loop and
                    // throttles reads from the client.
                    if audio_tx.send(payload).await.is_err() {
                        // Forwarder exited; its failure was already reported.
                        return;
                    }
                }
                Message::Close(_) => return,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }

    /// Validates the init message and brings up the engine session plus the
    /// two forwarding flows. Returns false when the connection must close.
    async fn handle_init(&mut self, payload: &[u8]) -> bool {
        let config = match init::parse_init(payload) {
            Ok(config) => config,
            Err(err) => {
                self.fail(err).await;
                return false;
            }
        };
        let track = match init::select_track(&config.model) {
            Ok(track) => track,
            Err(err) => {
                self.fail(err).await;
                return false;
            }
        };
        let (sink, transcripts) =
            match start_session(self.ctx.connector.as_ref(), &config, track).await {
                Ok(pair) => pair,
                Err(err) => {
                    self.ctx.metrics.add_upstream_error();
                    self.fail(ProxyError::protocol(format!("Upstream error: {err}")))
                        .await;
                    return false;
                }
            };

        let (audio_tx, audio_rx) = mpsc::channel(self.ctx.audio_buffer_frames);
        let audio_task = tokio::spawn(forward_audio(
            audio_rx,
            sink,
            self.out_tx.clone(),
            self.cancel.clone(),
            Arc::clone(&self.ctx.metrics),
        ));
        let transcript_task = tokio::spawn(forward_transcripts(
            transcripts,
            self.out_tx.clone(),
            self.cancel.clone(),
            Arc::clone(&self.ctx.metrics),
        ));
        info!(model = %config.model, track, "session streaming");
        self.streaming = Some(StreamingState {
            audio_tx,
            audio_task,
            transcript_task,
        });
        true
    }

    /// Normal end of audio: drain the queue, half-close the engine session,
    /// wait for the remaining transcripts, then confirm.
    async fn finish(&mut self) {
        let Some(streaming) = self.streaming.take() else {
            return;
        };
        streaming.join().await;
        let _ = self.out_tx.send(Outbound::Finished).await;
    }

    async fn fail(&mut self, error: ProxyError) {
        warn!(code = error.code.as_str(), message = %error.message, "session failed");
        let _ = self.out_tx.send(Outbound::Error(error)).await;
    }
}

/// Drains the bounded audio queue into the engine in FIFO order. Queue
/// closure is the end-of-audio signal and triggers the upstream half-close.
async fn forward_audio(
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    mut sink: EngineAudioSink,
    out_tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    metrics: Arc<MetricsStore>,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = audio_rx.recv() => frame,
        };
        match frame {
            Some(audio) => {
                if let Err(err) = sink.send_audio(audio).await {
                    metrics.add_upstream_error();
                    let _ = out_tx
                        .send(Outbound::Error(ProxyError::protocol(format!(
                            "Upstream error: {err}"
                        ))))
                        .await;
                    cancel.cancel();
                    return;
                }
            }
            None => {
                if let Err(err) = sink.complete().await {
                    warn!(error = %err, "engine half-close failed");
                }
                return;
            }
        }
    }
}

/// Relays stabilized transcript events to the client in arrival order.
async fn forward_transcripts(
    mut transcripts: TranscriptReader,
    out_tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    metrics: Arc<MetricsStore>,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = transcripts.next_event() => event,
        };
        match event {
            Some(Ok(event)) => {
                if out_tx
                    .send(Outbound::Transcript(TranscriptFrame::from(event)))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Some(Err(err)) => {
                metrics.add_upstream_error();
                let _ = out_tx
                    .send(Outbound::Error(ProxyError::protocol(format!(
                        "Upstream error: {err}"
                    ))))
                    .await;
                cancel.cancel();
                return;
            }
            None => return,
        }
    }
}

/// Single writer owning the socket sink: transcript frames, the finished
/// frame, and error frames are never interleaved, and only the first
/// terminal frame is ever sent.
async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<Outbound>,
    metrics: Arc<MetricsStore>,
) {
    while let Some(frame) = out_rx.recv().await {
        let (payload, close) = match &frame {
            Outbound::Transcript(frame) => (serde_json::to_string(frame), None),
            Outbound::Finished => (
                serde_json::to_string(&FinishedFrame::new()),
                Some(CloseFrame {
                    code: close_code::NORMAL,
                    reason: "finished".into(),
                }),
            ),
            Outbound::Error(proxy_error) => (
                serde_json::to_string(&ErrorFrame::from(proxy_error)),
                Some(CloseFrame {
                    code: close_code::PROTOCOL,
                    reason: proxy_error.code.as_str().into(),
                }),
            ),
        };
        let payload = match payload {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to serialize outbound frame");
                continue;
            }
        };
        metrics.add_bytes_out(payload.len() as u64);
        if ws_tx.send(Message::Text(payload)).await.is_err() {
            break;
        }
        if let Some(frame) = close {
            let _ = ws_tx.send(Message::Close(Some(frame))).await;
            break;
        }
    }
}
