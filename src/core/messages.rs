use serde::Serialize;

use crate::core::errors::ProxyError;
use crate::core::stabilizer::{Token, TranscriptEvent};

/// One token inside an outbound transcript frame. `nonspeech` is omitted
/// entirely when false.
#[derive(Debug, Clone, Serialize)]
pub struct WireToken {
    pub text: String,
    pub start_ms: f64,
    pub end_ms: f64,
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonspeech: Option<bool>,
}

impl From<Token> for WireToken {
    fn from(token: Token) -> Self {
        Self {
            text: token.text,
            start_ms: token.start_ms,
            end_ms: token.end_ms,
            is_final: token.is_final,
            nonspeech: token.nonspeech.then_some(true),
        }
    }
}

/// Outbound transcript frame, one per processed engine response frame.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptFrame {
    pub track: String,
    pub tokens: Vec<WireToken>,
    pub final_audio_proc_ms: f64,
    pub total_audio_proc_ms: f64,
}

impl From<TranscriptEvent> for TranscriptFrame {
    fn from(event: TranscriptEvent) -> Self {
        Self {
            track: event.track,
            tokens: event.tokens.into_iter().map(WireToken::from).collect(),
            final_audio_proc_ms: event.final_audio_proc_ms,
            total_audio_proc_ms: event.total_audio_proc_ms,
        }
    }
}

/// Sent once after a normal end-of-audio drain, immediately before closure.
#[derive(Debug, Clone, Serialize)]
pub struct FinishedFrame {
    pub finished: bool,
}

impl FinishedFrame {
    pub fn new() -> Self {
        Self { finished: true }
    }
}

impl Default for FinishedFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Sent at most once per connection, immediately before a protocol-error
/// closure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorFrame {
    pub error_code: String,
    pub error_message: String,
}

impl From<&ProxyError> for ErrorFrame {
    fn from(error: &ProxyError) -> Self {
        Self {
            error_code: error.code.as_str().to_string(),
            error_message: error.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{ErrorCode, ProxyError};

    #[test]
    fn transcript_frame_omits_false_nonspeech() {
        let frame = TranscriptFrame::from(TranscriptEvent {
            track: "pnc".to_string(),
            tokens: vec![
                Token {
                    text: "hello".to_string(),
                    start_ms: 0.0,
                    end_ms: 10.0,
                    is_final: true,
                    nonspeech: false,
                },
                Token {
                    text: "[n::noise]".to_string(),
                    start_ms: 10.0,
                    end_ms: 20.0,
                    is_final: false,
                    nonspeech: true,
                },
            ],
            final_audio_proc_ms: 10.0,
            total_audio_proc_ms: 20.0,
        });
        let json = serde_json::to_string(&frame).expect("serialize");
        assert!(json.contains("\"track\":\"pnc\""));
        assert!(json.contains("\"total_audio_proc_ms\":20.0"));
        assert_eq!(json.matches("nonspeech").count(), 1);
    }

    #[test]
    fn finished_frame_serializes_flag_only() {
        let json = serde_json::to_string(&FinishedFrame::new()).expect("serialize");
        assert_eq!(json, r#"{"finished":true}"#);
    }

    #[test]
    fn error_frame_carries_code_and_message() {
        let error = ProxyError::new(ErrorCode::BufferOverflow, "Upstream not ready");
        let json = serde_json::to_string(&ErrorFrame::from(&error)).expect("serialize");
        assert_eq!(
            json,
            r#"{"error_code":"buffer_overflow","error_message":"Upstream not ready"}"#
        );
    }
}
