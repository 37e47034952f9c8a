use anyhow::{anyhow, bail, Context};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::ClientArgs;
use crate::lexicon;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Streams an audio file through a running gateway and prints the resulting
/// transcript frames.
pub async fn run(args: &ClientArgs) -> anyhow::Result<()> {
    let init = build_init(args)?;
    let request = build_request(args)?;
    let (stream, _response) = connect_async(request)
        .await
        .context("failed to connect to gateway")?;
    let (mut tx, rx) = stream.split();

    tx.send(Message::Text(init.to_string()))
        .await
        .context("failed to send init message")?;

    let printer = tokio::spawn(print_frames(rx, args.json));

    let audio = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("failed to read input file '{}'", args.input.display()))?;
    let send_result = send_audio(&mut tx, &audio, args.chunk_size.max(1)).await;

    let print_result = printer
        .await
        .map_err(|err| anyhow!("printer task failed: {err}"))?;
    print_result?;
    send_result
}

async fn send_audio(
    tx: &mut SplitSink<WsStream, Message>,
    audio: &[u8],
    chunk_size: usize,
) -> anyhow::Result<()> {
    for chunk in audio.chunks(chunk_size) {
        tx.send(Message::Binary(chunk.to_vec()))
            .await
            .context("failed to send audio chunk")?;
    }
    tx.send(Message::Binary(Vec::new()))
        .await
        .context("failed to send end-of-audio frame")?;
    Ok(())
}

fn build_init(args: &ClientArgs) -> anyhow::Result<Value> {
    let mut init = json!({ "model": args.model });
    if let Some(path) = &args.lexicon {
        if let Some(terms) = lexicon::load(path)? {
            let terms: Vec<Value> = terms
                .iter()
                .map(|term| json!({ "source": term.source, "target": term.target }))
                .collect();
            init["lexicon"] = json!({ "rewrite_terms": terms });
        }
    }
    Ok(init)
}

fn build_request(args: &ClientArgs) -> anyhow::Result<Request> {
    let auth = args.auth.to_ascii_lowercase();
    let mut url = args.url.clone();
    if auth == "query" {
        let key = require_key(args)?;
        let separator = if url.contains('?') { '&' } else { '?' };
        url = format!("{url}{separator}authorization={key}");
    }
    let mut request = url
        .as_str()
        .into_client_request()
        .context("invalid gateway URL")?;
    match auth.as_str() {
        "none" | "query" => {}
        "header" => {
            let value = HeaderValue::from_str(require_key(args)?)?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        "bearer" => {
            let value = HeaderValue::from_str(&format!("Bearer {}", require_key(args)?))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        "subprotocol" => {
            let value = HeaderValue::from_str(require_key(args)?)?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }
        other => bail!("unsupported auth type '{other}'"),
    }
    Ok(request)
}

fn require_key(args: &ClientArgs) -> anyhow::Result<&str> {
    args.api_key
        .as_deref()
        .ok_or_else(|| anyhow!("--api-key is required with --auth {}", args.auth))
}

async fn print_frames(mut rx: SplitStream<WsStream>, raw_json: bool) -> anyhow::Result<()> {
    while let Some(message) = rx.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => bail!("gateway connection failed: {err}"),
        };
        match message {
            Message::Text(text) => {
                let frame: Value =
                    serde_json::from_str(&text).context("gateway sent invalid JSON")?;
                if raw_json {
                    println!("{text}");
                }
                if frame
                    .get("finished")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
                {
                    return Ok(());
                }
                if let Some(code) = frame.get("error_code").and_then(Value::as_str) {
                    let message = frame
                        .get("error_message")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    bail!("gateway error {code}: {message}");
                }
                if !raw_json {
                    print_final_tokens(&frame);
                }
            }
            Message::Close(_) => return Ok(()),
            _ => {}
        }
    }
    Ok(())
}

fn print_final_tokens(frame: &Value) {
    let Some(tokens) = frame.get("tokens").and_then(Value::as_array) else {
        return;
    };
    for token in tokens {
        if !token
            .get("is_final")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            continue;
        }
        let text = token.get("text").and_then(Value::as_str).unwrap_or_default();
        let start = token
            .get("start_ms")
            .and_then(Value::as_f64)
            .unwrap_or_default();
        let end = token
            .get("end_ms")
            .and_then(Value::as_f64)
            .unwrap_or_default();
        println!("[{start:.0}-{end:.0}] {text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args() -> ClientArgs {
        ClientArgs {
            url: "ws://localhost:8080/ws".to_string(),
            input: PathBuf::from("audio.raw"),
            model: "atran-test".to_string(),
            lexicon: None,
            chunk_size: 4096,
            json: false,
            auth: "none".to_string(),
            api_key: None,
        }
    }

    #[test]
    fn init_without_lexicon_is_model_only() {
        let init = build_init(&args()).expect("init");
        assert_eq!(init, json!({ "model": "atran-test" }));
    }

    #[test]
    fn query_auth_appends_authorization_parameter() {
        let mut args = args();
        args.auth = "query".to_string();
        args.api_key = Some("sekret".to_string());
        let request = build_request(&args).expect("request");
        assert_eq!(request.uri().query(), Some("authorization=sekret"));
    }

    #[test]
    fn bearer_auth_sets_authorization_header() {
        let mut args = args();
        args.auth = "bearer".to_string();
        args.api_key = Some("sekret".to_string());
        let request = build_request(&args).expect("request");
        assert_eq!(
            request.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Bearer sekret")
        );
    }

    #[test]
    fn subprotocol_auth_offers_the_key() {
        let mut args = args();
        args.auth = "subprotocol".to_string();
        args.api_key = Some("sekret".to_string());
        let request = build_request(&args).expect("request");
        assert_eq!(
            request
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|v| v.to_str().ok()),
            Some("sekret")
        );
    }

    #[test]
    fn missing_key_is_rejected() {
        let mut args = args();
        args.auth = "header".to_string();
        assert!(build_request(&args).is_err());
    }

    #[test]
    fn unknown_auth_type_is_rejected() {
        let mut args = args();
        args.auth = "cookie".to_string();
        args.api_key = Some("sekret".to_string());
        assert!(build_request(&args).is_err());
    }
}
