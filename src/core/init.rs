use serde_json::Value;

use crate::core::errors::{ErrorCode, ProxyError};

/// Immutable session configuration taken from the client's first message.
#[derive(Debug, Clone, PartialEq)]
pub struct InitConfig {
    pub model: String,
    pub lexicon: Option<Vec<RewriteTerm>>,
}

/// One `source -> target` substitution forwarded to the engine. Order is
/// preserved and duplicates are allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteTerm {
    pub source: String,
    pub target: String,
}

/// Parses and validates the raw init message payload.
///
/// Problems with the message itself or the `model` field classify as
/// `invalid_init_config`; any malformed `lexicon` shape classifies as
/// `unsupported_lexicon`.
pub fn parse_init(payload: &[u8]) -> Result<InitConfig, ProxyError> {
    let root: Value = serde_json::from_slice(payload).map_err(|_| {
        ProxyError::new(
            ErrorCode::InvalidInitConfig,
            "InitConfig must be a valid JSON object",
        )
    })?;
    let root = root.as_object().ok_or_else(|| {
        ProxyError::new(ErrorCode::InvalidInitConfig, "InitConfig must be a JSON object")
    })?;

    let model = root
        .get("model")
        .and_then(Value::as_str)
        .filter(|model| !model.trim().is_empty())
        .ok_or_else(|| {
            ProxyError::new(
                ErrorCode::InvalidInitConfig,
                "InitConfig requires a model string",
            )
        })?;

    let lexicon = match root.get("lexicon") {
        None => None,
        Some(lexicon) => Some(parse_lexicon(lexicon)?),
    };

    Ok(InitConfig {
        model: model.to_string(),
        lexicon,
    })
}

fn parse_lexicon(lexicon: &Value) -> Result<Vec<RewriteTerm>, ProxyError> {
    let lexicon = lexicon
        .as_object()
        .ok_or_else(|| lexicon_error("Lexicon must be an object"))?;
    let terms = lexicon
        .get("rewrite_terms")
        .ok_or_else(|| lexicon_error("Lexicon must include rewrite_terms"))?
        .as_array()
        .ok_or_else(|| lexicon_error("rewrite_terms must be an array"))?;

    let mut parsed = Vec::with_capacity(terms.len());
    for term in terms {
        let term = term
            .as_object()
            .ok_or_else(|| lexicon_error("rewrite_terms entries must be objects"))?;
        let source = term
            .get("source")
            .and_then(Value::as_str)
            .filter(|source| !source.trim().is_empty())
            .ok_or_else(|| lexicon_error("rewrite_terms entries require source string"))?;
        let target = term
            .get("target")
            .and_then(Value::as_str)
            .filter(|target| !target.trim().is_empty())
            .ok_or_else(|| lexicon_error("rewrite_terms entries require target string"))?;
        parsed.push(RewriteTerm {
            source: source.to_string(),
            target: target.to_string(),
        });
    }

    Ok(parsed)
}

fn lexicon_error(message: &str) -> ProxyError {
    ProxyError::new(ErrorCode::UnsupportedLexicon, message)
}

/// Resolves the engine output track a session subscribes to.
///
/// The model name is split on `-` and matched case-insensitively: `atran`
/// selects `pnc`, `dtran` selects `tpc`. A model carrying both markers or
/// neither is rejected.
pub fn select_track(model: &str) -> Result<&'static str, ProxyError> {
    if model.trim().is_empty() {
        return Err(ProxyError::protocol("Model is required"));
    }

    let parts: Vec<String> = model
        .split('-')
        .map(|part| part.trim().to_ascii_lowercase())
        .filter(|part| !part.is_empty())
        .collect();
    let has_atran = parts.iter().any(|part| part == "atran");
    let has_dtran = parts.iter().any(|part| part == "dtran");

    match (has_atran, has_dtran) {
        (true, true) => Err(ProxyError::protocol(format!(
            "Unsupported model '{model}': contains both atran and dtran"
        ))),
        (true, false) => Ok("pnc"),
        (false, true) => Ok("tpc"),
        (false, false) => Err(ProxyError::protocol(format!(
            "Unsupported model '{model}': only atran-* (pnc) and dtran-* (tpc) are supported"
        ))),
    }
}
