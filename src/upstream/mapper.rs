use crate::core::init::InitConfig;
use crate::core::stabilizer::TaggedItem;
use crate::upstream::protocol::{EngineItem, EnginePayload, AUDIO_TRACK};

const KEY_TIMESTAMP: &str = "ts";
const KEY_TEXT: &str = "txt";
const TAG_PROVISIONAL: &str = "la";
const TAG_SENTENCE_START: &str = "sos";

/// Builds the configuration frame sent as the first payload of every engine
/// session.
pub fn config_payload(config: &InitConfig) -> EnginePayload {
    let mut chunk = vec![
        string_item("audio-format", "auto:0"),
        string_item("audio-channel", "downmix"),
    ];

    if let Some(terms) = &config.lexicon {
        let entries = terms
            .iter()
            .map(|term| {
                let mut entry = EngineItem {
                    item_type: Some("s".to_string()),
                    s: Some(term.target.clone()),
                    ..EngineItem::default()
                };
                entry.labels.insert("hint".to_string(), term.source.clone());
                entry
            })
            .collect();
        chunk.push(EngineItem {
            key: "lexicon".to_string(),
            item_type: Some("m".to_string()),
            m: entries,
            ..EngineItem::default()
        });
    }

    EnginePayload {
        track: String::new(),
        chunk,
    }
}

/// Wraps one client audio chunk for the engine's audio track.
pub fn audio_payload(audio: Vec<u8>) -> EnginePayload {
    EnginePayload {
        track: AUDIO_TRACK.to_string(),
        chunk: vec![EngineItem {
            b: Some(audio),
            ..EngineItem::default()
        }],
    }
}

/// Narrows an engine response frame to the items the stabilizer understands;
/// unknown keys are dropped.
pub fn tagged_items(payload: &EnginePayload) -> Vec<TaggedItem> {
    payload
        .chunk
        .iter()
        .filter_map(|item| match item.key.as_str() {
            KEY_TIMESTAMP => item.d.map(|timestamp_ms| TaggedItem::Boundary {
                timestamp_ms,
                provisional: item.has_tag(TAG_PROVISIONAL),
            }),
            KEY_TEXT => item.s.as_ref().map(|text| TaggedItem::Fragment {
                text: text.clone(),
                provisional: item.has_tag(TAG_PROVISIONAL),
                sentence_start: item.has_tag(TAG_SENTENCE_START),
            }),
            _ => None,
        })
        .collect()
}

fn string_item(key: &str, value: &str) -> EngineItem {
    EngineItem {
        key: key.to_string(),
        item_type: Some("s".to_string()),
        s: Some(value.to_string()),
        ..EngineItem::default()
    }
}
