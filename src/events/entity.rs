//! Builders for the entity payloads carried inside protocol `event` messages.
//!
//! Two entity kinds are produced: `transcript` (a finalized recognition
//! result with per-word tokens) and `agentassist` (summary utterances and
//! optional knowledge suggestions). Each entity gets a generated UUID so the
//! client can de-duplicate re-deliveries.

use crate::protocol::ticks_to_duration;
use serde_json::{json, Value};
use uuid::Uuid;

/// One recognized word with its confidence and tick offsets, as reported by
/// the recognition backend.
#[derive(Debug, Clone)]
pub struct RecognizedWord {
    pub word: String,
    pub confidence: f64,
    pub offset_ticks: u64,
    pub duration_ticks: u64,
}

/// Build a `transcript` entity for one finalized utterance.
pub fn build_transcript_entity(
    channel_id: &str,
    transcript_text: &str,
    words: &[RecognizedWord],
    is_final: bool,
    offset_ticks: u64,
    duration_ticks: u64,
    language: &str,
) -> Value {
    let tokens: Vec<Value> = words
        .iter()
        .map(|word| {
            json!({
                "type": "word",
                "value": word.word,
                "confidence": word.confidence,
                "offset": ticks_to_duration(word.offset_ticks),
                "duration": ticks_to_duration(word.duration_ticks),
                "language": language,
            })
        })
        .collect();

    let confidence = if words.is_empty() {
        0.85
    } else {
        words.iter().map(|w| w.confidence).sum::<f64>() / words.len() as f64
    };

    json!({
        "type": "transcript",
        "data": {
            "id": Uuid::new_v4().to_string(),
            "channelId": channel_id,
            "isFinal": is_final,
            "offset": ticks_to_duration(offset_ticks),
            "duration": ticks_to_duration(duration_ticks),
            "alternatives": [
                {
                    "confidence": confidence,
                    "languages": [language],
                    "interpretations": [
                        {
                            "type": "display",
                            "transcript": transcript_text,
                            "tokens": tokens,
                        }
                    ],
                }
            ],
        }
    })
}

/// Build an `agentassist` entity wrapping utterances and suggestions.
pub fn build_agent_assist_entity(utterances: Vec<Value>, suggestions: Vec<Value>) -> Value {
    json!({
        "type": "agentassist",
        "data": {
            "id": Uuid::new_v4().to_string(),
            "utterances": utterances,
            "suggestions": suggestions,
        }
    })
}

/// Build one agent-assist utterance.
#[allow(clippy::too_many_arguments)]
pub fn build_agent_assist_utterance(
    position: &str,
    text: &str,
    language: &str,
    confidence: f64,
    channel: &str,
    is_final: bool,
    duration: &str,
) -> Value {
    json!({
        "id": Uuid::new_v4().to_string(),
        "position": position,
        "duration": duration,
        "text": text,
        "language": language,
        "confidence": confidence,
        "channel": channel,
        "isFinal": is_final,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_entity_shape() {
        let words = vec![
            RecognizedWord {
                word: "hello".into(),
                confidence: 0.9,
                offset_ticks: 0,
                duration_ticks: 5_000_000,
            },
            RecognizedWord {
                word: "world".into(),
                confidence: 0.7,
                offset_ticks: 5_000_000,
                duration_ticks: 5_000_000,
            },
        ];

        let entity = build_transcript_entity(
            "CUSTOMER",
            "Hello world.",
            &words,
            true,
            0,
            10_000_000,
            "en-US",
        );

        assert_eq!(entity["type"], "transcript");
        let data = &entity["data"];
        assert_eq!(data["channelId"], "CUSTOMER");
        assert_eq!(data["isFinal"], true);
        assert_eq!(data["offset"], "PT0.00S");
        assert_eq!(data["duration"], "PT1.00S");

        let alternative = &data["alternatives"][0];
        assert!((alternative["confidence"].as_f64().unwrap() - 0.8).abs() < 1e-9);
        let tokens = alternative["interpretations"][0]["tokens"].as_array().unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0]["value"], "hello");
        assert_eq!(tokens[1]["offset"], "PT0.50S");
    }

    #[test]
    fn test_transcript_entity_without_words_uses_default_confidence() {
        let entity =
            build_transcript_entity("CUSTOMER", "Hmm.", &[], true, 0, 2_000_000, "en-US");
        let confidence = entity["data"]["alternatives"][0]["confidence"].as_f64().unwrap();
        assert!((confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_agent_assist_entity_shape() {
        let utterance = build_agent_assist_utterance(
            "PT1.20S",
            "Customer asked about billing.",
            "en-US",
            0.85,
            "CUSTOMER",
            true,
            "PT1S",
        );
        let entity = build_agent_assist_entity(vec![utterance], vec![]);

        assert_eq!(entity["type"], "agentassist");
        let data = &entity["data"];
        assert_eq!(data["utterances"].as_array().unwrap().len(), 1);
        assert_eq!(data["suggestions"].as_array().unwrap().len(), 0);
        assert_eq!(data["utterances"][0]["position"], "PT1.20S");
        assert_eq!(data["utterances"][0]["isFinal"], true);
    }
}
