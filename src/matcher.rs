//! Extraction of candidate payloads from a normalized row.
//!
//! Matching never errors: a row missing an expected field, carrying an empty
//! text cell, or failing the speaker filter simply contributes zero items.
//! Requested languages are tried in priority order and every hit is kept, so
//! multi-language side specs can match several items on one row.

use serde_json::Value;

use crate::config::{Modality, SideConfig};
use crate::constants::fields;
use crate::record::Record;
use crate::types::LanguageCode;

/// One payload extracted from a row for one side of a pair.
#[derive(Clone, Debug, PartialEq)]
pub enum MatchedItem {
    /// A per-language text payload.
    Text {
        /// The text itself.
        text: String,
        /// Language the payload was matched under.
        language: LanguageCode,
        /// Provenance tag of the row that produced it.
        origin_dataset: String,
    },
    /// An audio payload, from the row's own recording or a join accumulator.
    Speech {
        /// The audio cell, passed through untouched.
        audio: Value,
        /// Language the payload was matched under.
        language: LanguageCode,
        /// Speaker id, `null` when unknown.
        speaker_id: Value,
        /// Studio flag, `null` when unknown (always unknown for
        /// accumulator hits).
        is_studio: Value,
        /// Provenance tag of the row that produced it.
        origin_dataset: String,
    },
}

/// Extract everything on `row` that satisfies one side's spec, in language
/// priority order.
pub fn matching_items(row: &Record, spec: &SideConfig) -> Vec<MatchedItem> {
    let origin = row.text(fields::ORIGIN_DATASET).unwrap_or_default();
    let mut items = Vec::new();
    for language in spec.language.codes() {
        match spec.modality {
            Modality::Text => match_text(row, language, origin, &mut items),
            Modality::Speech => match_speech(row, spec, language, origin, &mut items),
        }
    }
    items
}

fn match_text(row: &Record, language: &str, origin: &str, items: &mut Vec<MatchedItem>) {
    let field = format!("{language}{}", fields::TEXT_SUFFIX);
    if let Some(text) = row.text(&field) {
        items.push(MatchedItem::Text {
            text: text.to_string(),
            language: language.to_string(),
            origin_dataset: origin.to_string(),
        });
    }
}

fn match_speech(
    row: &Record,
    spec: &SideConfig,
    language: &str,
    origin: &str,
    items: &mut Vec<MatchedItem>,
) {
    // The row's own recording, when its language is the one requested.
    if row.text(fields::LANGUAGE) == Some(language)
        && let Some(audio) = row.value(fields::AUDIO)
    {
        let speaker = row.value(fields::SPEAKER_ID).cloned().unwrap_or(Value::Null);
        if speaker_accepted(spec, &speaker) {
            items.push(MatchedItem::Speech {
                audio: audio.clone(),
                language: language.to_string(),
                speaker_id: speaker,
                is_studio: row.value(fields::IS_STUDIO).cloned().unwrap_or(Value::Null),
                origin_dataset: origin.to_string(),
            });
        }
    }

    // Join accumulators: audio_<lang> with the index-aligned speaker column.
    let audio_key = format!("{}{language}", fields::AUDIO_PREFIX);
    let speaker_key = format!("{}{language}{}", fields::AUDIO_PREFIX, fields::SPEAKER_SUFFIX);
    let Some(Value::Array(audios)) = row.value(&audio_key) else {
        return;
    };
    let speakers = match row.value(&speaker_key) {
        Some(Value::Array(speakers)) => speakers.as_slice(),
        _ => &[],
    };
    for (idx, audio) in audios.iter().enumerate() {
        let speaker = speakers.get(idx).cloned().unwrap_or(Value::Null);
        if !speaker_accepted(spec, &speaker) {
            continue;
        }
        items.push(MatchedItem::Speech {
            audio: audio.clone(),
            language: language.to_string(),
            speaker_id: speaker,
            is_studio: Value::Null,
            origin_dataset: origin.to_string(),
        });
    }
}

fn speaker_accepted(spec: &SideConfig, speaker: &Value) -> bool {
    match &spec.speaker_id {
        None => true,
        Some(wanted) => speaker == wanted,
    }
}
