//! Pair generation: the cross product of a row's source and target matches.
//!
//! A row yielding `s` source items and `t` target items emits exactly
//! `s * t` examples; a miss on either side emits none. Examples carry the
//! payload under the bare side key plus namespaced metadata (`side.language`
//! and friends), which a later projection usually strips.

use serde_json::Value;

use crate::config::SideConfig;
use crate::constants::fields;
use crate::matcher::{MatchedItem, matching_items};
use crate::record::Record;

/// One finished training example.
///
/// Examples: `{"source": "hello", "target": {...audio...}}` after
/// projection, or the same plus `source.language`, `target.speaker_id`, etc.
/// before it.
pub type Example = Record;

/// Generate all examples one normalized row contributes: every matched
/// source item paired with every matched target item, source-major.
pub fn matching_pairs(row: &Record, source: &SideConfig, target: &SideConfig) -> Vec<Example> {
    let source_items = matching_items(row, source);
    if source_items.is_empty() {
        return Vec::new();
    }
    let target_items = matching_items(row, target);

    let mut examples = Vec::with_capacity(source_items.len() * target_items.len());
    for source_item in &source_items {
        for target_item in &target_items {
            let mut example = Example::new();
            write_side(&mut example, fields::SOURCE, source_item);
            write_side(&mut example, fields::TARGET, target_item);
            examples.push(example);
        }
    }
    examples
}

/// Write one matched item under its side: the payload at the bare side key,
/// metadata namespaced as `side.field`.
fn write_side(example: &mut Example, side: &str, item: &MatchedItem) {
    match item {
        MatchedItem::Text {
            text,
            language,
            origin_dataset,
        } => {
            example.insert(side, Value::String(text.clone()));
            example.insert(format!("{side}.language"), Value::String(language.clone()));
            example.insert(
                format!("{side}.origin_dataset"),
                Value::String(origin_dataset.clone()),
            );
        }
        MatchedItem::Speech {
            audio,
            language,
            speaker_id,
            is_studio,
            origin_dataset,
        } => {
            example.insert(side, audio.clone());
            example.insert(format!("{side}.language"), Value::String(language.clone()));
            example.insert(format!("{side}.speaker_id"), speaker_id.clone());
            example.insert(format!("{side}.is_studio"), is_studio.clone());
            example.insert(
                format!("{side}.origin_dataset"),
                Value::String(origin_dataset.clone()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LanguageSpec, Modality};
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn side(languages: LanguageSpec, modality: Modality) -> SideConfig {
        SideConfig::new(languages, modality)
    }

    #[test]
    fn pair_count_is_the_product_of_side_match_counts() {
        let row = record(json!({
            "eng_text": "hello",
            "lug_text": "mbote",
            "audio_ach": ["a1", "a2", "a3"],
            "origin_dataset": "joined",
        }));
        let source = side(
            LanguageSpec::Many(vec!["eng".to_string(), "lug".to_string()]),
            Modality::Text,
        );
        let target = side(LanguageSpec::from("ach"), Modality::Speech);
        let examples = matching_pairs(&row, &source, &target);
        // 2 text matches x 3 audio matches.
        assert_eq!(examples.len(), 6);
        // Source-major order: the first three pairs share the first source.
        for example in &examples[..3] {
            assert_eq!(example.text("source"), Some("hello"));
        }
        assert_eq!(examples[0].get("target"), Some(&json!("a1")));
        assert_eq!(examples[1].get("target"), Some(&json!("a2")));
    }

    #[test]
    fn a_miss_on_either_side_emits_no_examples() {
        let row = record(json!({"eng_text": "hello", "origin_dataset": "s"}));
        let source = side(LanguageSpec::from("eng"), Modality::Text);
        let target = side(LanguageSpec::from("lug"), Modality::Speech);
        assert!(matching_pairs(&row, &source, &target).is_empty());

        let source = side(LanguageSpec::from("ach"), Modality::Text);
        let target = side(LanguageSpec::from("eng"), Modality::Text);
        assert!(matching_pairs(&row, &source, &target).is_empty());
    }

    #[test]
    fn text_sides_carry_language_and_origin_metadata() {
        let row = record(json!({
            "eng_text": "hello",
            "lug_text": "mbote",
            "origin_dataset": "sentences",
        }));
        let source = side(LanguageSpec::from("eng"), Modality::Text);
        let target = side(LanguageSpec::from("lug"), Modality::Text);
        let examples = matching_pairs(&row, &source, &target);
        assert_eq!(examples.len(), 1);
        let example = &examples[0];
        assert_eq!(example.text("source"), Some("hello"));
        assert_eq!(example.text("source.language"), Some("eng"));
        assert_eq!(example.text("source.origin_dataset"), Some("sentences"));
        assert_eq!(example.text("target"), Some("mbote"));
        assert_eq!(example.text("target.language"), Some("lug"));
    }

    #[test]
    fn speech_sides_carry_speaker_and_studio_metadata() {
        let row = record(json!({
            "eng_text": "hello",
            "audio": "a",
            "language": "lug",
            "speaker_id": "spk-1",
            "is_studio": false,
            "origin_dataset": "recordings",
        }));
        let source = side(LanguageSpec::from("eng"), Modality::Text);
        let target = side(LanguageSpec::from("lug"), Modality::Speech);
        let examples = matching_pairs(&row, &source, &target);
        assert_eq!(examples.len(), 1);
        let example = &examples[0];
        assert_eq!(example.get("target"), Some(&json!("a")));
        assert_eq!(example.text("target.language"), Some("lug"));
        assert_eq!(example.get("target.speaker_id"), Some(&json!("spk-1")));
        assert_eq!(example.get("target.is_studio"), Some(&json!(false)));
        assert_eq!(example.text("target.origin_dataset"), Some("recordings"));
    }

    #[test]
    fn same_language_both_sides_pairs_text_with_speech() {
        // Speech-to-text style: the transcript pairs with its own recording.
        let row = record(json!({
            "lug_text": "mbote",
            "audio": "a",
            "language": "lug",
            "origin_dataset": "asr",
        }));
        let source = side(LanguageSpec::from("lug"), Modality::Speech);
        let target = side(LanguageSpec::from("lug"), Modality::Text);
        let examples = matching_pairs(&row, &source, &target);
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].get("source"), Some(&json!("a")));
        assert_eq!(examples[0].text("target"), Some("mbote"));
    }
}
