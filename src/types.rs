/// ISO 639-2 language code requested in configuration or carried on a row.
/// Examples: `eng`, `lug`, `ach`
pub type LanguageCode = String;
/// Provenance tag identifying which loaded dataset (or comma-joined pair of
/// datasets) a record came from.
/// Examples: `sentences_eng`, `sentences_eng,studio_audio_lug`
pub type DatasetTag = String;
/// Column or field name in a record, batch, or example.
/// Examples: `eng_text`, `audio_lug_speaker_id`, `source.language`
pub type FieldName = String;
/// Untyped cell payload: text, an opaque audio blob, a flag, or an
/// accumulator list.
pub type FieldValue = serde_json::Value;
/// Keyword arguments bound to a preprocessing step at pipeline-build time.
pub type Kwargs = serde_json::Map<String, serde_json::Value>;
