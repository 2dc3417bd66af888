//! Per-row canonicalization applied after load and before matching.
//!
//! Two responsibilities: rewriting the bare `text` payload of combined
//! text+audio rows into the per-language `<lang>_text` convention, and
//! stamping every row with its `origin_dataset` provenance tag. Shape is
//! decided once per source (see `SourceShape`), not re-detected per row.

use serde_json::Value;

use crate::constants::fields;
use crate::record::{ColumnarBatch, Record};
use crate::source::SourceShape;
use crate::types::DatasetTag;

/// Canonicalizes rows of one loaded source.
#[derive(Clone, Debug)]
pub struct RowNormalizer {
    tag: DatasetTag,
    shape: SourceShape,
}

impl RowNormalizer {
    /// Create a normalizer for a source with the given provenance tag and
    /// resolved shape.
    pub fn new(tag: impl Into<DatasetTag>, shape: SourceShape) -> Self {
        Self {
            tag: tag.into(),
            shape,
        }
    }

    /// Canonicalize one row.
    ///
    /// On combined text+audio rows the bare `text` moves to `<lang>_text`
    /// using the row's own `language`; rows without a usable language keep
    /// their bare `text` (which then simply matches nothing). Every row gets
    /// `origin_dataset` appended last.
    pub fn row(&self, mut record: Record) -> Record {
        if self.shape == SourceShape::CombinedTextAudio
            && record.value(fields::AUDIO).is_some()
            && record.value(fields::TEXT).is_some()
            && let Some(language) = record.text(fields::LANGUAGE).map(str::to_string)
            && let Some(text) = record.remove(fields::TEXT)
        {
            record.insert(format!("{language}{}", fields::TEXT_SUFFIX), text);
        }
        record.insert(fields::ORIGIN_DATASET, Value::String(self.tag.clone()));
        record
    }

    /// Canonicalize a whole batch into per-row records.
    pub fn rows(&self, batch: ColumnarBatch) -> Vec<Record> {
        batch
            .into_records()
            .into_iter()
            .map(|record| self.row(record))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn combined_rows_move_bare_text_under_the_row_language() {
        let normalizer = RowNormalizer::new("combined", SourceShape::CombinedTextAudio);
        let row = normalizer.row(record(
            json!({"id": 1, "audio": [0.1], "text": "mbote", "language": "lug"}),
        ));
        assert!(!row.contains("text"));
        assert_eq!(row.text("lug_text"), Some("mbote"));
        assert_eq!(row.text("origin_dataset"), Some("combined"));
    }

    #[test]
    fn combined_rows_without_language_keep_their_bare_text() {
        let normalizer = RowNormalizer::new("combined", SourceShape::CombinedTextAudio);
        let row = normalizer.row(record(json!({"id": 1, "audio": [0.1], "text": "mbote"})));
        assert_eq!(row.text("text"), Some("mbote"));
    }

    #[test]
    fn plain_rows_only_gain_the_provenance_tag() {
        let normalizer = RowNormalizer::new("sentences_eng", SourceShape::Plain);
        let row = normalizer.row(record(json!({"id": 1, "eng_text": "hello"})));
        assert_eq!(row.text("eng_text"), Some("hello"));
        assert_eq!(row.text("origin_dataset"), Some("sentences_eng"));
        // The tag lands last in field order.
        assert_eq!(row.field_names().last(), Some("origin_dataset"));
    }

    #[test]
    fn joined_rows_are_stamped_with_the_joined_tag() {
        let normalizer = RowNormalizer::new("left,right", SourceShape::Joined);
        let row = normalizer.row(record(json!({"id": 1, "audio_lug": [["a"]]})));
        assert_eq!(row.text("origin_dataset"), Some("left,right"));
    }
}
