//! Dataset loading seam and built-in loaders.
//!
//! Ownership model:
//! - `RecordLoader` is the boundary to the external storage/loading layer:
//!   given opaque load params, it produces a single-pass batched dataset.
//! - `LoadedSource` owns canonicalization: split validation, the synonym
//!   rename table, dataset identity tags, and per-source shape resolution.
//!
//! Loaders perform no caching; re-opening a source re-reads the data.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::constants::{fields, load};
use crate::errors::PairsetError;
use crate::record::{ColumnarBatch, Record};
use crate::types::{DatasetTag, FieldName};

/// JSONL shard-directory loader.
pub mod jsonl;

#[cfg(feature = "huggingface")]
/// Hugging Face Hub snapshot materialization helpers.
pub mod huggingface;

pub use jsonl::JsonlLoader;

/// Boundary to the external dataset storage/loading layer.
pub trait RecordLoader {
    /// Load one dataset described by opaque `params`.
    ///
    /// Implementations decide which params they understand; the pipeline
    /// only ever passes them through from configuration.
    fn load(&self, params: &Value) -> Result<LoadedDataset, PairsetError>;
}

/// Single-pass batched output of a `RecordLoader`, before canonicalization.
pub struct LoadedDataset {
    /// Top-level column names exposed by the dataset.
    pub columns: Vec<FieldName>,
    /// Columnar batches in storage order. Single-pass, not restartable.
    pub batches: Box<dyn Iterator<Item = Result<ColumnarBatch, PairsetError>>>,
}

/// Row shape of a loaded source, resolved once per source from its column
/// set rather than re-detected per row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceShape {
    /// Ordinary rows: text-only, or audio without a bare `text` column.
    Plain,
    /// Rows carrying both `audio` and `text`: the bare `text` is rewritten
    /// to `<language>_text` during normalization.
    CombinedTextAudio,
    /// Rows produced by a merge-join of two sources.
    Joined,
}

/// One loaded dataset after canonicalization, ready for normalization or
/// joining.
pub struct LoadedSource {
    tag: DatasetTag,
    shape: SourceShape,
    columns: Vec<FieldName>,
    batches: Box<dyn Iterator<Item = Result<ColumnarBatch, PairsetError>>>,
}

impl LoadedSource {
    /// Load and canonicalize one dataset.
    ///
    /// Fails fast — before any batch is pulled — when the dataset still
    /// exposes `train`/`test` columns, which means the caller forgot to
    /// specify a split in the load params.
    pub fn open(loader: &dyn RecordLoader, params: &Value) -> Result<Self, PairsetError> {
        let loaded = loader.load(params)?;

        for split in load::SPLIT_COLUMNS {
            if loaded.columns.iter().any(|column| column == split) {
                return Err(PairsetError::LoadShape {
                    params: params.to_string(),
                });
            }
        }

        let columns = renamed_columns(&loaded.columns);
        let shape = if columns.iter().any(|column| column == fields::AUDIO)
            && columns.iter().any(|column| column == fields::TEXT)
        {
            SourceShape::CombinedTextAudio
        } else {
            SourceShape::Plain
        };
        let tag = dataset_tag(params);
        debug!(tag, ?shape, columns = columns.len(), "opened source");

        let batches = Box::new(loaded.batches.map(|batch| batch.map(apply_renames)));
        Ok(Self {
            tag,
            shape,
            columns,
            batches,
        })
    }

    /// Provenance tag derived from this source's load params.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Row shape resolved from the canonicalized column set.
    pub fn shape(&self) -> SourceShape {
        self.shape
    }

    /// Canonicalized column names.
    pub fn columns(&self) -> &[FieldName] {
        &self.columns
    }

    /// Stream the canonicalized batches (consumes the source).
    pub fn batches(self) -> Box<dyn Iterator<Item = Result<ColumnarBatch, PairsetError>>> {
        self.batches
    }

    /// Flatten to per-row records in storage order (consumes the source).
    pub fn records(self) -> impl Iterator<Item = Result<Record, PairsetError>> {
        self.batches.flat_map(|batch| match batch {
            Ok(batch) => batch.into_records().into_iter().map(Ok).collect::<Vec<_>>(),
            Err(err) => vec![Err(err)],
        })
    }
}

/// Apply the canonical synonym rename table to one batch. Renames fire only
/// when the canonical column is absent; applying twice is a no-op.
pub fn apply_renames(mut batch: ColumnarBatch) -> ColumnarBatch {
    for (from, to) in load::COLUMN_RENAMES {
        batch.rename_column(from, to);
    }
    batch
}

fn renamed_columns(columns: &[FieldName]) -> Vec<FieldName> {
    let mut renamed: Vec<FieldName> = columns.to_vec();
    for (from, to) in load::COLUMN_RENAMES {
        if renamed.iter().any(|column| column == from)
            && !renamed.iter().any(|column| column == to)
        {
            for column in &mut renamed {
                if column == from {
                    *column = to.to_string();
                }
            }
        }
    }
    renamed
}

/// Derive the provenance tag for one load entry: `path`, then `name` if
/// present, then each `data_files` entry, joined by `_`.
pub fn dataset_tag(params: &Value) -> DatasetTag {
    let mut parts: Vec<String> = Vec::new();
    if let Some(path) = params.get("path").and_then(Value::as_str) {
        parts.push(path.to_string());
    }
    if let Some(name) = params.get("name").and_then(Value::as_str) {
        parts.push(name.to_string());
    }
    match params.get("data_files") {
        Some(Value::String(file)) => parts.push(file.clone()),
        Some(Value::Array(files)) => {
            parts.extend(files.iter().filter_map(Value::as_str).map(str::to_string));
        }
        _ => {}
    }
    parts.join("_")
}

/// In-memory loader for tests and small datasets, keyed by the `path` load
/// param.
#[derive(Clone, Debug, Default)]
pub struct MemoryLoader {
    datasets: HashMap<String, Vec<Record>>,
}

impl MemoryLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset under `path`.
    pub fn with_dataset(mut self, path: impl Into<String>, records: Vec<Record>) -> Self {
        self.datasets.insert(path.into(), records);
        self
    }

    fn column_union(records: &[Record]) -> Vec<FieldName> {
        let mut columns: Vec<FieldName> = Vec::new();
        for record in records {
            for name in record.field_names() {
                if !columns.iter().any(|column| column == name) {
                    columns.push(name.to_string());
                }
            }
        }
        columns
    }
}

impl RecordLoader for MemoryLoader {
    fn load(&self, params: &Value) -> Result<LoadedDataset, PairsetError> {
        let path = params
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PairsetError::Configuration(format!("load params missing 'path': {params}"))
            })?;
        let records = self.datasets.get(path).ok_or_else(|| PairsetError::Source {
            dataset: path.to_string(),
            reason: "dataset is not registered with this MemoryLoader".to_string(),
        })?;

        let columns = Self::column_union(records);
        let batches: Vec<Result<ColumnarBatch, PairsetError>> = records
            .chunks(load::ROWS_PER_BATCH)
            .map(|chunk| Ok(ColumnarBatch::from_records(chunk)))
            .collect();
        Ok(LoadedDataset {
            columns,
            batches: Box::new(batches.into_iter()),
        })
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
    fn open_applies_renames_and_resolves_plain_shape() {
        let loader = MemoryLoader::new().with_dataset(
            "sentences",
            vec![record(json!({"ids": 1, "texts": "hi", "audio_language": "eng"}))],
        );
        let source = LoadedSource::open(&loader, &json!({"path": "sentences"})).unwrap();

        assert_eq!(source.tag(), "sentences");
        assert_eq!(source.columns(), ["id", "text", "language"]);
        // A bare `text` column without `audio` stays Plain.
        assert_eq!(source.shape(), SourceShape::Plain);

        let rows: Vec<Record> = source
            .records()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("text"), Some("hi"));
        assert!(!rows[0].contains("texts"));
    }

    #[test]
    fn rename_skips_when_canonical_column_exists() {
        let loader = MemoryLoader::new().with_dataset(
            "both",
            vec![record(json!({"id": 1, "ids": 2, "eng_text": "hi"}))],
        );
        let source = LoadedSource::open(&loader, &json!({"path": "both"})).unwrap();
        let rows: Vec<Record> = source.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows[0].get("id"), Some(&json!(1)));
        assert_eq!(rows[0].get("ids"), Some(&json!(2)));
    }

    #[test]
    fn combined_text_audio_shape_is_resolved_from_columns() {
        let loader = MemoryLoader::new().with_dataset(
            "combined",
            vec![record(
                json!({"id": 1, "audio": [0.1], "text": "hi", "language": "lug"}),
            )],
        );
        let source = LoadedSource::open(&loader, &json!({"path": "combined"})).unwrap();
        assert_eq!(source.shape(), SourceShape::CombinedTextAudio);
    }

    #[test]
    fn datasets_still_split_into_train_test_fail_fast() {
        let loader = MemoryLoader::new()
            .with_dataset("unsplit", vec![record(json!({"train": {}, "test": {}}))]);
        let Err(err) = LoadedSource::open(&loader, &json!({"path": "unsplit"})) else {
            panic!("expected opening an unsplit dataset to fail");
        };
        let PairsetError::LoadShape { params } = err else {
            panic!("expected a load-shape error, got: {err}");
        };
        assert!(params.contains("unsplit"));
    }

    #[test]
    fn dataset_tags_concatenate_path_name_and_data_files() {
        assert_eq!(dataset_tag(&json!({"path": "sentences"})), "sentences");
        assert_eq!(
            dataset_tag(&json!({"path": "sentences", "name": "eng"})),
            "sentences_eng"
        );
        assert_eq!(
            dataset_tag(&json!({"path": "s", "data_files": ["a.jsonl", "b.jsonl"]})),
            "s_a.jsonl_b.jsonl"
        );
        assert_eq!(
            dataset_tag(&json!({"path": "s", "name": "n", "data_files": "a.jsonl"})),
            "s_n_a.jsonl"
        );
    }

    #[test]
    fn memory_loader_reports_unknown_datasets() {
        let loader = MemoryLoader::new();
        assert!(matches!(
            loader.load(&json!({"path": "nope"})),
            Err(PairsetError::Source { .. })
        ));
        assert!(matches!(
            loader.load(&json!({"name": "only"})),
            Err(PairsetError::Configuration(_))
        ));
    }
}
