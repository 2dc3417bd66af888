//! Declarative dataset-building configuration.
//!
//! The schema mirrors the YAML/JSON configs fed to the pipeline: one or many
//! `huggingface_load` entries (plain loader params or a two-way join), a
//! `source` and a `target` side specification, and output options. Loader
//! params stay untyped (`serde_json::Value`) — they are an opaque
//! pass-through to the configured `RecordLoader`.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::PairsetError;
use crate::types::{Kwargs, LanguageCode};

/// Top-level dataset-building configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct DatasetConfig {
    /// Which dataset(s) to load: one entry or an ordered list of entries.
    pub huggingface_load: LoadSpec,
    /// Source-side match and preprocessing specification.
    pub source: SideConfig,
    /// Target-side match and preprocessing specification.
    pub target: SideConfig,
    /// Keep namespaced metadata on emitted examples instead of projecting
    /// down to `source`/`target`.
    #[serde(default)]
    pub keep_metadata_features: bool,
    /// Shuffle the final example stream. Materializes the stream; the
    /// shuffle is deterministically seeded so rebuilds stay reproducible.
    #[serde(default)]
    pub shuffle: bool,
}

impl DatasetConfig {
    /// Deserialize a configuration from an untyped value.
    ///
    /// This is the usual entry point for configs parsed from YAML or JSON.
    /// Deserialization failures surface as configuration errors; the
    /// missing-`huggingface_load` case gets its own message because it is
    /// the most common mistake.
    pub fn from_value(value: Value) -> Result<Self, PairsetError> {
        if value.get("huggingface_load").is_none() {
            return Err(PairsetError::Configuration(format!(
                "there should be a 'huggingface_load' entry in the dataset config, \
                 specifying which datasets to load. Got: {value}"
            )));
        }
        serde_json::from_value(value)
            .map_err(|err| PairsetError::Configuration(format!("invalid dataset config: {err}")))
    }
}

/// One load entry or an ordered list of load entries.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum LoadSpec {
    /// An ordered list of entries, streamed in order.
    ///
    /// Tried before `One`: `LoadEntry::Single` accepts any value, so a list
    /// would otherwise be swallowed whole as a single entry.
    Many(Vec<LoadEntry>),
    /// A single entry given without list wrapping.
    One(LoadEntry),
}

impl LoadSpec {
    /// Entries in configuration order.
    pub fn entries(&self) -> &[LoadEntry] {
        match self {
            LoadSpec::One(entry) => std::slice::from_ref(entry),
            LoadSpec::Many(entries) => entries,
        }
    }
}

/// One `huggingface_load` entry.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum LoadEntry {
    /// Merge-join of two datasets by ascending id.
    Join(JoinSpec),
    /// Plain loader params passed through to the `RecordLoader`.
    Single(Value),
}

/// A two-dataset join entry.
#[derive(Clone, Debug, Deserialize)]
pub struct JoinSpec {
    /// Loader params for the two sides, in join order. Must be exactly two;
    /// validated eagerly by the builder.
    pub join: Vec<Value>,
    /// Merge strategy for the two record streams.
    #[serde(default)]
    pub join_strategy: JoinStrategy,
}

/// How the two sides of a join are merged.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub enum JoinStrategy {
    /// Streaming O(n+m) merge. Both inputs must already be sorted by
    /// ascending id; an out-of-order id is a data error.
    #[default]
    #[serde(rename = "merge")]
    MergeSorted,
    /// Materialize both streams, sort the concatenation by id, then group.
    /// The pipeline's sole unbounded-memory operation; use only when input
    /// sortedness cannot be guaranteed.
    #[serde(rename = "sort")]
    SortThenMerge,
}

/// Source or target sub-configuration: which payloads to extract from each
/// row, and how to preprocess the resulting examples.
#[derive(Clone, Debug, Deserialize)]
pub struct SideConfig {
    /// Requested language code(s), in match priority order.
    pub language: LanguageSpec,
    /// Payload modality to extract.
    #[serde(rename = "type")]
    pub modality: Modality,
    /// Only match audio whose speaker id equals this value when set.
    #[serde(default)]
    pub speaker_id: Option<Value>,
    /// Accepted for config compatibility; only `any` is supported. The
    /// builder rejects `studio`/`natural` instead of silently ignoring them.
    #[serde(default)]
    pub recording_type: Option<RecordingType>,
    /// Ordered preprocessing steps applied at load time. Kept untyped here
    /// so the list-vs-mapping mistake can be reported with guidance rather
    /// than as a generic type error.
    #[serde(default)]
    pub preprocessing: Option<Value>,
    /// Ordered steps re-applied on each access (augmentation-style). Same
    /// shape as `preprocessing`.
    #[serde(default)]
    pub preprocessing_on_the_fly: Option<Value>,
}

impl SideConfig {
    /// A minimal side spec with defaults for everything but language and
    /// modality.
    pub fn new(language: LanguageSpec, modality: Modality) -> Self {
        Self {
            language,
            modality,
            speaker_id: None,
            recording_type: None,
            preprocessing: None,
            preprocessing_on_the_fly: None,
        }
    }
}

/// One language code or an ordered list of codes.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum LanguageSpec {
    /// A single code.
    One(LanguageCode),
    /// Codes in match priority order.
    Many(Vec<LanguageCode>),
}

impl LanguageSpec {
    /// Requested codes in priority order.
    pub fn codes(&self) -> &[LanguageCode] {
        match self {
            LanguageSpec::One(code) => std::slice::from_ref(code),
            LanguageSpec::Many(codes) => codes,
        }
    }
}

impl From<&str> for LanguageSpec {
    fn from(code: &str) -> Self {
        LanguageSpec::One(code.to_string())
    }
}

/// Payload modality requested for one side of a pair.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Match per-language text fields (`<lang>_text`).
    Text,
    /// Match the row's own audio payload and per-language accumulators.
    Speech,
}

/// Recording environment filter referenced by the config contract.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordingType {
    /// Studio recordings only.
    Studio,
    /// Natural (non-studio) recordings only.
    Natural,
    /// No filtering.
    Any,
}

/// One named preprocessing step with bound keyword arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct StepSpec {
    /// Registry name of the step.
    pub name: String,
    /// Keyword arguments bound at pipeline-build time.
    pub kwargs: Kwargs,
}

impl StepSpec {
    /// Parse one side's `preprocessing` value into ordered step specs.
    ///
    /// Accepted list entries are `"name"` or `{name: {kwargs}}` (a null
    /// kwargs body means no kwargs). A mapping where the list was expected
    /// is the classic unordered-spec mistake and gets its own error with
    /// help text; anything else is a plain configuration error.
    pub fn parse_list(spec: &Option<Value>) -> Result<Vec<StepSpec>, PairsetError> {
        let entries = match spec {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(entries)) => entries,
            Some(mapping @ Value::Object(_)) => {
                return Err(PairsetError::PreprocessingNotAList {
                    got: format!("a mapping: {mapping}"),
                });
            }
            Some(other) => {
                return Err(PairsetError::Configuration(format!(
                    "preprocessing steps must be a list of names or \
                     single-key mappings, got: {other}"
                )));
            }
        };

        entries.iter().map(Self::parse_entry).collect()
    }

    fn parse_entry(entry: &Value) -> Result<StepSpec, PairsetError> {
        match entry {
            Value::String(name) => Ok(StepSpec {
                name: name.clone(),
                kwargs: Kwargs::new(),
            }),
            Value::Object(map) if map.len() == 1 => {
                // Single-key mapping: name plus optional kwargs body.
                let (name, body) = map.iter().next().ok_or_else(|| {
                    PairsetError::Configuration("empty preprocessing entry".to_string())
                })?;
                let kwargs = match body {
                    Value::Null => Kwargs::new(),
                    Value::Object(kwargs) => kwargs.clone(),
                    other => {
                        return Err(PairsetError::Configuration(format!(
                            "kwargs for preprocessing step '{name}' must be a \
                             mapping, got: {other}"
                        )));
                    }
                };
                Ok(StepSpec {
                    name: name.clone(),
                    kwargs,
                })
            }
            other => Err(PairsetError::Configuration(format!(
                "each preprocessing entry must be a step name or a \
                 single-key mapping of name to kwargs, got: {other}"
            ))),
        }
    }
}
