//! Pipeline assembly: configuration in, lazy example stream out.
//!
//! Construction is the validation point. `DatasetBuilder::new` checks the
//! whole configuration eagerly (language lists, join arity, recording-type
//! support, preprocessing step names) so that misconfiguration fails before
//! any data is touched; `build` then opens the sources and wires the
//! load-join-normalize-match-preprocess chain into a single pull-based
//! iterator. Per-row failures after that point travel through the stream as
//! `Err` items.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::config::{
    DatasetConfig, JoinSpec, LoadEntry, RecordingType, SideConfig, StepSpec,
};
use crate::constants::{fields, load, stream};
use crate::errors::PairsetError;
use crate::join::StreamJoiner;
use crate::pairs::{Example, matching_pairs};
use crate::preprocess::{BoundSteps, PreprocessRegistry, Side};
use crate::record::{ColumnarBatch, Record};
use crate::rows::RowNormalizer;
use crate::source::{LoadedSource, RecordLoader, SourceShape};

type ExampleResult = Result<Example, PairsetError>;
type BoxedExamples = Box<dyn Iterator<Item = ExampleResult>>;

/// Validated pipeline, ready to build.
pub struct DatasetBuilder<L> {
    config: DatasetConfig,
    loader: L,
    steps: BoundSteps,
}

impl<L: RecordLoader> DatasetBuilder<L> {
    /// Validate `config` against `registry` and bind it to a loader.
    ///
    /// Everything checkable without touching data is checked here.
    pub fn new(
        config: DatasetConfig,
        loader: L,
        registry: &PreprocessRegistry,
    ) -> Result<Self, PairsetError> {
        validate_side(&config.source, fields::SOURCE)?;
        validate_side(&config.target, fields::TARGET)?;
        for entry in config.huggingface_load.entries() {
            validate_entry(entry)?;
        }

        // Load-time steps run first, then the on-the-fly ones, each side's
        // list in configuration order.
        let mut steps = BoundSteps::identity();
        for (spec, side) in [
            (&config.source.preprocessing, Side::Source),
            (&config.target.preprocessing, Side::Target),
            (&config.source.preprocessing_on_the_fly, Side::Source),
            (&config.target.preprocessing_on_the_fly, Side::Target),
        ] {
            let parsed = StepSpec::parse_list(spec)?;
            steps.extend(registry.compose(&parsed, side)?);
        }

        Ok(Self {
            config,
            loader,
            steps,
        })
    }

    /// Open every configured source and assemble the example stream.
    ///
    /// Sources are opened (and their shapes resolved) here, so unavailable
    /// datasets and shape problems fail the build; the returned stream is
    /// otherwise lazy. `shuffle: true` is the exception: it materializes the
    /// whole stream and reorders it with a fixed seed.
    pub fn build(self) -> Result<ExampleStream, PairsetError> {
        let source_spec = self.config.source.clone();
        let target_spec = self.config.target.clone();

        let mut entry_streams: Vec<BoxedExamples> = Vec::new();
        for entry in self.config.huggingface_load.entries() {
            let stream = match entry {
                LoadEntry::Single(params) => {
                    let source = LoadedSource::open(&self.loader, params)?;
                    let normalizer = RowNormalizer::new(source.tag(), source.shape());
                    examples_of(source.records(), normalizer, &source_spec, &target_spec)
                }
                LoadEntry::Join(join) => {
                    let left = LoadedSource::open(&self.loader, &join.join[0])?;
                    let right = LoadedSource::open(&self.loader, &join.join[1])?;
                    let tag = format!("{},{}", left.tag(), right.tag());
                    debug!(tag, strategy = ?join.join_strategy, "joining sources");
                    let joined =
                        StreamJoiner::new(left.records(), right.records(), join.join_strategy);
                    let normalizer = RowNormalizer::new(tag, SourceShape::Joined);
                    examples_of(joined, normalizer, &source_spec, &target_spec)
                }
            };
            entry_streams.push(stream);
        }
        info!(entries = entry_streams.len(), "dataset pipeline built");

        let examples = PreprocessedExamples {
            inner: Box::new(entry_streams.into_iter().flatten()),
            steps: self.steps,
            keep_metadata: self.config.keep_metadata_features,
            buffer: VecDeque::new(),
            failed: false,
        };

        if self.config.shuffle {
            let mut collected: Vec<Example> = examples.collect::<Result<_, _>>()?;
            let mut rng = StdRng::seed_from_u64(stream::SHUFFLE_SEED);
            collected.shuffle(&mut rng);
            return Ok(ExampleStream {
                inner: Box::new(collected.into_iter().map(Ok)),
            });
        }
        Ok(ExampleStream {
            inner: Box::new(examples),
        })
    }
}

/// Lazy stream of finished examples.
pub struct ExampleStream {
    inner: BoxedExamples,
}

impl ExampleStream {
    /// Drain the stream, stopping at the first error.
    pub fn collect_examples(self) -> Result<Vec<Example>, PairsetError> {
        self.collect()
    }
}

impl Iterator for ExampleStream {
    type Item = ExampleResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

fn validate_side(side: &SideConfig, label: &str) -> Result<(), PairsetError> {
    for code in side.language.codes() {
        if code.contains(',') {
            return Err(PairsetError::Configuration(format!(
                "{label} language '{code}' contains a comma; specify multiple \
                 languages as a list, e.g. [eng, lug]"
            )));
        }
    }
    if let Some(recording_type) = side.recording_type
        && recording_type != RecordingType::Any
    {
        return Err(PairsetError::Configuration(format!(
            "{label} recording_type '{recording_type:?}' is not supported; \
             loaded rows do not carry a reliable recording environment. Only \
             'any' is accepted"
        )));
    }
    Ok(())
}

fn validate_entry(entry: &LoadEntry) -> Result<(), PairsetError> {
    match entry {
        LoadEntry::Join(JoinSpec { join, .. }) => {
            if join.len() != 2 {
                return Err(PairsetError::Configuration(format!(
                    "a join entry must name exactly two datasets, got {}",
                    join.len()
                )));
            }
        }
        LoadEntry::Single(params) => {
            // A 'join' key here means the entry failed to parse as a join
            // (e.g. its value was not a list); refuse to pass it through
            // to the loader as plain params.
            if params.get("join").is_some() {
                return Err(PairsetError::Configuration(format!(
                    "malformed join entry; 'join' must be a list of exactly \
                     two load-param mappings. Got: {params}"
                )));
            }
        }
    }
    Ok(())
}

/// Normalize, match, and pair every row of one entry's record stream.
fn examples_of(
    rows: impl Iterator<Item = Result<Record, PairsetError>> + 'static,
    normalizer: RowNormalizer,
    source: &SideConfig,
    target: &SideConfig,
) -> BoxedExamples {
    let source = source.clone();
    let target = target.clone();
    Box::new(rows.flat_map(move |row| match row {
        Ok(row) => {
            let row = normalizer.row(row);
            matching_pairs(&row, &source, &target)
                .into_iter()
                .map(Ok)
                .collect::<Vec<_>>()
        }
        Err(err) => vec![Err(err)],
    }))
}

/// Applies the bound preprocessing steps batch-wise and projects each
/// example down to `source`/`target` unless metadata is kept.
struct PreprocessedExamples {
    inner: BoxedExamples,
    steps: BoundSteps,
    keep_metadata: bool,
    buffer: VecDeque<Example>,
    failed: bool,
}

impl Iterator for PreprocessedExamples {
    type Item = ExampleResult;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(example) = self.buffer.pop_front() {
            return Some(Ok(example));
        }
        if self.failed {
            return None;
        }

        let mut pending = Vec::new();
        while pending.len() < load::ROWS_PER_BATCH {
            match self.inner.next() {
                Some(Ok(example)) => pending.push(example),
                Some(Err(err)) => {
                    self.failed = true;
                    return Some(Err(err));
                }
                None => break,
            }
        }
        if pending.is_empty() {
            return None;
        }

        let mut batch = ColumnarBatch::from_records(&pending);
        if let Err(err) = self.steps.apply(&mut batch) {
            self.failed = true;
            return Some(Err(err));
        }
        for example in batch.into_records() {
            let example = if self.keep_metadata {
                example
            } else {
                example.project(&[fields::SOURCE, fields::TARGET])
            };
            self.buffer.push_back(example);
        }
        self.buffer.pop_front().map(Ok)
    }
}
