#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod builder;
pub mod config;
pub mod constants;
mod errors;
pub mod join;
pub mod matcher;
pub mod pairs;
pub mod preprocess;
pub mod record;
pub mod rows;
pub mod source;
pub mod types;

pub use builder::{DatasetBuilder, ExampleStream};
pub use config::{
    DatasetConfig, JoinSpec, JoinStrategy, LanguageSpec, LoadEntry, LoadSpec, Modality,
    RecordingType, SideConfig, StepSpec,
};
pub use errors::PairsetError;
pub use join::StreamJoiner;
pub use matcher::{MatchedItem, matching_items};
pub use pairs::{Example, matching_pairs};
pub use preprocess::{BoundSteps, PreprocessRegistry, Side, StepFn};
pub use record::{ColumnarBatch, Record, RecordId};
pub use rows::RowNormalizer;
pub use source::{
    JsonlLoader, LoadedDataset, LoadedSource, MemoryLoader, RecordLoader, SourceShape,
};
