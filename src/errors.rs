use std::io;

use thiserror::Error;

use crate::types::DatasetTag;

/// Error type for configuration, load-shape, and data-stream failures.
///
/// Configuration and load-shape variants are raised synchronously at
/// pipeline-build or load time; nothing is retried or recovered. The one
/// deliberate silence is matching: a row missing an expected field simply
/// contributes zero matches and never errors.
#[derive(Debug, Error)]
pub enum PairsetError {
    /// The dataset configuration is structurally invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A configured preprocessing step name has no registry entry.
    #[error("preprocessing step '{name}' is not registered; available steps: {}", available.join(", "))]
    UnknownPreprocessor {
        /// The unresolvable step name.
        name: String,
        /// Every name the registry does know, in registration order.
        available: Vec<String>,
    },
    /// Preprocessing steps were given as a mapping instead of a list.
    #[error("preprocessing steps must be an ordered list, got {got}\n{}", crate::constants::preprocess::LIST_HELP)]
    PreprocessingNotAList {
        /// Description of the value actually given.
        got: String,
    },
    /// A loaded dataset still exposes `train`/`test` split columns.
    #[error(
        "the dataset is still split into train/test; specify a split in the load \
         params, e.g. 'split: train' or 'split: train+test'. Params given: {params}"
    )]
    LoadShape {
        /// The load params that produced the unsplit dataset.
        params: String,
    },
    /// A dataset could not be loaded at all.
    #[error("dataset '{dataset}' is unavailable: {reason}")]
    Source {
        /// Tag or path of the failing dataset.
        dataset: DatasetTag,
        /// What went wrong.
        reason: String,
    },
    /// A record mid-stream violated a pipeline invariant.
    #[error("data stream error: {0}")]
    Data(String),
    /// An underlying I/O operation failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
