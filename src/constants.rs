//! Pipeline-wide constants, grouped by the stage that owns them.

/// Constants used by dataset loading and column canonicalization.
pub mod load {
    /// Synonym-to-canonical column renames applied on load. A rename fires
    /// only when the synonym is present and the canonical name is absent.
    pub const COLUMN_RENAMES: [(&str, &str); 8] = [
        ("audio_language", "language"),
        ("audio_languages", "language"),
        ("audios", "audio"),
        ("texts", "text"),
        ("ids", "id"),
        ("are_studio", "is_studio"),
        ("speaker_ids", "speaker_id"),
        ("sample_rates", "sample_rate"),
    ];
    /// Top-level column names that signal the caller forgot to pick a split.
    pub const SPLIT_COLUMNS: [&str; 2] = ["train", "test"];
    /// Rows per columnar batch when streaming loaded or generated data.
    pub const ROWS_PER_BATCH: usize = 100;
    /// Shard file extensions accepted by the JSONL loader.
    pub const SHARD_EXTENSIONS: [&str; 2] = ["jsonl", "ndjson"];
}

/// Canonical record and example field names.
pub mod fields {
    /// Join key present on every record participating in a join.
    pub const ID: &str = "id";
    /// Bare text payload on single combined text+audio rows.
    pub const TEXT: &str = "text";
    /// Singular audio payload on speech rows.
    pub const AUDIO: &str = "audio";
    /// Language code of a speech row's own audio payload.
    pub const LANGUAGE: &str = "language";
    /// Speaker identifier of a speech row's own audio payload.
    pub const SPEAKER_ID: &str = "speaker_id";
    /// Studio-recording flag of a speech row's own audio payload.
    pub const IS_STUDIO: &str = "is_studio";
    /// Sample rate of a speech row's own audio payload.
    pub const SAMPLE_RATE: &str = "sample_rate";
    /// Provenance tag stamped onto every normalized row.
    pub const ORIGIN_DATASET: &str = "origin_dataset";
    /// Promoted source payload key on emitted examples.
    pub const SOURCE: &str = "source";
    /// Promoted target payload key on emitted examples.
    pub const TARGET: &str = "target";
    /// Suffix of per-language text fields, e.g. `eng_text`.
    pub const TEXT_SUFFIX: &str = "_text";
    /// Prefix of per-language audio accumulator fields, e.g. `audio_lug`.
    pub const AUDIO_PREFIX: &str = "audio_";
    /// Suffix of the speaker accumulator parallel to `audio_<lang>`.
    pub const SPEAKER_SUFFIX: &str = "_speaker_id";
}

/// Constants used by preprocessing composition.
pub mod preprocess {
    /// Guidance shown when preprocessing steps are given as a mapping.
    /// Mappings are unordered, and step order matters.
    pub const LIST_HELP: &str = "\
Preprocessing operations should be specified as an ordered list, for example:

preprocessing:
    - first_operation:
        params
    - second_operation

and not like this (without dashes):

preprocessing:
    first_operation:
        params
    second_operation
";
}

/// Constants used by the example stream.
pub mod stream {
    /// Seed for the deterministic shuffle applied when `shuffle: true`.
    /// Fixed so rebuilding the same pipeline yields the same sequence.
    pub const SHUFFLE_SEED: u64 = 0x5A17_AB1E;
}
