//! External merge-join of two record streams by ascending id.
//!
//! One combined record is emitted per distinct id across both inputs; ids
//! present on only one side still appear (full outer join), with the other
//! side's fields simply absent. Per-language text fields overwrite on
//! collision (last wins in scan order); audio payloads append into the
//! `audio_<lang>` accumulator with `audio_<lang>_speaker_id` kept
//! index-aligned.
//!
//! The default `MergeSorted` strategy streams both inputs in O(n+m) with
//! constant memory, verifying ascending id order as it goes. The explicit
//! `SortThenMerge` fallback materializes both inputs and is the pipeline's
//! only unbounded-memory operation.

use serde_json::Value;
use tracing::debug;

pub use crate::config::JoinStrategy;
use crate::constants::fields;
use crate::errors::PairsetError;
use crate::record::{Record, RecordId};

type KeyedResult = Result<(RecordId, Record), PairsetError>;
type RecordResult = Result<Record, PairsetError>;

/// Lazy merge-join of two record streams. Single-pass and not restartable,
/// because the inputs are assumed single-pass.
pub struct StreamJoiner {
    entries: Box<dyn Iterator<Item = KeyedResult>>,
    pending: Option<(RecordId, Record)>,
    failed: bool,
}

impl StreamJoiner {
    /// Merge `left` and `right` with the given strategy. Nothing is pulled
    /// from either input until the joiner itself is iterated.
    pub fn new<L, R>(left: L, right: R, strategy: JoinStrategy) -> Self
    where
        L: Iterator<Item = RecordResult> + 'static,
        R: Iterator<Item = RecordResult> + 'static,
    {
        let entries: Box<dyn Iterator<Item = KeyedResult>> = match strategy {
            JoinStrategy::MergeSorted => Box::new(MergeSortedEntries::new(left, right)),
            JoinStrategy::SortThenMerge => Box::new(SortThenMergeEntries::new(left, right)),
        };
        Self {
            entries,
            pending: None,
            failed: false,
        }
    }

    fn start_pending(&mut self, id: RecordId, record: Record) -> Result<(), PairsetError> {
        let mut combined = Record::new();
        combined.insert(fields::ID, id.to_value());
        fold_into(&mut combined, record)?;
        self.pending = Some((id, combined));
        Ok(())
    }
}

impl Iterator for StreamJoiner {
    type Item = RecordResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            match self.entries.next() {
                None => return self.pending.take().map(|(_, combined)| Ok(combined)),
                Some(Err(err)) => {
                    self.failed = true;
                    return Some(Err(err));
                }
                Some(Ok((id, record))) => {
                    let same_id = self
                        .pending
                        .as_ref()
                        .is_some_and(|(current, _)| *current == id);
                    if same_id {
                        if let Some((_, combined)) = &mut self.pending
                            && let Err(err) = fold_into(combined, record)
                        {
                            self.failed = true;
                            return Some(Err(err));
                        }
                        continue;
                    }

                    let finished = self.pending.take().map(|(_, combined)| combined);
                    if let Err(err) = self.start_pending(id, record) {
                        self.failed = true;
                        return Some(Err(err));
                    }
                    if let Some(combined) = finished {
                        return Some(Ok(combined));
                    }
                }
            }
        }
    }
}

/// Fold one record's fields into the combined record for its id.
///
/// Only join-relevant fields carry over: per-language text fields overwrite,
/// the singular audio payload appends into the per-language accumulators.
/// Everything else (language, speaker_id, is_studio, sample_rate) is
/// consumed by the accumulation itself and not copied through.
fn fold_into(combined: &mut Record, record: Record) -> Result<(), PairsetError> {
    let language = record
        .text(fields::LANGUAGE)
        .map(str::to_string);
    let speaker = record.get(fields::SPEAKER_ID).cloned().unwrap_or(Value::Null);

    for (key, value) in record {
        if key == fields::ID {
            continue;
        }
        if key.ends_with(fields::TEXT_SUFFIX) {
            combined.insert(key, value);
        } else if key == fields::AUDIO {
            let Some(language) = &language else {
                return Err(PairsetError::Data(
                    "cannot join an audio record that has no 'language' field".to_string(),
                ));
            };
            let audio_key = format!("{}{language}", fields::AUDIO_PREFIX);
            let speaker_key =
                format!("{}{language}{}", fields::AUDIO_PREFIX, fields::SPEAKER_SUFFIX);
            push_accumulator(combined, &audio_key, value);
            push_accumulator(combined, &speaker_key, speaker.clone());
        }
    }
    Ok(())
}

fn push_accumulator(combined: &mut Record, key: &str, value: Value) {
    match combined.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        _ => combined.insert(key.to_string(), Value::Array(vec![value])),
    }
}

/// One side of a streaming merge: buffers a single keyed record and verifies
/// ascending id order.
struct SortedSide<I> {
    inner: I,
    label: &'static str,
    last: Option<RecordId>,
    buffered: Option<(RecordId, Record)>,
    done: bool,
}

impl<I: Iterator<Item = RecordResult>> SortedSide<I> {
    fn new(inner: I, label: &'static str) -> Self {
        Self {
            inner,
            label,
            last: None,
            buffered: None,
            done: false,
        }
    }

    fn peek_id(&mut self) -> Result<Option<&RecordId>, PairsetError> {
        if self.buffered.is_none() && !self.done {
            match self.inner.next() {
                None => self.done = true,
                Some(Err(err)) => {
                    self.done = true;
                    return Err(err);
                }
                Some(Ok(record)) => {
                    let id = record.join_id()?;
                    if let Some(previous) = &self.last
                        && *previous > id
                    {
                        self.done = true;
                        return Err(PairsetError::Data(format!(
                            "{} join input is not sorted by id: {previous} followed by {id} \
                             (declare 'join_strategy: sort' if the inputs cannot be pre-sorted)",
                            self.label
                        )));
                    }
                    self.last = Some(id.clone());
                    self.buffered = Some((id, record));
                }
            }
        }
        Ok(self.buffered.as_ref().map(|(id, _)| id))
    }

    fn take(&mut self) -> Option<(RecordId, Record)> {
        self.buffered.take()
    }
}

/// Keyed entries from two verified-ascending inputs, globally id-ordered.
/// Ties take the left side first, preserving scan order within an id.
struct MergeSortedEntries<L, R> {
    left: SortedSide<L>,
    right: SortedSide<R>,
    failed: bool,
}

impl<L, R> MergeSortedEntries<L, R>
where
    L: Iterator<Item = RecordResult>,
    R: Iterator<Item = RecordResult>,
{
    fn new(left: L, right: R) -> Self {
        Self {
            left: SortedSide::new(left, "left"),
            right: SortedSide::new(right, "right"),
            failed: false,
        }
    }
}

impl<L, R> Iterator for MergeSortedEntries<L, R>
where
    L: Iterator<Item = RecordResult>,
    R: Iterator<Item = RecordResult>,
{
    type Item = KeyedResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let left_id = match self.left.peek_id() {
            Ok(id) => id.cloned(),
            Err(err) => {
                self.failed = true;
                return Some(Err(err));
            }
        };
        let right_id = match self.right.peek_id() {
            Ok(id) => id.cloned(),
            Err(err) => {
                self.failed = true;
                return Some(Err(err));
            }
        };
        let take_left = match (&left_id, &right_id) {
            (None, None) => return None,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(left), Some(right)) => left <= right,
        };
        let taken = if take_left {
            self.left.take()
        } else {
            self.right.take()
        };
        taken.map(Ok)
    }
}

/// Keyed entries from a materialized, stably sorted concatenation of both
/// inputs. Materialization happens on the first pull.
struct SortThenMergeEntries {
    inputs: Option<Box<dyn Iterator<Item = RecordResult>>>,
    sorted: Option<std::vec::IntoIter<(RecordId, Record)>>,
}

impl SortThenMergeEntries {
    fn new<L, R>(left: L, right: R) -> Self
    where
        L: Iterator<Item = RecordResult> + 'static,
        R: Iterator<Item = RecordResult> + 'static,
    {
        Self {
            inputs: Some(Box::new(left.chain(right))),
            sorted: None,
        }
    }
}

impl Iterator for SortThenMergeEntries {
    type Item = KeyedResult;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(inputs) = self.inputs.take() {
            let mut entries = Vec::new();
            for record in inputs {
                let keyed = record.and_then(|record| {
                    let id = record.join_id()?;
                    Ok((id, record))
                });
                match keyed {
                    Ok(entry) => entries.push(entry),
                    Err(err) => {
                        // Fuse: the inputs are single-pass and now partly consumed.
                        self.sorted = Some(Vec::new().into_iter());
                        return Some(Err(err));
                    }
                }
            }
            debug!(records = entries.len(), "materialized join inputs for sorting");
            // Stable sort keeps scan order (left before right) within an id.
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            self.sorted = Some(entries.into_iter());
        }
        self.sorted.as_mut()?.next().map(Ok)
    }
}
