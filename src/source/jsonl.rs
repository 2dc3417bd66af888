//! Loader for directories of newline-delimited JSON shard files.
//!
//! Shards are discovered with a recursive walk, ordered by path for
//! determinism, and streamed one batch of rows at a time; only the current
//! line is held in memory. Column names are taken from the first row, which
//! is also how the split-leak check gets something to fail fast on.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::constants::load;
use crate::errors::PairsetError;
use crate::record::{ColumnarBatch, Record};
use crate::source::{LoadedDataset, RecordLoader};
use crate::types::DatasetTag;

/// Loader that reads `.jsonl`/`.ndjson` shards from subdirectories of a
/// root directory. The `path` load param selects the subdirectory; an
/// optional `data_files` param (string or list) restricts which shard file
/// names are read.
#[derive(Clone, Debug)]
pub struct JsonlLoader {
    root: PathBuf,
}

impl JsonlLoader {
    /// Create a loader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn shard_paths(
        &self,
        dataset: &str,
        dir: &Path,
        data_files: Option<Vec<String>>,
    ) -> Result<Vec<PathBuf>, PairsetError> {
        let mut shards = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(|err| PairsetError::Source {
                dataset: dataset.to_string(),
                reason: format!("failed walking {}: {err}", dir.display()),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let accepted = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    load::SHARD_EXTENSIONS
                        .iter()
                        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
                });
            if !accepted {
                continue;
            }
            if let Some(wanted) = &data_files {
                let name = path.file_name().and_then(|name| name.to_str());
                if !name.is_some_and(|name| wanted.iter().any(|file| file == name)) {
                    continue;
                }
            }
            shards.push(path.to_path_buf());
        }
        shards.sort();
        if shards.is_empty() {
            return Err(PairsetError::Source {
                dataset: dataset.to_string(),
                reason: format!(
                    "no shard files found under {} with extensions {:?}",
                    dir.display(),
                    load::SHARD_EXTENSIONS
                ),
            });
        }
        Ok(shards)
    }

    fn first_record(dataset: &str, shard: &Path) -> Result<Option<Record>, PairsetError> {
        let file = File::open(shard).map_err(|err| PairsetError::Source {
            dataset: dataset.to_string(),
            reason: format!("failed opening shard {}: {err}", shard.display()),
        })?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|err| PairsetError::Source {
                dataset: dataset.to_string(),
                reason: format!("failed reading shard {}: {err}", shard.display()),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            return parse_line(dataset, shard, &line).map(Some);
        }
        Ok(None)
    }
}

impl RecordLoader for JsonlLoader {
    fn load(&self, params: &Value) -> Result<LoadedDataset, PairsetError> {
        let dataset = params
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PairsetError::Configuration(format!("load params missing 'path': {params}"))
            })?
            .to_string();
        let data_files = match params.get("data_files") {
            Some(Value::String(file)) => Some(vec![file.clone()]),
            Some(Value::Array(files)) => Some(
                files
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        };

        let dir = self.root.join(&dataset);
        let shards = self.shard_paths(&dataset, &dir, data_files)?;
        debug!(dataset, shards = shards.len(), "indexed jsonl shards");

        // Column names come from the first row of the first non-empty shard.
        let mut columns = Vec::new();
        for shard in &shards {
            if let Some(record) = Self::first_record(&dataset, shard)? {
                columns = record.field_names().map(str::to_string).collect();
                break;
            }
        }

        let batches = ShardBatches {
            dataset,
            shards: shards.into(),
            lines: None,
        };
        Ok(LoadedDataset {
            columns,
            batches: Box::new(batches),
        })
    }
}

fn parse_line(dataset: &str, shard: &Path, line: &str) -> Result<Record, PairsetError> {
    let value: Value =
        serde_json::from_str(line.trim()).map_err(|err| PairsetError::Source {
            dataset: dataset.to_string(),
            reason: format!("failed decoding JSON row in {}: {err}", shard.display()),
        })?;
    Record::from_value(value)
}

/// Streaming batch iterator over an ordered shard list.
struct ShardBatches {
    dataset: DatasetTag,
    shards: VecDeque<PathBuf>,
    lines: Option<(PathBuf, std::io::Lines<BufReader<File>>)>,
}

impl ShardBatches {
    fn next_record(&mut self) -> Result<Option<Record>, PairsetError> {
        loop {
            if let Some((shard, lines)) = &mut self.lines {
                if let Some(line) = lines.next() {
                    let line = line.map_err(|err| PairsetError::Source {
                        dataset: self.dataset.clone(),
                        reason: format!("failed reading shard {}: {err}", shard.display()),
                    })?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    return parse_line(&self.dataset, shard, &line).map(Some);
                }
            }

            // Current shard exhausted (or none open yet): advance.
            let Some(shard) = self.shards.pop_front() else {
                self.lines = None;
                return Ok(None);
            };
            let file = File::open(&shard).map_err(|err| PairsetError::Source {
                dataset: self.dataset.clone(),
                reason: format!("failed opening shard {}: {err}", shard.display()),
            })?;
            self.lines = Some((shard, BufReader::new(file).lines()));
        }
    }
}

impl Iterator for ShardBatches {
    type Item = Result<ColumnarBatch, PairsetError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut rows = Vec::new();
        while rows.len() < load::ROWS_PER_BATCH {
            match self.next_record() {
                Ok(Some(record)) => rows.push(record),
                Ok(None) => break,
                Err(err) => {
                    // Fuse after a failure; shard state is unreliable now.
                    self.shards.clear();
                    self.lines = None;
                    return Some(Err(err));
                }
            }
        }
        if rows.is_empty() {
            return None;
        }
        Some(Ok(ColumnarBatch::from_records(&rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_shard(dir: &Path, name: &str, rows: &[Value]) {
        std::fs::create_dir_all(dir).unwrap();
        let mut file = File::create(dir.join(name)).unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
    }

    #[test]
    fn streams_rows_across_shards_in_path_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("sentences");
        write_shard(
            &dir,
            "shard-0.jsonl",
            &[json!({"id": 1, "eng_text": "a"}), json!({"id": 2, "eng_text": "b"})],
        );
        write_shard(&dir, "shard-1.jsonl", &[json!({"id": 3, "eng_text": "c"})]);

        let loader = JsonlLoader::new(tmp.path());
        let loaded = loader.load(&json!({"path": "sentences"})).unwrap();
        assert_eq!(loaded.columns, ["id", "eng_text"]);

        let rows: Vec<Record> = loaded
            .batches
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
            .into_iter()
            .flat_map(ColumnarBatch::into_records)
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].text("eng_text"), Some("c"));
    }

    #[test]
    fn data_files_param_restricts_shard_selection() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("mixed");
        write_shard(&dir, "keep.jsonl", &[json!({"id": 1})]);
        write_shard(&dir, "skip.jsonl", &[json!({"id": 2})]);

        let loader = JsonlLoader::new(tmp.path());
        let loaded = loader
            .load(&json!({"path": "mixed", "data_files": "keep.jsonl"}))
            .unwrap();
        let rows: Vec<Record> = loaded
            .batches
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
            .into_iter()
            .flat_map(ColumnarBatch::into_records)
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&json!(1)));
    }

    #[test]
    fn missing_shard_directory_is_a_source_error() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = JsonlLoader::new(tmp.path());
        assert!(matches!(
            loader.load(&json!({"path": "absent"})),
            Err(PairsetError::Source { .. })
        ));
    }

    #[test]
    fn undecodable_rows_fail_with_the_shard_named() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("broken");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bad.jsonl"), "{\"id\": 1}\nnot json\n").unwrap();

        let loader = JsonlLoader::new(tmp.path());
        let loaded = loader.load(&json!({"path": "broken"})).unwrap();
        let result: Result<Vec<_>, _> = loaded.batches.collect();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("bad.jsonl"));
    }
}
