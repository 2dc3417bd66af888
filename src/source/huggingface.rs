//! Hugging Face Hub snapshot helpers (behind the `huggingface` feature).
//!
//! The hub is an external collaborator here: these helpers only materialize
//! a dataset repository's JSONL shard files into a local snapshot directory
//! that `JsonlLoader` can then stream. Files already present locally are
//! not re-downloaded.

use std::fs;
use std::path::{Path, PathBuf};

use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use tracing::debug;

use crate::constants::load;
use crate::errors::PairsetError;

fn hub_error(dataset: &str, reason: String) -> PairsetError {
    PairsetError::Source {
        dataset: dataset.to_string(),
        reason,
    }
}

/// List the repository's shard files matching `split`, relative to the repo
/// root. Matching follows the hub's common layouts: a `<split>/` directory,
/// a `-<split>-` token, or a `<split>-` file-name prefix.
pub fn list_shard_files(dataset: &str, split: &str) -> Result<Vec<String>, PairsetError> {
    let api = ApiBuilder::new()
        .with_progress(true)
        .with_retries(5)
        .with_token(None)
        .build()
        .map_err(|err| hub_error(dataset, format!("failed building hf-hub client: {err}")))?;
    let repo_api = api.repo(Repo::new(dataset.to_string(), RepoType::Dataset));
    let info = repo_api
        .info()
        .map_err(|err| hub_error(dataset, format!("failed reading repository info: {err}")))?;

    let split_dir = format!("{split}/");
    let split_token = format!("-{split}-");
    let split_prefix = format!("{split}-");
    let mut shards = Vec::new();
    for sibling in info.siblings {
        let remote = sibling.rfilename;
        let ext_accepted = Path::new(&remote)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                load::SHARD_EXTENSIONS
                    .iter()
                    .any(|allowed| ext.eq_ignore_ascii_case(allowed))
            });
        if !ext_accepted {
            continue;
        }
        if !split.is_empty() {
            let file_name = Path::new(&remote).file_name().and_then(|name| name.to_str());
            let split_match = remote.contains(&split_dir)
                || remote.contains(&split_token)
                || file_name.is_some_and(|name| name.starts_with(&split_prefix));
            if !split_match {
                continue;
            }
        }
        shards.push(remote);
    }
    shards.sort();
    if shards.is_empty() {
        return Err(hub_error(
            dataset,
            format!(
                "no shard files found for split '{split}' with extensions {:?}",
                load::SHARD_EXTENSIONS
            ),
        ));
    }
    Ok(shards)
}

/// Materialize the shard files of `dataset`/`split` under `snapshot_dir`,
/// returning the local paths in shard order.
pub fn fetch_snapshot(
    dataset: &str,
    split: &str,
    snapshot_dir: &Path,
) -> Result<Vec<PathBuf>, PairsetError> {
    let shards = list_shard_files(dataset, split)?;
    let api = ApiBuilder::new()
        .with_progress(true)
        .with_retries(5)
        .with_token(None)
        .build()
        .map_err(|err| hub_error(dataset, format!("failed building hf-hub client: {err}")))?;
    let repo_api = api.repo(Repo::new(dataset.to_string(), RepoType::Dataset));

    let mut local_paths = Vec::with_capacity(shards.len());
    for remote in &shards {
        let target = snapshot_dir.join(remote);
        if target.exists() {
            local_paths.push(target);
            continue;
        }
        debug!(dataset, shard = remote.as_str(), "downloading shard");
        let cached = repo_api
            .get(remote)
            .map_err(|err| hub_error(dataset, format!("failed downloading '{remote}': {err}")))?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&cached, &target)?;
        local_paths.push(target);
    }
    Ok(local_paths)
}
