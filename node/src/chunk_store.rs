use anyhow::anyhow;
use axum::body::Bytes;
use futures_util::Stream;
use nix::sys::statvfs::statvfs;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use uuid::Uuid;

use common::error::ApiError;
use common::file_utils::{chunk_path, file_exists, fsync_dir, stream_to_file_with_hash, tmp_path};

use crate::state::DurabilityLevel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    pub path: PathBuf,
    pub size: u64,
    pub checksum: String,
}

/// Bytes available to unprivileged users and total capacity of the
/// filesystem holding `root`.
pub fn disk_space(root: &Path) -> anyhow::Result<(u64, u64)> {
    let v = statvfs(root)?;
    let frag = v.fragment_size() as u64;
    let cap = v.blocks() as u64 * frag;
    let available = v.blocks_available() as u64 * frag;
    Ok((available, cap))
}

/// Streams a chunk into a temp file while hashing it, checks the hash against
/// `expected` and only then moves the file to its final path. On any failure
/// the temp file is removed and nothing is left at the final path.
#[allow(clippy::too_many_arguments)]
pub async fn write_chunk<S, E>(
    root: &Path,
    node_id: &str,
    file_id: &str,
    chunk_index: u64,
    stream: S,
    expected: Option<&str>,
    max_size: u64,
    durability: DurabilityLevel,
) -> Result<StoredChunk, ApiError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let tmp = tmp_path(root, node_id, &Uuid::new_v4().to_string());
    if let Some(parent) = tmp.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut tmp_file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp)
        .await?;

    let (size, checksum) = match stream_to_file_with_hash(stream, &mut tmp_file, max_size).await {
        Ok(v) => v,
        Err(e) => {
            drop(tmp_file);
            discard(&tmp).await;
            return Err(e);
        }
    };

    if let Some(expected) = expected {
        if !expected.eq_ignore_ascii_case(&checksum) {
            drop(tmp_file);
            discard(&tmp).await;
            return Err(ApiError::ChecksumMismatch {
                expected: expected.to_string(),
                actual: checksum,
            });
        }
    }

    if durability == DurabilityLevel::Immediate {
        tmp_file.sync_all().await?;
    }
    drop(tmp_file);

    let final_path = chunk_path(root, node_id, file_id, chunk_index);
    let parent = final_path
        .parent()
        .ok_or_else(|| ApiError::Any(anyhow!("chunk path has no parent")))?;
    fs::create_dir_all(parent).await?;

    if let Err(e) = fs::rename(&tmp, &final_path).await {
        discard(&tmp).await;
        return Err(e.into());
    }
    if durability == DurabilityLevel::Immediate {
        fsync_dir(parent).await?;
    }

    Ok(StoredChunk {
        path: final_path,
        size,
        checksum,
    })
}

/// Opens a stored chunk for streaming. Returns the file and its length.
pub async fn open_chunk(
    root: &Path,
    node_id: &str,
    file_id: &str,
    chunk_index: u64,
) -> Result<(File, u64), ApiError> {
    let path = chunk_path(root, node_id, file_id, chunk_index);
    if !file_exists(&path).await {
        return Err(ApiError::NotFound(format!("chunk {file_id}/{chunk_index}")));
    }
    let file = File::open(&path).await?;
    let len = file.metadata().await?.len();
    Ok((file, len))
}

/// Removes a stored chunk. Returns false when there was nothing to remove.
pub async fn remove_chunk(
    root: &Path,
    node_id: &str,
    file_id: &str,
    chunk_index: u64,
) -> Result<bool, ApiError> {
    let path = chunk_path(root, node_id, file_id, chunk_index);
    match fs::remove_file(&path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn discard(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp).await {
        tracing::warn!("failed to remove temp file {}: {e}", tmp.display());
    }
}
