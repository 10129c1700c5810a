use bytes::Bytes;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs::File;
use tokio::{fs, io::AsyncWriteExt};
use tracing::error;

use crate::constants::{CHUNK_DIR_NAME, TMP_DIR_NAME};
use crate::error::ApiError;

fn shard_dirs(name: &str) -> (String, String) {
    let hash = blake3::hash(name.as_bytes());
    let bytes = hash.as_bytes();
    (format!("{:02x}", bytes[0]), format!("{:02x}", bytes[1]))
}

pub fn chunk_file_name(file_id: &str, chunk_index: u64) -> String {
    format!("{}_{}.bin", file_id, chunk_index)
}

/// `{root}/{node_id}/chunks/{aa}/{bb}/{file_id}_{chunk_index}.bin`
pub fn chunk_path(root: &Path, node_id: &str, file_id: &str, chunk_index: u64) -> PathBuf {
    let name = chunk_file_name(file_id, chunk_index);
    let (a, b) = shard_dirs(&name);
    root.join(node_id)
        .join(CHUNK_DIR_NAME)
        .join(a)
        .join(b)
        .join(name)
}

pub fn tmp_path(root: &Path, node_id: &str, upload_id: &str) -> PathBuf {
    root.join(node_id).join(TMP_DIR_NAME).join(upload_id)
}

pub async fn init_dirs(root: &Path, node_id: &str) -> anyhow::Result<()> {
    fs::create_dir_all(root.join(node_id).join(CHUNK_DIR_NAME)).await?;
    fs::create_dir_all(root.join(node_id).join(TMP_DIR_NAME)).await?;

    Ok(())
}

pub async fn file_exists(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

pub async fn fsync_dir(dir: &Path) -> io::Result<()> {
    let dirf = std::fs::File::open(dir)?;
    dirf.sync_all()?;
    Ok(())
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Streams a request body into `file`, hashing as it goes. Fails with
/// `TooLarge` once more than `max_size` bytes have been received.
pub async fn stream_to_file_with_hash<S, E>(
    mut stream: S,
    file: &mut File,
    max_size: u64,
) -> Result<(u64, String), ApiError>
where
    S: futures_util::Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut hasher = Sha256::new();
    let mut total: u64 = 0;

    const BUFFER_SIZE: usize = 1024 * 1024;
    let mut buffer = Vec::with_capacity(BUFFER_SIZE);

    while let Some(next) = stream.next().await {
        let chunk: Bytes = next.map_err(|e| {
            error!("stream error: {e}");
            ApiError::Any(anyhow::anyhow!("stream error"))
        })?;

        total = total
            .checked_add(chunk.len() as u64)
            .ok_or(ApiError::TooLarge)?;
        if total > max_size {
            return Err(ApiError::TooLarge);
        }

        hasher.update(&chunk);
        buffer.extend_from_slice(&chunk);

        if buffer.len() >= BUFFER_SIZE {
            file.write_all(&buffer).await?;
            buffer.clear();
        }
    }

    if !buffer.is_empty() {
        file.write_all(&buffer).await?;
    }
    file.flush().await?;

    Ok((total, hex::encode(hasher.finalize())))
}
