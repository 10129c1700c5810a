use bytes::Bytes;
use reqwest::Client;
use std::collections::BTreeSet;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use common::constants::CHECKSUM_HEADER;
use common::file_utils::sha256_hex;
use common::retry::retry_with_backoff;
use common::schemas::{InitUploadRequest, UploadPlan, UploadTarget};

use crate::TransferOptions;
use crate::api::GatewayClient;
use crate::error::ClientError;

/// Plans, uploads and finalizes `path`. Returns the plan, whose `file_id`
/// names the stored file.
pub async fn upload_file(
    gateway: &GatewayClient,
    path: &Path,
    chunk_size: Option<i64>,
    opts: &TransferOptions,
) -> Result<UploadPlan, ClientError> {
    let size = fs::metadata(path).await?.len();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let plan = gateway
        .init_upload(&InitUploadRequest {
            filename,
            size: i64::try_from(size).map_err(|_| ClientError::InvalidPlan("file too large".into()))?,
            chunk_size,
        })
        .await?;
    info!(
        file_id = %plan.file_id,
        chunks = plan.upload_targets.len(),
        chunk_size = plan.chunk_size,
        "upload planned"
    );

    upload_chunks(gateway.http(), path, size, &plan, opts).await?;

    gateway.finalize(&plan.file_id).await?;
    info!(file_id = %plan.file_id, "upload finalized");

    Ok(plan)
}

/// Uploads every chunk of the plan, at most `opts.max_inflight` at a time.
/// All chunk tasks run to completion; if any failed, the error lists every
/// failed chunk. Chunks that were stored stay stored.
pub async fn upload_chunks(
    http: &Client,
    path: &Path,
    size: u64,
    plan: &UploadPlan,
    opts: &TransferOptions,
) -> Result<(), ClientError> {
    if plan.chunk_size == 0 {
        return Err(ClientError::InvalidPlan("chunk size is 0".into()));
    }

    let mut file = File::open(path).await?;
    let sem = Arc::new(Semaphore::new(opts.max_inflight.max(1)));
    let mut joinset = JoinSet::new();
    let mut pending = BTreeSet::new();
    let mut failures = Vec::new();

    // a chunk that cannot be started is recorded; chunks already in flight keep running
    for target in &plan.upload_targets {
        let permit = match sem.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                failures.push((target.chunk_index, ClientError::Task(e.to_string())));
                continue;
            }
        };

        let data = match read_chunk(&mut file, target.chunk_index, plan.chunk_size, size).await {
            Ok(data) => data,
            Err(e) => {
                warn!(chunk_index = target.chunk_index, "chunk read failed: {e}");
                failures.push((target.chunk_index, e));
                continue;
            }
        };
        pending.insert(target.chunk_index);

        let http = http.clone();
        let target = target.clone();
        let opts = opts.clone();
        joinset.spawn(async move {
            let _permit = permit;
            let res = upload_chunk(&http, &target, data, &opts).await;
            (target.chunk_index, res)
        });
    }

    while let Some(joined) = joinset.join_next().await {
        match joined {
            Ok((chunk_index, res)) => {
                pending.remove(&chunk_index);
                if let Err(e) = res {
                    warn!(chunk_index, "chunk upload failed: {e}");
                    failures.push((chunk_index, e));
                }
            }
            Err(e) => warn!("chunk upload task failed: {e}"),
        }
    }
    // tasks that panicked never reported their index
    for chunk_index in pending {
        failures.push((chunk_index, ClientError::Task("upload task aborted".into())));
    }

    if failures.is_empty() {
        Ok(())
    } else {
        failures.sort_by_key(|(i, _)| *i);
        Err(ClientError::Transfer { failures })
    }
}

/// Reads chunk `chunk_index`: `chunk_size` bytes, or the remainder for the last one.
async fn read_chunk(
    file: &mut File,
    chunk_index: u64,
    chunk_size: u64,
    file_size: u64,
) -> Result<Bytes, ClientError> {
    let offset = chunk_index
        .checked_mul(chunk_size)
        .filter(|o| *o < file_size)
        .ok_or_else(|| ClientError::InvalidPlan(format!("chunk {chunk_index} is past the end of the file")))?;
    let len = chunk_size.min(file_size - offset);
    let len = usize::try_from(len).map_err(|_| io::Error::other("chunk does not fit in memory"))?;

    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

async fn upload_chunk(
    http: &Client,
    target: &UploadTarget,
    data: Bytes,
    opts: &TransferOptions,
) -> Result<(), ClientError> {
    let checksum = sha256_hex(&data);

    retry_with_backoff(
        &opts.retry,
        |attempt| {
            debug!(chunk_index = target.chunk_index, attempt, "uploading chunk");
            put_chunk(http, target, data.clone(), &checksum, opts)
        },
        ClientError::retry_class,
    )
    .await
}

async fn put_chunk(
    http: &Client,
    target: &UploadTarget,
    data: Bytes,
    checksum: &str,
    opts: &TransferOptions,
) -> Result<(), ClientError> {
    let resp = http
        .put(&target.url)
        .timeout(opts.retry.per_attempt_timeout)
        .header(CHECKSUM_HEADER, checksum)
        .body(data)
        .send()
        .await?;

    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::ChunkStatus {
        chunk_index: target.chunk_index,
        status,
        body,
    })
}
