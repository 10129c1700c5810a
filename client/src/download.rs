use bytes::Bytes;
use reqwest::Client;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use common::file_utils::sha256_hex;
use common::retry::retry_with_backoff;
use common::schemas::DownloadTarget;

use crate::TransferOptions;
use crate::api::GatewayClient;
use crate::error::ClientError;

/// Downloads `file_id` into `output`. Every chunk is fetched and verified
/// before the output file is created, so a failed download leaves no file
/// behind. Returns the number of bytes written.
pub async fn download_file(
    gateway: &GatewayClient,
    file_id: &str,
    output: &Path,
    opts: &TransferOptions,
) -> Result<u64, ClientError> {
    let mut plan = gateway.download_plan(file_id).await?;
    check_contiguous(&mut plan)?;
    info!(file_id, chunks = plan.len(), "download planned");

    let chunks = fetch_chunks(gateway.http(), plan, opts).await?;

    let mut file = File::create(output).await?;
    let mut written = 0u64;
    for data in chunks.values() {
        file.write_all(data).await?;
        written += data.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;

    info!(file_id, bytes = written, output = %output.display(), "download complete");
    Ok(written)
}

/// Sorts the plan by chunk index and checks it covers `0..n` exactly once.
fn check_contiguous(plan: &mut [DownloadTarget]) -> Result<(), ClientError> {
    plan.sort_by_key(|t| t.chunk_index);
    for (expected, target) in (0u64..).zip(plan.iter()) {
        if target.chunk_index < expected {
            return Err(ClientError::InvalidPlan(format!(
                "chunk {} listed twice",
                target.chunk_index
            )));
        }
        if target.chunk_index > expected {
            return Err(ClientError::MissingChunk(expected));
        }
    }
    Ok(())
}

/// Fetches and verifies every chunk of the plan, at most `opts.max_inflight`
/// at a time.
pub async fn fetch_chunks(
    http: &Client,
    plan: Vec<DownloadTarget>,
    opts: &TransferOptions,
) -> Result<BTreeMap<u64, Bytes>, ClientError> {
    let sem = Arc::new(Semaphore::new(opts.max_inflight.max(1)));
    let mut joinset = JoinSet::new();
    let mut pending = BTreeSet::new();
    let mut failures = Vec::new();

    for target in plan {
        let permit = match sem.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                failures.push((target.chunk_index, ClientError::Task(e.to_string())));
                continue;
            }
        };
        pending.insert(target.chunk_index);

        let http = http.clone();
        let opts = opts.clone();
        joinset.spawn(async move {
            let _permit = permit;
            let res = download_chunk(&http, &target, &opts).await;
            (target.chunk_index, res)
        });
    }

    let mut chunks = BTreeMap::new();
    while let Some(joined) = joinset.join_next().await {
        match joined {
            Ok((chunk_index, res)) => {
                pending.remove(&chunk_index);
                match res {
                    Ok(data) => {
                        chunks.insert(chunk_index, data);
                    }
                    Err(e) => {
                        warn!(chunk_index, "chunk download failed: {e}");
                        failures.push((chunk_index, e));
                    }
                }
            }
            Err(e) => warn!("chunk download task failed: {e}"),
        }
    }
    for chunk_index in pending {
        failures.push((chunk_index, ClientError::Task("download task aborted".into())));
    }

    if failures.is_empty() {
        Ok(chunks)
    } else {
        failures.sort_by_key(|(i, _)| *i);
        Err(ClientError::Transfer { failures })
    }
}

async fn download_chunk(
    http: &Client,
    target: &DownloadTarget,
    opts: &TransferOptions,
) -> Result<Bytes, ClientError> {
    retry_with_backoff(
        &opts.retry,
        |attempt| {
            debug!(chunk_index = target.chunk_index, attempt, "fetching chunk");
            get_chunk(http, target, opts)
        },
        ClientError::retry_class,
    )
    .await
}

async fn get_chunk(
    http: &Client,
    target: &DownloadTarget,
    opts: &TransferOptions,
) -> Result<Bytes, ClientError> {
    let resp = http
        .get(&target.url)
        .timeout(opts.retry.per_attempt_timeout)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::ChunkStatus {
            chunk_index: target.chunk_index,
            status,
            body,
        });
    }

    let data = resp.bytes().await?;
    let actual = sha256_hex(&data);
    if !actual.eq_ignore_ascii_case(&target.checksum) {
        return Err(ClientError::Integrity {
            chunk_index: target.chunk_index,
            expected: target.checksum.clone(),
            actual,
        });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(chunk_index: u64) -> DownloadTarget {
        DownloadTarget {
            chunk_index,
            url: format!("http://gw/proxy-chunk-download?chunk_index={chunk_index}"),
            checksum: String::new(),
        }
    }

    #[test]
    fn plan_is_sorted_by_index() {
        let mut plan = vec![target(2), target(0), target(1)];
        check_contiguous(&mut plan).unwrap();
        let order: Vec<u64> = plan.iter().map(|t| t.chunk_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn gaps_and_duplicates_are_rejected() {
        let mut gap = vec![target(0), target(2)];
        assert!(matches!(
            check_contiguous(&mut gap),
            Err(ClientError::MissingChunk(1))
        ));

        let mut late_start = vec![target(1)];
        assert!(matches!(
            check_contiguous(&mut late_start),
            Err(ClientError::MissingChunk(0))
        ));

        let mut dup = vec![target(0), target(0), target(1)];
        assert!(matches!(
            check_contiguous(&mut dup),
            Err(ClientError::InvalidPlan(_))
        ));
    }
}
