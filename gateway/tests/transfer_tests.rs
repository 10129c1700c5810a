use reqwest::{Client, StatusCode};
use std::collections::BTreeSet;
use tempfile::TempDir;

mod harness;
use harness::*;

use common::constants::{CHECKSUM_HEADER, REPLICAS_HEADER};
use common::file_utils::sha256_hex;
use common::model::ReplicaType;
use common::schemas::InitUploadRequest;
use gateway::core::config::ReplicationStrategy;
use client::upload::upload_chunks;
use client::{ClientError, download_file, upload_file};

async fn round_trip(size: usize) -> anyhow::Result<()> {
    let gw = TestGateway::new(2).await?;
    let nodes = start_nodes(gw.url(), 3).await?;
    let client = gw.client();
    let dir = TempDir::new()?;

    let data = generate_bytes(size);
    let input = write_input(&dir, "input.bin", &data)?;
    let plan = upload_file(&client, &input, Some(1000), &fast_transfer()).await?;
    assert_eq!(plan.upload_targets.len(), size.div_ceil(1000));

    let output = dir.path().join("output.bin");
    let written = download_file(&client, &plan.file_id, &output, &fast_transfer()).await?;
    assert_eq!(written, size as u64);
    assert_eq!(std::fs::read(&output)?, data);

    shutdown_nodes(nodes).await?;
    gw.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_round_trip_exact_multiple_of_chunk_size() -> anyhow::Result<()> {
    round_trip(3000).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_round_trip_one_byte_short() -> anyhow::Result<()> {
    round_trip(2999).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_round_trip_one_byte_over() -> anyhow::Result<()> {
    round_trip(3001).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_chunk_is_reported_and_others_are_kept() -> anyhow::Result<()> {
    let gw = TestGateway::new(1).await?;
    let nodes = start_nodes(gw.url(), 3).await?;
    let http = Client::new();
    for node in &nodes {
        node.fail_store(&http, "chunk_index=1").await?;
    }

    let client = gw.client();
    let dir = TempDir::new()?;
    let data = generate_bytes(2500);
    let input = write_input(&dir, "input.bin", &data)?;

    let plan = client
        .init_upload(&InitUploadRequest {
            filename: "input.bin".into(),
            size: 2500,
            chunk_size: Some(1000),
        })
        .await?;
    let err = upload_chunks(client.http(), &input, 2500, &plan, &fast_transfer())
        .await
        .unwrap_err();

    assert_eq!(err.failed_chunks(), vec![1]);
    assert!(err.to_string().contains("[1]"), "got: {err}");

    let stored: BTreeSet<u64> = gw
        .state
        .catalog
        .replicas_for_file(&plan.file_id)
        .await?
        .into_iter()
        .map(|r| r.chunk_index)
        .collect();
    assert_eq!(stored, BTreeSet::from([0, 2]));

    // the client gave up on chunk 1 after exactly its retry budget
    let attempts: u64 = nodes
        .iter()
        .map(|n| n.state.fault_injector.store_attempts(1))
        .sum();
    assert_eq!(attempts, u64::from(fast_transfer().retry.max_attempts));

    shutdown_nodes(nodes).await?;
    gw.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreadable_chunk_does_not_abandon_the_others() -> anyhow::Result<()> {
    let gw = TestGateway::new(1).await?;
    let nodes = start_nodes(gw.url(), 1).await?;
    let client = gw.client();
    let dir = TempDir::new()?;
    let data = generate_bytes(2500);
    let input = write_input(&dir, "input.bin", &data)?;

    let mut plan = client
        .init_upload(&InitUploadRequest {
            filename: "input.bin".into(),
            size: 2500,
            chunk_size: Some(1000),
        })
        .await?;
    // a target past the end of the file, ahead of chunks that still need sending
    let mut bogus = plan.upload_targets[0].clone();
    bogus.chunk_index = 7;
    plan.upload_targets.insert(1, bogus);

    let opts = client::TransferOptions {
        max_inflight: 1,
        ..fast_transfer()
    };
    let err = upload_chunks(client.http(), &input, 2500, &plan, &opts)
        .await
        .unwrap_err();
    assert_eq!(err.failed_chunks(), vec![7]);

    let stored: BTreeSet<u64> = gw
        .state
        .catalog
        .replicas_for_file(&plan.file_id)
        .await?
        .into_iter()
        .map(|r| r.chunk_index)
        .collect();
    assert_eq!(stored, BTreeSet::from([0, 1, 2]));

    shutdown_nodes(nodes).await?;
    gw.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_upload_recovers_from_a_transient_store_failure() -> anyhow::Result<()> {
    let gw = TestGateway::new(1).await?;
    let nodes = start_nodes(gw.url(), 1).await?;
    let http = Client::new();
    nodes[0].fail_store(&http, "once=true").await?;

    let client = gw.client();
    let dir = TempDir::new()?;
    let data = generate_bytes(10);
    let input = write_input(&dir, "small.bin", &data)?;

    let plan = upload_file(&client, &input, None, &fast_transfer()).await?;
    assert_eq!(plan.upload_targets.len(), 1);
    assert_eq!(nodes[0].state.fault_injector.store_attempts(0), 2);

    let output = dir.path().join("small.out");
    download_file(&client, &plan.file_id, &output, &fast_transfer()).await?;
    assert_eq!(std::fs::read(&output)?, data);

    shutdown_nodes(nodes).await?;
    gw.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_checksum_mismatch_is_rejected_without_a_row() -> anyhow::Result<()> {
    let gw = TestGateway::new(1).await?;
    let nodes = start_nodes(gw.url(), 1).await?;
    let client = gw.client();

    let plan = client
        .init_upload(&InitUploadRequest {
            filename: "x.bin".into(),
            size: 10,
            chunk_size: Some(10),
        })
        .await?;
    let target = &plan.upload_targets[0];

    let resp = client
        .http()
        .put(&target.url)
        .header(CHECKSUM_HEADER, sha256_hex(b"not the body"))
        .body(b"0123456789".to_vec())
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(gw.state.catalog.replicas_for_file(&plan.file_id).await?.is_empty());
    assert!(!nodes[0].chunk_file(&plan.file_id, 0).exists());

    shutdown_nodes(nodes).await?;
    gw.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_corrupted_chunk_fails_download_without_output() -> anyhow::Result<()> {
    let gw = TestGateway::new(1).await?;
    let nodes = start_nodes(gw.url(), 1).await?;
    let client = gw.client();
    let dir = TempDir::new()?;

    let data = generate_bytes(2500);
    let input = write_input(&dir, "input.bin", &data)?;
    let plan = upload_file(&client, &input, Some(1000), &fast_transfer()).await?;

    std::fs::write(nodes[0].chunk_file(&plan.file_id, 1), vec![0u8; 1000])?;

    let output = dir.path().join("output.bin");
    let err = download_file(&client, &plan.file_id, &output, &fast_transfer())
        .await
        .unwrap_err();

    match &err {
        ClientError::Transfer { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, 1);
            assert!(matches!(failures[0].1, ClientError::Integrity { chunk_index: 1, .. }));
        }
        other => panic!("expected transfer error, got {other}"),
    }
    assert!(!output.exists());

    shutdown_nodes(nodes).await?;
    gw.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_replication_stores_every_copy() -> anyhow::Result<()> {
    let gw = TestGateway::new(2).await?;
    let nodes = start_nodes(gw.url(), 2).await?;
    let client = gw.client();

    let plan = client
        .init_upload(&InitUploadRequest {
            filename: "r.bin".into(),
            size: 5,
            chunk_size: None,
        })
        .await?;
    let target = &plan.upload_targets[0];
    assert_eq!(target.secondaries.len(), 1);

    let body = b"hello".to_vec();
    let resp = client
        .http()
        .put(&target.url)
        .header(CHECKSUM_HEADER, sha256_hex(&body))
        .body(body)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(
        resp.headers().get(REPLICAS_HEADER).and_then(|v| v.to_str().ok()),
        Some("2/2")
    );

    let rows = gw.state.catalog.replicas_for_chunk(&plan.file_id, 0).await?;
    assert_eq!(rows.len(), 2);
    let primary: Vec<_> = rows
        .iter()
        .filter(|r| r.replica_type == ReplicaType::Primary)
        .collect();
    assert_eq!(primary.len(), 1);
    assert_eq!(primary[0].node_id, target.node);
    for node in &nodes {
        assert!(node.chunk_file(&plan.file_id, 0).exists());
    }

    shutdown_nodes(nodes).await?;
    gw.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_replication_catches_up_in_the_background() -> anyhow::Result<()> {
    let gw = TestGateway::with_config(2, ReplicationStrategy::Async, 60).await?;
    let nodes = start_nodes(gw.url(), 2).await?;
    let client = gw.client();

    let plan = client
        .init_upload(&InitUploadRequest {
            filename: "a.bin".into(),
            size: 5,
            chunk_size: None,
        })
        .await?;
    let target = &plan.upload_targets[0];
    assert_eq!(target.secondaries.len(), 1);

    let body = b"hello".to_vec();
    let resp = client
        .http()
        .put(&target.url)
        .header(CHECKSUM_HEADER, sha256_hex(&body))
        .body(body)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(resp.headers().get(REPLICAS_HEADER).is_none());

    let catalog = &gw.state.catalog;
    wait_until(5000, || async {
        Ok(catalog.replicas_for_chunk(&plan.file_id, 0).await?.len() == 2)
    })
    .await?;

    let rows = catalog.replicas_for_chunk(&plan.file_id, 0).await?;
    let secondary: Vec<_> = rows
        .iter()
        .filter(|r| r.replica_type == ReplicaType::Secondary)
        .collect();
    assert_eq!(secondary.len(), 1);
    assert_eq!(secondary[0].node_id, target.secondaries[0]);
    for node in &nodes {
        assert!(node.chunk_file(&plan.file_id, 0).exists());
    }

    shutdown_nodes(nodes).await?;
    gw.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_download_of_unknown_file_is_not_found() -> anyhow::Result<()> {
    let gw = TestGateway::new(1).await?;
    let client = gw.client();
    let dir = TempDir::new()?;
    let output = dir.path().join("missing.bin");

    let err = download_file(&client, "no-such-file", &output, &fast_transfer())
        .await
        .unwrap_err();
    assert!(
        matches!(err, ClientError::Gateway { status, .. } if status == StatusCode::NOT_FOUND),
        "got: {err}"
    );
    assert!(!output.exists());

    gw.shutdown().await?;
    Ok(())
}
