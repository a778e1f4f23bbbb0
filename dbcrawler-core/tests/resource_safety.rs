//! Every streaming session releases its connection exactly once, whatever
//! way it ends.

mod common;

use common::{FakeAdapter, FakeBehavior, FakeTable, fake_source, wait_for_release};
use dbcrawler_core::adapters::{CrawlConfig, ResourceLedger};
use dbcrawler_core::error::CrawlerError;
use dbcrawler_core::models::{Projection, ReadMode};
use dbcrawler_core::reader::{ReadRequest, StreamReader};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

fn reader_for(adapter: &FakeAdapter, config: CrawlConfig) -> StreamReader {
    StreamReader::new(adapter.registry(), config, ResourceLedger::new())
}

fn request(table: &str, mode: ReadMode) -> ReadRequest {
    ReadRequest::new("public", table, Projection::all("docs"), mode)
}

#[tokio::test]
async fn test_full_drain_releases_once() {
    let adapter = FakeAdapter::new(FakeBehavior::with_tables(vec![FakeTable::new("items", 5)]));
    let reader = reader_for(&adapter, CrawlConfig::default().with_fetch_size(2));

    let mut session = reader
        .open_stream(&fake_source("shop"), &request("items", ReadMode::FullScan))
        .await
        .unwrap();

    let mut ids = Vec::new();
    while let Some(row) = session.next_row().await {
        let row = row.unwrap();
        assert_eq!(row.schema, "public");
        assert_eq!(row.table, "items");
        assert_eq!(row.projection_id, "docs");
        ids.push(row.values["id"].as_u64().unwrap());
    }
    assert_eq!(ids, [0, 1, 2, 3, 4]);

    let summary = session.finish().await.unwrap();
    assert_eq!(summary.rows_delivered, 5);
    assert!(!summary.cancelled);

    reader.ledger().verify().unwrap();
    assert_eq!(reader.ledger().acquired(), 1);
    assert_eq!(adapter.counters.opened(), 1);
    assert_eq!(adapter.counters.closed(), 1);
    assert_eq!(adapter.counters.dropped(), 1);
}

#[tokio::test]
async fn test_zero_row_table_releases_once() {
    let adapter = FakeAdapter::new(FakeBehavior::with_tables(vec![FakeTable::new("empty", 0)]));
    let reader = reader_for(&adapter, CrawlConfig::default());

    let mut session = reader
        .open_stream(&fake_source("shop"), &request("empty", ReadMode::FullScan))
        .await
        .unwrap();
    assert!(session.next_row().await.is_none());

    let summary = session.finish().await.unwrap();
    assert_eq!(summary.rows_delivered, 0);
    assert!(!summary.cancelled);
    reader.ledger().verify().unwrap();
    assert_eq!(adapter.counters.closed(), 1);
}

#[tokio::test]
async fn test_cancel_after_one_row() {
    let adapter = FakeAdapter::new(FakeBehavior::with_tables(vec![FakeTable::new("big", 100_000)]));
    let reader = reader_for(&adapter, CrawlConfig::default().with_fetch_size(4));

    let mut session = reader
        .open_stream(&fake_source("shop"), &request("big", ReadMode::FullScan))
        .await
        .unwrap();
    assert!(session.next_row().await.unwrap().is_ok());

    let summary = session.cancel().await.unwrap();
    assert_eq!(summary.rows_delivered, 1);
    assert!(summary.cancelled);

    reader.ledger().verify().unwrap();
    assert_eq!(adapter.counters.opened(), 1);
    assert_eq!(adapter.counters.closed(), 1);
    assert_eq!(adapter.counters.dropped(), 1);
}

#[tokio::test]
async fn test_drop_without_cancel_releases() {
    let adapter = FakeAdapter::new(FakeBehavior::with_tables(vec![FakeTable::new("big", 100_000)]));
    let reader = reader_for(&adapter, CrawlConfig::default().with_fetch_size(4));

    let mut session = reader
        .open_stream(&fake_source("shop"), &request("big", ReadMode::FullScan))
        .await
        .unwrap();
    assert!(session.next_row().await.unwrap().is_ok());
    drop(session);

    wait_for_release(reader.ledger()).await;
    reader.ledger().verify().unwrap();
    assert_eq!(adapter.counters.opened(), 1);
    assert_eq!(adapter.counters.dropped(), 1);
}

fn slow_rows() -> FakeAdapter {
    let mut behavior = FakeBehavior::with_tables(vec![FakeTable::new("slow", 10)]);
    behavior.row_delay = Some(Duration::from_secs(30));
    FakeAdapter::new(behavior)
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_slow_fetch_is_prompt() {
    let adapter = slow_rows();
    let reader = reader_for(&adapter, CrawlConfig::default());

    let mut session = reader
        .open_stream(&fake_source("shop"), &request("slow", ReadMode::FullScan))
        .await
        .unwrap();
    assert!(session.next_row().await.unwrap().is_ok());

    // The producer is now 30s into fetching the second row
    let started = tokio::time::Instant::now();
    let summary = session.cancel().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(summary.rows_delivered, 1);
    assert!(summary.cancelled);

    assert_eq!(reader.ledger().outstanding(), 0);
    reader.ledger().verify().unwrap();
    assert_eq!(adapter.counters.closed(), 1);
    assert_eq!(adapter.counters.dropped(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_during_slow_fetch_releases_promptly() {
    let adapter = slow_rows();
    let reader = reader_for(&adapter, CrawlConfig::default());

    let mut session = reader
        .open_stream(&fake_source("shop"), &request("slow", ReadMode::FullScan))
        .await
        .unwrap();
    assert!(session.next_row().await.unwrap().is_ok());

    let started = tokio::time::Instant::now();
    drop(session);
    wait_for_release(reader.ledger()).await;
    assert!(started.elapsed() < Duration::from_secs(1));
    reader.ledger().verify().unwrap();
    assert_eq!(adapter.counters.closed(), 1);
}

#[tokio::test]
async fn test_producer_error_mid_stream() {
    let mut behavior = FakeBehavior::with_tables(vec![FakeTable::new("flaky", 10)]);
    behavior.fail_stream_after = Some(3);
    let adapter = FakeAdapter::new(behavior);
    let reader = reader_for(&adapter, CrawlConfig::default());

    let mut session = reader
        .open_stream(&fake_source("shop"), &request("flaky", ReadMode::FullScan))
        .await
        .unwrap();

    let mut ok_rows = 0;
    let mut error = None;
    while let Some(item) = session.next_row().await {
        match item {
            Ok(_) => ok_rows += 1,
            Err(e) => error = Some(e),
        }
    }
    assert_eq!(ok_rows, 3);
    assert!(matches!(error, Some(CrawlerError::TableRead { .. })));

    let summary = session.finish().await.unwrap();
    assert_eq!(summary.rows_delivered, 3);
    reader.ledger().verify().unwrap();
    assert_eq!(adapter.counters.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_deadline_ends_stream() {
    let mut behavior = FakeBehavior::with_tables(vec![FakeTable::new("slow", 10)]);
    behavior.stall_stream = true;
    let adapter = FakeAdapter::new(behavior);
    let reader = reader_for(
        &adapter,
        CrawlConfig::default().with_fetch_timeout(Duration::from_millis(100)),
    );

    let mut session = reader
        .open_stream(&fake_source("shop"), &request("slow", ReadMode::FullScan))
        .await
        .unwrap();

    let item = session.next_row().await.unwrap();
    assert!(matches!(item, Err(CrawlerError::Timeout { .. })));
    assert!(session.next_row().await.is_none());

    session.finish().await.unwrap();
    reader.ledger().verify().unwrap();
}

#[tokio::test]
async fn test_sample_mode_is_capped() {
    let adapter = FakeAdapter::new(FakeBehavior::with_tables(vec![FakeTable::new("big", 10_000)]));
    let config = CrawlConfig::default().with_sampling(
        dbcrawler_core::adapters::SamplingConfig::default().with_sample_size(7),
    );
    let reader = reader_for(&adapter, config);

    let session = reader
        .open_stream(&fake_source("shop"), &request("big", ReadMode::Sample))
        .await
        .unwrap();
    let rows: Vec<_> = session.collect().await;
    assert_eq!(rows.len(), 7);
    assert!(rows.iter().all(Result::is_ok));

    wait_for_release(reader.ledger()).await;
    reader.ledger().verify().unwrap();
}

#[tokio::test]
async fn test_connect_failure_surfaces_from_open() {
    let mut behavior = FakeBehavior::with_tables(vec![FakeTable::new("items", 1)]);
    behavior.refuse_connect = true;
    let adapter = FakeAdapter::new(behavior);
    let reader = reader_for(&adapter, CrawlConfig::default());

    let err = reader
        .open_stream(&fake_source("shop"), &request("items", ReadMode::FullScan))
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlerError::Connection { .. }));
    assert_eq!(reader.ledger().acquired(), 0);
}

#[tokio::test]
async fn test_many_sessions_share_one_ledger() {
    let adapter = FakeAdapter::new(FakeBehavior::with_tables(vec![FakeTable::new("items", 50)]));
    let reader = Arc::new(reader_for(&adapter, CrawlConfig::default().with_fetch_size(1)));

    let mut handles = Vec::new();
    for i in 0..8u64 {
        let reader = Arc::clone(&reader);
        handles.push(tokio::spawn(async move {
            let mut session = reader
                .open_stream(&fake_source("shop"), &request("items", ReadMode::FullScan))
                .await
                .unwrap();
            // Half the consumers stop early
            let take = if i % 2 == 0 { 50 } else { 3 };
            for _ in 0..take {
                if session.next_row().await.is_none() {
                    break;
                }
            }
            session.finish().await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    reader.ledger().verify().unwrap();
    assert_eq!(reader.ledger().acquired(), 8);
    assert_eq!(adapter.counters.dropped(), 8);
}
