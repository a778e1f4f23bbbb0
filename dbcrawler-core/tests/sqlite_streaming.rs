//! End-to-end crawl and stream over a real SQLite file.

#![cfg(feature = "sqlite")]

use dbcrawler_core::adapters::{AdapterRegistry, CrawlConfig, SamplingConfig};
use dbcrawler_core::crawler::Crawler;
use dbcrawler_core::models::{
    CrawlStatus, DataSourceDescriptor, EngineFamily, Projection, ReadMode, RowCountSource,
};
use dbcrawler_core::reader::ReadRequest;
use dbcrawler_core::snapshot::SnapshotStore;
use sqlx::{Connection, Executor, SqliteConnection};
use std::sync::Arc;
use tempfile::TempDir;

async fn library_database() -> (TempDir, DataSourceDescriptor) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
    conn.execute(
        r#"
        CREATE TABLE books (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            summary TEXT,
            pages INTEGER
        );
        CREATE TABLE loans (id INTEGER PRIMARY KEY, book_id INTEGER, returned INTEGER);
        CREATE VIEW long_books AS SELECT id, title FROM books WHERE pages > 300;
        "#,
    )
    .await
    .unwrap();

    for i in 0..200 {
        sqlx::query("INSERT INTO books (title, summary, pages) VALUES (?1, ?2, ?3)")
            .bind(format!("Book {}", i))
            .bind("A long summary that will certainly be trimmed by the preview")
            .bind(100 + i * 3)
            .execute(&mut conn)
            .await
            .unwrap();
    }
    sqlx::query("INSERT INTO loans (book_id, returned) VALUES (1, 0), (2, 1)")
        .execute(&mut conn)
        .await
        .unwrap();
    conn.close().await.unwrap();

    let descriptor = DataSourceDescriptor::new(
        "library",
        EngineFamily::Sqlite,
        "",
        None,
        path.to_string_lossy(),
    );
    (dir, descriptor)
}

#[tokio::test]
async fn test_sqlite_crawl_then_stream() {
    let (_dir, descriptor) = library_database().await;
    let descriptor = Arc::new(descriptor);

    let config = CrawlConfig::default()
        .with_threshold(100)
        .with_sampling(SamplingConfig::default().with_sample_size(20).with_preview(3, 12));
    let crawler = Crawler::new(
        Arc::new(AdapterRegistry::standard()),
        config,
        Arc::new(SnapshotStore::new()),
    )
    .unwrap();

    let report = crawler.crawl_source(Arc::clone(&descriptor)).await;
    assert_eq!(report.status, CrawlStatus::Full);
    assert_eq!(report.table_count, 3);

    let snapshot = crawler.store().get(descriptor.id).unwrap();
    let names: Vec<_> = snapshot.metadata.schemas[0]
        .tables
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(names, ["books", "loans", "long_books"]);

    let books = snapshot.metadata.table("main", "books").unwrap();
    assert_eq!(books.row_count, 200);
    assert_eq!(books.row_count_source, RowCountSource::Exact);
    assert_eq!(books.planned_mode, Some(ReadMode::Sample));
    let preview = books.sample.as_ref().unwrap();
    assert_eq!(preview.rows.len(), 3);
    for row in &preview.rows {
        assert!(row["summary"].as_str().unwrap().chars().count() <= 12);
    }

    let loans = snapshot.metadata.table("main", "loans").unwrap();
    assert_eq!(loans.planned_mode, Some(ReadMode::FullScan));

    let reader = crawler.stream_reader();
    let request = ReadRequest::new(
        "main",
        "books",
        Projection::columns("book-titles", ["title", "pages"]),
        ReadMode::Sample,
    )
    .with_row_hint(books.row_count);
    let mut session = reader.open_stream(&descriptor, &request).await.unwrap();

    let mut rows = Vec::new();
    while let Some(row) = session.next_row().await {
        rows.push(row.unwrap());
    }
    let summary = session.finish().await.unwrap();

    assert!(!rows.is_empty());
    assert!(rows.len() <= 20);
    assert_eq!(summary.rows_delivered, rows.len() as u64);
    let keys: Vec<_> = rows[0].values.keys().map(String::as_str).collect();
    assert_eq!(keys, ["title", "pages"]);
    assert!(rows.iter().all(|r| r.projection_id == "book-titles"));

    crawler.ledger().verify().unwrap();
    assert_eq!(crawler.ledger().acquired(), 2);
}

#[tokio::test]
async fn test_sqlite_views_can_be_skipped() {
    let (_dir, descriptor) = library_database().await;
    let crawler = Crawler::new(
        Arc::new(AdapterRegistry::standard()),
        CrawlConfig::default().with_views(false),
        Arc::new(SnapshotStore::new()),
    )
    .unwrap();

    let report = crawler.crawl_source(Arc::new(descriptor)).await;
    assert_eq!(report.table_count, 2);
}
