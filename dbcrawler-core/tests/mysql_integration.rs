//! MySQL driver tests against a real server in a container.
//!
//! Requires Docker. Run with `cargo nextest run --run-ignored all`.

#![cfg(feature = "mysql")]

use dbcrawler_core::adapters::{AdapterRegistry, CrawlConfig};
use dbcrawler_core::crawler::Crawler;
use dbcrawler_core::models::{DataSourceDescriptor, EngineFamily, Projection, ReadMode};
use dbcrawler_core::reader::ReadRequest;
use dbcrawler_core::security::Credentials;
use dbcrawler_core::snapshot::SnapshotStore;
use serde_json::json;
use sqlx::{Connection, Executor, MySqlConnection};
use std::sync::Arc;
use std::time::Duration;
use testcontainers_modules::{mysql::Mysql, testcontainers::runners::AsyncRunner};

/// Polls until the server accepts connections.
async fn wait_for_mysql_ready(database_url: &str, max_attempts: u32) -> MySqlConnection {
    let mut attempts = 0;
    loop {
        if let Ok(conn) = MySqlConnection::connect(database_url).await {
            return conn;
        }
        attempts += 1;
        assert!(attempts < max_attempts, "MySQL never became ready");
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_mysql_integration_unsigned_and_decimal_values() {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let url = format!("mysql://root@localhost:{}/test", port);

    let mut conn = wait_for_mysql_ready(&url, 60).await;
    conn.execute(
        r#"
        CREATE TABLE ledger (
            id BIGINT UNSIGNED PRIMARY KEY,
            qty INT UNSIGNED NOT NULL,
            price DECIMAL(10, 2) NOT NULL,
            rate DECIMAL(30, 10) NULL,
            delta BIGINT NOT NULL
        );
        INSERT INTO ledger VALUES
            (18446744073709551615, 4294967295, 19.99, 12345678901234567890.1234567890, -7),
            (1, 0, 0.50, NULL, 3);
        "#,
    )
    .await
    .unwrap();
    conn.close().await.unwrap();

    let source = Arc::new(
        DataSourceDescriptor::new("my", EngineFamily::MySql, "localhost", Some(port), "test")
            .with_credentials(Credentials::new("root".to_string(), None)),
    );
    let crawler = Crawler::new(
        Arc::new(AdapterRegistry::standard()),
        CrawlConfig::default(),
        Arc::new(SnapshotStore::new()),
    )
    .unwrap();

    let request = ReadRequest::new("test", "ledger", Projection::all("ledger"), ReadMode::FullScan);
    let mut session = crawler
        .stream_reader()
        .open_stream(&source, &request)
        .await
        .unwrap();

    let mut rows = Vec::new();
    while let Some(row) = session.next_row().await {
        rows.push(row.unwrap().values);
    }
    session.finish().await.unwrap();
    rows.sort_by_key(|r| r["qty"].as_u64());

    assert_eq!(rows[0]["id"], json!(1u64));
    assert_eq!(rows[0]["price"], json!("0.50"));
    assert_eq!(rows[0]["rate"], json!(null));
    assert_eq!(rows[0]["delta"], json!(3));

    assert_eq!(rows[1]["id"], json!(u64::MAX));
    assert_eq!(rows[1]["qty"], json!(4_294_967_295u64));
    assert_eq!(rows[1]["price"], json!("19.99"));
    assert_eq!(rows[1]["rate"], json!("12345678901234567890.1234567890"));
    assert_eq!(rows[1]["delta"], json!(-7));

    crawler.ledger().verify().unwrap();
}
