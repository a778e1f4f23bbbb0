//! Exactly-once connection release.
//!
//! Every connection the crawler opens is wrapped in a [`ConnectionGuard`]
//! immediately. Normal paths call [`ConnectionGuard::release`], which awaits a
//! graceful close. Any other exit (early return, panic, task abort) drops the
//! guard, which drops the connection synchronously and records the release.
//! The shared [`ResourceLedger`] counts both sides.

use super::SourceConnection;
use crate::error::CrawlerError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Open/close accounting shared by everything that acquires connections.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    acquired: AtomicU64,
    released: AtomicU64,
}

impl ResourceLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record_acquire(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn record_release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Connections currently held.
    pub fn outstanding(&self) -> u64 {
        self.acquired().saturating_sub(self.released())
    }

    /// Checks that every acquired connection was released exactly once.
    ///
    /// # Errors
    /// Returns `ResourceLeak` with both counters when they differ
    pub fn verify(&self) -> crate::Result<()> {
        let opened = self.acquired();
        let released = self.released();
        if opened == released {
            Ok(())
        } else {
            Err(CrawlerError::ResourceLeak { opened, released })
        }
    }
}

/// Owns one open connection until it is released.
pub struct ConnectionGuard {
    connection: Option<Box<dyn SourceConnection>>,
    ledger: Arc<ResourceLedger>,
    label: String,
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("label", &self.label)
            .field("open", &self.connection.is_some())
            .finish()
    }
}

impl ConnectionGuard {
    /// Takes ownership of a freshly opened connection and records it.
    pub fn new(
        connection: Box<dyn SourceConnection>,
        ledger: Arc<ResourceLedger>,
        label: impl Into<String>,
    ) -> Self {
        ledger.record_acquire();
        Self {
            connection: Some(connection),
            ledger,
            label: label.into(),
        }
    }

    /// Borrows the connection.
    ///
    /// # Errors
    /// Fails after [`Self::retire`]
    pub fn connection(&mut self) -> crate::Result<&mut (dyn SourceConnection + 'static)> {
        self.connection
            .as_deref_mut()
            .ok_or_else(|| CrawlerError::configuration(format!("{} already released", self.label)))
    }

    /// Closes the connection gracefully and records the release.
    ///
    /// The release is recorded even when the close itself fails.
    ///
    /// # Errors
    /// Returns the driver's close error
    pub async fn release(mut self) -> crate::Result<()> {
        self.retire().await
    }

    /// Closes the connection but keeps the guard, which stays empty until it
    /// is overwritten. Retiring an empty guard does nothing.
    ///
    /// # Errors
    /// Returns the driver's close error
    pub async fn retire(&mut self) -> crate::Result<()> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        let result = connection.close().await;
        self.ledger.record_release();
        tracing::debug!("Released connection for {}", self.label);
        result
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::warn!(
                "Connection for {} dropped without graceful close",
                self.label
            );
            drop(connection);
            self.ledger.record_release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ReadPlan, RowSink, SchemaEntry, TableEntry};
    use crate::models::ColumnMetadata;
    use async_trait::async_trait;
    use std::time::Duration;

    struct NullConnection;

    #[async_trait]
    impl SourceConnection for NullConnection {
        async fn list_schemas(&mut self) -> crate::Result<Vec<SchemaEntry>> {
            Ok(Vec::new())
        }
        async fn list_tables(&mut self, _: &str, _: bool) -> crate::Result<Vec<TableEntry>> {
            Ok(Vec::new())
        }
        async fn list_columns(&mut self, _: &str, _: &str) -> crate::Result<Vec<ColumnMetadata>> {
            Ok(Vec::new())
        }
        async fn estimate_row_count(&mut self, _: &str, _: &str) -> crate::Result<Option<u64>> {
            Ok(None)
        }
        async fn count_rows(&mut self, _: &str, _: &str) -> crate::Result<u64> {
            Ok(0)
        }
        async fn stream_rows(
            &mut self,
            _: &ReadPlan,
            _: &mut dyn RowSink,
            _: Duration,
        ) -> crate::Result<u64> {
            Ok(0)
        }
        async fn close(self: Box<Self>) -> crate::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_release_is_recorded_once() {
        let ledger = ResourceLedger::new();
        let guard = ConnectionGuard::new(Box::new(NullConnection), Arc::clone(&ledger), "t");
        assert_eq!(ledger.outstanding(), 1);
        assert!(ledger.verify().is_err());

        guard.release().await.unwrap();
        assert_eq!(ledger.acquired(), 1);
        assert_eq!(ledger.released(), 1);
        assert!(ledger.verify().is_ok());
    }

    #[tokio::test]
    async fn test_retired_guard_is_empty() {
        let ledger = ResourceLedger::new();
        let mut guard = ConnectionGuard::new(Box::new(NullConnection), Arc::clone(&ledger), "t");
        guard.retire().await.unwrap();
        assert_eq!(ledger.outstanding(), 0);
        assert!(guard.connection().is_err());

        guard.retire().await.unwrap();
        guard = ConnectionGuard::new(Box::new(NullConnection), Arc::clone(&ledger), "t");
        guard.release().await.unwrap();
        assert_eq!(ledger.acquired(), 2);
        assert!(ledger.verify().is_ok());
    }

    #[test]
    fn test_drop_records_release() {
        let ledger = ResourceLedger::new();
        {
            let _guard = ConnectionGuard::new(Box::new(NullConnection), Arc::clone(&ledger), "t");
        }
        assert!(ledger.verify().is_ok());
    }

    #[test]
    fn test_leak_error_carries_counts() {
        let ledger = ResourceLedger::new();
        let guard = ConnectionGuard::new(Box::new(NullConnection), Arc::clone(&ledger), "t");
        match ledger.verify() {
            Err(CrawlerError::ResourceLeak { opened, released }) => {
                assert_eq!((opened, released), (1, 0));
            }
            other => panic!("unexpected {:?}", other),
        }
        drop(guard);
    }
}
