//! Lazy, bounded-memory row streaming.
//!
//! [`StreamReader::open_stream`] opens one connection, hands it to a producer
//! task inside a [`ConnectionGuard`] and returns a [`StreamingSession`] that
//! pulls rows from a bounded channel. The producer waits whenever the channel
//! is full, so at most `fetch_size` rows are buffered between the driver and
//! the consumer.
//!
//! # Shutdown paths
//! - Exhaustion: producer drains the result set, releases, exits
//! - [`StreamingSession::cancel`]: receiver dropped, producer awaited; an
//!   in-flight fetch is abandoned rather than waited out
//! - Session dropped: the producer sees the closed channel, releases, exits
//! - Driver error or fetch deadline: error delivered as the last item

use crate::adapters::{
    AdapterRegistry, ConnectionGuard, CrawlConfig, ReadPlan, ResourceLedger, RowSink, SinkStatus,
};
use crate::dialect::{Dialect, SampleStrategy};
use crate::error::CrawlerError;
use crate::models::{DataSourceDescriptor, Projection, ReadMode, Row, TaggedRow};
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What to read from one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub schema: String,
    pub table: String,
    pub projection: Projection,
    pub mode: ReadMode,
    /// Row count estimate; enables native sampling where the dialect has it
    pub row_count_hint: Option<u64>,
}

impl ReadRequest {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        projection: Projection,
        mode: ReadMode,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            projection,
            mode,
            row_count_hint: None,
        }
    }

    pub fn with_row_hint(mut self, hint: u64) -> Self {
        self.row_count_hint = Some(hint);
        self
    }
}

/// Phrases a read request as SQL for one dialect.
///
/// Full scans carry no row cap. Samples are capped at `sample_rows` both in
/// the SQL and by the producer.
///
/// # Errors
/// Returns a `Configuration` error for an empty column list
pub fn build_read_plan(
    dialect: &dyn Dialect,
    request: &ReadRequest,
    sample_rows: u64,
) -> Result<ReadPlan> {
    if let Some(columns) = &request.projection.columns {
        if columns.is_empty() {
            return Err(CrawlerError::configuration(format!(
                "projection '{}' selects no columns",
                request.projection.id
            )));
        }
        if columns.iter().any(|c| c.trim().is_empty()) {
            return Err(CrawlerError::configuration(format!(
                "projection '{}' contains an empty column name",
                request.projection.id
            )));
        }
    }

    let (sql, max_rows, fallback_sql) = match request.mode {
        ReadMode::FullScan => (
            dialect.full_scan_sql(&request.schema, &request.table, &request.projection),
            None,
            None,
        ),
        ReadMode::Sample => {
            let sample = |hint| {
                dialect.sample_plan(
                    &request.schema,
                    &request.table,
                    &request.projection,
                    sample_rows,
                    hint,
                )
            };
            let plan = sample(request.row_count_hint);
            let fallback = (plan.strategy != SampleStrategy::RowLimit).then(|| sample(None).sql);
            (plan.sql, Some(plan.max_rows), fallback)
        }
    };

    Ok(ReadPlan {
        schema: request.schema.clone(),
        table: request.table.clone(),
        sql,
        max_rows,
        fallback_sql,
    })
}

/// Opens streaming sessions against registered drivers.
#[derive(Debug, Clone)]
pub struct StreamReader {
    adapters: Arc<AdapterRegistry>,
    config: CrawlConfig,
    ledger: Arc<ResourceLedger>,
}

impl StreamReader {
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        config: CrawlConfig,
        ledger: Arc<ResourceLedger>,
    ) -> Self {
        Self {
            adapters,
            config,
            ledger,
        }
    }

    /// Ledger counting the connections this reader opens.
    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    /// Opens a lazy row stream over one table.
    ///
    /// The connection is established before this returns, so connect and
    /// authentication failures surface here rather than on the first row.
    ///
    /// # Errors
    /// Returns `UnsupportedDialect` before any I/O, `Connection` or `Timeout`
    /// when the connection cannot be established, `Configuration` for an
    /// invalid projection
    pub async fn open_stream(
        &self,
        descriptor: &DataSourceDescriptor,
        request: &ReadRequest,
    ) -> Result<StreamingSession> {
        let adapter = self.adapters.resolve(descriptor.engine)?;
        let dialect = adapter.dialect();
        let sample_rows = u64::from(self.config.sampling.sample_size);
        let plan = build_read_plan(dialect.as_ref(), request, sample_rows)?;

        let connect_timeout = self.config.connection.connect_timeout();
        let connection = tokio::time::timeout(
            connect_timeout,
            adapter.connect(descriptor, &self.config.connection),
        )
        .await
        .map_err(|_| {
            CrawlerError::timeout(
                format!("connect to source '{}'", descriptor.name),
                connect_timeout,
            )
        })??;

        let label = format!("stream {}.{} on '{}'", plan.schema, plan.table, descriptor.name);
        let guard = ConnectionGuard::new(connection, Arc::clone(&self.ledger), label);

        let (tx, rx) = mpsc::channel(self.config.fetch_size.max(1));
        let fetch_timeout = self.config.fetch_timeout();
        tracing::debug!(
            "Streaming {}.{} from '{}' in {} mode",
            plan.schema,
            plan.table,
            descriptor.name,
            request.mode
        );
        let producer = tokio::spawn(produce(guard, plan, tx, fetch_timeout));

        Ok(StreamingSession {
            rx: Some(rx),
            producer: Some(producer),
            schema: request.schema.clone(),
            table: request.table.clone(),
            projection_id: request.projection.id.clone(),
            delivered: 0,
            exhausted: false,
        })
    }
}

/// Sink that forwards rows into the session channel.
struct ChannelSink {
    tx: mpsc::Sender<Result<Row>>,
    closed: bool,
}

#[async_trait]
impl RowSink for ChannelSink {
    async fn accept(&mut self, row: Row) -> SinkStatus {
        if self.tx.send(Ok(row)).await.is_ok() {
            SinkStatus::Continue
        } else {
            self.closed = true;
            SinkStatus::Closed
        }
    }

    async fn closed(&mut self) {
        self.tx.closed().await;
        self.closed = true;
    }
}

/// Producer task body. Owns the guard, so the connection is released on every
/// path out of here, including abort.
async fn produce(
    mut guard: ConnectionGuard,
    plan: ReadPlan,
    tx: mpsc::Sender<Result<Row>>,
    fetch_timeout: std::time::Duration,
) -> u64 {
    let mut sink = ChannelSink { tx, closed: false };
    let result = match guard.connection() {
        Ok(connection) => connection.stream_rows(&plan, &mut sink, fetch_timeout).await,
        Err(e) => Err(e),
    };

    let sent = match result {
        Ok(sent) => sent,
        Err(e) => {
            tracing::warn!("Stream of {}.{} ended with error: {}", plan.schema, plan.table, e);
            if !sink.closed {
                let _ = sink.tx.send(Err(e)).await;
            }
            0
        }
    };
    drop(sink);

    if let Err(e) = guard.release().await {
        tracing::debug!("Close after stream of {}.{} failed: {}", plan.schema, plan.table, e);
    }
    sent
}

/// Totals reported when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub rows_delivered: u64,
    /// The consumer stopped before the producer reached the end
    pub cancelled: bool,
}

/// A lazy sequence of [`TaggedRow`]s from one table.
///
/// Also usable as a [`futures::Stream`].
#[derive(Debug)]
pub struct StreamingSession {
    rx: Option<mpsc::Receiver<Result<Row>>>,
    producer: Option<JoinHandle<u64>>,
    schema: String,
    table: String,
    projection_id: String,
    delivered: u64,
    exhausted: bool,
}

impl StreamingSession {
    fn tag(&self, values: Row) -> TaggedRow {
        TaggedRow {
            schema: self.schema.clone(),
            table: self.table.clone(),
            projection_id: self.projection_id.clone(),
            values,
        }
    }

    fn on_item(&mut self, item: Option<Result<Row>>) -> Option<Result<TaggedRow>> {
        match item {
            Some(Ok(values)) => {
                self.delivered = self.delivered.saturating_add(1);
                Some(Ok(self.tag(values)))
            }
            Some(Err(e)) => {
                self.exhausted = true;
                Some(Err(e))
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }

    /// Next row, or `None` once the stream has ended.
    ///
    /// # Errors
    /// The final item is an error when the producer failed or a fetch
    /// deadline passed
    pub async fn next_row(&mut self) -> Option<Result<TaggedRow>> {
        let item = match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        };
        self.on_item(item)
    }

    /// Rows handed to the consumer so far.
    pub fn rows_delivered(&self) -> u64 {
        self.delivered
    }

    /// Stops the stream and waits until the connection is released.
    ///
    /// # Errors
    /// Returns an error only if the producer task panicked
    pub async fn cancel(mut self) -> Result<StreamSummary> {
        let cancelled = !self.exhausted;
        self.shutdown(cancelled).await
    }

    /// Ends the session and waits for the producer. Reports `cancelled` when
    /// unread rows were abandoned.
    ///
    /// # Errors
    /// Returns an error only if the producer task panicked
    pub async fn finish(mut self) -> Result<StreamSummary> {
        let cancelled = !self.exhausted;
        self.shutdown(cancelled).await
    }

    async fn shutdown(&mut self, cancelled: bool) -> Result<StreamSummary> {
        drop(self.rx.take());
        if let Some(producer) = self.producer.take() {
            producer.await.map_err(|e| {
                CrawlerError::table_read(&self.schema, &self.table, "row producer failed", e)
            })?;
        }
        Ok(StreamSummary {
            rows_delivered: self.delivered,
            cancelled,
        })
    }
}

impl Stream for StreamingSession {
    type Item = Result<TaggedRow>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let item = match this.rx.as_mut() {
            Some(rx) => match rx.poll_recv(cx) {
                Poll::Ready(item) => item,
                Poll::Pending => return Poll::Pending,
            },
            None => None,
        };
        Poll::Ready(this.on_item(item))
    }
}
