//! Scan aggregation.
//!
//! A scan turns the radio's raw advertisement stream into a stream of
//! snapshots: the ordered list of every connectable device seen so far in
//! this scan, keyed by address. A device that advertises again is updated in
//! place and keeps its position. A snapshot is only emitted when it differs
//! from the previous one.
//!
//! Scans are lazy: nothing happens until the returned [`ScanStream`] is first
//! polled. Starting a scan cancels any scan already in progress, and
//! [`ScanAggregator::stop`] ends the current one.
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let mut scan = client.scan();
//! while let Some(snapshot) = scan.next().await {
//!     for device in snapshot? {
//!         println!("{} {:?}", device.address(), device.device.name);
//!     }
//! }
//! ```

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, ready};

use futures::{Stream, StreamExt};
use indexmap::IndexMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use blecore_types::ScanResult;

use crate::error::Result;
use crate::radio::Radio;

/// Item type of a [`ScanStream`].
pub type ScanSnapshot = Result<Vec<ScanResult>>;

/// What recording one advertisement did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// Not connectable; not considered.
    Ignored,
    /// First advertisement from this address.
    New,
    /// Known address with different advertisement data.
    Updated,
    /// Known address, identical data.
    Unchanged,
}

impl Recorded {
    /// Whether the snapshot changed.
    pub fn changed(self) -> bool {
        matches!(self, Self::New | Self::Updated)
    }
}

/// Insertion-ordered table of discovered devices, private to one scan.
#[derive(Debug, Clone, Default)]
pub struct DeviceTable {
    devices: IndexMap<String, ScanResult>,
}

impl DeviceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one advertisement.
    pub fn record(&mut self, result: ScanResult) -> Recorded {
        if !result.is_connectable() {
            return Recorded::Ignored;
        }
        match self.devices.get_mut(result.address()) {
            Some(existing) if *existing == result => Recorded::Unchanged,
            Some(existing) => {
                *existing = result;
                Recorded::Updated
            }
            None => {
                self.devices.insert(result.device.address.clone(), result);
                Recorded::New
            }
        }
    }

    /// All devices in first-seen order.
    pub fn snapshot(&self) -> Vec<ScanResult> {
        self.devices.values().cloned().collect()
    }

    /// Number of distinct devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device has been recorded.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Starts scans against a [`Radio`] and tracks the one in progress.
pub struct ScanAggregator {
    radio: Arc<dyn Radio>,
    runtime: Handle,
    filters: Vec<Uuid>,
    capacity: usize,
    logging_enabled: bool,
    current: Mutex<Option<CancellationToken>>,
}

impl ScanAggregator {
    /// Create an aggregator.
    pub fn new(
        radio: Arc<dyn Radio>,
        runtime: Handle,
        filters: Vec<Uuid>,
        capacity: usize,
        logging_enabled: bool,
    ) -> Self {
        Self {
            radio,
            runtime,
            filters,
            capacity: capacity.max(1),
            logging_enabled,
            current: Mutex::new(None),
        }
    }

    /// A lazy scan. Scanning starts when the stream is first polled.
    pub fn scan(self: &Arc<Self>) -> ScanStream {
        ScanStream {
            aggregator: Arc::clone(self),
            state: ScanState::Idle,
        }
    }

    /// Stop the scan in progress, if any. Its stream ends.
    pub fn stop(&self) {
        let token = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            debug!("Stopping scan");
            token.cancel();
        }
    }

    /// Whether a scan is currently running.
    pub fn is_scanning(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    fn start(&self) -> ScanState {
        let token = CancellationToken::new();
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        self.runtime.spawn(run_scan(
            Arc::clone(&self.radio),
            self.filters.clone(),
            tx,
            token.clone(),
            self.logging_enabled,
        ));
        ScanState::Running { rx, token }
    }
}

impl std::fmt::Debug for ScanAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanAggregator")
            .field("filters", &self.filters)
            .field("scanning", &self.is_scanning())
            .finish()
    }
}

async fn run_scan(
    radio: Arc<dyn Radio>,
    filters: Vec<Uuid>,
    tx: mpsc::Sender<ScanSnapshot>,
    token: CancellationToken,
    logging_enabled: bool,
) {
    let started = tokio::select! {
        _ = token.cancelled() => return,
        started = radio.scan(&filters) => started,
    };
    let mut results = match started {
        Ok(results) => results,
        Err(e) => {
            warn!("Failed to start scan: {}", e);
            let _ = tx.send(Err(e)).await;
            return;
        }
    };
    debug!(filters = filters.len(), "Scan started");

    let mut table = DeviceTable::new();
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            _ = tx.closed() => break,
            next = results.next() => next,
        };
        let result = match next {
            Some(Ok(result)) => result,
            Some(Err(e)) => {
                warn!("Scan failed: {}", e);
                let _ = tx.send(Err(e)).await;
                break;
            }
            None => break,
        };

        let (address, name, rssi) = (
            result.device.address.clone(),
            result.device.name.clone(),
            result.data.rssi,
        );
        let recorded = table.record(result);
        if recorded == Recorded::New && logging_enabled {
            info!(%address, ?name, ?rssi, "Discovered device");
        }
        if !recorded.changed() {
            continue;
        }

        tokio::select! {
            _ = token.cancelled() => break,
            sent = tx.send(Ok(table.snapshot())) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    debug!(devices = table.len(), "Scan ended");
}

enum ScanState {
    Idle,
    Running {
        rx: mpsc::Receiver<ScanSnapshot>,
        token: CancellationToken,
    },
    Done,
}

/// Stream of device snapshots returned by [`ScanAggregator::scan`].
///
/// Infinite unless stopped, superseded by a newer scan, or the radio fails.
/// A radio failure is delivered as the final `Err` item. Dropping the stream
/// stops its scan.
pub struct ScanStream {
    aggregator: Arc<ScanAggregator>,
    state: ScanState,
}

impl ScanStream {
    /// Whether this stream has started scanning.
    pub fn is_started(&self) -> bool {
        !matches!(self.state, ScanState::Idle)
    }
}

impl Stream for ScanStream {
    type Item = ScanSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if matches!(this.state, ScanState::Idle) {
            this.state = this.aggregator.start();
        }
        let ScanState::Running { rx, .. } = &mut this.state else {
            return Poll::Ready(None);
        };
        match ready!(rx.poll_recv(cx)) {
            Some(item) => Poll::Ready(Some(item)),
            None => {
                this.state = ScanState::Done;
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for ScanStream {
    fn drop(&mut self) {
        if let ScanState::Running { token, .. } = &self.state {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for ScanStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            ScanState::Idle => "idle",
            ScanState::Running { .. } => "running",
            ScanState::Done => "done",
        };
        f.debug_struct("ScanStream").field("state", &state).finish()
    }
}
