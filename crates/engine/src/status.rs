use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Well-known status keys.
pub mod keys {
    pub const STATUS: &str = "Status";
    pub const ACCOUNT_BALANCE: &str = "Account Balance";
    pub const TICKER_PRICE: &str = "Ticker Price";
    pub const UPTIME: &str = "Uptime";
    pub const ERROR: &str = "Error";
    pub const POLICY: &str = "Policy";
}

/// A displayed value.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusValue {
    Text(String),
    /// Per-currency balances; only non-zero entries are rendered.
    Balances(Vec<(String, f64)>),
}

impl std::fmt::Display for StatusValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusValue::Text(text) => write!(f, "{text}"),
            StatusValue::Balances(balances) => {
                let mut first = true;
                for (code, amount) in balances.iter().filter(|(_, amount)| *amount > 0.0) {
                    if !first {
                        write!(f, "  ")?;
                    }
                    write!(f, "{code} : {amount:.5}")?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

impl From<String> for StatusValue {
    fn from(text: String) -> Self {
        StatusValue::Text(text)
    }
}

impl From<&str> for StatusValue {
    fn from(text: &str) -> Self {
        StatusValue::Text(text.to_string())
    }
}

/// Two bounded queues between the trading loop and the display: one for
/// key/value updates, one for key removals.
pub struct StatusChannel;

impl StatusChannel {
    pub const DEFAULT_CAPACITY: usize = 10;

    /// Create a publisher/receiver pair. Each queue holds `capacity` entries.
    pub fn new(capacity: usize) -> (StatusPublisher, StatusReceiver) {
        let capacity = capacity.max(1);
        let (update_tx, update_rx) = mpsc::channel(capacity);
        let (remove_tx, remove_rx) = mpsc::channel(capacity);
        (
            StatusPublisher {
                update_tx,
                remove_tx,
                sequence: Arc::new(AtomicU64::new(0)),
            },
            StatusReceiver {
                update_rx,
                remove_rx,
            },
        )
    }
}

/// Producer side. Cheap to clone.
///
/// Pushes never wait: when a queue is full the entry is dropped and the
/// call returns `false`, so a slow display can never stall trading.
/// Every entry carries a sequence number shared by both queues so the
/// receiver can replay them in send order.
#[derive(Clone)]
pub struct StatusPublisher {
    update_tx: mpsc::Sender<(u64, String, StatusValue)>,
    remove_tx: mpsc::Sender<(u64, String)>,
    sequence: Arc<AtomicU64>,
}

impl StatusPublisher {
    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Set `key` to `value` on the display.
    pub fn update(&self, key: &str, value: impl Into<StatusValue>) -> bool {
        let seq = self.next_sequence();
        match self.update_tx.try_send((seq, key.to_string(), value.into())) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full((_, key, _))) => {
                debug!(key = %key, "Status update queue full, dropping update");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Remove `key` from the display. A no-op there if the key is absent.
    pub fn remove(&self, key: &str) -> bool {
        let seq = self.next_sequence();
        match self.remove_tx.try_send((seq, key.to_string())) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full((_, key))) => {
                debug!(key = %key, "Status removal queue full, dropping removal");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

enum Change {
    Set(String, StatusValue),
    Remove(String),
}

/// Consumer side, owned by the display task.
pub struct StatusReceiver {
    update_rx: mpsc::Receiver<(u64, String, StatusValue)>,
    remove_rx: mpsc::Receiver<(u64, String)>,
}

impl StatusReceiver {
    /// Apply every queued update and removal in the order they were sent.
    /// Returns the number of entries consumed.
    pub fn drain_into(&mut self, board: &mut StatusBoard) -> usize {
        let mut changes: Vec<(u64, Change)> = Vec::new();
        while let Ok((seq, key, value)) = self.update_rx.try_recv() {
            changes.push((seq, Change::Set(key, value)));
        }
        while let Ok((seq, key)) = self.remove_rx.try_recv() {
            changes.push((seq, Change::Remove(key)));
        }
        changes.sort_by_key(|(seq, _)| *seq);

        let consumed = changes.len();
        for (_, change) in changes {
            match change {
                Change::Set(key, value) => board.set(key, value),
                Change::Remove(key) => {
                    board.remove(&key);
                }
            }
        }
        consumed
    }
}

/// Displayed key/value pairs in first-insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusBoard {
    entries: Vec<(String, StatusValue)>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an existing key in place, or append a new one.
    pub fn set(&mut self, key: String, value: StatusValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<StatusValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn get(&self, key: &str) -> Option<&StatusValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StatusValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Renders a status board somewhere.
pub trait StatusSink: Send {
    fn render(&mut self, board: &StatusBoard) -> std::io::Result<()>;
}

/// Redraws the whole board on a terminal.
pub struct TerminalSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl TerminalSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> StatusSink for TerminalSink<W> {
    fn render(&mut self, board: &StatusBoard) -> std::io::Result<()> {
        // Clear screen, cursor home.
        write!(self.out, "\x1b[2J\x1b[H")?;
        for (key, value) in board.iter() {
            match value {
                StatusValue::Balances(balances) => {
                    writeln!(self.out, "{key}:")?;
                    for (code, amount) in balances.iter().filter(|(_, amount)| *amount > 0.0) {
                        writeln!(self.out, "    {code:6} : {amount:.5}")?;
                    }
                }
                StatusValue::Text(text) => writeln!(self.out, "{key}: {text}")?,
            }
        }
        self.out.flush()
    }
}

/// Emits changed entries as tracing events. For headless runs.
#[derive(Default)]
pub struct LogSink {
    last: HashMap<String, String>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusSink for LogSink {
    fn render(&mut self, board: &StatusBoard) -> std::io::Result<()> {
        for (key, value) in board.iter() {
            // Uptime changes every second and would drown everything else.
            if key == keys::UPTIME {
                continue;
            }
            let rendered = value.to_string();
            if self.last.get(key) != Some(&rendered) {
                info!(key = %key, value = %rendered, "status");
                self.last.insert(key.to_string(), rendered);
            }
        }
        self.last.retain(|key, _| board.get(key).is_some());
        Ok(())
    }
}

/// Display consumer loop. Drains the status queues into a board and renders
/// it every `refresh` until `shutdown` flips to `true`.
pub async fn run_display<S: StatusSink>(
    mut receiver: StatusReceiver,
    mut sink: S,
    refresh: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> StatusBoard {
    info!("Status display running");
    let mut board = StatusBoard::new();
    let mut ticker = tokio::time::interval(refresh);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                receiver.drain_into(&mut board);
                if let Err(e) = sink.render(&board) {
                    warn!(error = %e, "Failed to render status");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    receiver.drain_into(&mut board);
    let _ = sink.render(&board);
    info!("Status display stopped");
    board
}
