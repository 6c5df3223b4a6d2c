//! Process-lifetime debug log
//!
//! [`DebugLog`] is created once by the caller and shared by reference.
//! Page lifecycle events go through a bounded channel ([`EventLog`]) that a
//! single task drains into the log, so event callbacks never block a scrape.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

/// Append-only plaintext log, flushed after every line
pub struct DebugLog {
    path: Option<PathBuf>,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl DebugLog {
    /// Opens (or creates) the log file in append mode
    ///
    /// Parent directories are created when missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            writer: Mutex::new(Box::new(file)),
        })
    }

    /// A log that only mirrors to `tracing`
    pub fn discard() -> Self {
        Self {
            path: None,
            writer: Mutex::new(Box::new(io::sink())),
        }
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one line and flushes
    ///
    /// Write failures are reported through `tracing` and otherwise ignored.
    pub fn line(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        debug!(target: "xbuddy::debug_log", "{}", message);

        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(writer, "{}", message).and_then(|_| writer.flush()) {
            warn!(error = %e, "failed to write debug log line");
        }
    }
}

impl fmt::Debug for DebugLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugLog").field("path", &self.path).finish()
    }
}

/// Diagnostic page lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Console(String),
    Request { method: String, url: String },
    Response { status: i64, url: String },
    Popup(String),
    Download { url: String, suggested_filename: String },
}

impl fmt::Display for PageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageEvent::Console(text) => write!(f, "console: {}", text),
            PageEvent::Request { method, url } => write!(f, "request: {} {}", method, url),
            PageEvent::Response { status, url } => write!(f, "response: {} {}", status, url),
            PageEvent::Popup(url) => write!(f, "popup: {}", url),
            PageEvent::Download {
                url,
                suggested_filename,
            } => write!(f, "download: {} as {}", url, suggested_filename),
        }
    }
}

/// Non-blocking handle for emitting page events
///
/// Events are dropped when the queue is full or the drain task is gone.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PageEvent>>,
    dropped: Arc<AtomicUsize>,
}

impl EventSink {
    /// A sink that discards everything
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: PageEvent) {
        if let Some(tx) = &self.tx
            && tx.try_send(event).is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of events lost to a full or closed queue
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Bounded event queue drained into a [`DebugLog`] by one task
pub struct EventLog {
    sink: EventSink,
    task: JoinHandle<usize>,
}

impl EventLog {
    /// Spawns the drain task; must be called inside a tokio runtime
    pub fn spawn(log: Arc<DebugLog>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<PageEvent>(capacity.max(1));
        let task = tokio::spawn(async move {
            let mut written = 0;
            while let Some(event) = rx.recv().await {
                log.line(format!("[event] {}", event));
                written += 1;
            }
            written
        });

        Self {
            sink: EventSink {
                tx: Some(tx),
                dropped: Arc::new(AtomicUsize::new(0)),
            },
            task,
        }
    }

    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Closes the queue and waits until every queued event is written
    ///
    /// Returns the number of events written. Completes once every sink
    /// clone has been dropped.
    pub async fn shutdown(self) -> usize {
        let dropped = self.sink.dropped();
        drop(self.sink);
        let written = self.task.await.unwrap_or(0);
        if dropped > 0 {
            warn!(dropped, "page events dropped by full queue");
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("debug.log");

        let log = DebugLog::open(&path).unwrap();
        log.line("first");
        log.line("second");
        drop(log);

        let log = DebugLog::open(&path).unwrap();
        log.line("third");

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\nthird\n");
        assert_eq!(log.path(), Some(path.as_path()));
    }

    #[test]
    fn test_discard_log() {
        let log = DebugLog::discard();
        log.line("nowhere");
        assert!(log.path().is_none());
    }

    #[test]
    fn test_page_event_display() {
        let event = PageEvent::Request {
            method: "GET".to_string(),
            url: "https://h/x".to_string(),
        };
        assert_eq!(event.to_string(), "request: GET https://h/x");
        assert_eq!(PageEvent::Popup("about:blank".to_string()).to_string(), "popup: about:blank");
    }

    #[test]
    fn test_disabled_sink_counts_nothing() {
        let sink = EventSink::disabled();
        sink.emit(PageEvent::Console("x".to_string()));
        assert_eq!(sink.dropped(), 0);
    }

    #[tokio::test]
    async fn test_event_log_drains_into_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        let log = Arc::new(DebugLog::open(&path).unwrap());

        let events = EventLog::spawn(log.clone(), 16);
        let sink = events.sink();
        sink.emit(PageEvent::Console("hello".to_string()));
        sink.emit(PageEvent::Response {
            status: 200,
            url: "https://h/".to_string(),
        });
        drop(sink);

        let written = events.shutdown().await;
        assert_eq!(written, 2);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "[event] console: hello\n[event] response: 200 https://h/\n");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_event_sink_never_blocks_when_full() {
        let log = Arc::new(DebugLog::discard());
        let events = EventLog::spawn(log, 2);
        let sink = events.sink();

        // The drain task cannot run on this thread until we yield.
        for i in 0..10 {
            sink.emit(PageEvent::Console(i.to_string()));
        }
        assert_eq!(sink.dropped(), 8);
        drop(sink);

        assert_eq!(events.shutdown().await, 2);
    }
}
