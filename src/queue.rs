//! Outbound message queue.
//!
//! A deque of raw lines shared between producers (user code, the DCC
//! manager, the default handler) and the single sender loop. Normal sends
//! append; priority sends prepend. An optional compaction pass removes
//! duplicate lines so a flood of identical messages does not read as spam.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;
use tracing::debug;

use crate::error::ClientError;

#[derive(Debug)]
enum Entry {
    Line(String),
    /// Orderly-shutdown sentinel; the sender loop exits when it takes one.
    Shutdown,
}

/// Thread-safe FIFO of raw outbound lines with priority prepend.
#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    items: Mutex<VecDeque<Entry>>,
    notify: Notify,
}

impl OutboundQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a line.
    ///
    /// # Errors
    ///
    /// Rejects empty lines with [`ClientError::InvalidArgument`].
    pub(crate) fn push(&self, line: String) -> Result<(), ClientError> {
        if line.is_empty() {
            return Err(ClientError::InvalidArgument(
                "cannot send an empty line to the server".into(),
            ));
        }
        self.items.lock().unwrap().push_back(Entry::Line(line));
        self.notify.notify_one();
        Ok(())
    }

    /// Prepend a line so it is sent ahead of everything already queued.
    ///
    /// # Errors
    ///
    /// Rejects empty lines with [`ClientError::InvalidArgument`].
    pub(crate) fn push_front(&self, line: String) -> Result<(), ClientError> {
        if line.is_empty() {
            return Err(ClientError::InvalidArgument(
                "cannot send an empty line to the server".into(),
            ));
        }
        self.items.lock().unwrap().push_front(Entry::Line(line));
        self.notify.notify_one();
        Ok(())
    }

    /// Ask the sender loop to exit once it reaches the sentinel. Prepended
    /// so shutdown is not stuck behind queued chatter.
    pub(crate) fn shutdown(&self) {
        self.items.lock().unwrap().push_front(Entry::Shutdown);
        self.notify.notify_one();
    }

    /// Best-effort count of queued lines.
    pub(crate) fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Entry::Line(_)))
            .count()
    }

    /// Take the next line, waiting if the queue is empty. `None` signals
    /// orderly shutdown.
    pub(crate) async fn take(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            if let Some(entry) = self.items.lock().unwrap().pop_front() {
                match entry {
                    Entry::Line(line) => return Some(line),
                    Entry::Shutdown => return None,
                }
            }
            notified.await;
        }
    }

    /// One deduplication pass: the head-nearest copy of each distinct line
    /// survives, later copies are dropped. Racing enqueues may leave
    /// duplicates behind; the next pass picks them up.
    pub(crate) fn compact(&self) -> usize {
        let mut items = self.items.lock().unwrap();
        if items.len() <= 1 {
            return 0;
        }
        let before = items.len();
        let mut seen = std::collections::HashSet::new();
        items.retain(|entry| match entry {
            Entry::Shutdown => true,
            Entry::Line(line) => seen.insert(line.clone()),
        });
        let removed = before - items.len();
        if removed > 0 {
            debug!(removed, "compacted outbound queue");
        }
        removed
    }
}
