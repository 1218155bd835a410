//! # Thread-safe line buffer with lazy compaction.
//!
//! The producer is a pipe draining into a tight reader loop; the consumer is
//! a line-oriented classifier that lags behind. Deleting from the head on
//! every line read would copy the unread tail each time, and a deque of bytes
//! gives up contiguous search. Instead the buffer keeps one contiguous string
//! plus a read cursor: reads advance the cursor, and only once the consumed
//! prefix crosses a threshold is it actually dropped and the cursor rewound.
//! Appends never compact; compaction on the append path would block the
//! producer.
//!
//! ```text
//!   append ──►  [ consumed … | cursor | …unread… ]  ──► read_line
//!                   └─ dropped when cursor ≥ threshold ─┘
//! ```

use std::sync::Mutex;

/// Append-and-read-by-line buffer shared between the pipe reader and the
/// log pump. All operations are atomic with respect to each other.
pub struct LineBuffer {
    inner: Mutex<Inner>,
    compact_threshold: usize,
}

struct Inner {
    buf: String,
    cursor: usize,
}

impl LineBuffer {
    /// Consumed-prefix size at which the buffer is compacted.
    pub const DEFAULT_COMPACT_THRESHOLD: usize = 4096;

    /// Creates an empty buffer with the default compaction threshold.
    pub fn new() -> Self {
        Self::with_threshold(Self::DEFAULT_COMPACT_THRESHOLD)
    }

    /// Creates an empty buffer that compacts once the consumed prefix
    /// reaches `threshold` bytes.
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: String::new(),
                cursor: 0,
            }),
            compact_threshold: threshold,
        }
    }

    /// Appends data at the tail. Never compacts.
    pub fn append(&self, data: &str) {
        if data.is_empty() {
            return;
        }
        let mut inner = self.lock();
        inner.buf.push_str(data);
    }

    /// Returns the next complete line including its `'\n'`, or `None` when no
    /// complete line is buffered.
    ///
    /// After a successful read the cursor sits one byte past the newline; if
    /// the consumed prefix now reaches the threshold it is dropped and the
    /// cursor rewound, preserving the unread suffix exactly.
    pub fn read_line(&self) -> Option<String> {
        let mut inner = self.lock();
        if inner.cursor >= inner.buf.len() {
            return None;
        }
        let newline = inner.buf[inner.cursor..].find('\n')?;
        let end = inner.cursor + newline + 1;
        let line = inner.buf[inner.cursor..end].to_string();
        inner.cursor = end;

        if inner.cursor >= self.compact_threshold {
            let cursor = inner.cursor;
            inner.buf.drain(..cursor);
            inner.cursor = 0;
        }
        Some(line)
    }

    /// Returns everything unread and resets the buffer to empty.
    pub fn read_all(&self) -> Option<String> {
        let mut inner = self.lock();
        if inner.cursor >= inner.buf.len() {
            return None;
        }
        let rest = inner.buf[inner.cursor..].to_string();
        inner.buf.clear();
        inner.cursor = 0;
        Some(rest)
    }

    /// Drops all content, read or not.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.buf.clear();
        inner.cursor = 0;
    }

    /// True when no unread data is buffered.
    pub fn is_empty(&self) -> bool {
        let inner = self.lock();
        inner.cursor >= inner.buf.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
