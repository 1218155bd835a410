//! # Child process I/O: pipes in, lines out.
//!
//! Two pieces:
//!
//! - [`LineBuffer`]: a thread-safe byte buffer with a read cursor and lazy
//!   compaction; the producer (pipe reader) appends, the consumer (log pump)
//!   takes whole lines.
//! - [`ChildProcess`]: owns the shell-spawned child, keeps one buffer per
//!   output stream, and exposes stdin writes plus lifecycle signals.

mod buffer;
mod child;

pub use buffer::LineBuffer;
pub use child::{ChildProcess, StreamKind};
