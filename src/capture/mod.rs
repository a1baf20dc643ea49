//! Build log capture.
//!
//! Stage output goes to exactly one backend per run, a local file or the
//! streaming log service, and always to a bounded [`TailBuffer`] used for
//! failure reports.

mod sink;
mod tail;
mod transport;

pub use sink::{BuildLogResponse, FileSink, LogSink, StreamSink};
pub use tail::{DEFAULT_TAIL_LINES, TailBuffer};
pub use transport::{CaptureOutcome, LogLocator, LogSession, LogTransport, StageLog};
