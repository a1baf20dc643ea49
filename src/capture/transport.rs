//! Log capture sessions over a local file or the streaming log service.

use super::sink::{FileSink, LogSink, StreamSink};
use super::tail::TailBuffer;
use log::Level;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a stage log ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLocator {
    /// Local log file
    Local(PathBuf),
    /// Path relative to the build logs repository
    Remote(String),
}

impl LogLocator {
    /// Link used in reports
    pub fn to_url(&self, logs_repo: &str) -> String {
        match self {
            LogLocator::Local(path) => path.display().to_string(),
            LogLocator::Remote(file) => {
                format!("https://github.com/{}/tree/master/{}", logs_repo, file)
            }
        }
    }
}

/// Result of a finished capture session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Stored log location, if one could be resolved
    pub locator: Option<LogLocator>,
    /// Last lines of the log
    pub tail: String,
}

/// Selects the log backend for every stage group of a run
#[derive(Debug, Clone)]
pub enum LogTransport {
    /// Append to a local file
    LocalFile {
        /// Log file path
        path: PathBuf,
        /// Lines kept as tail
        tail_lines: usize,
    },
    /// Stream to the log service subprocess
    Streaming {
        /// Service command and arguments
        command: Vec<String>,
        /// Lines kept as tail
        tail_lines: usize,
        /// How long to wait for the service to answer after input is closed
        finish_timeout: Duration,
    },
}

impl LogTransport {
    /// Local file backend when a path is configured, streaming backend otherwise
    pub fn select(
        local_log_file: Option<PathBuf>,
        command: Vec<String>,
        tail_lines: usize,
        finish_timeout: Duration,
    ) -> Self {
        match local_log_file {
            Some(path) => LogTransport::LocalFile { path, tail_lines },
            None => LogTransport::Streaming {
                command,
                tail_lines,
                finish_timeout,
            },
        }
    }

    /// Start capturing one stage group, writing `header` lines first
    pub fn open(&self, header: &[String]) -> LogSession {
        let mut session = match self {
            LogTransport::LocalFile { path, tail_lines } => {
                let sink = match FileSink::open(path) {
                    Ok(sink) => Some(sink),
                    Err(e) => {
                        log::warn!("Cannot open log file {}: {}", path.display(), e);
                        None
                    }
                };
                LogSession {
                    tail: TailBuffer::new(*tail_lines),
                    backend: Backend::File {
                        path: path.clone(),
                        sink,
                    },
                }
            }
            LogTransport::Streaming {
                command,
                tail_lines,
                finish_timeout,
            } => LogSession {
                tail: TailBuffer::new(*tail_lines),
                backend: Backend::Stream {
                    sink: spawn_service(command),
                    finish_timeout: *finish_timeout,
                },
            },
        };

        let mut log = session.stage_log();
        for line in header {
            log.info(line);
        }
        session
    }
}

fn spawn_service(command: &[String]) -> Option<StreamSink> {
    let (program, args) = command.split_first()?;
    let program = match which::which(program) {
        Ok(path) => path,
        Err(e) => {
            log::warn!("Log service '{}' not available: {}", program, e);
            return None;
        }
    };
    match StreamSink::spawn(&program, args) {
        Ok(sink) => Some(sink),
        Err(e) => {
            log::warn!("Failed to start log service '{}': {}", program.display(), e);
            None
        }
    }
}

#[derive(Debug)]
enum Backend {
    File {
        path: PathBuf,
        sink: Option<FileSink>,
    },
    Stream {
        sink: Option<StreamSink>,
        finish_timeout: Duration,
    },
}

/// Capture of one stage group
///
/// The tail buffer always receives every line, whatever happens to the backend.
#[derive(Debug)]
pub struct LogSession {
    tail: TailBuffer,
    backend: Backend,
}

impl LogSession {
    /// Sink list for the stage group
    pub fn stage_log(&mut self) -> StageLog<'_> {
        let mut sinks: Vec<&mut dyn LogSink> = Vec::with_capacity(2);
        sinks.push(&mut self.tail);
        match &mut self.backend {
            Backend::File { sink: Some(sink), .. } => sinks.push(sink),
            Backend::Stream { sink: Some(sink), .. } => sinks.push(sink),
            _ => {}
        }
        StageLog::with(sinks)
    }

    /// Close the backend and resolve the stored log location and tail
    pub fn finish(self) -> CaptureOutcome {
        let LogSession { mut tail, backend } = self;
        match backend {
            Backend::File { path, sink } => {
                let locator = match sink {
                    Some(mut sink) => {
                        sink.close();
                        Some(LogLocator::Local(path.clone()))
                    }
                    None => None,
                };
                let tail = read_file_tail(&path, tail.capacity()).unwrap_or_else(|| tail.render());
                CaptureOutcome { locator, tail }
            }
            Backend::Stream {
                sink,
                finish_timeout,
            } => {
                let response = match sink {
                    Some(sink) => sink.finish(finish_timeout),
                    None => Default::default(),
                };
                let locator = response.locator.map(LogLocator::Remote);
                if locator.is_none() {
                    log::warn!("Log service did not report a stored log location");
                    for line in response.diagnostics {
                        tail.push(line);
                    }
                }
                CaptureOutcome {
                    locator,
                    tail: tail.render(),
                }
            }
        }
    }
}

fn read_file_tail(path: &Path, lines: usize) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Some(all[start..].join("\n"))
}

/// Explicit list of sinks receiving the lines of one stage group
///
/// Every line is mirrored to the `log` facade. Sinks that detach are dropped
/// from the list and never written again.
pub struct StageLog<'a> {
    sinks: Vec<&'a mut dyn LogSink>,
}

impl<'a> StageLog<'a> {
    /// Create a stage log over the given sinks
    pub fn with(sinks: Vec<&'a mut dyn LogSink>) -> Self {
        Self { sinks }
    }

    /// Emit one line at `level`
    pub fn line(&mut self, level: Level, line: &str) {
        log::log!(target: "build_log", level, "{}", line);
        for sink in self.sinks.iter_mut() {
            sink.write_line(line);
        }
        self.sinks.retain(|sink| sink.is_attached());
    }

    /// Emit an info line
    pub fn info(&mut self, line: &str) {
        self.line(Level::Info, line);
    }

    /// Emit an error line
    pub fn error(&mut self, line: &str) {
        self.line(Level::Error, line);
    }

    /// Number of sinks still attached
    pub fn attached(&self) -> usize {
        self.sinks.len()
    }
}
