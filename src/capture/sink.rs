//! Log sinks: local file and streaming log service subprocess.

use regex::Regex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::LazyLock;
use std::thread::JoinHandle;
use std::time::Duration;
use wait_timeout::ChildExt;

/// Destination for log lines
///
/// Sinks never raise: a sink that can no longer accept lines detaches itself
/// and silently drops further writes.
pub trait LogSink: Send {
    /// Write one line (without trailing newline)
    fn write_line(&mut self, line: &str);

    /// Whether the sink still accepts lines
    fn is_attached(&self) -> bool {
        true
    }
}

/// Appends lines to a local log file
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
}

impl FileSink {
    /// Open `path` for appending, creating it and its parent directory if needed
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the file
    pub fn close(&mut self) {
        if let Some(mut file) = self.file.take()
            && let Err(e) = file.flush()
        {
            log::warn!("Failed to flush log file {}: {}", self.path.display(), e);
        }
    }
}

impl LogSink for FileSink {
    fn write_line(&mut self, line: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(file, "{}", line) {
            log::warn!(
                "Cannot write to log file {}, detaching: {}",
                self.path.display(),
                e
            );
            self.file = None;
        }
    }

    fn is_attached(&self) -> bool {
        self.file.is_some()
    }
}

/// What the streaming log service reported after its input was closed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildLogResponse {
    /// Relative path of the stored log, if the service printed one
    pub locator: Option<String>,
    /// Lines the service wrote to stderr
    pub diagnostics: Vec<String>,
}

impl BuildLogResponse {
    /// Parse service output: the first stdout line is the locator when it looks like a log path
    pub fn parse(stdout: &str, stderr: &str) -> Self {
        static LOCATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^\S*/log_[\w.-]+$").expect("log locator regex is valid")
        });

        let locator = stdout
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| LOCATOR_RE.is_match(line))
            .map(str::to_string);
        let diagnostics = stderr
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            locator,
            diagnostics,
        }
    }
}

/// Streams lines to the stdin of a log service child process
///
/// A write failing with a broken pipe permanently disables the sink: further
/// writes are dropped and the pipe end is closed. The sink never reattaches.
pub struct StreamSink {
    command: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_reader: Option<JoinHandle<String>>,
    stderr_reader: Option<JoinHandle<String>>,
}

impl StreamSink {
    /// Spawn the log service
    pub fn spawn(program: &Path, args: &[String]) -> io::Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        Ok(Self {
            command: format!("{} {}", program.display(), args.join(" ")),
            child: Some(child),
            stdin,
            stdout_reader,
            stderr_reader,
        })
    }

    /// Close the input, wait up to `timeout` for the service to exit and collect its answer
    ///
    /// A service still running after the timeout is killed and reported without a locator.
    pub fn finish(mut self, timeout: Duration) -> BuildLogResponse {
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return BuildLogResponse::default();
        };

        let mut timed_out = false;
        match child.wait_timeout(timeout) {
            Ok(Some(status)) => {
                if !status.success() {
                    log::warn!(
                        "Log service '{}' exited with code {}",
                        self.command,
                        status.code().unwrap_or(-1)
                    );
                }
            }
            Ok(None) => {
                timed_out = true;
                log::warn!(
                    "Log service '{}' did not exit within {} seconds, terminating",
                    self.command,
                    timeout.as_secs()
                );
                let _ = child.kill();
                let _ = child.wait();
            }
            Err(e) => {
                log::warn!("Failed to wait for log service '{}': {}", self.command, e);
                let _ = child.kill();
                let _ = child.wait();
            }
        }

        let stdout = join_reader(self.stdout_reader.take());
        let stderr = join_reader(self.stderr_reader.take());
        let mut response = BuildLogResponse::parse(&stdout, &stderr);
        if timed_out {
            response.locator = None;
        }
        response
    }
}

impl LogSink for StreamSink {
    fn write_line(&mut self, line: &str) {
        let Some(stdin) = self.stdin.as_mut() else {
            return;
        };
        let result = writeln!(stdin, "{}", line).and_then(|_| stdin.flush());
        if let Err(e) = result {
            if e.kind() == io::ErrorKind::BrokenPipe {
                log::debug!("Log service '{}' closed its input", self.command);
            } else {
                log::warn!(
                    "Cannot write to log service '{}', detaching: {}",
                    self.command,
                    e
                );
            }
            self.stdin = None;
        }
    }

    fn is_attached(&self) -> bool {
        self.stdin.is_some()
    }
}

impl Drop for StreamSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl std::fmt::Debug for StreamSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSink")
            .field("command", &self.command)
            .field("attached", &self.stdin.is_some())
            .finish()
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: R) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut collected = String::new();
        for line in BufReader::new(pipe).lines() {
            match line {
                Ok(line) => {
                    collected.push_str(&line);
                    collected.push('\n');
                }
                Err(_) => break,
            }
        }
        collected
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> StreamSink {
        StreamSink::spawn(Path::new("sh"), &["-c".to_string(), script.to_string()])
            .expect("spawn sh")
    }

    #[test]
    fn test_parse_locator() {
        let response = BuildLogResponse::parse("2025/01/log_core-qrexec_abc123\n", "");
        assert_eq!(
            response.locator.as_deref(),
            Some("2025/01/log_core-qrexec_abc123")
        );
    }

    #[test]
    fn test_parse_malformed_output() {
        let response = BuildLogResponse::parse("upload failed\n", "permission denied\n\n");
        assert_eq!(response.locator, None);
        assert_eq!(response.diagnostics, vec!["permission denied"]);

        assert_eq!(BuildLogResponse::parse("", "").locator, None);
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("build.log");
        {
            let mut sink = FileSink::open(&path).unwrap();
            sink.write_line("first");
            sink.close();
        }
        let mut sink = FileSink::open(&path).unwrap();
        sink.write_line("second");
        sink.close();
        assert!(!sink.is_attached());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_stream_sink_returns_locator() {
        let mut sink = sh("cat > /dev/null; echo 2025/log_test_1");
        sink.write_line("hello");
        let response = sink.finish(Duration::from_secs(10));
        assert_eq!(response.locator.as_deref(), Some("2025/log_test_1"));
    }

    #[test]
    fn test_broken_pipe_detaches_without_raising() {
        let mut sink = sh("exec 0<&-; echo gone >&2; sleep 1");
        std::thread::sleep(Duration::from_millis(300));
        let big = "x".repeat(64 * 1024);
        for _ in 0..16 {
            sink.write_line(&big);
        }
        assert!(!sink.is_attached());
        sink.write_line("dropped");
        let response = sink.finish(Duration::from_secs(10));
        assert_eq!(response.locator, None);
        assert_eq!(response.diagnostics, vec!["gone"]);
    }
}
