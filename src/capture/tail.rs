//! Bounded buffer of the most recent log lines.

use super::LogSink;
use std::collections::VecDeque;

/// Number of lines kept for failure reports
pub const DEFAULT_TAIL_LINES: usize = 30;

/// Fixed-capacity FIFO of formatted log lines
///
/// Once full, every push evicts the oldest line, so after `capacity + k`
/// pushes the buffer holds exactly the last `capacity` lines in order.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl TailBuffer {
    /// Create an empty buffer holding at most `capacity` lines (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting the oldest one when full
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// Lines currently held, oldest first
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Number of lines held
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether no line was pushed yet
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Maximum number of lines
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lines joined with newlines
    pub fn render(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }
}

impl Default for TailBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_LINES)
    }
}

impl LogSink for TailBuffer {
    fn write_line(&mut self, line: &str) {
        self.push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_exceeds_capacity() {
        let mut tail = TailBuffer::new(3);
        for i in 0..10 {
            tail.push(format!("line {i}"));
            assert!(tail.len() <= 3);
        }
        assert_eq!(
            tail.lines().collect::<Vec<_>>(),
            vec!["line 7", "line 8", "line 9"]
        );
    }

    #[test]
    fn test_under_capacity_keeps_everything() {
        let mut tail = TailBuffer::default();
        tail.push("a");
        tail.push("b");
        assert_eq!(tail.capacity(), DEFAULT_TAIL_LINES);
        assert_eq!(tail.render(), "a\nb");
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut tail = TailBuffer::new(0);
        tail.push("x");
        tail.push("y");
        assert_eq!(tail.render(), "y");
    }
}
