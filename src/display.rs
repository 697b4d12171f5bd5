//! Consumer-side helpers for rendering captured output.

use crate::buffer::OutputBuffer;
use std::collections::VecDeque;

/// 默认的最大显示行数
pub const DEFAULT_MAX_DISPLAY_LINES: usize = 50;

/// Tracks how far a reader has consumed an [`OutputBuffer`].
///
/// The buffer is lossy; a reader that polls too slowly gets the whole
/// retained window and the gap is added to [`OutputCursor::dropped`].
#[derive(Debug, Default, Clone)]
pub struct OutputCursor {
    seen: u64,
    dropped: u64,
}

impl OutputCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written since the previous poll, oldest first.
    pub fn poll(&mut self, buffer: &OutputBuffer) -> Vec<u8> {
        let (total, snapshot) = buffer.snapshot_with_total();
        let fresh = total.saturating_sub(self.seen);
        self.seen = total;

        let available = snapshot.len() as u64;
        if fresh > available {
            self.dropped += fresh - available;
            return snapshot;
        }
        let start = (available - fresh) as usize;
        snapshot[start..].to_vec()
    }

    /// Bytes that were overwritten before this cursor could read them.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// 滚动显示缓冲区 - 只保留最后N行
pub struct ScrollingDisplay {
    lines: VecDeque<String>,
    max_lines: usize,
    pub current_line_buffer: String,
}

impl ScrollingDisplay {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max_lines),
            max_lines,
            current_line_buffer: String::new(),
        }
    }

    /// Feed raw bytes; returns the lines completed by this chunk.
    pub fn process(&mut self, data: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(data);
        let mut completed = Vec::new();

        for ch in text.chars() {
            match ch {
                '\n' => {
                    let line = std::mem::take(&mut self.current_line_buffer);
                    completed.push(line.clone());
                    self.lines.push_back(line);
                    // 严格限制在最大行数内
                    while self.lines.len() > self.max_lines {
                        self.lines.pop_front();
                    }
                }
                // 回车符，清除当前行缓冲
                '\r' => self.current_line_buffer.clear(),
                _ => self.current_line_buffer.push(ch),
            }
        }

        completed
    }

    /// Retained lines, each prefixed, newline terminated.
    pub fn render(&self, prefix: &str) -> String {
        let mut output = String::new();
        for line in &self.lines {
            output.push_str(prefix);
            output.push_str(line);
            output.push('\n');
        }
        output
    }

    /// 刷新未完成的行（用于最终输出）
    pub fn flush_remaining(&mut self) -> Option<String> {
        if self.current_line_buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.current_line_buffer);
        self.lines.push_back(line.clone());
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
        Some(line)
    }

    pub fn validate_line_limit(&self) -> bool {
        self.lines.len() <= self.max_lines
    }

    pub fn current_line_count(&self) -> usize {
        self.lines.len()
    }
}
