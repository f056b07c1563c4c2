use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use crate::error::BufferError;

/// The continuous media buffer a player decodes from. Times are seconds on
/// the buffer's own timeline.
#[async_trait]
pub trait DecodeBuffer: Send {
    /// Whether another append may be issued now.
    fn is_ready(&self) -> bool;

    async fn append(&mut self, bytes: Bytes) -> Result<(), BufferError>;

    fn buffered_range(&self) -> Option<(f64, f64)>;

    fn playback_position(&self) -> f64;

    /// Drops buffered material inside `[start, end)`. Returns how many
    /// appended units went away.
    async fn remove(&mut self, start: f64, end: f64) -> Result<usize, BufferError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BufferedRange {
    start: f64,
    end: f64,
    len: usize,
}

/// Fixed-duration timeline of appended segments. Playback starts at the
/// first append and advances with the wall clock, pausing while it waits at
/// the end of the buffer. Bytes are optionally streamed to a file for an
/// external player.
pub struct TimelineBuffer {
    segment_duration: f64,
    max_ahead: f64,
    ranges: VecDeque<BufferedRange>,
    next_start: f64,
    /// Playback position at the last append and when it was taken.
    anchor: Option<(Instant, f64)>,
    sink: Option<File>,
    bytes_held: usize,
}

impl TimelineBuffer {
    pub fn new(segment_duration: f64, max_ahead: f64) -> Self {
        Self {
            segment_duration,
            max_ahead,
            ranges: VecDeque::new(),
            next_start: 0.0,
            anchor: None,
            sink: None,
            bytes_held: 0,
        }
    }

    pub async fn with_file_sink(mut self, path: &Path) -> Result<Self, BufferError> {
        self.sink = Some(File::create(path).await?);
        Ok(self)
    }

    pub fn bytes_held(&self) -> usize {
        self.bytes_held
    }
}

#[async_trait]
impl DecodeBuffer for TimelineBuffer {
    fn is_ready(&self) -> bool {
        self.next_start - self.playback_position() < self.max_ahead
    }

    async fn append(&mut self, bytes: Bytes) -> Result<(), BufferError> {
        if !self.is_ready() {
            return Err(BufferError::NotReady);
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.write_all(&bytes).await?;
            sink.flush().await?;
        }

        let position = self.playback_position();
        let start = self.next_start;
        self.next_start += self.segment_duration;
        self.ranges.push_back(BufferedRange {
            start,
            end: self.next_start,
            len: bytes.len(),
        });
        self.bytes_held += bytes.len();
        self.anchor = Some((Instant::now(), position));
        Ok(())
    }

    fn buffered_range(&self) -> Option<(f64, f64)> {
        let first = self.ranges.front()?;
        let last = self.ranges.back()?;
        Some((first.start, last.end))
    }

    fn playback_position(&self) -> f64 {
        match self.anchor {
            Some((at, position)) => (position + at.elapsed().as_secs_f64()).min(self.next_start),
            None => 0.0,
        }
    }

    async fn remove(&mut self, start: f64, end: f64) -> Result<usize, BufferError> {
        let before = self.ranges.len();
        let mut freed = 0;
        self.ranges.retain(|r| {
            let inside = r.start >= start && r.end <= end;
            if inside {
                freed += r.len;
            }
            !inside
        });
        self.bytes_held -= freed;
        Ok(before - self.ranges.len())
    }
}
