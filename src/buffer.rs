//! Circular output buffer
//!
//! Fixed-capacity byte arena holding the most recent output of one process.
//! The backing pages are mapped twice, back to back, so both the writer's
//! window and the reader's window are always a single contiguous slice: no
//! modulo arithmetic on the hot path and no copy at the wrap boundary.
//!
//! There is exactly one writer ([`OutputWriter`], owned by the drain thread)
//! and any number of readers holding the shared [`OutputBuffer`]. The writer
//! never blocks: when it overruns the reader side the oldest bytes are
//! discarded. Shared readers only ever get owned copies
//! ([`OutputBuffer::snapshot`]); a borrowed contiguous view is available
//! from the writer itself ([`OutputWriter::read_view`]), which cannot commit
//! while that borrow is live, or through the unsafe
//! [`OutputBuffer::read_view`].

use crate::error::BufferError;
use crate::platform::MirroredMapping;
use std::fmt;
use std::ptr;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub struct OutputBuffer {
    mapping: MirroredMapping,
    capacity: usize,
    /// Valid unread bytes, never above `capacity`.
    size: AtomicUsize,
    /// Offset of the oldest valid byte.
    read_cursor: AtomicUsize,
    /// Offset of the next write; only the writer stores to it.
    write_cursor: AtomicUsize,
    total_written: AtomicU64,
    /// Odd while the writer is updating the cursors.
    seq: AtomicU64,
    writer_taken: AtomicBool,
}

impl OutputBuffer {
    /// Map a buffer of `capacity` bytes.
    ///
    /// `capacity` must be a non-zero multiple of [`crate::platform::page_size`].
    /// Any partially created mapping is released before an error is returned.
    pub fn acquire(capacity: usize) -> Result<Arc<Self>, BufferError> {
        let mapping = MirroredMapping::new(capacity)?;
        Ok(Arc::new(Self {
            mapping,
            capacity,
            size: AtomicUsize::new(0),
            read_cursor: AtomicUsize::new(0),
            write_cursor: AtomicUsize::new(0),
            total_written: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            writer_taken: AtomicBool::new(false),
        }))
    }

    /// Hand out the single writer. Returns `None` once it has been taken.
    pub fn writer(self: &Arc<Self>) -> Option<OutputWriter> {
        if self.writer_taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(OutputWriter {
            buffer: Arc::clone(self),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained bytes.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes ever committed, including ones already overwritten.
    pub fn total_written(&self) -> u64 {
        self.total_written.load(Ordering::Acquire)
    }

    /// Contiguous view of the retained bytes, oldest first.
    ///
    /// # Safety
    ///
    /// The writer must not commit while the returned slice is alive: any
    /// write into the buffer may land inside the viewed range. Callers
    /// sharing the buffer with a live drain thread should use
    /// [`Self::snapshot`] instead.
    pub unsafe fn read_view(&self) -> &[u8] {
        let (start, size) = self.window();
        std::slice::from_raw_parts(self.mapping.as_ptr().add(start), size)
    }

    /// Owned copy of the retained bytes, oldest first.
    pub fn snapshot(&self) -> Vec<u8> {
        let (start, size) = self.window();
        let mut out = Vec::with_capacity(size);
        // copied straight from the mapping, no shared slice over bytes the
        // writer may be filling
        unsafe {
            ptr::copy_nonoverlapping(self.mapping.as_ptr().add(start), out.as_mut_ptr(), size);
            out.set_len(size);
        }
        out
    }

    // start < capacity and size <= capacity, so the window ends inside the
    // mirror view
    fn window(&self) -> (usize, usize) {
        let size = self.size.load(Ordering::Acquire);
        let start = self.read_cursor.load(Ordering::Acquire);
        (start, size)
    }

    /// [`Self::total_written`] and [`Self::snapshot`] taken at the same
    /// commit point, so the snapshot ends exactly at byte `total` of the
    /// stream.
    pub fn snapshot_with_total(&self) -> (u64, Vec<u8>) {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let total = self.total_written.load(Ordering::Relaxed);
            let snapshot = self.snapshot();
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return (total, snapshot);
            }
        }
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("capacity", &self.capacity)
            .field("size", &self.size.load(Ordering::Relaxed))
            .field("read_cursor", &self.read_cursor.load(Ordering::Relaxed))
            .field("write_cursor", &self.write_cursor.load(Ordering::Relaxed))
            .finish()
    }
}

/// Exclusive write side of an [`OutputBuffer`].
pub struct OutputWriter {
    buffer: Arc<OutputBuffer>,
}

impl OutputWriter {
    /// Mutable window of exactly `capacity` bytes at the write cursor.
    ///
    /// Fill any prefix of it, then [`Self::advance`] by the amount written.
    pub fn write_view(&mut self) -> &mut [u8] {
        let buf = &self.buffer;
        let start = buf.write_cursor.load(Ordering::Relaxed);
        unsafe { std::slice::from_raw_parts_mut(buf.mapping.as_ptr().add(start), buf.capacity) }
    }

    /// Commit `n` bytes written into [`Self::write_view`].
    ///
    /// On overflow the size saturates at capacity and the read cursor jumps to
    /// the new write cursor, dropping the oldest bytes.
    pub fn advance(&mut self, n: usize) {
        self.commit(n, 0);
    }

    /// Copy `bytes` in and commit them.
    ///
    /// Input longer than the capacity only keeps its trailing `capacity` bytes.
    pub fn write(&mut self, bytes: &[u8]) {
        let capacity = self.buffer.capacity;
        let skipped = bytes.len().saturating_sub(capacity);
        let tail = &bytes[skipped..];
        self.write_view()[..tail.len()].copy_from_slice(tail);
        // the skipped prefix still counts as written
        self.commit(tail.len(), skipped);
    }

    fn commit(&mut self, n: usize, skipped: usize) {
        let buf = &self.buffer;
        debug_assert!(n <= buf.capacity, "advance past write view");
        let n = n.min(buf.capacity);
        if n == 0 && skipped == 0 {
            return;
        }

        let seq = buf.seq.load(Ordering::Relaxed);
        buf.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        let write = (buf.write_cursor.load(Ordering::Relaxed) + n) % buf.capacity;
        buf.write_cursor.store(write, Ordering::Relaxed);

        // compute first so `size` is never observed above capacity
        let new_size = buf.size.load(Ordering::Relaxed) + n;
        if new_size > buf.capacity {
            buf.read_cursor.store(write, Ordering::Release);
            buf.size.store(buf.capacity, Ordering::Release);
        } else {
            buf.size.store(new_size, Ordering::Release);
        }
        buf.total_written.fetch_add((n + skipped) as u64, Ordering::AcqRel);

        buf.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Contiguous view of the retained bytes, oldest first.
    ///
    /// Safe here: committing needs `&mut self`, so nothing writes while the
    /// slice is borrowed.
    pub fn read_view(&self) -> &[u8] {
        unsafe { self.buffer.read_view() }
    }

    /// Shared reader side of this writer's buffer.
    pub fn buffer(&self) -> &Arc<OutputBuffer> {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::page_size;

    fn buffer() -> (Arc<OutputBuffer>, OutputWriter) {
        let buf = OutputBuffer::acquire(page_size()).unwrap();
        let writer = buf.writer().unwrap();
        (buf, writer)
    }

    #[test]
    fn new_buffer_is_empty() {
        let (buf, writer) = buffer();
        assert!(buf.is_empty());
        assert_eq!(writer.read_view(), b"");
        assert!(buf.snapshot().is_empty());
        assert_eq!(buf.total_written(), 0);
    }

    #[test]
    fn writer_is_handed_out_once() {
        let (buf, _writer) = buffer();
        assert!(buf.writer().is_none());
    }

    #[test]
    fn write_view_spans_full_capacity_from_any_cursor() {
        let (buf, mut writer) = buffer();
        writer.write(b"abc");
        assert_eq!(writer.write_view().len(), buf.capacity());
    }

    #[test]
    fn advance_without_overflow_grows_size() {
        let (buf, mut writer) = buffer();
        writer.write_view()[..5].copy_from_slice(b"hello");
        writer.advance(5);
        assert_eq!(buf.len(), 5);
        assert_eq!(writer.read_view(), b"hello");
    }

    #[test]
    fn advance_zero_is_noop() {
        let (buf, mut writer) = buffer();
        writer.advance(0);
        assert!(buf.is_empty());
    }

    #[test]
    fn exact_fill_is_not_an_overflow() {
        let (buf, mut writer) = buffer();
        let cap = buf.capacity();
        let data: Vec<u8> = (0..cap).map(|i| (i % 251) as u8).collect();
        writer.write(&data);
        assert_eq!(buf.len(), cap);
        assert_eq!(writer.read_view(), &data[..]);
    }

    #[test]
    fn oversized_write_keeps_tail() {
        let (buf, mut writer) = buffer();
        let cap = buf.capacity();
        let data: Vec<u8> = (0..cap + 10).map(|i| (i % 253) as u8).collect();
        writer.write(&data);
        assert_eq!(buf.len(), cap);
        assert_eq!(writer.read_view(), &data[10..]);
        assert_eq!(buf.total_written(), (cap + 10) as u64);
    }

    #[test]
    fn snapshot_with_total_matches_stream_position() {
        let (buf, mut writer) = buffer();
        writer.write(b"one ");
        writer.write(b"two");
        let (total, snapshot) = buf.snapshot_with_total();
        assert_eq!(total, 7);
        assert_eq!(snapshot, b"one two");
    }

    #[test]
    fn snapshot_is_detached_from_later_overflow() {
        let (buf, mut writer) = buffer();
        let cap = buf.capacity();
        writer.write(b"keep me");
        let snapshot = buf.snapshot();

        writer.write(&vec![b'x'; cap]);
        assert_eq!(snapshot, b"keep me");
        assert_eq!(buf.snapshot(), vec![b'x'; cap]);
    }
}
