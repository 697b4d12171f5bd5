#![cfg(unix)]

use app_warden::platform::page_size;
use app_warden::{BufferError, OutputBuffer, OutputCursor};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add((i % 251) as u8)).collect()
}

#[test]
fn sequential_writes_within_capacity_are_kept_in_order() {
    let cap = page_size();
    let buffer = OutputBuffer::acquire(cap).unwrap();
    let mut writer = buffer.writer().unwrap();

    let mut expected = Vec::new();
    for (i, chunk) in [100usize, 1, 57, 300].into_iter().enumerate() {
        let bytes = pattern(chunk, i as u8);
        writer.write(&bytes);
        expected.extend_from_slice(&bytes);
    }

    assert_eq!(writer.read_view(), expected.as_slice());
    assert_eq!(buffer.len(), expected.len());
    assert_eq!(buffer.total_written(), expected.len() as u64);
}

#[test]
fn overflow_retains_exactly_the_newest_capacity_bytes() {
    let cap = page_size();
    let buffer = OutputBuffer::acquire(cap).unwrap();
    let mut writer = buffer.writer().unwrap();

    let mut all = Vec::new();
    // uneven chunk sizes so the cursor lands everywhere
    for (i, chunk) in [cap / 3, cap / 2, 17, cap - 5, cap / 7, 999]
        .into_iter()
        .enumerate()
    {
        let bytes = pattern(chunk, (i * 31) as u8);
        writer.write(&bytes);
        all.extend_from_slice(&bytes);
    }

    assert_eq!(buffer.len(), cap);
    assert_eq!(buffer.total_written(), all.len() as u64);
    assert_eq!(writer.read_view(), &all[all.len() - cap..]);
}

#[test]
fn data_straddling_the_end_reads_back_contiguously() {
    let cap = page_size();
    let buffer = OutputBuffer::acquire(cap).unwrap();
    let mut writer = buffer.writer().unwrap();

    let head = pattern(cap - 4, 1);
    writer.write(&head);
    writer.write(b"ABCDEFGH");

    let mut all = head;
    all.extend_from_slice(b"ABCDEFGH");
    let view = writer.read_view();
    assert_eq!(view.len(), cap);
    assert_eq!(view, &all[all.len() - cap..]);
    assert_eq!(buffer.snapshot(), &all[all.len() - cap..]);
}

#[test]
fn oversized_single_write_keeps_its_tail() {
    let cap = page_size();
    let buffer = OutputBuffer::acquire(cap).unwrap();
    let mut writer = buffer.writer().unwrap();

    let bytes = pattern(cap * 2 + 10, 7);
    writer.write(&bytes);

    assert_eq!(writer.read_view(), &bytes[bytes.len() - cap..]);
    assert_eq!(buffer.total_written(), bytes.len() as u64);
}

#[test]
fn invalid_capacities_are_rejected() {
    assert!(matches!(
        OutputBuffer::acquire(0),
        Err(BufferError::ZeroCapacity)
    ));
    assert!(matches!(
        OutputBuffer::acquire(page_size() + 1),
        Err(BufferError::UnalignedCapacity { .. })
    ));
}

#[test]
fn writer_is_handed_out_once() {
    let buffer = OutputBuffer::acquire(page_size()).unwrap();
    let first = buffer.writer();
    assert!(first.is_some());
    assert!(buffer.writer().is_none());
}

#[test]
fn concurrent_reader_sees_a_consistent_stream() {
    let cap = page_size() * 4;
    let buffer = OutputBuffer::acquire(cap).unwrap();
    let mut writer = buffer.writer().unwrap();

    // writer never overruns: the reader only checks ordering, not loss
    let lines = 500usize;
    let reader_buffer = Arc::clone(&buffer);
    let reader = thread::spawn(move || {
        let mut cursor = OutputCursor::new();
        let mut seen = Vec::new();
        while seen.iter().filter(|&&b| b == b'\n').count() < lines {
            seen.extend(cursor.poll(&reader_buffer));
            thread::yield_now();
        }
        (seen, cursor.dropped())
    });

    let mut expected = Vec::new();
    for i in 0..lines {
        let line = format!("{i:04}\n");
        writer.write(line.as_bytes());
        expected.extend_from_slice(line.as_bytes());
    }

    let (seen, dropped) = reader.join().unwrap();
    assert_eq!(dropped, 0);
    assert_eq!(String::from_utf8(seen).unwrap(), String::from_utf8(expected).unwrap());
}
