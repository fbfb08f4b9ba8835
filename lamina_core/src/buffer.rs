// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Growable primitive-value buffer and the shared buffer pool.
//!
//! [`DataBuffer`] encodes a sequence of primitive values as little-endian
//! bytes and reads them back in the same order, bit-exactly. It is the
//! carrier used by command-stream consumers (for example a canvas replay
//! layer) and by diagnostics.
//!
//! [`BufferPool`] is the one structure in this crate guarded by a real
//! lock: buffers can be acquired and released from any thread, while all
//! other scene-graph state follows the single-writer frame handoff
//! described in the crate docs.
//!
//! Reading past the written data, or reading with a type that does not
//! match what was written at that position, is a caller bug; reads panic
//! on underflow rather than inventing values.

use std::sync::Mutex;

/// How many released buffers the pool retains for reuse.
const MAX_POOLED_BUFFERS: usize = 8;

/// A growable byte buffer with typed sequential encode/decode.
#[derive(Clone, Debug, Default)]
pub struct DataBuffer {
    bytes: Vec<u8>,
    read_pos: usize,
}

impl DataBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with pre-reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Number of encoded bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of bytes not yet consumed by reads.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.read_pos
    }

    /// Clears all contents and resets the read cursor.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.read_pos = 0;
    }

    /// Resets the read cursor to the start without discarding contents.
    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }

    /// A view of the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn take(&mut self, n: usize) -> &[u8] {
        assert!(
            self.read_pos + n <= self.bytes.len(),
            "DataBuffer underflow: need {n} bytes, {} remaining",
            self.remaining()
        );
        let slice = &self.bytes[self.read_pos..self.read_pos + n];
        self.read_pos += n;
        slice
    }

    /// Appends a boolean.
    pub fn put_bool(&mut self, v: bool) {
        self.bytes.push(u8::from(v));
    }

    /// Reads the next boolean.
    pub fn get_bool(&mut self) -> bool {
        self.take(1)[0] != 0
    }

    /// Appends a byte.
    pub fn put_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    /// Reads the next byte.
    pub fn get_u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    /// Appends a 32-bit integer.
    pub fn put_i32(&mut self, v: i32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Reads the next 32-bit integer.
    pub fn get_i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take(4).try_into().expect("take returned 4 bytes"))
    }

    /// Appends a 64-bit integer.
    pub fn put_i64(&mut self, v: i64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Reads the next 64-bit integer.
    pub fn get_i64(&mut self) -> i64 {
        i64::from_le_bytes(self.take(8).try_into().expect("take returned 8 bytes"))
    }

    /// Appends a 32-bit float. NaN payloads survive the round trip.
    pub fn put_f32(&mut self, v: f32) {
        self.bytes.extend_from_slice(&v.to_bits().to_le_bytes());
    }

    /// Reads the next 32-bit float.
    pub fn get_f32(&mut self) -> f32 {
        f32::from_bits(u32::from_le_bytes(self.take(4).try_into().expect("take returned 4 bytes")))
    }

    /// Appends a 64-bit float. NaN payloads survive the round trip.
    pub fn put_f64(&mut self, v: f64) {
        self.bytes.extend_from_slice(&v.to_bits().to_le_bytes());
    }

    /// Reads the next 64-bit float.
    pub fn get_f64(&mut self) -> f64 {
        f64::from_bits(u64::from_le_bytes(self.take(8).try_into().expect("take returned 8 bytes")))
    }
}

/// A thread-safe pool of reusable [`DataBuffer`]s.
///
/// Acquisition can happen from any thread; the pool retains at most
/// [`MAX_POOLED_BUFFERS`] released buffers and drops the rest.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Mutex<Vec<DataBuffer>>,
}

impl BufferPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a cleared buffer from the pool, or allocates a fresh one.
    #[must_use]
    pub fn acquire(&self) -> DataBuffer {
        self.free
            .lock()
            .expect("buffer pool lock poisoned")
            .pop()
            .unwrap_or_default()
    }

    /// Returns a buffer to the pool for reuse. The buffer is cleared;
    /// buffers beyond the retention cap are dropped.
    pub fn release(&self, mut buffer: DataBuffer) {
        buffer.clear();
        let mut free = self.free.lock().expect("buffer pool lock poisoned");
        if free.len() < MAX_POOLED_BUFFERS {
            free.push(buffer);
        }
    }

    /// Number of buffers currently pooled.
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.free.lock().expect("buffer pool lock poisoned").len()
    }
}
