//
// Copyright 2025 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Single-producer single-consumer circular byte buffer.
//!
//! The stream buffers decouple byte-at-a-time producers and consumers (the
//! console, interrupt-driven stdin delivery) from the framed rings. `head` and
//! `tail` are free-running counters; a byte's slot is its counter masked by
//! `size - 1`. `head` is written only by the producer and only after the byte
//! at the old `head` is stored; `tail` is written only by the consumer and
//! only after the bytes up to the new `tail` were copied out. A buffer of
//! `size` bytes holds at most `size - 1`, so `head - tail` beyond that means
//! the indices are corrupted.
//!
//! The buffer itself does not serialise producers against each other or
//! consumers against each other; callers hold an outer lock for that.

use alloc::{boxed::Box, vec::Vec};
use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicUsize, Ordering},
};

use snafu::ensure;

use crate::error::{BufferTooLargeSnafu, Result};

pub struct StreamBuffer {
    storage: Box<[UnsafeCell<u8>]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// Safety: a slot is written by the producer only while it lies outside the
// pending range, and read by the consumer only while it lies inside it. The
// release/acquire pairs on `head` and `tail` order those accesses.
unsafe impl Sync for StreamBuffer {}
unsafe impl Send for StreamBuffer {}

impl StreamBuffer {
    pub fn new(size: usize) -> Self {
        assert!(size.is_power_of_two() && size >= 2, "stream size must be a power of 2");
        let storage: Vec<UnsafeCell<u8>> = (0..size).map(|_| UnsafeCell::new(0)).collect();
        Self {
            storage: storage.into_boxed_slice(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    fn size(&self) -> usize {
        self.storage.len()
    }

    fn mask(&self) -> usize {
        self.size() - 1
    }

    /// Maximum number of bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.size() - 1
    }

    /// Number of bytes waiting to be consumed.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bytes that can be pushed before the buffer is full.
    pub fn free(&self) -> usize {
        self.capacity().saturating_sub(self.len())
    }

    /// Appends a byte. Returns `false` without storing anything if the buffer
    /// is full.
    pub fn push(&self, byte: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) >= self.capacity() {
            return false;
        }
        // Safety: `head` is outside of the pending range, so the consumer does
        // not read this slot until the store below publishes it.
        unsafe { *self.storage[head & self.mask()].get() = byte };
        // Commit the byte before publishing the new head.
        self.head.store(head.wrapping_add(1), Ordering::Release);
        true
    }

    /// Copies up to `dst.len()` bytes out of the buffer and returns how many
    /// were copied. Never blocks.
    pub fn pop_into(&self, dst: &mut [u8]) -> Result<usize> {
        self.with_pending(|first, second| {
            let from_first = core::cmp::min(first.len(), dst.len());
            dst[..from_first].copy_from_slice(&first[..from_first]);
            let from_second = core::cmp::min(second.len(), dst.len() - from_first);
            dst[from_first..from_first + from_second].copy_from_slice(&second[..from_second]);
            let count = from_first + from_second;
            (count, count)
        })
    }

    /// Gives the consumer a view of the pending bytes as two contiguous runs,
    /// the second one non-empty only if the pending bytes wrap. `consumer`
    /// returns how many bytes from the start of the view it used up, which
    /// are then released to the producer.
    pub fn with_pending<R>(&self, consumer: impl FnOnce(&[u8], &[u8]) -> (usize, R)) -> Result<R> {
        // Read the index before reading the bytes it covers.
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        let pending = head.wrapping_sub(tail);
        ensure!(
            pending <= self.capacity(),
            BufferTooLargeSnafu { pending, capacity: self.capacity() }
        );
        let start = tail & self.mask();
        let first_len = core::cmp::min(pending, self.size() - start);
        // Safety: both runs lie inside the pending range, which the producer
        // does not write until `tail` moves past it.
        let (first, second) =
            unsafe { (self.run(start, first_len), self.run(0, pending - first_len)) };
        let (used, result) = consumer(first, second);
        let used = core::cmp::min(used, pending);
        if used > 0 {
            // Finish reading the bytes before handing their slots back.
            self.tail.store(tail.wrapping_add(used), Ordering::Release);
        }
        Ok(result)
    }

    /// # Safety
    ///
    /// `start..start + len` must be within the pending range.
    unsafe fn run(&self, start: usize, len: usize) -> &[u8] {
        let base = UnsafeCell::raw_get(self.storage.as_ptr().wrapping_add(start));
        unsafe { core::slice::from_raw_parts(base, len) }
    }
}

#[cfg(test)]
impl StreamBuffer {
    pub(crate) fn set_head(&self, head: usize) {
        self.head.store(head, Ordering::Release);
    }
}
