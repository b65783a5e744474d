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

//! Hardware ring adapter.
//!
//! The outbox and inbox are power-of-two byte regions inside the shared
//! memory window. Each ring is described by a pair of free-running 64-bit
//! pointers held in device control registers; the physical position of a
//! pointer inside its region is `pointer & (size - 1)`.
//!
//! The firmware uses pointer visibility as its only "data is ready" signal,
//! so every pointer publication is preceded by a write barrier and every
//! pointer observation is followed by a read barrier.

use core::{
    ops::Range,
    ptr::NonNull,
    sync::atomic::{fence, Ordering},
};

use strum::Display;

use crate::registers::{mailbox_reg, DeviceControlRegisters};

/// Makes all preceding stores to shared memory observable before any
/// following store, in particular the pointer register update.
///
/// This only orders ordinary memory accesses. Where the window or the
/// registers are mapped cache-inhibited, as on the real node, the
/// [`SharedMemory`] and [`DeviceControlRegisters`] implementations must issue
/// the I/O barrier themselves after writing and before reading.
#[inline]
pub fn write_barrier() {
    fence(Ordering::Release);
}

/// Ensures a pointer value is fully consumed before dependent loads from
/// shared memory are issued.
#[inline]
pub fn read_barrier() {
    fence(Ordering::Acquire);
}

/// One of the two mailbox rings.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Ring {
    /// Written by the node, read by the firmware.
    Outbox,
    /// Written by the firmware, read by the node.
    Inbox,
}

/// One of the four mailbox pointer registers.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum RingPointer {
    OutboxWrite,
    OutboxRead,
    InboxWrite,
    InboxRead,
}

impl RingPointer {
    /// The DCR offset backing this pointer.
    pub const fn register(self) -> u32 {
        match self {
            RingPointer::OutboxWrite => mailbox_reg(0),
            RingPointer::OutboxRead => mailbox_reg(1),
            RingPointer::InboxWrite => mailbox_reg(2),
            RingPointer::InboxRead => mailbox_reg(3),
        }
    }
}

/// Placement of a ring inside the shared memory window.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RingRegion {
    /// Byte offset of the region inside the window.
    pub base: usize,
    /// Size of the region; always a power of two.
    pub size: usize,
}

impl RingRegion {
    pub fn new(base: usize, size: usize) -> Self {
        assert!(size.is_power_of_two(), "ring size must be a power of 2");
        Self { base, size }
    }

    /// Physical offset of a logical pointer, relative to the region start.
    pub fn mask(&self, pointer: u64) -> usize {
        (pointer & (self.size as u64 - 1)) as usize
    }

    /// Splits an access of `len` bytes starting at `pointer` into at most two
    /// window ranges, the second one only present if the access wraps past the
    /// end of the region.
    pub fn split(&self, pointer: u64, len: usize) -> (Range<usize>, Option<Range<usize>>) {
        assert!(len <= self.size, "access of {len} bytes exceeds a ring of {}", self.size);
        let start = self.mask(pointer);
        let first = core::cmp::min(len, self.size - start);
        let head = self.base + start..self.base + start + first;
        if first == len {
            (head, None)
        } else {
            (head, Some(self.base..self.base + (len - first)))
        }
    }

    /// Window range covered by the region.
    pub fn range(&self) -> Range<usize> {
        self.base..self.base + self.size
    }
}

/// Byte access to the shared memory window.
///
/// Implementations over a cache-inhibited mapping complete each `write` with
/// an I/O write barrier, so the bytes reach the device before the pointer
/// register store that publishes them.
pub trait SharedMemory: Sync {
    /// Length of the window in bytes.
    fn len(&self) -> usize;
    fn read(&self, offset: usize, dst: &mut [u8]);
    fn write(&self, offset: usize, src: &[u8]);
}

impl<T: SharedMemory + ?Sized> SharedMemory for &T {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn read(&self, offset: usize, dst: &mut [u8]) {
        (**self).read(offset, dst)
    }

    fn write(&self, offset: usize, src: &[u8]) {
        (**self).write(offset, src)
    }
}

/// Shared memory window mapped into the address space.
pub struct MmioWindow {
    base: NonNull<u8>,
    len: usize,
}

impl MmioWindow {
    /// Wraps a mapped window of `len` bytes.
    ///
    /// # Safety
    ///
    /// `base` must point to a device mapping of at least `len` bytes that stays
    /// valid for the lifetime of this value and is not accessed through any
    /// other path while the mailbox is live.
    pub unsafe fn new(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len }
    }

    fn check(&self, offset: usize, len: usize) {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "window access {offset:#x}+{len} out of bounds"
        );
    }
}

// Safety: every access is a bounds-checked volatile copy, and the mailbox
// locks ensure each ring region has a single writer on the node side.
unsafe impl Send for MmioWindow {}
unsafe impl Sync for MmioWindow {}

impl SharedMemory for MmioWindow {
    fn len(&self) -> usize {
        self.len
    }

    fn read(&self, offset: usize, dst: &mut [u8]) {
        self.check(offset, dst.len());
        for (i, byte) in dst.iter_mut().enumerate() {
            // Safety: the range was checked against the mapping above.
            *byte = unsafe { self.base.as_ptr().add(offset + i).read_volatile() };
        }
    }

    fn write(&self, offset: usize, src: &[u8]) {
        self.check(offset, src.len());
        for (i, byte) in src.iter().enumerate() {
            // Safety: the range was checked against the mapping above.
            unsafe { self.base.as_ptr().add(offset + i).write_volatile(*byte) };
        }
    }
}

/// Register and memory access for both rings.
pub struct RingAdapter<D, M> {
    registers: D,
    memory: M,
    outbox: RingRegion,
    inbox: RingRegion,
}

impl<D: DeviceControlRegisters, M: SharedMemory> RingAdapter<D, M> {
    pub fn new(registers: D, memory: M, outbox: RingRegion, inbox: RingRegion) -> Self {
        assert!(outbox.range().end <= memory.len(), "outbox lies outside the shared window");
        assert!(inbox.range().end <= memory.len(), "inbox lies outside the shared window");
        Self { registers, memory, outbox, inbox }
    }

    pub fn region(&self, ring: Ring) -> &RingRegion {
        match ring {
            Ring::Outbox => &self.outbox,
            Ring::Inbox => &self.inbox,
        }
    }

    pub fn capacity(&self, ring: Ring) -> usize {
        self.region(ring).size
    }

    pub fn registers(&self) -> &D {
        &self.registers
    }

    /// Reads one of the pointer registers.
    ///
    /// No shared memory load that depends on the returned value can be
    /// satisfied before the register read.
    pub fn read_pointer(&self, which: RingPointer) -> u64 {
        let value = self.registers.read64(which.register());
        read_barrier();
        value
    }

    /// Publishes one of the pointer registers.
    ///
    /// All earlier stores to the shared window are observable before the peer
    /// can see the new value.
    pub fn write_pointer(&self, which: RingPointer, value: u64) {
        write_barrier();
        self.registers.write64(which.register(), value);
    }

    /// Copies `dst.len()` bytes out of a ring starting at a logical pointer.
    pub fn read_bytes(&self, ring: Ring, pointer: u64, dst: &mut [u8]) {
        let (head, tail) = self.region(ring).split(pointer, dst.len());
        let (first, second) = dst.split_at_mut(head.len());
        self.memory.read(head.start, first);
        if let Some(tail) = tail {
            self.memory.read(tail.start, second);
        }
    }

    /// Copies `src` into a ring starting at a logical pointer.
    pub fn write_bytes(&self, ring: Ring, pointer: u64, src: &[u8]) {
        let (head, tail) = self.region(ring).split(pointer, src.len());
        let (first, second) = src.split_at(head.len());
        self.memory.write(head.start, first);
        if let Some(tail) = tail {
            self.memory.write(tail.start, second);
        }
    }

    /// Iterates over `len` bytes of a ring starting at a logical pointer,
    /// reading each byte on demand.
    pub fn bytes(&self, ring: Ring, pointer: u64, len: usize) -> RingBytes<'_, D, M> {
        RingBytes { adapter: self, ring, pointer, remaining: len }
    }
}

/// Byte-at-a-time reader over a ring, following the wrap boundary.
pub struct RingBytes<'a, D, M> {
    adapter: &'a RingAdapter<D, M>,
    ring: Ring,
    pointer: u64,
    remaining: usize,
}

impl<D: DeviceControlRegisters, M: SharedMemory> Iterator for RingBytes<'_, D, M> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }
        let mut byte = [0u8; 1];
        self.adapter.read_bytes(self.ring, self.pointer, &mut byte);
        self.pointer = self.pointer.wrapping_add(1);
        self.remaining -= 1;
        Some(byte[0])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<D: DeviceControlRegisters, M: SharedMemory> ExactSizeIterator for RingBytes<'_, D, M> {}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::test::FakeFirmware;

    #[test]
    fn test_split_without_wrap() {
        let region = RingRegion::new(0x100, 64);
        assert_eq!(region.split(16, 32), (0x110..0x130, None));
        // The pointer is free-running, only the low bits select the position.
        assert_eq!(region.split(64 * 1000 + 16, 32), (0x110..0x130, None));
    }

    #[test]
    fn test_split_with_wrap() {
        let region = RingRegion::new(0x100, 64);
        assert_eq!(region.split(48, 32), (0x130..0x140, Some(0x100..0x110)));
    }

    #[test]
    fn test_split_exactly_to_end() {
        let region = RingRegion::new(0, 64);
        assert_eq!(region.split(32, 32), (32..64, None));
    }

    #[test]
    #[should_panic]
    fn test_split_longer_than_ring() {
        RingRegion::new(0, 64).split(0, 65);
    }

    #[test]
    #[should_panic]
    fn test_invalid_ring_size() {
        RingRegion::new(0, 48);
    }

    #[test]
    fn test_wrapping_write_and_read() {
        let firmware = FakeFirmware::new(64, 64);
        let adapter = firmware.adapter();
        let data: alloc::vec::Vec<u8> = (0..40).collect();

        adapter.write_bytes(Ring::Outbox, 40, &data);

        let mut result = vec![0u8; 40];
        adapter.read_bytes(Ring::Outbox, 40 + 64 * 3, &mut result);
        assert_eq!(result, data);
        // The wrapped tail landed at the start of the region.
        assert_eq!(firmware.outbox_bytes()[..16], data[24..]);
        assert_eq!(adapter.bytes(Ring::Outbox, 40, 40).collect::<alloc::vec::Vec<_>>(), data);
    }

    #[test]
    fn test_pointers_use_mailbox_registers() {
        let firmware = FakeFirmware::new(64, 64);
        let adapter = firmware.adapter();

        adapter.write_pointer(RingPointer::InboxRead, 0x30);
        assert_eq!(firmware.register(mailbox_reg(3)), 0x30);

        firmware.set_register(mailbox_reg(1), 0x20);
        assert_eq!(adapter.read_pointer(RingPointer::OutboxRead), 0x20);
    }

    #[test]
    fn test_mmio_window() {
        let mut backing = [0u8; 32];
        let window = unsafe { MmioWindow::new(NonNull::new(backing.as_mut_ptr()).unwrap(), 32) };
        window.write(30, &[1, 2]);
        let mut result = [0u8; 2];
        window.read(30, &mut result);
        assert_eq!(result, [1, 2]);
    }

    #[test]
    #[should_panic]
    fn test_mmio_window_out_of_bounds() {
        let mut backing = [0u8; 32];
        let window = unsafe { MmioWindow::new(NonNull::new(backing.as_mut_ptr()).unwrap(), 32) };
        window.write(31, &[1, 2]);
    }
}
