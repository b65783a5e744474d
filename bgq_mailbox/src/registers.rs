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

//! Device control register (DCR) layout of the test-interface unit that hosts
//! the mailbox pointers, the ring geometry and the inbox interrupt state.

use core::ptr::NonNull;

/// The offset of the interrupt state register.
pub const INTERRUPT_STATE: u32 = 0x10;
/// The offset of the high half of the interrupt state control register.
pub const INTERRUPT_STATE_CONTROL_HIGH: u32 = 0x12;
/// The offset of the first mailbox pointer register.
const MAILBOX_REG0: u32 = 0x160;
/// The offset of the first user code register.
const USERCODE0: u32 = 0x200;
/// The stride between consecutive mailbox and user code registers.
const REGISTER_STRIDE: u32 = 0x10;

/// Returns the offset of the `index`th mailbox pointer register.
pub const fn mailbox_reg(index: u32) -> u32 {
    MAILBOX_REG0 + index * REGISTER_STRIDE
}

/// Returns the offset of the `index`th user code register.
///
/// User code registers 0 and 1 describe the outbox and inbox placement in the
/// shared memory window as `size << 32 | offset`.
pub const fn usercode(index: u32) -> u32 {
    USERCODE0 + index * REGISTER_STRIDE
}

/// 64-bit access to the device control registers.
///
/// Reads and writes use the platform's native register byte order. On
/// hardware where register accesses are not ordered against the shared
/// window by ordinary fences, implementations issue the I/O barrier around
/// each access.
pub trait DeviceControlRegisters: Sync {
    fn read64(&self, offset: u32) -> u64;
    fn write64(&self, offset: u32, value: u64);
}

impl<T: DeviceControlRegisters + ?Sized> DeviceControlRegisters for &T {
    fn read64(&self, offset: u32) -> u64 {
        (**self).read64(offset)
    }

    fn write64(&self, offset: u32, value: u64) {
        (**self).write64(offset, value)
    }
}

/// DCR block mapped into the address space.
///
/// Each register offset is scaled by 8 to give its byte address in the
/// mapping. Accesses are plain volatile loads and stores with no I/O barrier.
pub struct MappedRegisters {
    base: NonNull<u64>,
    len: u32,
}

impl MappedRegisters {
    /// Creates a wrapper around a mapped DCR block of `len` registers.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `base` points to a device mapping of at
    /// least `len` 64-bit registers that stays valid for the lifetime of this
    /// value, and that it is mapped uncached.
    pub unsafe fn new(base: NonNull<u64>, len: u32) -> Self {
        Self { base, len }
    }

    fn register(&self, offset: u32) -> *mut u64 {
        assert!(offset < self.len, "DCR offset {offset:#x} outside of the mapped block");
        // Safety: the offset was checked against the mapped length above.
        unsafe { self.base.as_ptr().add(offset as usize) }
    }
}

// Safety: the mapping is device memory; every access is a single volatile
// 64-bit load or store, and the mailbox locks serialise the read-modify-write
// sequences.
unsafe impl Send for MappedRegisters {}
unsafe impl Sync for MappedRegisters {}

impl DeviceControlRegisters for MappedRegisters {
    fn read64(&self, offset: u32) -> u64 {
        // Safety: `register` returns a pointer inside the mapping guaranteed by
        // the contract of `new`.
        unsafe { self.register(offset).read_volatile() }
    }

    fn write64(&self, offset: u32, value: u64) {
        // Safety: `register` returns a pointer inside the mapping guaranteed by
        // the contract of `new`.
        unsafe { self.register(offset).write_volatile(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_offsets() {
        assert_eq!(mailbox_reg(0), 0x160);
        assert_eq!(mailbox_reg(3), 0x190);
        assert_eq!(usercode(0), 0x200);
        assert_eq!(usercode(1), 0x210);
    }

    #[test]
    fn test_mapped_registers() {
        let mut block = [0u64; 0x220];
        let registers = unsafe {
            MappedRegisters::new(NonNull::new(block.as_mut_ptr()).unwrap(), block.len() as u32)
        };
        registers.write64(mailbox_reg(2), 0x1234);
        assert_eq!(registers.read64(mailbox_reg(2)), 0x1234);
        assert_eq!(registers.read64(mailbox_reg(1)), 0);
    }

    #[test]
    #[should_panic]
    fn test_mapped_registers_out_of_range() {
        let mut block = [0u64; 4];
        let registers =
            unsafe { MappedRegisters::new(NonNull::new(block.as_mut_ptr()).unwrap(), 4) };
        registers.read64(INTERRUPT_STATE);
    }
}
