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

//! Process-wide home of the mailbox.
//!
//! Console, interrupt and device integrations may run before the mailbox
//! hardware has been discovered. They reach the mailbox through a
//! [`MailboxSlot`], which reports [`Error::NotInitialized`] until it has been
//! filled.

use core::{
    cell::UnsafeCell,
    convert::Infallible,
    mem::MaybeUninit,
    sync::atomic::{AtomicBool, Ordering},
};

use spinning_top::Spinlock;

use crate::{
    error::{Error, Result},
    messages::BlockStatus,
    platform::Platform,
    registers::DeviceControlRegisters,
    ring::SharedMemory,
    Mailbox,
};

pub struct MailboxSlot<D, M, P> {
    ready: AtomicBool,
    lock: Spinlock<()>,
    mailbox: UnsafeCell<MaybeUninit<Mailbox<D, M, P>>>,
}

// Safety: the mailbox is written once, under the lock and before `ready` is
// published; afterwards only shared references to it are handed out.
unsafe impl<D, M, P> Sync for MailboxSlot<D, M, P> where Mailbox<D, M, P>: Send + Sync {}

impl<D, M, P> MailboxSlot<D, M, P> {
    pub const fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            lock: Spinlock::new(()),
            mailbox: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Installs `mailbox`. If the slot is already filled, `mailbox` is handed
    /// back unchanged.
    pub fn init(
        &self,
        mailbox: Mailbox<D, M, P>,
    ) -> core::result::Result<&Mailbox<D, M, P>, Mailbox<D, M, P>> {
        if self.ready.load(Ordering::Acquire) {
            return Err(mailbox);
        }
        let _lock = self.lock.lock();
        if self.ready.load(Ordering::Relaxed) {
            return Err(mailbox);
        }
        // Safety: the lock is held and `ready` is unset, so nothing else can
        // access the slot.
        let mailbox = unsafe { &mut *self.mailbox.get() }.write(mailbox);
        self.ready.store(true, Ordering::Release);
        Ok(mailbox)
    }

    pub fn get(&self) -> Result<&Mailbox<D, M, P>> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(Error::NotInitialized);
        }
        // Safety: `ready` is only set once the mailbox has been written, and it
        // is never modified again.
        Ok(unsafe { (*self.mailbox.get()).assume_init_ref() })
    }

    pub fn is_initialized(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

impl<D, M, P> Default for MailboxSlot<D, M, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, M, P> Drop for MailboxSlot<D, M, P> {
    fn drop(&mut self) {
        if *self.ready.get_mut() {
            // Safety: the mailbox was initialized and nothing borrows it anymore.
            unsafe { self.mailbox.get_mut().assume_init_drop() };
        }
    }
}

impl<D, M, P> MailboxSlot<D, M, P>
where
    D: DeviceControlRegisters,
    M: SharedMemory,
    P: Platform,
{
    pub fn poll_inbox(&self, buf: &mut [u8]) -> Result<usize> {
        self.get()?.poll_inbox(buf)
    }

    pub fn put_chars(&self, data: &[u8]) -> Result<usize> {
        self.get()?.put_chars(data)
    }

    pub fn flush_stdout(&self) -> Result<usize> {
        self.get()?.flush_stdout()
    }

    pub fn mask_inbox_irq(&self) -> Result<()> {
        self.get().map(Mailbox::mask_inbox_irq)
    }

    pub fn unmask_inbox_irq(&self) -> Result<()> {
        self.get().map(Mailbox::unmask_inbox_irq)
    }

    pub fn eoi_inbox_irq(&self) -> Result<()> {
        self.get().map(Mailbox::eoi_inbox_irq)
    }

    pub fn handle_inbox_interrupt(&self) -> Result<usize> {
        self.get()?.handle_inbox_interrupt()
    }

    pub fn block_state(&self, status: BlockStatus, block_id: u32) -> Result<usize> {
        self.get()?.block_state(status, block_id)
    }

    pub fn ras_puts(&self, id: u32, text: &[u8]) -> Result<usize> {
        self.get()?.ras_puts(id, text)
    }

    pub fn ras_write(&self, id: u32, details: &[u64]) -> Result<usize> {
        self.get()?.ras_write(id, details)
    }

    /// Halts the node; only returns if there is no mailbox yet.
    pub fn halt(&self) -> Result<Infallible> {
        self.get()?.halt()
    }

    pub fn restart(&self, reason: Option<&str>) -> Result<Infallible> {
        self.get()?.restart(reason)
    }

    pub fn panic(&self, message: &str) -> Result<Infallible> {
        self.get()?.panic(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{mailbox, FakeFirmware, TestPlatform};

    #[test]
    fn test_uninitialized_slot() {
        let slot = MailboxSlot::<&FakeFirmware, &FakeFirmware, &TestPlatform>::new();
        let mut buf = [0u8; 4];
        assert!(!slot.is_initialized());
        assert_eq!(slot.put_chars(b"x"), Err(Error::NotInitialized));
        assert_eq!(slot.poll_inbox(&mut buf), Err(Error::NotInitialized));
        assert_eq!(slot.mask_inbox_irq(), Err(Error::NotInitialized));
        assert!(matches!(slot.halt(), Err(Error::NotInitialized)));
    }

    #[test]
    fn test_init_once() {
        let firmware = FakeFirmware::new(64, 64);
        let platform = TestPlatform::new();
        let slot = MailboxSlot::new();

        assert!(slot.init(mailbox(&firmware, &platform)).is_ok());
        assert!(slot.init(mailbox(&firmware, &platform)).is_err());
        assert!(slot.is_initialized());

        assert_eq!(slot.ras_puts(1, b"ok"), Ok(15));
        assert_eq!(firmware.peer_read_frames().len(), 1);
    }
}
