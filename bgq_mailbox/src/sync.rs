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

//! Interrupt-safe spinlock.
//!
//! Both the outbox framer and the inbox dispatcher run from interrupt
//! handlers as well as from ordinary calls, so their locks must mask local
//! interrupts for as long as they are held. Otherwise an interrupt taken while
//! the lock is held on the same processor would spin forever.

use core::{
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
};

use spinning_top::{guard::SpinlockGuard, Spinlock};

use crate::platform::{InterruptState, Platform};

pub struct IrqSafeSpinlock<T> {
    inner: Spinlock<T>,
}

impl<T> IrqSafeSpinlock<T> {
    pub const fn new(value: T) -> Self {
        Self { inner: Spinlock::new(value) }
    }

    /// Masks local interrupts, then acquires the lock.
    pub fn lock<'a, P: Platform>(&'a self, platform: &'a P) -> IrqSafeGuard<'a, T, P> {
        let state = platform.disable_interrupts();
        let guard = ManuallyDrop::new(self.inner.lock());
        IrqSafeGuard { guard, platform, state }
    }

    /// Whether some context currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

pub struct IrqSafeGuard<'a, T, P: Platform> {
    guard: ManuallyDrop<SpinlockGuard<'a, T>>,
    platform: &'a P,
    state: InterruptState,
}

impl<T, P: Platform> Deref for IrqSafeGuard<'_, T, P> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, P: Platform> DerefMut for IrqSafeGuard<'_, T, P> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T, P: Platform> Drop for IrqSafeGuard<'_, T, P> {
    fn drop(&mut self) {
        // The lock is released before interrupts come back on.
        // Safety: `guard` is never used again after this point.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        self.platform.restore_interrupts(self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestPlatform;

    #[test]
    fn test_lock_masks_interrupts() {
        let platform = TestPlatform::new();
        let lock = IrqSafeSpinlock::new(5u32);
        {
            let mut guard = lock.lock(&platform);
            assert!(!platform.interrupts_enabled());
            assert!(lock.is_locked());
            *guard += 1;
        }
        assert!(platform.interrupts_enabled());
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(&platform), 6);
    }

    #[test]
    fn test_nested_locks_restore_outer_state() {
        let platform = TestPlatform::new();
        let outer = IrqSafeSpinlock::new(());
        let inner = IrqSafeSpinlock::new(());
        let outer_guard = outer.lock(&platform);
        {
            let _inner_guard = inner.lock(&platform);
            assert!(!platform.interrupts_enabled());
        }
        // Still masked: the outer lock is held.
        assert!(!platform.interrupts_enabled());
        drop(outer_guard);
        assert!(platform.interrupts_enabled());
    }
}
