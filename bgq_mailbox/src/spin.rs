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

//! Bounded spin-with-backoff used while waiting on the firmware.
//!
//! The control system has been observed to take minutes before it frees
//! ring space or delivers a message, so waiting is unbounded overall; each
//! individual wait is short, and never sleeps unless the caller says it may.

use crate::platform::Platform;

/// Whether the waiting context is allowed to give up the processor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitContext {
    /// Interrupt context, or a lock with interrupts masked is held.
    Atomic,
    /// Ordinary process context.
    MaySleep,
}

pub struct SpinWait<'a, P: Platform> {
    platform: &'a P,
    context: WaitContext,
    interval_us: u32,
    max_interval_us: u32,
    waited_us: u64,
}

impl<'a, P: Platform> SpinWait<'a, P> {
    pub fn new(
        platform: &'a P,
        context: WaitContext,
        interval_us: u32,
        max_interval_us: u32,
    ) -> Self {
        Self {
            platform,
            context,
            interval_us: interval_us.max(1),
            max_interval_us: max_interval_us.max(interval_us),
            waited_us: 0,
        }
    }

    /// Waits one interval.
    ///
    /// Atomic waits always busy-wait for the initial interval. Waits that may
    /// sleep double their interval on every call up to the maximum.
    pub fn wait(&mut self) {
        let interval_us = self.interval_us;
        match self.context {
            WaitContext::Atomic => self.platform.delay_us(interval_us),
            WaitContext::MaySleep => {
                self.platform.sleep_us(interval_us);
                self.interval_us = interval_us.saturating_mul(2).min(self.max_interval_us);
            }
        }
        self.waited_us += u64::from(interval_us);
    }

    /// Total time spent waiting so far, in microseconds.
    pub fn waited_us(&self) -> u64 {
        self.waited_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestPlatform;

    #[test]
    fn test_atomic_wait_never_sleeps() {
        let platform = TestPlatform::new();
        let mut wait = SpinWait::new(&platform, WaitContext::Atomic, 10, 1000);
        for _ in 0..5 {
            wait.wait();
        }
        assert_eq!(platform.delays(), 5);
        assert_eq!(platform.sleeps(), 0);
        assert_eq!(wait.waited_us(), 50);
    }

    #[test]
    fn test_may_sleep_backs_off() {
        let platform = TestPlatform::new();
        let mut wait = SpinWait::new(&platform, WaitContext::MaySleep, 10, 40);
        for _ in 0..4 {
            wait.wait();
        }
        assert_eq!(platform.sleeps(), 4);
        assert_eq!(platform.delays(), 0);
        assert_eq!(platform.slept_us(), 10 + 20 + 40 + 40);
    }
}
