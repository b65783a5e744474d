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

//! Services the mailbox needs from the rest of the platform.

/// Opaque interrupt state returned by [`Platform::disable_interrupts`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InterruptState(pub bool);

/// The platform collaborator: timebase, processor identity, local interrupt
/// masking, delays, and the system actions triggered by the control system.
pub trait Platform: Sync {
    /// Current value of the free-running timebase.
    fn timebase(&self) -> u64;

    /// Hardware thread id of the calling processor.
    fn processor_id(&self) -> u16;

    /// Masks interrupts on the calling processor and returns the previous
    /// state.
    fn disable_interrupts(&self) -> InterruptState;

    /// Restores the interrupt state returned by a matching
    /// [`Platform::disable_interrupts`].
    fn restore_interrupts(&self, state: InterruptState);

    /// Busy-waits for `us` microseconds. Must be safe with interrupts masked.
    fn delay_us(&self, us: u32);

    /// Gives up the processor for about `us` microseconds. Only called from
    /// contexts that may sleep.
    fn sleep_us(&self, us: u32) {
        self.delay_us(us)
    }

    /// Starts an orderly power-off of the node.
    fn power_off(&self) -> Result<(), &'static str>;

    /// Stops the node for good after the termination notice was sent.
    fn stop(&self) -> !;
}

impl<T: Platform + ?Sized> Platform for &T {
    fn timebase(&self) -> u64 {
        (**self).timebase()
    }

    fn processor_id(&self) -> u16 {
        (**self).processor_id()
    }

    fn disable_interrupts(&self) -> InterruptState {
        (**self).disable_interrupts()
    }

    fn restore_interrupts(&self, state: InterruptState) {
        (**self).restore_interrupts(state)
    }

    fn delay_us(&self, us: u32) {
        (**self).delay_us(us)
    }

    fn sleep_us(&self, us: u32) {
        (**self).sleep_us(us)
    }

    fn power_off(&self) -> Result<(), &'static str> {
        (**self).power_off()
    }

    fn stop(&self) -> ! {
        (**self).stop()
    }
}
