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

//! Inbox interrupt control.
//!
//! The firmware raises the inbox interrupt whenever it publishes a frame. The
//! interrupt controller integration masks, unmasks and acknowledges it
//! through these calls and runs [`Mailbox::handle_inbox_interrupt`] as the
//! handler.

use bitflags::bitflags;

use crate::{
    error::Result,
    platform::Platform,
    registers::{DeviceControlRegisters, INTERRUPT_STATE, INTERRUPT_STATE_CONTROL_HIGH},
    ring::SharedMemory,
    Mailbox,
};

/// Value that clears every mailbox interrupt when written to the interrupt
/// state register.
pub const MAILBOX_INTERRUPTS: u64 = 0xffff_ffff_0000_0000;

bitflags! {
    /// Bits of the high interrupt state control register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct InterruptControl: u64 {
        /// Delivery of the inbox interrupt is enabled.
        const INBOX = 1 << 0;
    }
}

pub(crate) fn clear_interrupts<D: DeviceControlRegisters>(registers: &D) {
    registers.write64(INTERRUPT_STATE, MAILBOX_INTERRUPTS);
}

fn update_control<D: DeviceControlRegisters>(
    registers: &D,
    f: impl FnOnce(&mut InterruptControl),
) {
    let mut control =
        InterruptControl::from_bits_retain(registers.read64(INTERRUPT_STATE_CONTROL_HIGH));
    f(&mut control);
    registers.write64(INTERRUPT_STATE_CONTROL_HIGH, control.bits());
}

impl<D, M, P> Mailbox<D, M, P>
where
    D: DeviceControlRegisters,
    M: SharedMemory,
    P: Platform,
{
    pub fn mask_inbox_irq(&self) {
        update_control(self.adapter.registers(), |control| control.remove(InterruptControl::INBOX));
    }

    pub fn unmask_inbox_irq(&self) {
        update_control(self.adapter.registers(), |control| control.insert(InterruptControl::INBOX));
    }

    /// Acknowledges the pending interrupts by writing back their state.
    pub fn eoi_inbox_irq(&self) {
        let registers = self.adapter.registers();
        let state = registers.read64(INTERRUPT_STATE);
        registers.write64(INTERRUPT_STATE, state);
    }

    /// Inbox interrupt handler: acknowledges the interrupt, then processes
    /// the inbox.
    pub fn handle_inbox_interrupt(&self) -> Result<usize> {
        self.eoi_inbox_irq();
        self.drain_inbox()
    }
}
