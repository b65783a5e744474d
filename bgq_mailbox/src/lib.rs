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

//! Mailbox protocol engine for the control system firmware of a compute node.
//!
//! The node and the firmware exchange framed messages over two rings in a
//! shared memory window: the outbox (node to firmware) carries console
//! output, RAS events, block state changes and the termination notice; the
//! inbox (firmware to node) carries console input and system requests.

#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod config;
pub mod console;
pub mod devices;
pub mod error;
pub mod frame;
pub mod inbox;
pub mod irq;
pub mod logging;
pub mod messages;
pub mod outbox;
pub mod platform;
pub mod ras;
pub mod registers;
pub mod ring;
pub mod spin;
pub mod stream;
pub mod sync;
pub mod system;

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use log::{error, info};

pub use crate::{
    config::{MailboxConfig, RingGeometry},
    error::{Error, ErrorKind, Result},
    messages::BlockStatus,
    platform::Platform,
    system::MailboxSlot,
};
use crate::{
    console::Console,
    frame::{OutboundCommand, SystemRequest},
    inbox::Inbox,
    outbox::Outbox,
    registers::DeviceControlRegisters,
    ring::{RingAdapter, RingPointer, SharedMemory},
};

/// The mailbox of one node: both rings, the console streams, and the locks
/// serialising their users.
pub struct Mailbox<D, M, P> {
    adapter: RingAdapter<D, M>,
    platform: P,
    config: MailboxConfig,
    outbox: Outbox,
    inbox: Inbox,
    console: Console,
    /// Block id of the last IO link shutdown request.
    io_reset_block_id: AtomicU32,
    /// Set once the node started going down because of a fatal error.
    panicking: AtomicBool,
}

impl<D, M, P> Mailbox<D, M, P>
where
    D: DeviceControlRegisters,
    M: SharedMemory,
    P: Platform,
{
    /// Takes over the mailbox hardware.
    ///
    /// Pending mailbox interrupts are cleared, and the node's ring pointers
    /// are picked up from the registers, as the firmware may already have
    /// exchanged messages with an earlier boot stage.
    pub fn new(config: MailboxConfig, registers: D, memory: M, platform: P) -> Result<Self> {
        config.validate(memory.len())?;
        irq::clear_interrupts(&registers);
        let adapter =
            RingAdapter::new(registers, memory, config.outbox.region(), config.inbox.region());
        let write = adapter.read_pointer(RingPointer::OutboxWrite);
        let read = adapter.read_pointer(RingPointer::InboxRead);
        info!(
            "mailbox outbox {:#x}+{:#x} at {:#x}, inbox {:#x}+{:#x} at {:#x}",
            config.outbox.offset,
            config.outbox.size,
            write,
            config.inbox.offset,
            config.inbox.size,
            read
        );
        Ok(Self {
            outbox: Outbox::new(write, config.poll_interval_us, config.stall_warning_us),
            inbox: Inbox::new(read),
            console: Console::new(config.stdout_buffer_size, config.stdin_buffer_size),
            adapter,
            platform,
            config,
            io_reset_block_id: AtomicU32::new(0),
            panicking: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &MailboxConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Block id carried by the last IO link shutdown request, zero if there
    /// was none.
    pub fn io_reset_block_id(&self) -> u32 {
        self.io_reset_block_id.load(Ordering::Acquire)
    }

    /// Sends `payload` to the firmware as a single frame.
    pub fn send(&self, command: OutboundCommand, payload: &[u8]) -> Result<usize> {
        self.send_vectored(command, &[payload])
    }

    /// Sends the concatenation of `parts` to the firmware as a single frame.
    pub fn send_vectored(&self, command: OutboundCommand, parts: &[&[u8]]) -> Result<usize> {
        self.checked(self.outbox.send_vectored(&self.adapter, &self.platform, command, parts))
    }

    /// Processes everything the firmware has published in the inbox and
    /// returns the number of console input bytes it delivered.
    pub fn drain_inbox(&self) -> Result<usize> {
        let result =
            self.inbox.drain(&self.adapter, &self.platform, &self.console.stdin, |request| {
                self.handle_system_request(request)
            });
        self.checked(result)
    }

    fn handle_system_request(&self, request: SystemRequest) -> Result<()> {
        match request {
            SystemRequest::Shutdown => {
                error!("shutting down system now");
                self.platform.power_off().map_err(|reason| Error::PowerOffFailed { reason })
            }
            SystemRequest::ShutdownIoLink { block_id } => {
                info!("need to shut down block id {block_id:#x}");
                self.io_reset_block_id.store(block_id, Ordering::Release);
                self.block_state(BlockStatus::IoLinkShutdown, block_id).map(drop)
            }
            SystemRequest::Unknown { .. } => Ok(()),
        }
    }

    /// Passes `result` through, unless it carries a fatal error, in which case
    /// the node is taken down.
    fn checked<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Err(error) if error.is_fatal() => self.fatal(&error),
            result => result,
        }
    }
}
