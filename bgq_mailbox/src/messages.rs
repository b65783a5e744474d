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

//! Messages the node sends to the control system, and the ways the node
//! goes down.

use core::{fmt::Write, sync::atomic::Ordering};

use strum::{Display, FromRepr};
use zerocopy::{
    byteorder::big_endian::{U16, U32, U64},
    IntoBytes,
};

use crate::{
    console::LineBuffer,
    error::{Error, Result},
    frame::{
        BlockStatePayload, OutboundCommand, RasAsciiHeader, RasBinaryHeader, TerminatePayload,
        RAS_ASCII_HEADER_SIZE, RAS_BINARY_HEADER_SIZE, RAS_MAX,
    },
    platform::Platform,
    ras::RasId,
    registers::DeviceControlRegisters,
    ring::{Ring, SharedMemory},
    Mailbox,
};

/// Maximum number of detail words in a binary RAS event.
pub const RAS_MAX_DETAILS: usize = RAS_MAX / core::mem::size_of::<u64>();

/// Room for the description of a fatal error.
const FATAL_MESSAGE_SIZE: usize = 256;

/// Block state reported to the control system.
#[derive(Clone, Copy, Debug, Display, Eq, FromRepr, PartialEq)]
#[repr(u16)]
pub enum BlockStatus {
    Initialized = 1,
    Halted = 2,
    IoLinkShutdown = 3,
}

impl<D, M, P> Mailbox<D, M, P>
where
    D: DeviceControlRegisters,
    M: SharedMemory,
    P: Platform,
{
    /// Sends `text` unbuffered on the stdout channel.
    pub fn stdout(&self, text: &[u8]) -> Result<usize> {
        self.send_text(OutboundCommand::Stdout, text)
    }

    /// Sends `text` unbuffered on the stderr channel.
    pub fn stderr(&self, text: &[u8]) -> Result<usize> {
        self.send_text(OutboundCommand::Stderr, text)
    }

    fn send_text(&self, command: OutboundCommand, text: &[u8]) -> Result<usize> {
        let cap = command.max_payload(self.adapter.capacity(Ring::Outbox));
        let mut sent = 0;
        for chunk in text.chunks(cap) {
            sent += self.send(command, chunk)?;
        }
        Ok(sent)
    }

    /// Reports a RAS event with a text message.
    ///
    /// The message ends at the first NUL in `text` and is cut to
    /// `RAS_MAX - 1` bytes, or less if the outbox cannot hold a frame that
    /// large; it is always sent NUL-terminated.
    pub fn ras_puts(&self, id: u32, text: &[u8]) -> Result<usize> {
        let text = match text.iter().position(|&byte| byte == 0) {
            Some(end) => &text[..end],
            None => text,
        };
        let max = OutboundCommand::RasAscii
            .max_payload(self.adapter.capacity(Ring::Outbox))
            .saturating_sub(RAS_ASCII_HEADER_SIZE + 1);
        let text = &text[..core::cmp::min(text.len(), max)];
        let header = RasAsciiHeader { uci: U64::ZERO, id: U32::new(id) };
        self.send_vectored(OutboundCommand::RasAscii, &[header.as_bytes(), text, &[0u8][..]])
    }

    /// Reports a RAS event with up to [`RAS_MAX_DETAILS`] binary detail
    /// words, fewer on an outbox too small for them; any further words are
    /// dropped.
    pub fn ras_write(&self, id: u32, details: &[u64]) -> Result<usize> {
        let max = OutboundCommand::RasBinary
            .max_payload(self.adapter.capacity(Ring::Outbox))
            .saturating_sub(RAS_BINARY_HEADER_SIZE)
            / core::mem::size_of::<u64>();
        let count = core::cmp::min(details.len(), max);
        let mut words = [U64::ZERO; RAS_MAX_DETAILS];
        for (word, detail) in words.iter_mut().zip(details) {
            *word = U64::new(*detail);
        }
        let header = RasBinaryHeader {
            uci: U64::ZERO,
            id: U32::new(id),
            reserved: U16::ZERO,
            num_details: U16::new(count as u16),
        };
        self.send_vectored(
            OutboundCommand::RasBinary,
            &[header.as_bytes(), words[..count].as_bytes()],
        )
    }

    /// Sends the termination notice. Nothing may be sent after it.
    pub fn terminate(&self, status: i32) -> Result<usize> {
        let payload = TerminatePayload {
            timebase: U64::new(self.platform.timebase()),
            status: U32::new(status as u32),
        };
        self.send(OutboundCommand::Terminate, payload.as_bytes())
    }

    pub fn block_state(&self, status: BlockStatus, block_id: u32) -> Result<usize> {
        let payload = BlockStatePayload {
            status: U16::new(status as u16),
            reserved: U16::ZERO,
            block_id: U32::new(block_id),
            timestamp: U64::new(self.platform.timebase()),
        };
        self.send(OutboundCommand::BlockState, payload.as_bytes())
    }

    /// Stops the node after a clean termination notice.
    pub fn halt(&self) -> ! {
        let _ = self.stdout(b"halt");
        let _ = self.terminate(0);
        self.platform.stop()
    }

    /// Stops the node, reporting `reason`, so that it can be restarted.
    pub fn restart(&self, reason: Option<&str>) -> ! {
        let _ = self.stdout(b"restart");
        if let Some(reason) = reason {
            let _ = self.stdout(reason.as_bytes());
        }
        let _ = self.terminate(0);
        self.platform.stop()
    }

    /// Reports `message` on stderr and as a kernel panic RAS event, then
    /// stops the node with a failure status.
    ///
    /// A fatal error hit while already going down stops the node right away.
    pub fn panic(&self, message: &str) -> ! {
        if self.panicking.swap(true, Ordering::AcqRel) {
            self.platform.stop()
        }
        let _ = self.stderr(b"panic");
        let _ = self.stderr(message.as_bytes());
        let _ = self.ras_puts(RasId::KernelPanic as u32, message.as_bytes());
        let _ = self.terminate(-1);
        self.platform.stop()
    }

    pub(crate) fn fatal(&self, error: &Error) -> ! {
        let mut message = LineBuffer::<FATAL_MESSAGE_SIZE>::new();
        let _ = write!(message, "{error}");
        self.panic(message.as_str())
    }
}
