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

//! Outbound framer.
//!
//! Frames are appended at the cached write pointer and published by a single
//! pointer store once header and payload are in place. The firmware frees
//! space by advancing the outbox read pointer, which may take a long time, so
//! a full ring is busy-waited on with the lock held: the lock is what keeps
//! frames from different processors from interleaving.

use log::warn;
use snafu::ensure;
use zerocopy::IntoBytes;

use crate::{
    error::{Error, PayloadTooLargeSnafu, Result},
    frame::{frame_len, FrameHeader, OutboundCommand, HEADER_SIZE},
    platform::Platform,
    registers::DeviceControlRegisters,
    ring::{Ring, RingAdapter, RingPointer, SharedMemory},
    spin::{SpinWait, WaitContext},
    sync::IrqSafeSpinlock,
};

pub struct Outbox {
    /// Local copy of the outbox write pointer; the node is its only writer.
    write: IrqSafeSpinlock<u64>,
    poll_interval_us: u32,
    stall_warning_us: u64,
}

impl Outbox {
    pub fn new(write: u64, poll_interval_us: u32, stall_warning_us: u64) -> Self {
        Self { write: IrqSafeSpinlock::new(write), poll_interval_us, stall_warning_us }
    }

    /// Sends `payload` as a single frame and returns the payload length.
    pub fn send<D, M, P>(
        &self,
        adapter: &RingAdapter<D, M>,
        platform: &P,
        command: OutboundCommand,
        payload: &[u8],
    ) -> Result<usize>
    where
        D: DeviceControlRegisters,
        M: SharedMemory,
        P: Platform,
    {
        self.send_vectored(adapter, platform, command, &[payload])
    }

    /// Sends the concatenation of `parts` as a single frame and returns the
    /// payload length.
    ///
    /// Blocks while the outbox lacks room for the frame. Sending nothing is a
    /// no-op.
    pub fn send_vectored<D, M, P>(
        &self,
        adapter: &RingAdapter<D, M>,
        platform: &P,
        command: OutboundCommand,
        parts: &[&[u8]],
    ) -> Result<usize>
    where
        D: DeviceControlRegisters,
        M: SharedMemory,
        P: Platform,
    {
        let len: usize = parts.iter().map(|part| part.len()).sum();
        if len == 0 {
            return Ok(0);
        }
        let capacity = adapter.capacity(Ring::Outbox);
        let max = command.max_payload(capacity);
        ensure!(len <= max, PayloadTooLargeSnafu { command: command as u16, len, max });

        let frame_len = frame_len(len) as u64;
        let header = FrameHeader::new(command as u16, len as u16, platform.processor_id());
        let interval = self.poll_interval_us;
        let mut wait = SpinWait::new(platform, WaitContext::Atomic, interval, interval);

        let result = {
            let mut write = self.write.lock(platform);
            let result = loop {
                let read = adapter.read_pointer(RingPointer::OutboxRead);
                let used = write.wrapping_sub(read);
                if used > capacity as u64 {
                    break Err(Error::RingPointerCorrupted {
                        ring: Ring::Outbox,
                        write: *write,
                        read,
                        size: capacity as u64,
                    });
                }
                if used + frame_len <= capacity as u64 {
                    break Ok(());
                }
                wait.wait();
            };
            if result.is_ok() {
                let mut pointer = *write;
                adapter.write_bytes(Ring::Outbox, pointer, header.as_bytes());
                pointer = pointer.wrapping_add(HEADER_SIZE as u64);
                for part in parts {
                    adapter.write_bytes(Ring::Outbox, pointer, part);
                    pointer = pointer.wrapping_add(part.len() as u64);
                }
                *write = write.wrapping_add(frame_len);
                adapter.write_pointer(RingPointer::OutboxWrite, *write);
            }
            result
        };

        if wait.waited_us() > self.stall_warning_us {
            warn!("outbox stalled for {} us sending {} frame", wait.waited_us(), command);
        }
        result.map(|()| len)
    }
}
