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

//! Inbound dispatcher.
//!
//! Drains every frame the firmware has published in the inbox, in order.
//! Console input is moved into the stdin stream byte by byte; system requests
//! are handed to the caller. The read pointer is published after every
//! frame, so the firmware can reuse the space while the rest is processed.

use log::{debug, warn};
use zerocopy::IntoBytes;

use crate::{
    error::{Error, Result},
    frame::{FrameHeader, InboundFrame, SystemRequest, HEADER_SIZE, STDIN_COUNT_SIZE},
    platform::Platform,
    registers::DeviceControlRegisters,
    ring::{Ring, RingAdapter, RingPointer, SharedMemory},
    stream::StreamBuffer,
    sync::IrqSafeSpinlock,
};

/// Number of payload bytes needed to decode any inbound frame.
const DECODE_PREFIX_SIZE: usize = 8;

pub struct Inbox {
    /// Local copy of the inbox read pointer; the node is its only writer.
    read: IrqSafeSpinlock<u64>,
}

impl Inbox {
    pub fn new(read: u64) -> Self {
        Self { read: IrqSafeSpinlock::new(read) }
    }

    /// Processes all published frames and returns the number of bytes added to
    /// `stdin`.
    ///
    /// A frame is consumed even if handling it fails; draining then stops and
    /// the error is returned. Frames that claim more bytes than were published
    /// are skipped together with everything up to the write pointer.
    ///
    /// Draining also stops at a STDIN frame that does not fit into `stdin`
    /// yet. It is left in the inbox and delivered by a later drain. Only a
    /// frame larger than the whole stream is cut short, with
    /// [`Error::StdinOverrun`].
    pub fn drain<D, M, P, F>(
        &self,
        adapter: &RingAdapter<D, M>,
        platform: &P,
        stdin: &StreamBuffer,
        mut on_request: F,
    ) -> Result<usize>
    where
        D: DeviceControlRegisters,
        M: SharedMemory,
        P: Platform,
        F: FnMut(SystemRequest) -> Result<()>,
    {
        let size = adapter.capacity(Ring::Inbox) as u64;
        let mut read = self.read.lock(platform);
        let mut produced = 0;
        loop {
            let write = adapter.read_pointer(RingPointer::InboxWrite);
            if write == *read {
                return Ok(produced);
            }
            let available = write.wrapping_sub(*read);
            if available > size {
                return Err(Error::RingPointerCorrupted {
                    ring: Ring::Inbox,
                    write,
                    read: *read,
                    size,
                });
            }

            let mut header = FrameHeader::default();
            if available >= HEADER_SIZE as u64 {
                adapter.read_bytes(Ring::Inbox, *read, header.as_mut_bytes());
            }
            let frame_len = header.frame_len() as u64;
            if available < HEADER_SIZE as u64 || frame_len > available {
                let error = Error::MalformedFrame {
                    read: *read,
                    command: header.command.get(),
                    frame_len: frame_len as usize,
                    available,
                };
                *read = write;
                adapter.write_pointer(RingPointer::InboxRead, write);
                return Err(error);
            }

            let payload_len = usize::from(header.payload_len.get());
            let payload = read.wrapping_add(HEADER_SIZE as u64);
            let mut prefix = [0u8; DECODE_PREFIX_SIZE];
            let prefix_len = core::cmp::min(payload_len, DECODE_PREFIX_SIZE);
            adapter.read_bytes(Ring::Inbox, payload, &mut prefix[..prefix_len]);

            let result = match InboundFrame::decode(&header, &prefix[..prefix_len]) {
                InboundFrame::Nop => Ok(()),
                InboundFrame::Stdin { count } => {
                    let chars = payload.wrapping_add(STDIN_COUNT_SIZE as u64);
                    let max = payload_len.saturating_sub(STDIN_COUNT_SIZE);
                    let mut count = usize::from(count);
                    if count > max {
                        warn!("stdin frame claims {count} chars in a {payload_len} byte payload");
                        count = max;
                    }
                    if count > stdin.free() && count <= stdin.capacity() {
                        // The frame stays published until the console has
                        // read enough input to take all of it.
                        return Ok(produced);
                    }
                    let pushed = adapter
                        .bytes(Ring::Inbox, chars, count)
                        .take_while(|c| stdin.push(*c))
                        .count();
                    produced += pushed;
                    if pushed < count {
                        Err(Error::StdinOverrun { dropped: count - pushed })
                    } else {
                        Ok(())
                    }
                }
                InboundFrame::SystemRequest(SystemRequest::Unknown { request_id }) => {
                    warn!("ignoring unknown system request {request_id}");
                    Ok(())
                }
                InboundFrame::SystemRequest(request) => {
                    debug!("system request {request:?}");
                    on_request(request)
                }
                InboundFrame::Unknown { command } => {
                    warn!("ignoring unknown inbox command {command:#x}");
                    Ok(())
                }
            };

            *read = read.wrapping_add(frame_len);
            adapter.write_pointer(RingPointer::InboxRead, *read);
            result?;
        }
    }
}
