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

//! Mailbox frame layout.
//!
//! A frame is an 8-byte header followed by the payload, padded to the next
//! 16-byte boundary:
//!
//! ```text
//! +---------+-------------+-----------+----------+-----------------+---------+
//! | command | payload_len | sender_id | checksum | payload ...     | padding |
//! |   u16   |     u16     |    u16    |   u16    | payload_len     | to 16   |
//! +---------+-------------+-----------+----------+-----------------+---------+
//! ```
//!
//! All fields are big-endian. The checksum is reserved and always zero.

use strum::{Display, FromRepr};
use zerocopy::{
    byteorder::big_endian::{U16, U32, U64},
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
};

/// The size of the frame header in bytes.
pub const HEADER_SIZE: usize = 8;
/// Frames always start and end on this boundary.
pub const FRAME_ALIGNMENT: usize = 16;
/// Upper bound on the message part of RAS payloads.
pub const RAS_MAX: usize = 2048;

#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout,
    Unaligned,
)]
pub struct FrameHeader {
    pub command: U16,
    pub payload_len: U16,
    /// Hardware thread id of the sender.
    pub sender_id: U16,
    /// Reserved, zero means no checksum.
    pub checksum: U16,
}
static_assertions::assert_eq_size!(FrameHeader, [u8; HEADER_SIZE]);

impl FrameHeader {
    pub fn new(command: u16, payload_len: u16, sender_id: u16) -> Self {
        Self {
            command: U16::new(command),
            payload_len: U16::new(payload_len),
            sender_id: U16::new(sender_id),
            checksum: U16::ZERO,
        }
    }

    /// Total length the frame occupies in the ring, padding included.
    pub fn frame_len(&self) -> usize {
        frame_len(self.payload_len.get().into())
    }
}

/// Length a frame with `payload_len` payload bytes occupies in a ring.
pub const fn frame_len(payload_len: usize) -> usize {
    (HEADER_SIZE + payload_len).next_multiple_of(FRAME_ALIGNMENT)
}

/// Largest payload whose frame still fits into a ring of `capacity` bytes.
pub const fn max_payload_for_ring(capacity: usize) -> usize {
    let aligned = capacity - capacity % FRAME_ALIGNMENT;
    if aligned < HEADER_SIZE {
        0
    } else {
        aligned - HEADER_SIZE
    }
}

/// Commands sent from the node to the control system.
#[derive(Clone, Copy, Debug, Display, Eq, FromRepr, PartialEq)]
#[repr(u16)]
pub enum OutboundCommand {
    Stdout = 0x0002,
    RasBinary = 0x0004,
    /// Termination notice; must be the last message before the node stops.
    Terminate = 0x0008,
    RasAscii = 0x0080,
    Stderr = 0x0100,
    BlockState = 0x0400,
}

impl OutboundCommand {
    /// Largest payload accepted for this command in a ring of `capacity`
    /// bytes.
    pub fn max_payload(self, capacity: usize) -> usize {
        let command_cap = match self {
            OutboundCommand::RasAscii => RAS_ASCII_HEADER_SIZE + RAS_MAX,
            OutboundCommand::RasBinary => RAS_BINARY_HEADER_SIZE + RAS_MAX,
            OutboundCommand::Terminate => TERMINATE_PAYLOAD_SIZE,
            OutboundCommand::BlockState => core::mem::size_of::<BlockStatePayload>(),
            OutboundCommand::Stdout | OutboundCommand::Stderr => u16::MAX as usize,
        };
        core::cmp::min(command_cap, max_payload_for_ring(capacity))
    }
}

/// Commands sent from the control system to the node.
#[derive(Clone, Copy, Debug, Display, Eq, FromRepr, PartialEq)]
#[repr(u16)]
pub enum InboundCommand {
    None = 0x0,
    Stdin = 0x5,
    SysReq = 0x9,
}

/// System request sub-codes carried in a SYSREQ payload.
#[derive(Clone, Copy, Debug, Display, Eq, FromRepr, PartialEq)]
#[repr(u32)]
pub enum SystemRequestCode {
    Shutdown = 1,
    ShutdownIoLink = 2,
}

/// A decoded system request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SystemRequest {
    /// Power the node off in an orderly way.
    Shutdown,
    /// Shut down the IO link serving `block_id`.
    ShutdownIoLink { block_id: u32 },
    Unknown { request_id: u32 },
}

/// Inbound frame, decoded once from its header and the fixed part of its
/// payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InboundFrame {
    Nop,
    /// Console input; `count` characters follow the count field.
    Stdin { count: u16 },
    SystemRequest(SystemRequest),
    Unknown { command: u16 },
}

/// Size of the character count that prefixes a STDIN payload.
pub const STDIN_COUNT_SIZE: usize = 2;

impl InboundFrame {
    /// Decodes a frame from its header and up to the first 8 bytes of its
    /// payload. `prefix` may be shorter than 8 bytes if the payload is.
    pub fn decode(header: &FrameHeader, prefix: &[u8]) -> Self {
        let payload_len = usize::from(header.payload_len.get());
        let prefix = &prefix[..core::cmp::min(prefix.len(), payload_len)];
        match InboundCommand::from_repr(header.command.get()) {
            Some(InboundCommand::None) => InboundFrame::Nop,
            Some(InboundCommand::Stdin) => {
                let count =
                    U16::read_from_prefix(prefix).map(|(count, _)| count.get()).unwrap_or(0);
                InboundFrame::Stdin { count }
            }
            Some(InboundCommand::SysReq) => {
                InboundFrame::SystemRequest(SystemRequestPayload::decode(prefix))
            }
            None => InboundFrame::Unknown { command: header.command.get() },
        }
    }
}

/// Fixed part of a SYSREQ payload.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SystemRequestPayload {
    pub request_id: U32,
    pub block_id: U32,
}
static_assertions::assert_eq_size!(SystemRequestPayload, [u8; 8]);

impl SystemRequestPayload {
    fn decode(payload: &[u8]) -> SystemRequest {
        let Ok((request_id, rest)) = U32::read_from_prefix(payload) else {
            return SystemRequest::Unknown { request_id: 0 };
        };
        match SystemRequestCode::from_repr(request_id.get()) {
            Some(SystemRequestCode::Shutdown) => SystemRequest::Shutdown,
            Some(SystemRequestCode::ShutdownIoLink) => match U32::read_from_prefix(rest) {
                Ok((block_id, _)) => SystemRequest::ShutdownIoLink { block_id: block_id.get() },
                Err(_) => SystemRequest::Unknown { request_id: request_id.get() },
            },
            None => SystemRequest::Unknown { request_id: request_id.get() },
        }
    }
}

/// Fixed part of a RAS ASCII payload; the NUL-terminated message follows.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RasAsciiHeader {
    /// Unique component identifier, always zero from the node.
    pub uci: U64,
    pub id: U32,
}
pub const RAS_ASCII_HEADER_SIZE: usize = 12;
static_assertions::assert_eq_size!(RasAsciiHeader, [u8; RAS_ASCII_HEADER_SIZE]);

/// Fixed part of a RAS binary payload; `num_details` 64-bit words follow.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RasBinaryHeader {
    pub uci: U64,
    pub id: U32,
    pub reserved: U16,
    pub num_details: U16,
}
pub const RAS_BINARY_HEADER_SIZE: usize = 16;
static_assertions::assert_eq_size!(RasBinaryHeader, [u8; RAS_BINARY_HEADER_SIZE]);

/// Termination notice payload: the timebase at the time of the notice and
/// the exit status.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct TerminatePayload {
    pub timebase: U64,
    pub status: U32,
}
pub const TERMINATE_PAYLOAD_SIZE: usize = 12;
static_assertions::assert_eq_size!(TerminatePayload, [u8; TERMINATE_PAYLOAD_SIZE]);

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BlockStatePayload {
    pub status: U16,
    pub reserved: U16,
    pub block_id: U32,
    pub timestamp: U64,
}
static_assertions::assert_eq_size!(BlockStatePayload, [u8; 16]);

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn test_frame_len_is_aligned() {
        assert_eq!(frame_len(0), 16);
        assert_eq!(frame_len(1), 16);
        assert_eq!(frame_len(8), 16);
        assert_eq!(frame_len(9), 32);
        assert_eq!(frame_len(15), 32);
        assert_eq!(frame_len(RAS_MAX), 2064);
    }

    #[test]
    fn test_max_payload_for_ring() {
        assert_eq!(max_payload_for_ring(64), 56);
        assert_eq!(frame_len(max_payload_for_ring(64)), 64);
        assert_eq!(max_payload_for_ring(4), 0);
    }

    #[test]
    fn test_header_is_big_endian() {
        let header = FrameHeader::new(OutboundCommand::RasAscii as u16, 0x0102, 3);
        assert_eq!(header.as_bytes(), &[0x00, 0x80, 0x01, 0x02, 0x00, 0x03, 0x00, 0x00]);
        assert_eq!(header.frame_len(), frame_len(0x0102));
    }

    #[test]
    fn test_command_caps() {
        assert_eq!(OutboundCommand::RasAscii.max_payload(1 << 16), 12 + RAS_MAX);
        assert_eq!(OutboundCommand::Stdout.max_payload(1 << 16), (1 << 16) - 8);
        assert_eq!(OutboundCommand::Stdout.max_payload(256), 248);
        assert_eq!(OutboundCommand::BlockState.max_payload(256), 16);
    }

    #[googletest::test]
    fn test_decode_inbound_frames() {
        let stdin = FrameHeader::new(InboundCommand::Stdin as u16, 5, 0);
        assert_that!(
            InboundFrame::decode(&stdin, &[0, 3, b'a', b'b', b'c']),
            eq(InboundFrame::Stdin { count: 3 })
        );

        let nop = FrameHeader::new(InboundCommand::None as u16, 0, 0);
        assert_that!(InboundFrame::decode(&nop, &[]), eq(InboundFrame::Nop));

        let unknown = FrameHeader::new(0x77, 0, 0);
        assert_that!(
            InboundFrame::decode(&unknown, &[]),
            eq(InboundFrame::Unknown { command: 0x77 })
        );
    }

    #[googletest::test]
    fn test_decode_system_requests() {
        let header = FrameHeader::new(InboundCommand::SysReq as u16, 8, 0);
        assert_that!(
            InboundFrame::decode(&header, &[0, 0, 0, 2, 0, 0, 0x12, 0x34]),
            eq(InboundFrame::SystemRequest(SystemRequest::ShutdownIoLink { block_id: 0x1234 }))
        );

        let header = FrameHeader::new(InboundCommand::SysReq as u16, 4, 0);
        assert_that!(
            InboundFrame::decode(&header, &[0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff]),
            eq(InboundFrame::SystemRequest(SystemRequest::Shutdown))
        );
        // The block id lies outside of the declared payload.
        assert_that!(
            InboundFrame::decode(&header, &[0, 0, 0, 2, 0, 0, 0x12, 0x34]),
            eq(InboundFrame::SystemRequest(SystemRequest::Unknown { request_id: 2 }))
        );
        assert_that!(
            InboundFrame::decode(&header, &[0, 0, 0, 7]),
            eq(InboundFrame::SystemRequest(SystemRequest::Unknown { request_id: 7 }))
        );
    }

    #[test]
    fn test_truncated_stdin_count() {
        let header = FrameHeader::new(InboundCommand::Stdin as u16, 1, 0);
        assert_eq!(InboundFrame::decode(&header, &[9, 9]), InboundFrame::Stdin { count: 0 });
    }
}
