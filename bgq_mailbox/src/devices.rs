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

//! Write protocols of the RAS and block status device files, which let user
//! space report events and block state through the mailbox.

use core::fmt;

use zerocopy::{
    byteorder::big_endian::{U16, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
};

use crate::{
    messages::BlockStatus, platform::Platform, ras, registers::DeviceControlRegisters,
    ring::SharedMemory, Mailbox,
};

/// Header of a record written to the RAS device; `len` message bytes
/// follow.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RasRecordHeader {
    pub msg_id: U32,
    pub is_binary: u8,
    pub pad: u8,
    pub len: U16,
}
static_assertions::assert_eq_size!(RasRecordHeader, [u8; 8]);

/// A RAS text event as written by user space.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RasRecord<'a> {
    pub msg_id: u32,
    /// Message text, without its NUL terminator.
    pub message: &'a [u8],
}

impl<'a> RasRecord<'a> {
    /// Parses a record. The message must be a NUL-terminated string that
    /// takes up exactly the declared length.
    pub fn parse(bytes: &'a [u8]) -> anyhow::Result<Self> {
        let Ok((header, rest)) = RasRecordHeader::read_from_prefix(bytes) else {
            anyhow::bail!("RAS record too short for its header");
        };
        if header.is_binary != 0 {
            anyhow::bail!("binary RAS records are not supported");
        }
        let len = usize::from(header.len.get());
        if rest.len() < len {
            anyhow::bail!("RAS record holds {} of {} message bytes", rest.len(), len);
        }
        let message = &rest[..len];
        match message.iter().position(|&byte| byte == 0) {
            Some(end) if end + 1 == len => {
                Ok(Self { msg_id: header.msg_id.get(), message: &message[..end] })
            }
            _ => anyhow::bail!("RAS message is not a string"),
        }
    }
}

/// The RAS device file.
pub struct RasDevice<'a, D, M, P> {
    mailbox: &'a Mailbox<D, M, P>,
}

impl<'a, D, M, P> RasDevice<'a, D, M, P>
where
    D: DeviceControlRegisters,
    M: SharedMemory,
    P: Platform,
{
    pub fn new(mailbox: &'a Mailbox<D, M, P>) -> Self {
        Self { mailbox }
    }

    /// Reports the event in `record` and returns the number of bytes
    /// accepted.
    pub fn write(&self, record: &[u8]) -> anyhow::Result<usize> {
        let parsed = RasRecord::parse(record)?;
        self.mailbox.ras_puts(parsed.msg_id, parsed.message).map_err(anyhow::Error::msg)?;
        Ok(record.len())
    }

    /// Lists the known RAS ids.
    pub fn read(&self, out: &mut impl fmt::Write) -> fmt::Result {
        ras::write_catalog(out)
    }
}

/// The block status device file. Accepts a status digit followed by a
/// newline.
pub struct BlockStatusDevice<'a, D, M, P> {
    mailbox: &'a Mailbox<D, M, P>,
}

impl<'a, D, M, P> BlockStatusDevice<'a, D, M, P>
where
    D: DeviceControlRegisters,
    M: SharedMemory,
    P: Platform,
{
    pub fn new(mailbox: &'a Mailbox<D, M, P>) -> Self {
        Self { mailbox }
    }

    pub fn write(&self, input: &[u8]) -> anyhow::Result<usize> {
        let status = match input {
            [b'1', b'\n'] => BlockStatus::Initialized,
            [b'2', b'\n'] => BlockStatus::Halted,
            _ => anyhow::bail!("expected a block status of 1 or 2 followed by a newline"),
        };
        self.mailbox.block_state(status, 0).map_err(anyhow::Error::msg)?;
        Ok(input.len())
    }
}
