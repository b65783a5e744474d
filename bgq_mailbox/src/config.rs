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

//! Mailbox configuration.
//!
//! The ring placement is published by the control system in the user code
//! registers before the node boots; everything else has fixed defaults that
//! match the observed firmware behaviour.

use snafu::ensure;

use crate::{
    error::{InvalidGeometrySnafu, Result},
    frame::FRAME_ALIGNMENT,
    registers::{usercode, DeviceControlRegisters},
    ring::RingRegion,
};

/// Smallest ring that can hold a frame with a non-trivial payload.
pub const MIN_RING_SIZE: usize = 2 * FRAME_ALIGNMENT;

/// Default interval between polls of a stalled ring.
pub const DEFAULT_POLL_INTERVAL_US: u32 = 10;
/// Default cap on the backoff interval of waits that may sleep.
pub const DEFAULT_MAX_BACKOFF_US: u32 = 1000;
/// Stalls longer than this are reported once the send completes.
pub const DEFAULT_STALL_WARNING_US: u64 = 1_000_000;

/// Placement of one ring inside the shared memory window.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RingGeometry {
    pub offset: u32,
    pub size: u32,
}

impl RingGeometry {
    /// Decodes a user code register value: the size in the high word, the
    /// window offset in the low word.
    pub fn from_usercode(value: u64) -> Self {
        Self { offset: (value & 0xffff_ffff) as u32, size: (value >> 32) as u32 }
    }

    pub fn to_usercode(self) -> u64 {
        (u64::from(self.size) << 32) | u64::from(self.offset)
    }

    fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.size)
    }

    fn validate(&self, window_len: usize) -> Result<()> {
        ensure!(self.size != 0, InvalidGeometrySnafu { reason: "ring size is zero" });
        ensure!(
            self.size.is_power_of_two(),
            InvalidGeometrySnafu { reason: "ring size is not a power of two" }
        );
        ensure!(
            self.size as usize >= MIN_RING_SIZE,
            InvalidGeometrySnafu { reason: "ring is too small to hold a frame" }
        );
        ensure!(
            self.offset as usize % FRAME_ALIGNMENT == 0,
            InvalidGeometrySnafu { reason: "ring offset is not frame aligned" }
        );
        ensure!(
            self.end() <= window_len as u64,
            InvalidGeometrySnafu { reason: "ring lies outside of the shared window" }
        );
        Ok(())
    }

    pub fn region(&self) -> RingRegion {
        RingRegion::new(self.offset as usize, self.size as usize)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MailboxConfig {
    pub outbox: RingGeometry,
    pub inbox: RingGeometry,
    /// Busy-wait interval while the outbox is full.
    pub poll_interval_us: u32,
    /// Upper bound of the backoff used by blocking console reads.
    pub max_backoff_us: u32,
    /// Outbox stalls longer than this are logged.
    pub stall_warning_us: u64,
    /// Size of the buffered console output stream.
    pub stdout_buffer_size: usize,
    /// Size of the buffered console input stream.
    pub stdin_buffer_size: usize,
}

impl MailboxConfig {
    /// Creates a configuration with explicit ring placement. Both stream
    /// buffers match the size of their ring.
    pub fn new(outbox: RingGeometry, inbox: RingGeometry) -> Self {
        Self {
            outbox,
            inbox,
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
            max_backoff_us: DEFAULT_MAX_BACKOFF_US,
            stall_warning_us: DEFAULT_STALL_WARNING_US,
            stdout_buffer_size: outbox.size as usize,
            stdin_buffer_size: inbox.size as usize,
        }
    }

    /// Reads the ring placement published by the control system.
    pub fn discover<D: DeviceControlRegisters>(registers: &D, window_len: usize) -> Result<Self> {
        let outbox = RingGeometry::from_usercode(registers.read64(usercode(0)));
        let inbox = RingGeometry::from_usercode(registers.read64(usercode(1)));
        let config = Self::new(outbox, inbox);
        config.validate(window_len)?;
        Ok(config)
    }

    pub fn validate(&self, window_len: usize) -> Result<()> {
        self.outbox.validate(window_len)?;
        self.inbox.validate(window_len)?;
        ensure!(
            self.outbox.end() <= u64::from(self.inbox.offset)
                || self.inbox.end() <= u64::from(self.outbox.offset),
            InvalidGeometrySnafu { reason: "outbox and inbox overlap" }
        );
        ensure!(
            self.stdout_buffer_size.is_power_of_two() && self.stdin_buffer_size.is_power_of_two(),
            InvalidGeometrySnafu { reason: "stream buffer size is not a power of two" }
        );
        ensure!(
            self.stdout_buffer_size >= 2 && self.stdin_buffer_size >= 2,
            InvalidGeometrySnafu { reason: "stream buffer is too small" }
        );
        ensure!(
            self.stdin_buffer_size >= self.inbox.size as usize,
            InvalidGeometrySnafu { reason: "stdin stream is smaller than the inbox" }
        );
        Ok(())
    }
}
