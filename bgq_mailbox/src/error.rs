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

use snafu::Snafu;
use strum::Display;

use crate::ring::Ring;

/// Errors reported by the mailbox engine.
#[derive(Clone, Debug, Eq, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The mailbox hardware has not been discovered yet.
    #[snafu(display("mailbox device is not initialized"))]
    NotInitialized,

    /// The pointer pair of a ring no longer satisfies `write - read <= size`.
    #[snafu(display("{ring} pointers corrupted: write {write:#x}, read {read:#x}, size {size:#x}"))]
    RingPointerCorrupted { ring: Ring, write: u64, read: u64, size: u64 },

    /// An inbound frame claims more bytes than the firmware has published.
    #[snafu(display(
        "malformed frame at {read:#x}: command {command:#x} needs {frame_len} bytes, {available} published"
    ))]
    MalformedFrame { read: u64, command: u16, frame_len: usize, available: u64 },

    #[snafu(display("payload of {len} bytes exceeds the {max} byte limit for command {command:#x}"))]
    PayloadTooLarge { command: u16, len: usize, max: usize },

    /// Console input was dropped because the stdin stream was full.
    #[snafu(display("stdin stream full, dropped {dropped} bytes"))]
    StdinOverrun { dropped: usize },

    /// A stream buffer holds more bytes than it can possibly contain.
    #[snafu(display("buffer too big: {pending} bytes pending in a {capacity} byte stream"))]
    BufferTooLarge { pending: usize, capacity: usize },

    #[snafu(display("invalid ring geometry: {reason}"))]
    InvalidGeometry { reason: &'static str },

    #[snafu(display("orderly power-off failed: {reason}"))]
    PowerOffFailed { reason: &'static str },
}

/// Broad classification of [`Error`] values.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ErrorKind {
    NotInitialized,
    ProtocolViolation,
    ResourceExhausted,
    Configuration,
    Platform,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotInitialized => ErrorKind::NotInitialized,
            Error::RingPointerCorrupted { .. }
            | Error::MalformedFrame { .. }
            | Error::PayloadTooLarge { .. }
            | Error::StdinOverrun { .. } => ErrorKind::ProtocolViolation,
            Error::BufferTooLarge { .. } => ErrorKind::ResourceExhausted,
            Error::InvalidGeometry { .. } => ErrorKind::Configuration,
            Error::PowerOffFailed { .. } => ErrorKind::Platform,
        }
    }

    /// Whether the error leaves the mailbox in a state that only the panic
    /// path can deal with.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::RingPointerCorrupted { .. }
                | Error::BufferTooLarge { .. }
                | Error::PowerOffFailed { .. }
        )
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Error::NotInitialized.kind(), ErrorKind::NotInitialized);
        assert_eq!(Error::StdinOverrun { dropped: 1 }.kind(), ErrorKind::ProtocolViolation);
        assert_eq!(
            Error::BufferTooLarge { pending: 9, capacity: 8 }.kind(),
            ErrorKind::ResourceExhausted
        );
    }

    #[test]
    fn test_fatal() {
        assert!(Error::RingPointerCorrupted { ring: Ring::Inbox, write: 0, read: 64, size: 32 }
            .is_fatal());
        assert!(Error::PowerOffFailed { reason: "busy" }.is_fatal());
        assert!(!Error::NotInitialized.is_fatal());
        assert!(!Error::MalformedFrame { read: 0, command: 5, frame_len: 32, available: 16 }
            .is_fatal());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Error::RingPointerCorrupted { ring: Ring::Outbox, write: 0x80, read: 0x10, size: 0x40 }
                .to_string(),
            "Outbox pointers corrupted: write 0x80, read 0x10, size 0x40"
        );
        assert_eq!(Error::NotInitialized.to_string(), "mailbox device is not initialized");
    }
}
