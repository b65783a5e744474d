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

//! Kernel log backend that writes to the control system console.

use alloc::boxed::Box;
use core::{
    fmt::Write,
    sync::atomic::{AtomicBool, Ordering},
};

use log::{LevelFilter, SetLoggerError};

use crate::{
    console::LineBuffer, platform::Platform, registers::DeviceControlRegisters,
    ring::SharedMemory, system::MailboxSlot,
};

/// Longest log line; the rest of a record is dropped.
pub const LOG_LINE_SIZE: usize = 512;

/// Sends every record as its own STDOUT frames.
///
/// Records skip the buffered console, so logging from code that holds the
/// console locks is fine. Records logged while another record is being sent,
/// and records logged before the mailbox exists, are dropped.
pub struct MailboxLogger<'a, D, M, P> {
    slot: &'a MailboxSlot<D, M, P>,
    busy: AtomicBool,
}

impl<'a, D, M, P> MailboxLogger<'a, D, M, P> {
    pub const fn new(slot: &'a MailboxSlot<D, M, P>) -> Self {
        Self { slot, busy: AtomicBool::new(false) }
    }
}

impl<D, M, P> log::Log for MailboxLogger<'_, D, M, P>
where
    D: DeviceControlRegisters + Send + Sync,
    M: SharedMemory + Send + Sync,
    P: Platform + Send,
{
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let Ok(mailbox) = self.slot.get() else {
            return;
        };
        if self.busy.swap(true, Ordering::Acquire) {
            return;
        }
        let mut line = LineBuffer::<LOG_LINE_SIZE>::new();
        let _ = writeln!(line, "kernel {}: {}", record.level(), record.args());
        let _ = mailbox.stdout(line.as_bytes());
        self.busy.store(false, Ordering::Release);
    }

    fn flush(&self) {
        let _ = self.slot.flush_stdout();
    }
}

/// Installs a [`MailboxLogger`] for `slot` as the global logger.
pub fn init_logging<D, M, P>(
    slot: &'static MailboxSlot<D, M, P>,
    level: LevelFilter,
) -> Result<(), SetLoggerError>
where
    D: DeviceControlRegisters + Send + Sync + 'static,
    M: SharedMemory + Send + Sync + 'static,
    P: Platform + Send + 'static,
{
    log::set_logger(Box::leak(Box::new(MailboxLogger::new(slot))))?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloc::{string::String, vec::Vec};

    use log::{Level, Log, Record};

    use super::*;
    use crate::{
        frame::OutboundCommand,
        test::{mailbox, FakeFirmware, TestPlatform},
    };

    fn log_line(logger: &impl Log, level: Level, text: &str) {
        logger.log(&Record::builder().level(level).args(format_args!("{text}")).build());
    }

    #[test]
    fn test_records_are_sent_as_stdout_frames() {
        let firmware = FakeFirmware::new(256, 64);
        let platform = TestPlatform::new();
        let slot = MailboxSlot::new();
        let logger = MailboxLogger::new(&slot);

        log_line(&logger, Level::Info, "dropped");
        assert!(slot.init(mailbox(&firmware, &platform)).is_ok());
        log_line(&logger, Level::Warn, "ring stalled");

        let frames = firmware.peer_read_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, OutboundCommand::Stdout as u16);
        assert_eq!(frames[0].payload, b"kernel WARN: ring stalled\n");
    }

    #[test]
    fn test_records_bypass_console_buffer() {
        let firmware = FakeFirmware::new(256, 64);
        let platform = TestPlatform::new();
        let slot = MailboxSlot::new();
        let logger = MailboxLogger::new(&slot);
        assert!(slot.init(mailbox(&firmware, &platform)).is_ok());

        assert_eq!(slot.put_chars(b"prompt> "), Ok(8));
        log_line(&logger, Level::Error, "boom");
        let payloads: Vec<Vec<u8>> =
            firmware.peer_read_frames().into_iter().map(|frame| frame.payload).collect();
        assert_eq!(payloads, [b"kernel ERROR: boom\n".to_vec()]);

        logger.flush();
        assert_eq!(firmware.peer_read_frames()[0].payload, b"prompt> ");
    }

    #[test]
    fn test_long_records_are_cut() {
        let firmware = FakeFirmware::new(4096, 64);
        let platform = TestPlatform::new();
        let slot = MailboxSlot::new();
        let logger = MailboxLogger::new(&slot);
        assert!(slot.init(mailbox(&firmware, &platform)).is_ok());

        let text: String = core::iter::repeat('x').take(2 * LOG_LINE_SIZE).collect();
        log_line(&logger, Level::Debug, &text);
        let frames = firmware.peer_read_frames();
        let sent: usize = frames.iter().map(|frame| frame.payload.len()).sum();
        assert_eq!(sent, LOG_LINE_SIZE);
        assert!(frames[0].payload.starts_with(b"kernel DEBUG: xxx"));
    }

    #[test]
    fn test_nested_records_are_dropped() {
        let firmware = FakeFirmware::new(256, 64);
        let platform = TestPlatform::new();
        let slot = MailboxSlot::new();
        let logger = MailboxLogger::new(&slot);
        assert!(slot.init(mailbox(&firmware, &platform)).is_ok());

        logger.busy.store(true, Ordering::SeqCst);
        log_line(&logger, Level::Info, "nested");
        assert!(firmware.peer_read_frames().is_empty());

        logger.busy.store(false, Ordering::SeqCst);
        log_line(&logger, Level::Info, "outer");
        assert_eq!(firmware.peer_read_frames().len(), 1);
    }
}
