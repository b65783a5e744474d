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

use alloc::vec::Vec;
use core::{
    fmt::Write,
    sync::atomic::{AtomicBool, Ordering},
};
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::*;
use crate::{
    ring::RingPointer,
    test::{mailbox, FakeFirmware, TestPlatform},
};

fn payloads(firmware: &FakeFirmware) -> Vec<Vec<u8>> {
    firmware.peer_read_frames().into_iter().map(|frame| frame.payload).collect()
}

#[test]
fn test_newline_flushes_line() {
    let firmware = FakeFirmware::new(256, 64);
    let platform = TestPlatform::new();
    let mailbox = mailbox(&firmware, &platform);

    assert_eq!(mailbox.put_chars(b"abc\ndef"), Ok(7));
    assert_eq!(payloads(&firmware), [b"abc\n".to_vec()]);
    assert_eq!(mailbox.console.stdout.len(), 3);

    assert_eq!(mailbox.flush_stdout(), Ok(3));
    assert_eq!(payloads(&firmware), [b"def".to_vec()]);
    assert_eq!(mailbox.flush_stdout(), Ok(0));
    assert!(firmware.peer_read_frames().is_empty());
}

#[test]
fn test_full_stream_is_flushed() {
    let firmware = FakeFirmware::new(256, 64);
    let platform = TestPlatform::new();
    let mut config = firmware.config();
    config.stdout_buffer_size = 8;
    let mailbox = Mailbox::new(config, &firmware, &firmware, &platform).unwrap();

    mailbox.put_chars(b"0123456789").unwrap();
    assert_eq!(payloads(&firmware), [b"0123456".to_vec()]);
    assert_eq!(mailbox.flush_stdout(), Ok(3));
    assert_eq!(payloads(&firmware), [b"789".to_vec()]);
}

#[test]
fn test_flush_splits_at_stdout_cap() {
    let firmware = FakeFirmware::new(32, 32);
    let received = spinning_top::Spinlock::new(Vec::new());
    let platform = TestPlatform::new().with_delay_hook(|| {
        received.lock().extend(payloads(&firmware));
    });
    let mut config = firmware.config();
    config.stdout_buffer_size = 64;
    let mailbox = Mailbox::new(config, &firmware, &firmware, &platform).unwrap();

    let text: Vec<u8> = (b'a'..b'a' + 26).chain(b'A'..b'A' + 14).collect();
    mailbox.put_chars(&text).unwrap();
    assert_eq!(mailbox.flush_stdout(), Ok(40));
    received.lock().extend(payloads(&firmware));

    // A 32 byte outbox carries at most 24 payload bytes per frame.
    let received = received.lock();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0], text[..24]);
    assert_eq!(received[1], text[24..]);
}

#[test]
fn test_wrapped_stream_is_sent_as_one_frame() {
    let firmware = FakeFirmware::new(256, 64);
    let platform = TestPlatform::new();
    let mut config = firmware.config();
    config.stdout_buffer_size = 16;
    let mailbox = Mailbox::new(config, &firmware, &firmware, &platform).unwrap();

    mailbox.put_chars(b"0123456789").unwrap();
    mailbox.flush_stdout().unwrap();
    firmware.peer_free_outbox();

    mailbox.put_chars(b"abcdefghij").unwrap();
    assert_eq!(mailbox.flush_stdout(), Ok(10));
    assert_eq!(payloads(&firmware), [b"abcdefghij".to_vec()]);
}

#[test]
fn test_writer() {
    let firmware = FakeFirmware::new(256, 64);
    let platform = TestPlatform::new();
    let mailbox = mailbox(&firmware, &platform);

    writeln!(mailbox.writer(), "answer={}", 42).unwrap();
    mailbox.put_str("!").unwrap();
    mailbox.flush_stdout().unwrap();
    assert_eq!(payloads(&firmware), [b"answer=42\n".to_vec(), b"!".to_vec()]);
}

#[test]
fn test_poll_inbox() {
    let firmware = FakeFirmware::new(64, 64);
    let platform = TestPlatform::new();
    let mailbox = mailbox(&firmware, &platform);
    let mut buf = [0u8; 8];

    assert_eq!(mailbox.poll_inbox(&mut buf), Ok(0));
    firmware.peer_write_stdin(b"hi");
    assert_eq!(mailbox.poll_inbox(&mut buf), Ok(2));
    assert_eq!(&buf[..2], b"hi");
    assert_eq!(mailbox.getc_poll(), Ok(None));
}

#[test]
fn test_poll_inbox_loses_no_input() {
    let firmware = FakeFirmware::new(256, 64);
    let platform = TestPlatform::new();
    let mailbox = mailbox(&firmware, &platform);
    let first: Vec<u8> = (b'a'..b'a' + 26).chain(b'A'..b'A' + 14).collect();
    let second: Vec<u8> = (b'0'..b'0' + 10).cycle().take(30).collect();
    let mut received = Vec::new();
    let mut buf = [0u8; 4];

    firmware.peer_write_stdin(&first);
    assert_eq!(mailbox.poll_inbox(&mut buf), Ok(4));
    received.extend_from_slice(&buf);
    // Does not fit next to the 36 bytes still buffered.
    firmware.peer_write_stdin(&second);
    for _ in 0..32 {
        let count = mailbox.poll_inbox(&mut buf).unwrap();
        received.extend_from_slice(&buf[..count]);
    }

    assert_eq!(received, [first, second].concat());
    assert_eq!(
        firmware.pointer(RingPointer::InboxRead),
        firmware.pointer(RingPointer::InboxWrite)
    );
}

#[test]
fn test_corrupted_stdout_stream_is_fatal() {
    let firmware = FakeFirmware::new(256, 64);
    let platform = TestPlatform::new();
    let mailbox = mailbox(&firmware, &platform);

    mailbox.console.stdout.set_head(1000);
    let result = catch_unwind(AssertUnwindSafe(|| mailbox.flush_stdout()));
    assert!(result.is_err());
    let frames = firmware.peer_read_frames();
    assert_eq!(frames[0].payload, b"panic");
    assert!(frames[1].payload.starts_with(b"buffer too big"));
}

#[test]
fn test_getc_waits_for_input() {
    let firmware = FakeFirmware::new(256, 64);
    let typed = AtomicBool::new(false);
    let platform = TestPlatform::new().with_delay_hook(|| {
        if !typed.swap(true, Ordering::SeqCst) {
            firmware.peer_write_stdin(b"q");
        }
    });
    let mailbox = mailbox(&firmware, &platform);

    assert_eq!(mailbox.getc(), Ok(b'q'));
    assert_eq!(platform.sleeps(), 1);
    assert_eq!(platform.delays(), 0);
}

#[test]
fn test_line_buffer_truncates_at_char_boundary() {
    let mut line = LineBuffer::<4>::new();
    write!(line, "h\u{e9}llo").unwrap();
    assert_eq!(line.as_str(), "h\u{e9}l");

    let mut line = LineBuffer::<2>::new();
    write!(line, "\u{e9}\u{e9}").unwrap();
    assert_eq!(line.as_str(), "\u{e9}");
}
