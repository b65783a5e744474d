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

//! Buffered console on top of the mailbox.
//!
//! Output is collected in the stdout stream and sent as STDOUT frames, at the
//! latest when a newline is written. Input arrives in STDIN frames, which
//! the inbox dispatcher unpacks into the stdin stream.

use core::fmt;

use log::warn;

use crate::{
    error::Result,
    frame::OutboundCommand,
    platform::Platform,
    registers::DeviceControlRegisters,
    ring::{Ring, SharedMemory},
    spin::{SpinWait, WaitContext},
    stream::StreamBuffer,
    sync::IrqSafeSpinlock,
    Mailbox,
};

/// Console streams and the locks serialising their producers and consumers.
///
/// Locks are always taken in the order stdout producer, stdout consumer,
/// outbox.
pub struct Console {
    pub(crate) stdout: StreamBuffer,
    pub(crate) stdin: StreamBuffer,
    stdout_producer: IrqSafeSpinlock<()>,
    stdout_consumer: IrqSafeSpinlock<()>,
    stdin_consumer: IrqSafeSpinlock<()>,
}

impl Console {
    pub fn new(stdout_size: usize, stdin_size: usize) -> Self {
        Self {
            stdout: StreamBuffer::new(stdout_size),
            stdin: StreamBuffer::new(stdin_size),
            stdout_producer: IrqSafeSpinlock::new(()),
            stdout_consumer: IrqSafeSpinlock::new(()),
            stdin_consumer: IrqSafeSpinlock::new(()),
        }
    }
}

impl<D, M, P> Mailbox<D, M, P>
where
    D: DeviceControlRegisters,
    M: SharedMemory,
    P: Platform,
{
    /// Writes console output. A newline sends everything buffered up to and
    /// including it.
    pub fn put_chars(&self, data: &[u8]) -> Result<usize> {
        let _producer = self.console.stdout_producer.lock(&self.platform);
        for &byte in data {
            while !self.console.stdout.push(byte) {
                self.flush_stdout()?;
            }
            if byte == b'\n' {
                self.flush_stdout()?;
            }
        }
        Ok(data.len())
    }

    pub fn putc(&self, byte: u8) -> Result<()> {
        self.put_chars(&[byte]).map(drop)
    }

    pub fn put_str(&self, text: &str) -> Result<usize> {
        self.put_chars(text.as_bytes())
    }

    /// Sends all buffered console output and returns the number of bytes
    /// sent.
    ///
    /// The output goes out in as few STDOUT frames as the outbox allows.
    pub fn flush_stdout(&self) -> Result<usize> {
        let _consumer = self.console.stdout_consumer.lock(&self.platform);
        let cap = OutboundCommand::Stdout.max_payload(self.adapter.capacity(Ring::Outbox));
        let mut total = 0;
        loop {
            let sent = self.console.stdout.with_pending(|first, second| {
                let first = &first[..core::cmp::min(first.len(), cap)];
                let second = &second[..core::cmp::min(second.len(), cap - first.len())];
                match self.send_vectored(OutboundCommand::Stdout, &[first, second]) {
                    Ok(sent) => (sent, Ok(sent)),
                    Err(error) => (0, Err(error)),
                }
            });
            let sent = self.checked(sent)??;
            if sent == 0 {
                return Ok(total);
            }
            total += sent;
        }
    }

    /// Picks up pending inbox messages, then copies buffered console input to
    /// `buf`. Returns the number of bytes copied; never blocks.
    pub fn poll_inbox(&self, buf: &mut [u8]) -> Result<usize> {
        if let Err(error) = self.drain_inbox() {
            warn!("inbox: {error}");
        }
        let _consumer = self.console.stdin_consumer.lock(&self.platform);
        self.checked(self.console.stdin.pop_into(buf))
    }

    pub fn getc_poll(&self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        let count = self.poll_inbox(&mut byte)?;
        Ok((count == 1).then_some(byte[0]))
    }

    /// Waits for a byte of console input. Must only be called where the
    /// caller may sleep.
    pub fn getc(&self) -> Result<u8> {
        let mut wait = SpinWait::new(
            &self.platform,
            WaitContext::MaySleep,
            self.config.poll_interval_us,
            self.config.max_backoff_us,
        );
        loop {
            if let Some(byte) = self.getc_poll()? {
                return Ok(byte);
            }
            wait.wait();
        }
    }

    /// Returns a [`fmt::Write`] adaptor for the console.
    pub fn writer(&self) -> ConsoleWriter<'_, D, M, P> {
        ConsoleWriter { mailbox: self }
    }
}

pub struct ConsoleWriter<'a, D, M, P> {
    mailbox: &'a Mailbox<D, M, P>,
}

impl<D, M, P> fmt::Write for ConsoleWriter<'_, D, M, P>
where
    D: DeviceControlRegisters,
    M: SharedMemory,
    P: Platform,
{
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.mailbox.put_str(s).map(drop).map_err(|_| fmt::Error)
    }
}

/// Fixed-size text buffer for formatting without allocating. Output that
/// does not fit is dropped at a character boundary.
pub struct LineBuffer<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self { buf: [0; N], len: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for LineBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut count = core::cmp::min(s.len(), N - self.len);
        while !s.is_char_boundary(count) {
            count -= 1;
        }
        self.buf[self.len..self.len + count].copy_from_slice(&s.as_bytes()[..count]);
        self.len += count;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
