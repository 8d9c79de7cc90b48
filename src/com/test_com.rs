use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use super::Com;
use crate::protocol::TransferError;

/// One scripted event on the inbound side of a [`TestCom`].
#[derive(Debug, Clone, Copy)]
pub enum ScriptItem {
    Byte(u8),
    Timeout,
    UserCancel,
}

/// Com backed by a pre-scripted inbound byte stream.
///
/// Reads pop the front of the script; an exhausted script reads as an
/// endless timeout. Everything the receiver emits is captured for
/// inspection.
pub struct TestCom {
    input: VecDeque<ScriptItem>,
    pub output: Vec<u8>,
    pub transcript: Vec<String>,
    pub progress_calls: Vec<(u64, u64)>,
}

impl TestCom {
    pub fn new() -> Self {
        Self {
            input: VecDeque::new(),
            output: Vec::new(),
            transcript: Vec::new(),
            progress_calls: Vec::new(),
        }
    }

    pub fn push_byte(&mut self, byte: u8) {
        self.input.push_back(ScriptItem::Byte(byte));
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push_byte(byte);
        }
    }

    /// One elapsed read timeout. Phases of a script that the real sender
    /// separates by waiting for the receiver are separated by one of these.
    pub fn push_timeout(&mut self) {
        self.input.push_back(ScriptItem::Timeout);
    }

    pub fn push_timeouts(&mut self, count: usize) {
        for _ in 0..count {
            self.push_timeout();
        }
    }

    pub fn push_cancel(&mut self) {
        self.input.push_back(ScriptItem::UserCancel);
    }
}

impl Com for TestCom {
    fn read_byte(&mut self, _timeout: Duration) -> Result<Option<u8>, TransferError> {
        match self.input.pop_front() {
            Some(ScriptItem::Byte(byte)) => Ok(Some(byte)),
            Some(ScriptItem::Timeout) | None => Ok(None),
            Some(ScriptItem::UserCancel) => Err(TransferError::UserCancel),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.output.extend_from_slice(buf);
        Ok(())
    }

    fn log(&mut self, message: &str) {
        self.transcript.push(message.to_string());
    }

    fn progress(&mut self, bytes: u64, total: u64) {
        self.progress_calls.push((bytes, total));
    }
}
