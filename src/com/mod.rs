use std::io;
use std::time::Duration;

use crate::protocol::TransferError;

#[cfg(test)]
pub mod test_com;
#[cfg(test)]
pub use test_com::*;

/// Byte port and event sinks the host hands to the receiver.
///
/// The receiver is fully synchronous; the only suspension point is inside
/// [`Com::read_byte`]. Every inbound byte is consumed exactly once and in
/// transport order.
pub trait Com {
    /// Blocking read of the next inbound byte.
    ///
    /// Returns `Ok(None)` when `timeout` elapses without data, and
    /// `Err(TransferError::UserCancel)` when a host-controlled cancel is
    /// active while blocked.
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, TransferError>;

    /// Sends bytes to the remote sender.
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Human-readable transfer transcript ("Downloading x.txt (200 Bytes)").
    fn log(&mut self, _message: &str) {}

    /// Called after every accepted data block, and once with 0 bytes when a
    /// file is opened. `total` is 0 when the sender declared no length.
    fn progress(&mut self, _bytes: u64, _total: u64) {}
}
