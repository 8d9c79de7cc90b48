use std::io;

use thiserror::Error;

use super::ry::format_bytes;

pub type TransferResult<T> = Result<T, TransferError>;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Download cancelled by user.")]
    UserCancel,
    #[error("Handshake timed out.")]
    HandshakeTimeout,
    #[error("Cancel received from sender.")]
    SenderCancel,
    #[error("Out of sequence block number (0x{0:02x}).")]
    OutOfSequence(u8),
    #[error("Too many errors.  Download aborted.")]
    TooManyErrors,
    #[error("File has exceeded its declared length: {}", format_bytes(*length))]
    LengthExceeded { length: u64 },
    #[error("{0}")]
    Abort(String),
    #[error("Error creating file.")]
    CreateFile(#[source] io::Error),
    #[error("Error writing file.")]
    WriteFile(#[source] io::Error),
    #[error("Connection error.")]
    Io(#[from] io::Error),
}
