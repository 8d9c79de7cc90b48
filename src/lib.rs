//! Receiver side of the XModem/YModem file transfer protocol family.
//!
//! Supports XModem-Checksum, XModem-CRC, XModem-1K, YModem-Batch and
//! YModem-G over any byte transport the host provides through the [`com::Com`]
//! trait. Implements just enough of ZModem to recognize the ZRQINIT frame
//! (see [`auto_file_transfer`]), relying on automatic sender fallback to
//! X/YModem, if available.

pub mod auto_file_transfer;
pub mod com;
pub mod crc16;
pub mod protocol;
pub mod storage;

pub use protocol::{Download, OverrunOption, Ry, TransferError, TransferResult};
