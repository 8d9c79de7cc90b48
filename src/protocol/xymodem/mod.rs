pub mod block0;
pub mod constants;
pub mod detect;
pub mod err;
pub mod ry;


pub use detect::{Protocol, ProtocolDetector};
pub use err::{TransferError, TransferResult};
pub use ry::Ry;

/// Behavior options for data received past the end of a downloaded file,
/// when the file length was provided by the sender (YModem).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrunOption {
    /// Ignore the extra data and limit the file to the declared length.
    /// This is what the YModem spec calls for, but loses data when a file
    /// really is longer than the sender reported.
    Ignore,
    /// Enforce the length as in `Ignore` when the file ends on the expected
    /// packet; cancel the download when additional packets follow.
    Error,
    /// Keep all extra data. Every downloaded file is padded to the packet
    /// size, like XModem.
    Accept,
    /// Enforce the length when the file ends on the expected packet; keep
    /// the data when additional packets follow.
    #[default]
    Mixed,
}
