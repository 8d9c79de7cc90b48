use std::path::PathBuf;
use std::time::SystemTime;

pub mod xymodem;
pub use xymodem::*;

/// Details of one received file, surfaced after its transfer completes.
#[derive(Debug, Clone)]
pub struct Download {
    /// Path of the local copy of the file.
    pub file: PathBuf,
    /// File name as supplied by the sender. `None` when the protocol carries
    /// no file information and the receiver chose a synthetic name.
    pub name: Option<String>,
    /// Length declared by the sender; 0 when unknown.
    pub length: u64,
    /// Modification time declared by the sender, if any.
    pub modified: Option<SystemTime>,
    /// Unix file mode declared by the sender; 0 when not sent.
    pub mode: u32,
    /// Serial number of the sending program; 0 when not sent.
    pub serial: u32,
}

impl Download {
    pub fn new(file: PathBuf) -> Self {
        Self {
            file,
            name: None,
            length: 0,
            modified: None,
            mode: 0,
            serial: 0,
        }
    }
}
