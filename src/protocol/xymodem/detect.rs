use crate::com::Com;

/// The five dialects the receiver can end up speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    XModemChecksum,
    XModemCRC,
    XModem1K,
    YModemBatch,
    YModemG,
}

impl Protocol {
    pub fn label(self) -> &'static str {
        match self {
            Protocol::XModemChecksum => "XModem-Checksum",
            Protocol::XModemCRC => "XModem-CRC",
            Protocol::XModem1K => "XModem-1K",
            Protocol::YModemBatch => "YModem-Batch",
            Protocol::YModemG => "YModem-G",
        }
    }
}

const ALL: [Protocol; 5] = [
    Protocol::XModemChecksum,
    Protocol::XModemCRC,
    Protocol::XModem1K,
    Protocol::YModemBatch,
    Protocol::YModemG,
];

/// Checks off protocol options as the handshake and the first blocks reveal
/// them, to identify the dialect in use. Also keeps the flags the session
/// branches on during a download.
///
/// The candidate set only ever shrinks; once it is down to one entry the
/// detected protocol is announced, once per session.
pub struct ProtocolDetector {
    protocols: Vec<Protocol>,
    reported: bool,
    /// Is CRC being used?
    pub is_crc: bool,
    /// Is this a batch transfer?
    pub is_batch: bool,
    /// Is this a streaming transfer?
    pub is_streaming: bool,
}

impl ProtocolDetector {
    pub fn new() -> Self {
        Self {
            protocols: ALL.to_vec(),
            reported: false,
            is_crc: false,
            is_batch: false,
            is_streaming: false,
        }
    }

    /// Dialects still in the running.
    pub fn candidates(&self) -> &[Protocol] {
        &self.protocols
    }

    /// The detected dialect, once the candidates have narrowed to one.
    pub fn detected(&self) -> Option<Protocol> {
        match self.protocols.as_slice() {
            [protocol] => Some(*protocol),
            _ => None,
        }
    }

    fn remove(&mut self, protocol: Protocol) {
        self.protocols.retain(|&p| p != protocol);
    }

    fn log_protocol<T: Com>(&mut self, com: &mut T) {
        if !self.reported && self.protocols.len() == 1 {
            self.reported = true;
            let message = format!("Detected protocol: {}", self.protocols[0].label());
            log::debug!("{message}");
            com.log(&message);
        }
    }

    pub fn set_crc<T: Com>(&mut self, com: &mut T, on: bool) {
        if on {
            self.is_crc = true;
            self.remove(Protocol::XModemChecksum);
        } else {
            self.is_crc = false;
            self.remove(Protocol::XModemCRC);
            self.remove(Protocol::XModem1K);
            self.remove(Protocol::YModemBatch);
            self.remove(Protocol::YModemG);
        }
        self.log_protocol(com);
    }

    pub fn set_streaming<T: Com>(&mut self, com: &mut T, on: bool) {
        if on {
            self.is_crc = true;
            self.is_streaming = true;
            self.remove(Protocol::XModemChecksum);
            self.remove(Protocol::XModemCRC);
            self.remove(Protocol::XModem1K);
            self.remove(Protocol::YModemBatch);
        } else {
            self.is_streaming = false;
            self.remove(Protocol::YModemG);
        }
        self.log_protocol(com);
    }

    pub fn set_batch<T: Com>(&mut self, com: &mut T, on: bool) {
        if on {
            self.is_batch = true;
            self.remove(Protocol::XModemChecksum);
            self.remove(Protocol::XModemCRC);
            self.remove(Protocol::XModem1K);
        } else {
            self.is_batch = false;
            self.remove(Protocol::YModemBatch);
            self.remove(Protocol::YModemG);
        }
        self.log_protocol(com);
    }

    pub fn set_1k<T: Com>(&mut self, com: &mut T, on: bool) {
        if on {
            self.remove(Protocol::XModemChecksum);
            self.remove(Protocol::XModemCRC);
        } else {
            self.remove(Protocol::XModem1K);
            self.remove(Protocol::YModemBatch);
            self.remove(Protocol::YModemG);
        }
        self.log_protocol(com);
    }
}

impl Default for ProtocolDetector {
    fn default() -> Self {
        Self::new()
    }
}
