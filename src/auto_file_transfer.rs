//! Detection of an incoming ZModem session in the terminal byte stream.
//!
//! A ZModem sender opens with a ZRQINIT frame, always transmitted as a hex
//! header: `* * ZDLE B <type> <flags> <crc> CR LF XON`. Recognizing it lets a
//! host start the X/YModem receiver; declining the ZModem session makes a
//! capable sender fall back to YModem.

/// Byte-at-a-time matcher for one exact byte sequence.
///
/// The match restarts from the beginning of the pattern on any mismatch;
/// there is no partial backtracking.
pub struct PatternRecognizer {
    pattern: Vec<u8>,
    cur_idx: usize,
}

impl PatternRecognizer {
    pub fn from(data: &[u8]) -> Self {
        Self {
            pattern: data.to_vec(),
            cur_idx: 0,
        }
    }

    pub fn reset(&mut self) {
        self.cur_idx = 0;
    }

    pub fn push_ch(&mut self, ch: u8) -> bool {
        if ch == self.pattern[self.cur_idx] {
            self.cur_idx += 1;
            if self.cur_idx >= self.pattern.len() {
                self.cur_idx = 0;
                return true;
            }
        } else {
            self.cur_idx = 0;
        }
        false
    }
}

// ZRQINIT hex header: ZPAD ZPAD ZDLE ZHEX, then type, ZF3..ZF0 and the CRC
// as two hex digits each, then CR LF XON.
const ZRQINIT_FRAME: &[u8] = b"**\x18B00000000000000\r\n\x11";

/// Watches the inbound stream for the ZModem download invitation.
pub struct AutoFileTransfer {
    zmodem_dl: PatternRecognizer,
}

impl AutoFileTransfer {
    pub fn new() -> Self {
        Self {
            zmodem_dl: PatternRecognizer::from(ZRQINIT_FRAME),
        }
    }

    pub fn reset(&mut self) {
        self.zmodem_dl.reset();
    }

    /// Feeds one byte; true once a complete ZRQINIT frame has been seen.
    pub fn try_transfer(&mut self, ch: u8) -> bool {
        self.zmodem_dl.push_ch(ch)
    }
}

impl Default for AutoFileTransfer {
    fn default() -> Self {
        Self::new()
    }
}
