use std::time::{Duration, Instant};

use crate::com::Com;
use crate::crc16::{get_checksum, get_crc16};
use crate::protocol::Download;
use crate::storage::FileStorageHandler;

use super::block0;
use super::constants::{
    ACK, BS, CAN, CPMEOF, DEFAULT_BLOCK_LENGTH, EOT, EXT_BLOCK_LENGTH, NAK, SOH, STX,
};
use super::detect::ProtocolDetector;
use super::err::{TransferError, TransferResult};
use super::OverrunOption;

/// Inter-block wait for the first byte of a header.
const HEADER_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Per-byte wait once inside a block, and for draining the line.
const BLOCK_TIMEOUT: Duration = Duration::from_millis(1000);
/// Per-attempt wait on the handshake probes of the detection ladder.
const PROBE_TIMEOUT: Duration = Duration::from_millis(2000);

/// All errors are retried this many times per block.
const BLOCK_RETRIES: usize = 10;
/// CANs (and BSs) emitted by the graceful abort sequence.
const CAN_COUNT: usize = 8;

/// Receiver session for the X/YModem protocol family.
///
/// One [`Ry::download`] call is one session: it figures out which dialect
/// the sender speaks, then receives one file (XModem) or a batch (YModem)
/// into the given storage. Completed files are collected in `files`.
///
/// specification: <http://pauillac.inria.fr/~doligez/zmodem/ymodem.txt>
pub struct Ry {
    detector: ProtocolDetector,
    /// Byte that opened the transfer, reused to request every further file
    /// of a batch.
    handshake: Option<u8>,
    /// One byte read while only waiting for the line to become active,
    /// handed back to the next header read.
    waiting_byte: Option<u8>,
    overrun_option: OverrunOption,

    pub files: Vec<Download>,
    pub errors: usize,
}

impl Ry {
    pub fn new() -> Self {
        Ry {
            detector: ProtocolDetector::new(),
            handshake: None,
            waiting_byte: None,
            overrun_option: OverrunOption::default(),
            files: Vec::new(),
            errors: 0,
        }
    }

    pub fn set_overrun_option(&mut self, option: OverrunOption) {
        self.overrun_option = option;
    }

    pub fn detector(&self) -> &ProtocolDetector {
        &self.detector
    }

    pub fn get_received_files(&mut self) -> Vec<Download> {
        std::mem::take(&mut self.files)
    }

    /// Runs a download session to completion.
    ///
    /// On any fatal outcome the graceful abort sequence is emitted and the
    /// partially written file of the current transfer is deleted; files
    /// delivered earlier in a batch remain in `files`.
    pub fn download<T: Com, S: FileStorageHandler>(
        &mut self,
        com: &mut T,
        storage: &mut S,
    ) -> TransferResult<()> {
        self.detector = ProtocolDetector::new();
        self.handshake = None;
        self.waiting_byte = None;
        match self.run(com, storage) {
            Ok(()) => Ok(()),
            Err(TransferError::UserCancel) => {
                self.cancel(com, "Download cancelled by user.");
                Err(TransferError::UserCancel)
            }
            Err(err) => {
                self.cancel(com, &format!("Download cancelled: {err}"));
                Err(err)
            }
        }
    }

    fn run<T: Com, S: FileStorageHandler>(
        &mut self,
        com: &mut T,
        storage: &mut S,
    ) -> TransferResult<()> {
        loop {
            self.send_handshake(com)?;
            if !self.download_file(com, storage)? {
                return Ok(());
            }
        }
    }

    /// Sends the handshake and waits for the sender to react.
    ///
    /// The first time through this walks the detection ladder: 'G' marks a
    /// streaming (YModem-G) receiver, 'C' requests CRC mode, NAK falls back
    /// to checksum mode. Within a batch the established handshake byte is
    /// reused for every further file.
    fn send_handshake<T: Com>(&mut self, com: &mut T) -> TransferResult<()> {
        // wait until nothing is coming in
        self.purge(com, false)?;
        if let Some(handshake) = self.handshake {
            for _ in 0..10 {
                com.write(&[handshake])?;
                if self.wait_for_data(com, HEADER_TIMEOUT)? {
                    return Ok(());
                }
            }
            return Err(TransferError::HandshakeTimeout);
        }
        com.log("Checking for YModem-G...");
        for _ in 0..3 {
            com.write(&[b'G'])?;
            if self.wait_for_data(com, PROBE_TIMEOUT)? {
                self.detector.set_streaming(com, true);
                self.handshake = Some(b'G');
                return Ok(());
            }
        }
        self.detector.set_streaming(com, false);
        com.log("Checking for YModem-Batch, XModem-1K or XModem-CRC...");
        for _ in 0..3 {
            com.write(&[b'C'])?;
            if self.wait_for_data(com, PROBE_TIMEOUT)? {
                self.detector.set_crc(com, true);
                self.handshake = Some(b'C');
                return Ok(());
            }
        }
        self.detector.set_crc(com, false);
        com.log("Starting XModem-Checksum...");
        for _ in 0..4 {
            com.write(&[NAK])?;
            if self.wait_for_data(com, PROBE_TIMEOUT)? {
                self.handshake = Some(NAK);
                return Ok(());
            }
        }
        Err(TransferError::HandshakeTimeout)
    }

    /// Downloads one file. True if possibly more files follow in a batch.
    fn download_file<T: Com, S: FileStorageHandler>(
        &mut self,
        com: &mut T,
        storage: &mut S,
    ) -> TransferResult<bool> {
        let result = self.receive_file(com, storage);
        if result.is_err() {
            // drop a partially written file; earlier files of the batch stay
            let _ = storage.remove();
        }
        result
    }

    fn receive_file<T: Com, S: FileStorageHandler>(
        &mut self,
        com: &mut T,
        storage: &mut S,
    ) -> TransferResult<bool> {
        let mut end_of_file = false;
        let mut prev_block_num: Option<u8> = None;
        let mut download: Option<Download> = None;
        let mut count: u64 = 0;
        let mut possible_last_packet = false;
        let start = Instant::now();

        loop {
            let mut retries = 0;
            while retries < BLOCK_RETRIES {
                let Some(header) = self.read_header(com)? else {
                    self.nak_or_abort(com, "Timed out waiting for block header.")?;
                    retries += 1;
                    continue;
                };
                if header[0] == EOT || header[0] == CPMEOF {
                    if !end_of_file && !self.detector.is_streaming {
                        // make them send EOT twice, in case of glitched data
                        end_of_file = true;
                        self.nak(com, "Doublecheck EOT.")?;
                        retries += 1;
                        continue;
                    }
                    if let Some(download) = download.take() {
                        self.finish_file(com, storage, download, count, possible_last_packet, start)?;
                    }
                    com.write(&[ACK])?;
                    return Ok(self.detector.is_batch);
                }
                let packet_size = match header[0] {
                    SOH => DEFAULT_BLOCK_LENGTH,
                    STX => EXT_BLOCK_LENGTH,
                    byte => {
                        self.nak_or_abort(com, &format!("Invalid packet header (0x{byte:02x})."))?;
                        retries += 1;
                        continue;
                    }
                };
                let Some(block_num) = get_block_num(&header) else {
                    self.nak_or_abort(
                        com,
                        &format!("Invalid block number (0x{:02x}).", header[1]),
                    )?;
                    retries += 1;
                    continue;
                };
                // A valid block number is either the expected one or a repeat
                // of the previous block (the sender missed our ACK). Anything
                // else is a fatal loss of synchronization.
                if !valid_block_num(block_num, prev_block_num) {
                    return Err(TransferError::OutOfSequence(block_num));
                }
                log::debug!("reading {packet_size} byte packet");
                let Some(packet) = self.read_bytes(com, packet_size, BLOCK_TIMEOUT)? else {
                    self.nak_or_abort(com, "Timed out waiting for block data.")?;
                    retries += 1;
                    continue;
                };
                let crc_len = if self.detector.is_crc { 2 } else { 1 };
                let Some(crc) = self.read_bytes(com, crc_len, BLOCK_TIMEOUT)? else {
                    self.nak_or_abort(com, "Timed out waiting for block CRC/checksum.")?;
                    retries += 1;
                    continue;
                };
                if !self.check_crc(&packet, &crc) {
                    self.nak_or_abort(com, "Invalid block CRC/checksum.")?;
                    retries += 1;
                    continue;
                }
                if prev_block_num.is_none() {
                    if block_num == 0x00 {
                        self.detector.set_batch(com, true);
                        let Some(info) = block0::parse(&packet) else {
                            // a null pathname terminates the batch
                            com.log("No more files to download.");
                            if !self.detector.is_streaming {
                                com.write(&[ACK])?;
                            }
                            return Ok(false);
                        };
                        let path = storage
                            .open_file(&info.name)
                            .map_err(TransferError::CreateFile)?;
                        let mut message = format!("Downloading {}", info.name);
                        if info.length > 0 {
                            message += &format!(" ({})", format_bytes(info.length));
                        }
                        com.log(&message);
                        download = Some(Download {
                            file: path,
                            name: Some(info.name),
                            length: info.length,
                            modified: info.modified,
                            mode: info.mode,
                            serial: info.serial,
                        });
                        com.progress(count, info.length);
                        prev_block_num = Some(block_num);
                        if !self.detector.is_streaming {
                            com.write(&[ACK])?;
                        }
                        // ask for block 1 of the file itself
                        if let Some(handshake) = self.handshake {
                            com.write(&[handshake])?;
                        }
                        break;
                    } else if block_num == 0x01 {
                        self.detector.set_batch(com, false);
                        let path = storage
                            .open_unnamed_file()
                            .map_err(TransferError::CreateFile)?;
                        download = Some(Download::new(path));
                        self.detector.set_1k(com, header[0] == STX);
                        com.progress(count, 0);
                    }
                }
                // only process the block if it's not a repeat
                if prev_block_num != Some(block_num) {
                    let Some(download) = download.as_ref() else {
                        // unreachable by the block number rules, but never
                        // write without an open file
                        return Err(TransferError::OutOfSequence(block_num));
                    };
                    if possible_last_packet {
                        // the previous packet was supposed to be the last,
                        // but here we are with another one
                        if self.overrun_option == OverrunOption::Error {
                            return Err(TransferError::LengthExceeded {
                                length: download.length,
                            });
                        }
                        com.log(&format!(
                            "File has exceeded its declared length: {}",
                            format_bytes(download.length)
                        ));
                        possible_last_packet = false;
                    }
                    let after_packet = count + packet.len() as u64;
                    // this packet crossing the declared length marks it as
                    // the expected last one, unless more follow
                    if download.length != 0 && count < download.length && after_packet >= download.length
                    {
                        possible_last_packet = true;
                    }
                    if download.length == 0
                        || count <= download.length
                        || matches!(
                            self.overrun_option,
                            OverrunOption::Accept | OverrunOption::Mixed
                        )
                    {
                        storage.append(&packet).map_err(TransferError::WriteFile)?;
                        count = after_packet;
                    } else {
                        // already past the declared length under Ignore
                        log::debug!("dropping packet past the declared length");
                    }
                    com.progress(count, download.length);
                    prev_block_num = Some(block_num);
                }
                if !self.detector.is_streaming {
                    com.write(&[ACK])?;
                }
                break;
            }
            if retries >= BLOCK_RETRIES {
                return Err(TransferError::TooManyErrors);
            }
        }
    }

    /// Applies the overrun policy, restores the sender mtime and closes the
    /// finished file.
    fn finish_file<T: Com, S: FileStorageHandler>(
        &mut self,
        com: &mut T,
        storage: &mut S,
        download: Download,
        count: u64,
        possible_last_packet: bool,
        start: Instant,
    ) -> TransferResult<()> {
        if download.length != 0 {
            if count < download.length {
                // file ended before the expected packet
                com.log("Received file was shorter than declared length.");
                com.log(&format!(
                    "{} / {} (short {}).",
                    format_bytes(count),
                    format_bytes(download.length),
                    format_bytes(download.length - count)
                ));
            } else if count > download.length {
                if possible_last_packet {
                    // file ended on the expected packet; everything past the
                    // declared length is padding, unless told to keep it
                    if self.overrun_option != OverrunOption::Accept {
                        log::debug!("truncating download from {count} to {}", download.length);
                        storage
                            .set_current_size_to(download.length)
                            .map_err(TransferError::WriteFile)?;
                    }
                } else if self.overrun_option == OverrunOption::Ignore {
                    log::debug!("truncating download from {count} to {}", download.length);
                    storage
                        .set_current_size_to(download.length)
                        .map_err(TransferError::WriteFile)?;
                } else {
                    // be forgiving: the file really was longer than claimed
                    com.log("Received file was longer than declared length.");
                    com.log(&format!(
                        "{} / {} (extra {}).",
                        format_bytes(count),
                        format_bytes(download.length),
                        format_bytes(count - download.length)
                    ));
                }
            }
        }
        storage.close().map_err(TransferError::WriteFile)?;
        if let Some(modified) = download.modified {
            // best effort; the download stands even if the mtime does not
            let _ = storage.set_modified(modified);
        }
        let elapsed = start.elapsed();
        com.log(&format!(
            "Download complete.  Elapsed time: {} ({})",
            format_elapsed_time(elapsed),
            format_bps(count, elapsed)
        ));
        log::debug!("file: {}", download.file.display());
        self.files.push(download);
        Ok(())
    }

    /// Reads the next block header: start byte, block number, complement.
    ///
    /// Returns early when the first byte is EOT or EOF (end of file), fails
    /// on two consecutive CANs (sender abort), and returns `None` on
    /// timeout. Headers that don't frame a block are handed to the caller
    /// to classify.
    fn read_header<T: Com>(&mut self, com: &mut T) -> TransferResult<Option<[u8; 3]>> {
        log::debug!("reading header");
        let mut header = [0u8; 3];
        let Some(ch) = self.read_data(com, HEADER_TIMEOUT)? else {
            return Ok(None);
        };
        header[0] = ch;
        if ch == EOT || ch == CPMEOF {
            return Ok(Some(header));
        }
        if ch == CAN {
            let Some(ch) = self.read_data(com, BLOCK_TIMEOUT)? else {
                return Ok(None);
            };
            if ch == CAN {
                return Err(TransferError::SenderCancel);
            }
            // not a valid header, but not a cancel either
            header[1] = ch;
            return Ok(Some(header));
        }
        if ch != SOH && ch != STX {
            return Ok(Some(header));
        }
        let Some(bytes) = self.read_bytes(com, 2, BLOCK_TIMEOUT)? else {
            return Ok(None);
        };
        header[1] = bytes[0];
        header[2] = bytes[1];
        Ok(Some(header))
    }

    fn check_crc(&self, packet: &[u8], crc: &[u8]) -> bool {
        if self.detector.is_crc {
            u16::from_be_bytes([crc[0], crc[1]]) == get_crc16(packet)
        } else {
            crc[0] == get_checksum(packet)
        }
    }

    /// Purges waiting data and NAKs, or aborts when streaming: YModem-G has
    /// no block level recovery at all.
    fn nak_or_abort<T: Com>(&mut self, com: &mut T, message: &str) -> TransferResult<()> {
        if self.detector.is_streaming {
            log::debug!("abort: {message}");
            return Err(TransferError::Abort(message.to_string()));
        }
        self.nak(com, message)
    }

    fn nak<T: Com>(&mut self, com: &mut T, message: &str) -> TransferResult<()> {
        log::debug!("NAK: {message}");
        self.errors += 1;
        // wait for the line to clear, so the resend starts clean
        self.purge(com, false)?;
        com.write(&[NAK])?;
        Ok(())
    }

    /// Emits the graceful abort sequence: eight CANs to stop the sender,
    /// eight BSs to wipe them from a remote keyboard buffer.
    fn cancel<T: Com>(&mut self, com: &mut T, message: &str) {
        log::debug!("cancel: {message}");
        com.log(message);
        if self.detector.is_streaming {
            // a YModem-G sender streams blocks without waiting for ACKs, so
            // the purge below would never see the line go quiet. Two CANs up
            // front stop it.
            let _ = com.write(&[CAN, CAN]);
        }
        if let Err(TransferError::UserCancel) = self.purge(com, true) {
            // already cancelling
        }
        let count = if self.detector.is_streaming {
            CAN_COUNT - 2
        } else {
            CAN_COUNT
        };
        for _ in 0..count {
            let _ = com.write(&[CAN]);
        }
        for _ in 0..CAN_COUNT {
            let _ = com.write(&[BS]);
        }
    }

    /// Drains the inbound queue until it goes quiet. With `watch_cancel`,
    /// also returns once the echo of the abort sequence (8 CAN, 8 BS) has
    /// been read back.
    fn purge<T: Com>(&mut self, com: &mut T, watch_cancel: bool) -> TransferResult<()> {
        log::debug!("purge");
        let mut can = 0;
        let mut bs = 0;
        while let Some(ch) = self.read_data(com, BLOCK_TIMEOUT)? {
            if !watch_cancel {
                continue;
            }
            if can < CAN_COUNT {
                if ch == CAN {
                    can += 1;
                } else {
                    can = 0;
                }
            } else if bs < CAN_COUNT {
                if ch == BS {
                    bs += 1;
                } else {
                    can = 0;
                    bs = 0;
                }
            } else {
                // found the echoed cancel sequence
                return Ok(());
            }
        }
        Ok(())
    }

    fn read_bytes<T: Com>(
        &mut self,
        com: &mut T,
        num: usize,
        timeout: Duration,
    ) -> TransferResult<Option<Vec<u8>>> {
        let mut bytes = Vec::with_capacity(num);
        for _ in 0..num {
            match self.read_data(com, timeout)? {
                Some(b) => bytes.push(b),
                None => return Ok(None),
            }
        }
        Ok(Some(bytes))
    }

    fn read_data<T: Com>(
        &mut self,
        com: &mut T,
        timeout: Duration,
    ) -> TransferResult<Option<u8>> {
        if let Some(b) = self.waiting_byte.take() {
            return Ok(Some(b));
        }
        com.read_byte(timeout)
    }

    /// Waits for the next byte to become available without consuming it.
    fn wait_for_data<T: Com>(&mut self, com: &mut T, timeout: Duration) -> TransferResult<bool> {
        if self.waiting_byte.is_some() {
            return Ok(true);
        }
        self.waiting_byte = com.read_byte(timeout)?;
        Ok(self.waiting_byte.is_some())
    }
}

impl Default for Ry {
    fn default() -> Self {
        Self::new()
    }
}

fn get_block_num(header: &[u8; 3]) -> Option<u8> {
    if header[1] ^ 0xFF == header[2] {
        Some(header[1])
    } else {
        None
    }
}

fn valid_block_num(block_num: u8, prev_block_num: Option<u8>) -> bool {
    match prev_block_num {
        None => block_num == 0x00 || block_num == 0x01,
        Some(prev) => block_num == prev || block_num == prev.wrapping_add(1),
    }
}

pub fn format_elapsed_time(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub fn format_bps(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return format!("{}Bps", format_kmgt(0.0));
    }
    format!("{}Bps", format_kmgt(bytes as f64 / secs))
}

pub fn format_bytes(bytes: u64) -> String {
    format!("{}Bytes", format_kmgt(bytes as f64))
}

fn format_kmgt(mut value: f64) -> String {
    if value < 1024.0 {
        return format!("{value:.0} ");
    }
    value /= 1024.0;
    if value < 1024.0 {
        return format!("{value:.3} K");
    }
    value /= 1024.0;
    if value < 1024.0 {
        return format!("{value:.3} M");
    }
    value /= 1024.0;
    if value < 1024.0 {
        return format!("{value:.3} G");
    }
    value /= 1024.0;
    format!("{value:.3} T")
}
