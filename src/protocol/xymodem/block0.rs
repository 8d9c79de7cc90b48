//! Parser for the YModem file header block (block 0).
//!
//! Layout: a null terminated pathname, then optional fields separated by
//! single spaces, the list ending at a NUL or at the end of the block:
//! decimal length, octal modification time, octal mode, octal serial number.
//! Fields may not be skipped, so parsing stops at the first absent field.
//! The rest of the block is nulls.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Metadata carried by a non-empty block 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block0 {
    pub name: String,
    pub length: u64,
    pub modified: Option<SystemTime>,
    pub mode: u32,
    pub serial: u32,
}

/// Splits block 0 into its up to five tokens.
fn read_strings(packet: &[u8]) -> [Option<String>; 5] {
    let mut strings: [Option<String>; 5] = Default::default();
    let mut cur = String::new();
    let mut str_num = 0;
    for &b in packet {
        if b == 0x00 {
            if !cur.is_empty() {
                strings[str_num] = Some(std::mem::take(&mut cur));
                str_num += 1;
                if str_num == 1 {
                    // the null terminated pathname; fields follow
                    continue;
                }
            }
            break;
        }
        if b == 0x20 {
            strings[str_num] = Some(std::mem::take(&mut cur));
            str_num += 1;
            if str_num == strings.len() {
                break;
            }
            continue;
        }
        cur.push(b as char);
    }
    strings
}

/// Parses a block 0 packet. `None` means an empty pathname: the batch is
/// over.
///
/// An unparsable numeric field is silently left at its default and parsing
/// continues with the next field, so a 0 is indistinguishable from an
/// omitted field. A modification time of 0 means unknown and maps to `None`.
pub fn parse(packet: &[u8]) -> Option<Block0> {
    let strings = read_strings(packet);
    let mut iter = strings.into_iter();

    let name = iter.next().flatten()?;
    log::debug!("block 0 name: {name:?}");
    let mut block0 = Block0 {
        name,
        length: 0,
        modified: None,
        mode: 0,
        serial: 0,
    };

    let Some(Some(length)) = iter.next() else {
        return Some(block0);
    };
    if let Ok(length) = length.parse::<u64>() {
        block0.length = length;
    }

    let Some(Some(mtime)) = iter.next() else {
        return Some(block0);
    };
    if let Ok(mtime) = u64::from_str_radix(&mtime, 8) {
        if mtime > 0 {
            block0.modified = Some(UNIX_EPOCH + Duration::from_secs(mtime));
        }
    }

    let Some(Some(mode)) = iter.next() else {
        return Some(block0);
    };
    if let Ok(mode) = u32::from_str_radix(&mode, 8) {
        block0.mode = mode;
    }

    let Some(Some(serial)) = iter.next() else {
        return Some(block0);
    };
    if let Ok(serial) = u32::from_str_radix(&serial, 8) {
        block0.serial = serial;
    }

    Some(block0)
}
