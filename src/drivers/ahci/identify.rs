//! IDENTIFY DEVICE data parsing

use heapless::String;
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use super::regs::SECTOR_SIZE;

/// Word 83 bit 10: 48-bit address feature set supported
const CMD_SET_2_LBA48: u16 = 1 << 10;

/// IDENTIFY DEVICE response (512 bytes)
///
/// Only the fields the inventory needs are broken out. Strings are stored
/// with the two characters of each word swapped.
#[repr(C, packed)]
#[derive(FromBytes, Immutable, KnownLayout, Unaligned, Clone, Copy)]
pub struct IdentifyData {
    /// Words 0-9
    pub reserved0: [u16; 10],
    /// Words 10-19: serial number
    pub serial: [u8; 20],
    /// Words 20-22
    pub reserved1: [u16; 3],
    /// Words 23-26: firmware revision
    pub firmware: [u8; 8],
    /// Words 27-46: model number
    pub model: [u8; 40],
    /// Words 47-59
    pub reserved2: [u16; 13],
    /// Words 60-61: total user addressable sectors (28-bit)
    pub lba28_sectors: [u16; 2],
    /// Words 62-82
    pub reserved3: [u16; 21],
    /// Word 83: command sets supported
    pub command_set_2: u16,
    /// Words 84-99
    pub reserved4: [u16; 16],
    /// Words 100-103: total user addressable sectors (48-bit)
    pub lba48_sectors: [u16; 4],
    /// Words 104-255
    pub reserved5: [u16; 152],
}

impl IdentifyData {
    /// Parse the first 512 bytes of `bytes`
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let Ok((data, _)) = Self::read_from_prefix(bytes) else {
            return None;
        };
        Some(data)
    }

    pub fn supports_lba48(&self) -> bool {
        let words = self.command_set_2;
        u16::from_le(words) & CMD_SET_2_LBA48 != 0
    }

    /// Addressable sectors
    ///
    /// Uses the 48-bit count when the feature set is supported and the
    /// count is populated, else the 28-bit count.
    pub fn total_sectors(&self) -> u64 {
        if self.supports_lba48() {
            let words = self.lba48_sectors;
            let sectors = words
                .iter()
                .enumerate()
                .fold(0u64, |acc, (i, w)| acc | (u16::from_le(*w) as u64) << (16 * i));
            if sectors != 0 {
                return sectors;
            }
        }
        let words = self.lba28_sectors;
        u16::from_le(words[0]) as u64 | (u16::from_le(words[1]) as u64) << 16
    }

    pub fn model(&self) -> String<40> {
        let raw = self.model;
        let mut s = decode_ata_string::<40>(&raw);
        trim_trailing_spaces(&mut s);
        s
    }

    pub fn firmware(&self) -> String<8> {
        let raw = self.firmware;
        let mut s = decode_ata_string::<8>(&raw);
        trim_trailing_spaces(&mut s);
        s
    }

    /// Serial number with every space removed
    pub fn serial(&self) -> String<20> {
        let raw = self.serial;
        let decoded = decode_ata_string::<20>(&raw);
        let mut s = String::new();
        for c in decoded.chars().filter(|c| *c != ' ') {
            // Never longer than the source
            let _ = s.push(c);
        }
        s
    }
}

/// Undo the per-word byte swap of an ATA string
///
/// NUL becomes a space and anything else outside printable ASCII becomes '?'.
pub fn decode_ata_string<const N: usize>(raw: &[u8]) -> String<N> {
    let mut s = String::new();
    for pair in raw.chunks_exact(2) {
        for &b in [pair[1], pair[0]].iter() {
            let c = match b {
                0 => ' ',
                0x20..=0x7E => b as char,
                _ => '?',
            };
            if s.push(c).is_err() {
                return s;
            }
        }
    }
    s
}

fn trim_trailing_spaces<const N: usize>(s: &mut String<N>) {
    while s.ends_with(' ') {
        s.pop();
    }
}

/// Capacity in GiB, rounded up
pub fn capacity_gib(total_sectors: u64) -> u64 {
    let bytes = total_sectors as u128 * SECTOR_SIZE as u128;
    bytes.div_ceil(1 << 30) as u64
}
