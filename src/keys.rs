//! Key material for the ES module.
//!
//! IOS keeps its secrets in a fixed key table addressed by slot number. Guest
//! software asks ES to encrypt or decrypt with a slot (never with raw key
//! bytes), so the emulated table only has to hold the keys guests actually
//! use:
//!
//! * **SD key** (slot 6) is the only slot populated with a real value by
//!   default. It protects save data exported to SD cards.
//! * **Common key** is not reachable through the ioctlv interface. It unwraps
//!   the title key stored inside every ticket.
//! * All other slots are zero placeholders unless a key file provides them.
//!
//! ## Key file format
//! Plain text, `name = hex_value` per line, comments prefixed with `;`.
//! Unknown names are ignored.

use std::io::{BufRead, BufReader, Read};

use crate::{Error, Result};

/// Number of slots in the IOS key table.
pub const KEY_TABLE_SIZE: usize = 11;

/// Wii common key, used to decrypt ticket title keys.
pub const COMMON_KEY: [u8; 16] = [
    0xeb, 0xe4, 0x2a, 0x22, 0x5e, 0x85, 0x93, 0xe4, 0x48, 0xd9, 0xc5, 0x45, 0x73, 0x81, 0xaa, 0xf7,
];

/// SD card key.
pub const SD_KEY: [u8; 16] = [
    0xab, 0x01, 0xb9, 0xd8, 0xe1, 0x62, 0x2b, 0x08, 0xaf, 0xba, 0xd8, 0x4d, 0xbf, 0xc2, 0xa5, 0x5d,
];

/// Slot numbers of the IOS key table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum KeyIndex {
    EccPrivate = 0,
    ConsoleId = 1,
    NandAes = 2,
    NandHmac = 3,
    Common = 4,
    PrngSeed = 5,
    Sd = 6,
    Unknown7 = 7,
    Unknown8 = 8,
    Unknown9 = 9,
    Unknown10 = 10,
}

impl TryFrom<u32> for KeyIndex {
    type Error = Error;
    fn try_from(v: u32) -> Result<Self> {
        Ok(match v {
            0 => Self::EccPrivate,
            1 => Self::ConsoleId,
            2 => Self::NandAes,
            3 => Self::NandHmac,
            4 => Self::Common,
            5 => Self::PrngSeed,
            6 => Self::Sd,
            7 => Self::Unknown7,
            8 => Self::Unknown8,
            9 => Self::Unknown9,
            10 => Self::Unknown10,
            _ => return Err(Error::UnknownKeyIndex(v)),
        })
    }
}

/// The emulated IOS key table.
///
/// Slot 0 holds a 30-byte ECC private key; AES operations on that slot use
/// its first 16 bytes, as IOS does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTable {
    ecc_private_key: [u8; 0x1e],
    slots: [[u8; 16]; KEY_TABLE_SIZE],
    common_key: [u8; 16],
}

impl Default for KeyTable {
    fn default() -> Self {
        let mut ecc_private_key = [0u8; 0x1e];
        ecc_private_key[0x1d] = 0x01;

        let mut slots = [[0u8; 16]; KEY_TABLE_SIZE];
        slots[KeyIndex::Sd as usize] = SD_KEY;

        Self {
            ecc_private_key,
            slots,
            common_key: COMMON_KEY,
        }
    }
}

impl KeyTable {
    /// Create a table holding the built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// AES key stored in `index`.
    pub fn aes_key(&self, index: KeyIndex) -> [u8; 16] {
        match index {
            KeyIndex::EccPrivate => {
                let mut key = [0u8; 16];
                key.copy_from_slice(&self.ecc_private_key[..16]);
                key
            }
            other => self.slots[other as usize],
        }
    }

    /// The ECC private key in slot 0.
    pub fn ecc_private_key(&self) -> &[u8; 0x1e] {
        &self.ecc_private_key
    }

    /// The common key used to unwrap ticket title keys.
    pub fn common_key(&self) -> &[u8; 16] {
        &self.common_key
    }

    /// Override slots from a key file.
    ///
    /// Lines beginning with `;` and blank lines are ignored; malformed values
    /// are skipped so a partially valid file still applies what it can.
    pub fn load_keys<R: Read>(&mut self, reader: R) -> Result<()> {
        let buf = BufReader::new(reader);
        for line in buf.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();

            if name == "ecc_private_key" {
                if let Ok(key) = decode_hex::<0x1e>(value) {
                    self.ecc_private_key = key;
                }
                continue;
            }
            if name == "common_key" {
                if let Ok(key) = decode_hex::<16>(value) {
                    self.common_key = key;
                }
                continue;
            }
            // The NAND HMAC key is 20 bytes; only its AES-sized prefix is
            // addressable through the table.
            if name == "nand_hmac"
                && let Ok(key) = decode_hex::<20>(value)
            {
                self.slots[KeyIndex::NandHmac as usize].copy_from_slice(&key[..16]);
                continue;
            }

            let slot = match name {
                "console_id" => KeyIndex::ConsoleId,
                "nand_aes_key" => KeyIndex::NandAes,
                "prng_seed" => KeyIndex::PrngSeed,
                "sd_key" => KeyIndex::Sd,
                _ => continue,
            };
            if let Ok(key) = decode_hex::<16>(value) {
                self.slots[slot as usize] = key;
            }
        }
        Ok(())
    }
}

fn decode_hex<const N: usize>(s: &str) -> std::result::Result<[u8; N], hex::FromHexError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(s.trim(), &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_only_populate_sd_slot() {
        let keys = KeyTable::new();
        assert_eq!(keys.aes_key(KeyIndex::Sd), SD_KEY);
        assert_eq!(keys.aes_key(KeyIndex::NandAes), [0u8; 16]);
        assert_eq!(keys.aes_key(KeyIndex::EccPrivate), [0u8; 16]);
        assert_eq!(keys.ecc_private_key()[0x1d], 1);
        assert_eq!(keys.common_key(), &COMMON_KEY);
    }

    #[test]
    fn key_index_bounds() {
        assert_eq!(KeyIndex::try_from(6).unwrap(), KeyIndex::Sd);
        assert_eq!(KeyIndex::try_from(10).unwrap(), KeyIndex::Unknown10);
        assert!(matches!(KeyIndex::try_from(11), Err(Error::UnknownKeyIndex(11))));
    }

    #[test]
    fn key_file_overrides_known_slots() {
        let file = "\
; comment line
sd_key = 000102030405060708090a0b0c0d0e0f

nand_aes_key=ffffffffffffffffffffffffffffffff
nand_hmac = 0102030405060708090a0b0c0d0e0f1011121314
prng_seed = not-hex
mystery_key = 00
";
        let mut keys = KeyTable::new();
        keys.load_keys(file.as_bytes()).unwrap();

        let expected_sd: [u8; 16] = core::array::from_fn(|i| i as u8);
        assert_eq!(keys.aes_key(KeyIndex::Sd), expected_sd);
        assert_eq!(keys.aes_key(KeyIndex::NandAes), [0xff; 16]);
        assert_eq!(keys.aes_key(KeyIndex::NandHmac)[0], 0x01);
        assert_eq!(keys.aes_key(KeyIndex::NandHmac)[15], 0x10);
        assert_eq!(keys.aes_key(KeyIndex::PrngSeed), [0u8; 16]);
    }
}
