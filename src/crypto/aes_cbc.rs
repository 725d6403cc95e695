//! AES-128-CBC with a rolling IV.

use aes::Aes128;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::{Error, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Encrypt `data` and advance `iv` to the last ciphertext block.
///
/// `data.len()` must be a multiple of [`BLOCK_SIZE`]. Empty input is allowed
/// and leaves `iv` untouched.
pub fn encrypt_cbc(key: &[u8; 16], iv: &mut [u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    check_len(data.len())?;
    let mut out = data.to_vec();
    if out.is_empty() {
        return Ok(out);
    }
    let len = out.len();
    Aes128CbcEnc::new(key.into(), (&*iv).into())
        .encrypt_padded_mut::<NoPadding>(&mut out, len)
        .map_err(|_| Error::UnalignedLength(len))?;
    iv.copy_from_slice(&out[len - BLOCK_SIZE..]);
    Ok(out)
}

/// Decrypt `data` and advance `iv` to the last ciphertext block.
///
/// `data.len()` must be a multiple of [`BLOCK_SIZE`]. Empty input is allowed
/// and leaves `iv` untouched.
pub fn decrypt_cbc(key: &[u8; 16], iv: &mut [u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    check_len(data.len())?;
    let mut out = data.to_vec();
    if out.is_empty() {
        return Ok(out);
    }
    let len = out.len();
    Aes128CbcDec::new(key.into(), (&*iv).into())
        .decrypt_padded_mut::<NoPadding>(&mut out)
        .map_err(|_| Error::UnalignedLength(len))?;
    iv.copy_from_slice(&data[len - BLOCK_SIZE..]);
    Ok(out)
}

/// IV used for title content: the content index, big-endian, zero extended.
pub fn content_iv(index: u16) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..2].copy_from_slice(&index.to_be_bytes());
    iv
}

/// Unwrap a ticket's encrypted title key.
pub fn decrypt_title_key(common_key: &[u8; 16], encrypted: &[u8; 16], title_id: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&title_id.to_be_bytes());

    let mut key = *encrypted;
    // A single block always decrypts.
    if let Ok(plain) = decrypt_cbc(common_key, &mut iv, encrypted) {
        key.copy_from_slice(&plain);
    }
    key
}

fn check_len(len: usize) -> Result<()> {
    if len % BLOCK_SIZE != 0 {
        return Err(Error::UnalignedLength(len));
    }
    Ok(())
}
