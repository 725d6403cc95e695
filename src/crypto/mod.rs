//! Cryptographic operations performed by ES.
//!
//! Everything ES encrypts or decrypts uses AES-128-CBC:
//!
//! | Use | Key | IV |
//! |-----|-----|----|
//! | Ticket title key unwrap | common key | title ID (BE) + 8 zero bytes |
//! | Title content import / export | title key | content index (BE `u16`) + 14 zero bytes |
//! | `Encrypt` / `Decrypt` ioctlvs | key table slot | caller supplied |
//!
//! The primitives come from the RustCrypto `aes` and `cbc` crates. The
//! functions here add the one behaviour IOS callers depend on: the IV is
//! updated in place to the last ciphertext block, so consecutive calls chain
//! exactly like a single call over the concatenated data.

mod aes_cbc;

pub use self::aes_cbc::{content_iv, decrypt_cbc, decrypt_title_key, encrypt_cbc, BLOCK_SIZE};
