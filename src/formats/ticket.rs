//! Ticket - signed licence carrying a title's encrypted AES key.
//!
//! ## Layout
//! ```text
//! [0x000] SignatureType   (u32 BE)
//! [0x004] Signature + padding (size depends on SignatureType)
//! [off]   Body            (0x164 bytes)
//! ```
//!
//! | SignatureType | Algorithm  | Body offset |
//! |---------------|------------|-------------|
//! | `0x00010000`  | RSA-4096   | 576         |
//! | `0x00010001`  | RSA-2048   | 320         |
//! | `0x00010002`  | ECDSA      | 128         |
//!
//! ## Body (0x164 bytes, offsets relative to the body)
//! ```text
//! [0x000] SignatureIssuer  (0x40 bytes)
//! [0x040] EcdhKey          (0x3C bytes)
//! [0x07C] Unknown          (3 bytes)
//! [0x07F] TitleKey         (16 bytes, encrypted with the common key)
//! [0x090] TicketId         (u64)   ─┐
//! [0x098] DeviceId         (u32)    │ ticket view
//! [0x09C] TitleId          (u64)    │ (after a u32 view index)
//! [0x0A4] AccessMask ...   (0xC0)  ─┘
//! ```
//!
//! ## Notes
//! * A ticket file may hold several signed tickets back to back, all with the
//!   first one's signature type. Ticket `n` starts at `n × (offset + 0x164)`;
//!   only the first one's fields are decoded.
//! * A ticket view is 0xD8 bytes.

use crate::crypto::decrypt_title_key;
use crate::utils::{array_at, be_u32_at, be_u64_at};
use crate::{Error, Result};

/// Size of a ticket body.
pub const TICKET_BODY_SIZE: usize = 0x164;
/// Size of a ticket view.
pub const TICKET_VIEW_SIZE: usize = 0xD8;
/// Size of a complete RSA-2048 signed ticket.
pub const SIGNED_TICKET_SIZE: usize = 320 + TICKET_BODY_SIZE;

const TITLE_KEY: usize = 0x7F;
const TICKET_ID: usize = 0x90;
const DEVICE_ID: usize = 0x98;
const TITLE_ID: usize = 0x9C;

/// Body offset for a signature type, if the type is known.
fn body_offset(signature_type: u32) -> Option<usize> {
    match signature_type {
        0x0001_0000 => Some(576),
        0x0001_0001 => Some(320),
        0x0001_0002 => Some(128),
        _ => None,
    }
}

/// A structurally valid ticket file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    raw: Vec<u8>,
    offset: usize,
    ticket_id: u64,
    device_id: u32,
    title_id: u64,
    title_key: [u8; 16],
}

impl Ticket {
    /// Parse a ticket file.
    ///
    /// Returns [`Error::InvalidTicket`] for unknown signature types or files
    /// too short to hold one ticket body.
    pub fn parse(raw: Vec<u8>) -> Result<Self> {
        let signature_type = be_u32_at(&raw, 0).map_err(|_| Error::InvalidTicket)?;
        let Some(offset) = body_offset(signature_type) else {
            tracing::error!("invalid ticket signature type: {signature_type:08x}");
            return Err(Error::InvalidTicket);
        };
        if raw.len() < offset + TICKET_BODY_SIZE {
            return Err(Error::InvalidTicket);
        }

        Ok(Self {
            ticket_id: be_u64_at(&raw, offset + TICKET_ID)?,
            device_id: be_u32_at(&raw, offset + DEVICE_ID)?,
            title_id: be_u64_at(&raw, offset + TITLE_ID)?,
            title_key: array_at(&raw, offset + TITLE_KEY)?,
            offset,
            raw,
        })
    }

    /// The ticket file exactly as it was received or stored.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Byte offset of the (first) ticket body.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn ticket_id(&self) -> u64 {
        self.ticket_id
    }

    /// Console the ticket is personalised for (0 for common tickets).
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn title_id(&self) -> u64 {
        self.title_id
    }

    /// Size of one signed ticket in this file.
    fn stride(&self) -> usize {
        self.offset + TICKET_BODY_SIZE
    }

    /// Number of tickets in the file.
    pub fn number_of_tickets(&self) -> u32 {
        (self.raw.len() / self.stride()) as u32
    }

    /// Ticket view for ticket `n`: the big-endian view index followed by
    /// the body from the ticket ID onwards.
    ///
    /// Returns `None` if the file holds fewer than `n + 1` tickets.
    pub fn raw_view(&self, n: u32) -> Option<Vec<u8>> {
        if n >= self.number_of_tickets() {
            return None;
        }
        let start = self.stride() * n as usize + self.offset + TICKET_ID;
        let body = self.raw.get(start..start + TICKET_VIEW_SIZE - 4)?;

        let mut view = Vec::with_capacity(TICKET_VIEW_SIZE);
        view.extend_from_slice(&n.to_be_bytes());
        view.extend_from_slice(body);
        Some(view)
    }

    /// The title key still encrypted with the common key.
    pub fn encrypted_title_key(&self) -> &[u8; 16] {
        &self.title_key
    }

    /// Decrypt the title key with `common_key`.
    pub fn title_key(&self, common_key: &[u8; 16]) -> [u8; 16] {
        decrypt_title_key(common_key, &self.title_key, self.title_id)
    }
}
