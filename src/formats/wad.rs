//! WAD - installable title package.
//!
//! ## Layout
//! ```text
//! [0x00] HeaderSize   (u32 BE)
//! [0x04] Type/Version (u32)
//! [0x08] CertChainSize(u32 BE)
//! [0x0C] Reserved     (u32)
//! [0x10] TicketSize   (u32 BE)
//! [0x14] TmdSize      (u32 BE)
//! [0x18] DataSize     (u32 BE)
//! [0x1C] FooterSize   (u32 BE)
//! ```
//!
//! Sections follow the header in this order, each starting on a 0x40-byte
//! boundary: header, certificate chain, ticket, TMD, content data, footer.
//!
//! ## Content data
//! Contents are stored encrypted with the title key in TMD order. Each one
//! occupies its size rounded up to 16 bytes and starts on a 0x40 boundary.
//!
//! ## Notes
//! * TMDs larger than 4 MiB are rejected.

use std::io::{Read, Seek, SeekFrom};

use crate::crypto::{content_iv, decrypt_cbc};
use crate::formats::ticket::Ticket;
use crate::formats::tmd::{Content, Tmd};
use crate::utils::{align_up, be_u32, bytesv};
use crate::{Error, Result};

const SECTION_ALIGN: u64 = 0x40;
const MAX_TMD_SIZE: u32 = 4 * 1024 * 1024;

/// Parsed WAD header: section sizes and offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wad {
    pub header_size: u32,
    pub cert_size: u32,
    pub ticket_size: u32,
    pub tmd_size: u32,
    pub data_size: u32,
    /// Absolute offset of the ticket.
    pub(crate) ticket_offset: u64,
    /// Absolute offset of the TMD.
    pub(crate) tmd_offset: u64,
    /// Absolute offset of the content data section.
    pub(crate) data_offset: u64,
}

impl Wad {
    /// Parse the WAD header from `r`, which must be positioned at its start.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;

        let header_size = be_u32(r)?;
        let _kind = be_u32(r)?;
        let cert_size = be_u32(r)?;
        let _reserved = be_u32(r)?;
        let ticket_size = be_u32(r)?;
        let tmd_size = be_u32(r)?;
        let data_size = be_u32(r)?;

        if tmd_size > MAX_TMD_SIZE {
            tracing::error!("TMD is too large: {tmd_size} bytes");
            return Err(Error::Parse("WAD TMD exceeds 4 MiB"));
        }

        let ticket_offset = base
            + align_up(header_size as u64, SECTION_ALIGN)
            + align_up(cert_size as u64, SECTION_ALIGN);
        let tmd_offset = ticket_offset + align_up(ticket_size as u64, SECTION_ALIGN);
        let data_offset = tmd_offset + align_up(tmd_size as u64, SECTION_ALIGN);

        Ok(Self {
            header_size,
            cert_size,
            ticket_size,
            tmd_size,
            data_size,
            ticket_offset,
            tmd_offset,
            data_offset,
        })
    }
}

/// Reader wrapper around a WAD file.
///
/// Owns the underlying reader along with the parsed ticket and TMD.
pub struct WadReader<R> {
    inner: R,
    pub wad: Wad,
    ticket: Ticket,
    tmd: Tmd,
}

impl<R: Read + Seek> WadReader<R> {
    /// Parse a WAD, its ticket and its TMD.
    pub fn new(mut reader: R) -> Result<Self> {
        let wad = Wad::parse(&mut reader)?;

        reader.seek(SeekFrom::Start(wad.ticket_offset))?;
        let ticket = Ticket::parse(bytesv(&mut reader, wad.ticket_size as usize)?)?;

        reader.seek(SeekFrom::Start(wad.tmd_offset))?;
        let tmd = Tmd::parse(bytesv(&mut reader, wad.tmd_size as usize)?)?;

        Ok(Self {
            inner: reader,
            wad,
            ticket,
            tmd,
        })
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn tmd(&self) -> &Tmd {
        &self.tmd
    }

    /// Absolute offset of `content` inside the WAD.
    fn content_offset(&self, content: &Content) -> Result<u64> {
        let mut offset = self.wad.data_offset;
        for c in self.tmd.contents() {
            if c.id == content.id && c.index == content.index {
                return Ok(offset);
            }
            offset = align_up(offset + align_up(c.size, 16), SECTION_ALIGN);
        }
        Err(Error::ContentNotFound)
    }

    /// Read a content's encrypted bytes (size rounded up to 16).
    pub fn read_encrypted_content(&mut self, content: &Content) -> Result<Vec<u8>> {
        let offset = self.content_offset(content)?;
        self.inner.seek(SeekFrom::Start(offset))?;
        bytesv(&mut self.inner, align_up(content.size, 16) as usize)
    }

    /// Read and decrypt a content with the ticket's title key.
    ///
    /// The result is truncated to the size declared in the TMD.
    pub fn read_content(&mut self, content: &Content, common_key: &[u8; 16]) -> Result<Vec<u8>> {
        let encrypted = self.read_encrypted_content(content)?;
        let title_key = self.ticket.title_key(common_key);
        let mut iv = content_iv(content.index);
        let mut plain = decrypt_cbc(&title_key, &mut iv, &encrypted)?;
        plain.truncate(content.size as usize);
        Ok(plain)
    }

    /// Consume the reader, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}
