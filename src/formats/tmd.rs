//! TMD (Title Metadata) - signed descriptor of a title's contents.
//!
//! ## Header layout (RSA-2048 signed, 0x1E4 bytes)
//! ```text
//! [0x000] SignatureType     (u32 BE)
//! [0x004] Signature         (0x100 bytes)
//! [0x104] Padding           (0x3C bytes)
//! [0x140] Issuer            (0x40 bytes)
//! [0x180] TmdVersion        (u8)   ─┐
//! [0x181] CaCrlVersion      (u8)    │
//! [0x182] SignerCrlVersion  (u8)    │
//! [0x183] IsVWii            (u8)    │
//! [0x184] IosId             (u64)   │ copied verbatim
//! [0x18C] TitleId           (u64)   │ into the TMD view
//! [0x194] TitleType         (u32)   │
//! [0x198] GroupId           (u16)   │
//! [0x19A] Zero              (u16)   │
//! [0x19C] Region            (u16)   │
//! [0x19E] Ratings           (0x10)  │
//! [0x1AE] Reserved          (0x0C)  │
//! [0x1BA] IpcMask           (0x0C)  │
//! [0x1C6] Reserved          (0x12) ─┘
//! [0x1D8] AccessRights      (u32)
//! [0x1DC] TitleVersion      (u16)
//! [0x1DE] NumContents       (u16)
//! [0x1E0] BootIndex         (u16)
//! [0x1E2] Padding           (u16)
//! [0x1E4] ContentRecords    (NumContents × 0x24 bytes)
//! ```
//!
//! ## Content record (0x24 bytes)
//! ```text
//! [0x00] ContentId  (u32)
//! [0x04] Index      (u16)
//! [0x06] Type       (u16)   bit 15 = shared
//! [0x08] Size       (u64)
//! [0x10] Sha1       (20 bytes)
//! ```
//!
//! ## Notes
//! * Validity is purely structural: the buffer must hold the header and all
//!   declared content records. Signatures are never checked.
//! * The TMD view handed to guests omits the signature, access rights and
//!   content hashes.

use crate::utils::{array_at, be_u16_at, be_u32_at, be_u64_at};
use crate::{Error, Result};

/// Size of the signed TMD header.
pub const TMD_HEADER_SIZE: usize = 0x1E4;
/// Size of one content record.
pub const CONTENT_RECORD_SIZE: usize = 0x24;

const VIEW_START: usize = 0x180;
const ACCESS_RIGHTS: usize = 0x1D8;
const TITLE_VERSION: usize = 0x1DC;
const NUM_CONTENTS: usize = 0x1DE;
const CONTENT_VIEW_SIZE: usize = 0x10;

/// Content type flag marking contents stored in the shared pool.
const SHARED_FLAG: u16 = 0x8000;

/// One content record of a TMD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Content {
    pub id: u32,
    pub index: u16,
    pub content_type: u16,
    pub size: u64,
    pub sha1: [u8; 20],
}

impl Content {
    /// Shared contents live in `/shared1` and are deduplicated by hash.
    pub fn is_shared(&self) -> bool {
        self.content_type & SHARED_FLAG != 0
    }

    fn parse(buf: &[u8], offset: usize) -> Result<Self> {
        Ok(Self {
            id: be_u32_at(buf, offset)?,
            index: be_u16_at(buf, offset + 0x04)?,
            content_type: be_u16_at(buf, offset + 0x06)?,
            size: be_u64_at(buf, offset + 0x08)?,
            sha1: array_at(buf, offset + 0x10)?,
        })
    }
}

/// A structurally valid TMD.
///
/// The raw bytes are kept because ES hands them (or views derived from them)
/// back to guests verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tmd {
    raw: Vec<u8>,
    ios_id: u64,
    title_id: u64,
    title_type: u32,
    group_id: u16,
    access_rights: u32,
    title_version: u16,
    boot_index: u16,
    contents: Vec<Content>,
}

impl Tmd {
    /// Parse a TMD from its raw bytes.
    ///
    /// Returns [`Error::InvalidTmd`] if the buffer cannot hold the header or
    /// every declared content record.
    pub fn parse(raw: Vec<u8>) -> Result<Self> {
        if raw.len() < TMD_HEADER_SIZE {
            return Err(Error::InvalidTmd);
        }
        let num_contents = be_u16_at(&raw, NUM_CONTENTS)? as usize;
        if raw.len() < TMD_HEADER_SIZE + num_contents * CONTENT_RECORD_SIZE {
            return Err(Error::InvalidTmd);
        }

        let contents = (0..num_contents)
            .map(|i| Content::parse(&raw, TMD_HEADER_SIZE + i * CONTENT_RECORD_SIZE))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            ios_id: be_u64_at(&raw, 0x184)?,
            title_id: be_u64_at(&raw, 0x18C)?,
            title_type: be_u32_at(&raw, 0x194)?,
            group_id: be_u16_at(&raw, 0x198)?,
            access_rights: be_u32_at(&raw, ACCESS_RIGHTS)?,
            title_version: be_u16_at(&raw, TITLE_VERSION)?,
            boot_index: be_u16_at(&raw, 0x1E0)?,
            contents,
            raw,
        })
    }

    /// The TMD exactly as it was received or stored.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Build the TMD view returned by the `GetTMDViews` family.
    pub fn raw_view(&self) -> Vec<u8> {
        let mut view = Vec::with_capacity(
            ACCESS_RIGHTS - VIEW_START + 4 + self.contents.len() * CONTENT_VIEW_SIZE,
        );
        view.extend_from_slice(&self.raw[VIEW_START..ACCESS_RIGHTS]);
        view.extend_from_slice(&self.raw[TITLE_VERSION..TITLE_VERSION + 2]);
        view.extend_from_slice(&self.raw[NUM_CONTENTS..NUM_CONTENTS + 2]);
        for i in 0..self.contents.len() {
            let start = TMD_HEADER_SIZE + i * CONTENT_RECORD_SIZE;
            view.extend_from_slice(&self.raw[start..start + CONTENT_VIEW_SIZE]);
        }
        view
    }

    /// Title ID of the IOS this title runs on.
    pub fn ios_id(&self) -> u64 {
        self.ios_id
    }

    pub fn title_id(&self) -> u64 {
        self.title_id
    }

    pub fn title_type(&self) -> u32 {
        self.title_type
    }

    /// Maker code for disc games.
    pub fn group_id(&self) -> u16 {
        self.group_id
    }

    pub fn access_rights(&self) -> u32 {
        self.access_rights
    }

    pub fn title_version(&self) -> u16 {
        self.title_version
    }

    /// Index of the content the PPC boots from.
    pub fn boot_index(&self) -> u16 {
        self.boot_index
    }

    pub fn num_contents(&self) -> u16 {
        self.contents.len() as u16
    }

    /// All content records in declaration order.
    pub fn contents(&self) -> &[Content] {
        &self.contents
    }

    /// Content record stored at position `position` in the table.
    pub fn content(&self, position: u16) -> Option<&Content> {
        self.contents.get(position as usize)
    }

    /// Content record whose `index` field equals `index`.
    pub fn find_content_by_index(&self, index: u16) -> Option<&Content> {
        self.contents.iter().find(|c| c.index == index)
    }

    pub fn find_content_by_id(&self, id: u32) -> Option<&Content> {
        self.contents.iter().find(|c| c.id == id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a minimal TMD for tests: `contents` is a list of
    /// `(id, index, type, size)`.
    pub(crate) fn build_tmd(
        title_id: u64,
        ios_id: u64,
        contents: &[(u32, u16, u16, u64)],
    ) -> Vec<u8> {
        let mut raw = vec![0u8; TMD_HEADER_SIZE + contents.len() * CONTENT_RECORD_SIZE];
        raw[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        raw[0x180] = 1;
        raw[0x184..0x18C].copy_from_slice(&ios_id.to_be_bytes());
        raw[0x18C..0x194].copy_from_slice(&title_id.to_be_bytes());
        raw[0x194..0x198].copy_from_slice(&1u32.to_be_bytes());
        raw[0x198..0x19A].copy_from_slice(&0x3031u16.to_be_bytes());
        raw[0x1D8..0x1DC].copy_from_slice(&0xdead_beefu32.to_be_bytes());
        raw[0x1DC..0x1DE].copy_from_slice(&0x0102u16.to_be_bytes());
        raw[0x1DE..0x1E0].copy_from_slice(&(contents.len() as u16).to_be_bytes());
        for (i, &(id, index, ty, size)) in contents.iter().enumerate() {
            let o = TMD_HEADER_SIZE + i * CONTENT_RECORD_SIZE;
            raw[o..o + 4].copy_from_slice(&id.to_be_bytes());
            raw[o + 4..o + 6].copy_from_slice(&index.to_be_bytes());
            raw[o + 6..o + 8].copy_from_slice(&ty.to_be_bytes());
            raw[o + 8..o + 16].copy_from_slice(&size.to_be_bytes());
            raw[o + 16..o + 36].fill(id as u8);
        }
        raw
    }

    #[test]
    fn parses_header_and_contents() {
        let raw = build_tmd(
            0x0001_0001_4841_4241,
            0x0000_0001_0000_003a,
            &[(0x10, 0, 1, 0x40), (0x22, 1, 0x8001, 0x1000)],
        );
        let tmd = Tmd::parse(raw.clone()).unwrap();

        assert_eq!(tmd.title_id(), 0x0001_0001_4841_4241);
        assert_eq!(tmd.ios_id(), 0x0000_0001_0000_003a);
        assert_eq!(tmd.group_id(), 0x3031);
        assert_eq!(tmd.title_version(), 0x0102);
        assert_eq!(tmd.num_contents(), 2);
        assert_eq!(tmd.raw(), &raw[..]);

        let shared = tmd.find_content_by_id(0x22).unwrap();
        assert!(shared.is_shared());
        assert_eq!(shared.index, 1);
        assert_eq!(shared.size, 0x1000);
        assert_eq!(shared.sha1, [0x22; 20]);
        assert!(!tmd.find_content_by_index(0).unwrap().is_shared());
        assert!(tmd.find_content_by_index(2).is_none());
    }

    #[test]
    fn rejects_truncated_tmds() {
        assert!(matches!(Tmd::parse(vec![0u8; 0x100]), Err(Error::InvalidTmd)));

        let mut raw = build_tmd(1, 2, &[(1, 0, 1, 1), (2, 1, 1, 1)]);
        raw.truncate(raw.len() - 1);
        assert!(matches!(Tmd::parse(raw), Err(Error::InvalidTmd)));
    }

    #[test]
    fn view_omits_signature_and_hashes() {
        let tmd = Tmd::parse(build_tmd(7, 8, &[(0xaa, 0, 1, 5), (0xbb, 1, 1, 6)])).unwrap();
        let view = tmd.raw_view();

        assert_eq!(view.len(), 0x58 + 4 + 2 * 0x10);
        assert_eq!(view[0], 1);
        // title ID sits at view offset 0x0C
        assert_eq!(&view[0x0C..0x14], &7u64.to_be_bytes());
        assert_eq!(&view[0x58..0x5A], &0x0102u16.to_be_bytes());
        assert_eq!(&view[0x5A..0x5C], &2u16.to_be_bytes());
        assert_eq!(&view[0x5C..0x60], &0xaau32.to_be_bytes());
        assert_eq!(&view[0x6C..0x70], &0xbbu32.to_be_bytes());
    }
}
