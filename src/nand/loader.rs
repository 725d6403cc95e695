//! Title loaders: a title's TMD, ticket and readable contents.
//!
//! Contents are reached through the [`ContentSource`] capability so ES does
//! not care where the bytes live:
//!
//! | Source | Backing | Used for |
//! |--------|---------|----------|
//! | [`FileSource`] | decrypted `.app` file on the NAND | installed titles (private and shared contents) |
//! | [`MemorySource`] | decrypted buffer | titles booted straight from a WAD |

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::formats::ticket::Ticket;
use crate::formats::tmd::{Content, Tmd};
use crate::formats::wad::WadReader;
use crate::nand::Nand;
use crate::nand::shared::SharedContentMap;
use crate::{Error, Result};

/// Random access to one decrypted content.
///
/// `open` and `close` are reference counted: the source may release its
/// resources once every `open` has been matched by a `close`.
pub trait ContentSource {
    fn open(&mut self) -> Result<()>;

    /// Fill `buf` with the bytes starting at `offset`.
    ///
    /// Returns [`Error::ShortRead`] if fewer bytes are available.
    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    fn close(&mut self);
}

/// A content stored as a file on the host.
#[derive(Debug)]
pub struct FileSource {
    path: Option<PathBuf>,
    file: Option<File>,
    open_count: u32,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            file: None,
            open_count: 0,
        }
    }

    /// A shared content that is not registered in `content.map`.
    pub fn missing() -> Self {
        Self {
            path: None,
            file: None,
            open_count: 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn ensure_open(&mut self) -> Result<&mut File> {
        if self.file.is_none() {
            let path = self.path.as_ref().ok_or(Error::ContentNotFound)?;
            self.file = Some(File::open(path)?);
        }
        self.file.as_mut().ok_or(Error::ContentNotFound)
    }
}

impl ContentSource for FileSource {
    fn open(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.open_count += 1;
        Ok(())
    }

    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let file = self.ensure_open()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::ShortRead,
            _ => Error::Io(e),
        })
    }

    fn close(&mut self) {
        self.open_count = self.open_count.saturating_sub(1);
        if self.open_count == 0 {
            self.file = None;
        }
    }
}

/// A content held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ContentSource for MemorySource {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset).map_err(|_| Error::ShortRead)?;
        let src = start
            .checked_add(buf.len())
            .and_then(|end| self.data.get(start..end))
            .ok_or(Error::ShortRead)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn close(&mut self) {}
}

/// One content of a loaded title.
pub struct NandContent {
    pub metadata: Content,
    pub source: Box<dyn ContentSource>,
}

impl std::fmt::Debug for NandContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NandContent")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// A resolved title: TMD, ticket (if installed) and content sources.
#[derive(Debug)]
pub struct TitleLoader {
    tmd: Tmd,
    ticket: Option<Ticket>,
    contents: Vec<NandContent>,
}

impl TitleLoader {
    /// Load an installed title from the NAND.
    ///
    /// Fails with [`Error::TitleNotFound`] if the title has no readable TMD.
    /// A missing or malformed ticket is not an error.
    pub fn from_nand(nand: &Nand, title_id: u64) -> Result<Self> {
        let tmd = nand.read_tmd(title_id)?;
        let ticket = nand.find_signed_ticket(title_id).ok();
        let shared = SharedContentMap::load(nand.shared_dir())?;

        let contents = tmd
            .contents()
            .iter()
            .map(|&metadata| {
                let source = if metadata.is_shared() {
                    shared
                        .get_filename_from_sha1(&metadata.sha1)
                        .map(FileSource::new)
                        .unwrap_or_else(FileSource::missing)
                } else {
                    FileSource::new(nand.content_path(title_id, metadata.id))
                };
                NandContent {
                    metadata,
                    source: Box::new(source),
                }
            })
            .collect();

        Ok(Self {
            tmd,
            ticket,
            contents,
        })
    }

    /// Load a title directly from a WAD file, decrypting its contents.
    pub fn from_wad(path: &Path, common_key: &[u8; 16]) -> Result<Self> {
        let mut reader = WadReader::new(File::open(path)?)?;
        let tmd = reader.tmd().clone();
        let ticket = reader.ticket().clone();

        let contents = tmd
            .contents()
            .iter()
            .map(|&metadata| {
                let data = reader.read_content(&metadata, common_key)?;
                Ok(NandContent {
                    metadata,
                    source: Box::new(MemorySource::new(data)),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tmd,
            ticket: Some(ticket),
            contents,
        })
    }

    pub fn tmd(&self) -> &Tmd {
        &self.tmd
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }

    /// The ticket, or [`Error::NoTicketInstalled`].
    pub fn require_ticket(&self) -> Result<&Ticket> {
        self.ticket
            .as_ref()
            .ok_or(Error::NoTicketInstalled(self.tmd.title_id()))
    }

    pub fn contents(&self) -> &[NandContent] {
        &self.contents
    }

    pub fn content_by_index(&mut self, index: u16) -> Option<&mut NandContent> {
        self.contents.iter_mut().find(|c| c.metadata.index == index)
    }

    pub fn content_by_id(&mut self, id: u32) -> Option<&mut NandContent> {
        self.contents.iter_mut().find(|c| c.metadata.id == id)
    }

    /// Delete the title's private content files. Shared contents stay.
    pub fn remove_contents(&self, nand: &Nand) {
        for content in self.contents.iter().filter(|c| !c.metadata.is_shared()) {
            let path = nand.content_path(self.tmd.title_id(), content.metadata.id);
            tracing::info!("deleting {}", path.display());
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("failed to delete {}: {e}", path.display());
            }
        }
    }
}
