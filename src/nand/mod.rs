//! Emulated NAND storage as seen by ES.
//!
//! Everything lives under a host directory (the NAND root):
//!
//! ```text
//! title/<hi>/<lo>/content/title.tmd      installed TMD
//! title/<hi>/<lo>/content/<cid>.app      private content (decrypted)
//! title/<hi>/<lo>/data/                  save data
//! ticket/<hi>/<lo>.tik                   installed ticket
//! shared1/content.map                    shared content index
//! shared1/<n>.app                        shared content (decrypted)
//! sys/uid.sys                            title registry
//! ```
//!
//! | Module | Content |
//! |--------|---------|
//! | [`shared`] | `content.map` reader/writer |
//! | [`uid`] | `uid.sys` reader/writer |
//! | [`loader`] | [`loader::ContentSource`] implementations and [`loader::TitleLoader`] |
//! | [`manager`] | [`manager::ContentManager`], the loader cache |

pub mod loader;
pub mod manager;
pub mod shared;
pub mod uid;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::formats::ticket::Ticket;
use crate::formats::tmd::{Content, Tmd};
use crate::nand::shared::SharedContentMap;
use crate::nand::uid::UidSys;
use crate::title::{Tid, high, low};
use crate::utils::is_title_id_part;
use crate::{Error, Result};

/// A NAND rooted at a host directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nand {
    root: PathBuf,
}

impl Nand {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn title_dir(&self, title_id: u64) -> PathBuf {
        self.root.join(format!("title/{}", Tid(title_id)))
    }

    pub fn title_content_dir(&self, title_id: u64) -> PathBuf {
        self.title_dir(title_id).join("content")
    }

    pub fn title_data_dir(&self, title_id: u64) -> PathBuf {
        self.title_dir(title_id).join("data")
    }

    pub fn tmd_path(&self, title_id: u64) -> PathBuf {
        self.title_content_dir(title_id).join("title.tmd")
    }

    pub fn ticket_path(&self, title_id: u64) -> PathBuf {
        self.root.join(format!("ticket/{}.tik", Tid(title_id)))
    }

    /// Path of a private (non-shared) content file.
    pub fn content_path(&self, title_id: u64, content_id: u32) -> PathBuf {
        self.title_content_dir(title_id)
            .join(format!("{content_id:08x}.app"))
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.root.join("shared1")
    }

    pub fn uid_sys_path(&self) -> PathBuf {
        self.root.join("sys/uid.sys")
    }

    /// Read and parse an installed TMD.
    pub fn read_tmd(&self, title_id: u64) -> Result<Tmd> {
        match fs::read(self.tmd_path(title_id)) {
            Ok(raw) => Tmd::parse(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::TitleNotFound(title_id)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn has_tmd(&self, title_id: u64) -> bool {
        self.tmd_path(title_id).is_file()
    }

    /// Install (or overwrite) a TMD.
    pub fn write_tmd(&self, tmd: &Tmd) -> Result<()> {
        let path = self.tmd_path(tmd.title_id());
        write_file(&path, tmd.raw())
    }

    /// Install a ticket under the title ID it names.
    pub fn add_ticket(&self, ticket: &Ticket) -> Result<()> {
        let path = self.ticket_path(ticket.title_id());
        tracing::info!("installing ticket for {}", Tid(ticket.title_id()));
        write_file(&path, ticket.raw())
    }

    /// The installed ticket for `title_id`.
    ///
    /// Fails with [`Error::NoTicketInstalled`] when there is no parsable
    /// ticket file.
    pub fn find_signed_ticket(&self, title_id: u64) -> Result<Ticket> {
        let raw = fs::read(self.ticket_path(title_id))
            .map_err(|_| Error::NoTicketInstalled(title_id))?;
        Ticket::parse(raw).map_err(|_| Error::NoTicketInstalled(title_id))
    }

    pub fn delete_ticket(&self, title_id: u64) -> Result<()> {
        fs::remove_file(self.ticket_path(title_id))?;
        Ok(())
    }

    /// Delete a title's whole directory tree.
    pub fn delete_title_dir(&self, title_id: u64) -> Result<()> {
        fs::remove_dir_all(self.title_dir(title_id)).map_err(|e| {
            tracing::error!("failed to delete title directory for {}: {e}", Tid(title_id));
            Error::AccessDenied
        })
    }

    pub fn create_title_data_dir(&self, title_id: u64) -> Result<()> {
        fs::create_dir_all(self.title_data_dir(title_id))?;
        Ok(())
    }

    /// Store a decrypted content, returning the path written.
    ///
    /// Shared contents go to the shared pool (deduplicated by SHA-1), all
    /// others next to the title's TMD.
    pub fn write_content(&self, title_id: u64, content: &Content, data: &[u8]) -> Result<PathBuf> {
        let path = if content.is_shared() {
            SharedContentMap::load(self.shared_dir())?.add_shared_content(&content.sha1)?
        } else {
            self.content_path(title_id, content.id)
        };
        write_file(&path, data)?;
        Ok(path)
    }

    /// Contents of `tmd` whose data is present on the NAND.
    pub fn stored_contents(&self, tmd: &Tmd) -> Result<Vec<Content>> {
        let shared = SharedContentMap::load(self.shared_dir())?;
        Ok(tmd
            .contents()
            .iter()
            .filter(|content| {
                if content.is_shared() {
                    shared
                        .get_filename_from_sha1(&content.sha1)
                        .is_some_and(|path| path.is_file())
                } else {
                    self.content_path(tmd.title_id(), content.id).is_file()
                }
            })
            .copied()
            .collect())
    }

    /// Register a title in `uid.sys`.
    pub fn add_title_to_uid_sys(&self, title_id: u64) -> Result<u32> {
        UidSys::load(self.uid_sys_path())?.add_title(title_id)
    }

    /// Title IDs with a directory under `/title`. TMDs are not checked.
    pub fn installed_titles(&self) -> Vec<u64> {
        self.scan_titles(
            "title",
            |entry, name| entry.file_type().is_ok_and(|t| t.is_dir()) && is_title_id_part(name),
            |name| name,
        )
    }

    /// Title IDs with a ticket under `/ticket`.
    pub fn titles_with_tickets(&self) -> Vec<u64> {
        self.scan_titles(
            "ticket",
            |entry, name| {
                entry.file_type().is_ok_and(|t| t.is_file())
                    && name.strip_suffix(".tik").is_some_and(is_title_id_part)
            },
            |name| &name[..8],
        )
    }

    /// Walk `<root>/<dir>/<hi>/<entry>` and collect title IDs, sorted.
    fn scan_titles(
        &self,
        dir: &str,
        accept: impl Fn(&fs::DirEntry, &str) -> bool,
        low_part: impl Fn(&str) -> &str,
    ) -> Vec<u64> {
        let base = self.root.join(dir);
        let Ok(types) = fs::read_dir(&base) else {
            tracing::error!("/{dir} is not a directory");
            return Vec::new();
        };

        let mut title_ids = Vec::new();
        for type_entry in types.flatten() {
            let type_name = type_entry.file_name().to_string_lossy().into_owned();
            if !type_entry.file_type().is_ok_and(|t| t.is_dir()) || !is_title_id_part(&type_name) {
                continue;
            }
            let Ok(entries) = fs::read_dir(type_entry.path()) else {
                continue;
            };
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !accept(&entry, &name) {
                    continue;
                }
                if let (Ok(hi), Ok(lo)) = (
                    u32::from_str_radix(&type_name, 16),
                    u32::from_str_radix(low_part(&name), 16),
                ) {
                    title_ids.push(((hi as u64) << 32) | lo as u64);
                }
            }
        }
        title_ids.sort_unstable();
        title_ids
    }
}

/// Write `data` to `path`, creating parent directories.
fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data).map_err(|e| {
        tracing::error!("failed to write {}: {e}", path.display());
        Error::WriteFailure
    })
}

/// Whether `title_id` may be deleted: anything except system titles up to
/// `00000001/00000101`.
pub fn can_delete_title(title_id: u64) -> bool {
    high(title_id) != 0x0000_0001 || low(title_id) > 0x101
}
