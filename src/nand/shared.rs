//! `/shared1/content.map` - index of the shared content pool.
//!
//! ## Record (28 bytes)
//! ```text
//! [0x00] FileName  (8 ASCII hex digits, no extension)
//! [0x08] Sha1      (20 bytes)
//! ```
//!
//! Shared contents are stored as `/shared1/<FileName>.app`. New entries take
//! the next free number, formatted `%08x`.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::Result;

const RECORD_SIZE: usize = 28;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: [u8; 8],
    sha1: [u8; 20],
}

/// In-memory copy of `content.map`.
#[derive(Debug, Clone)]
pub struct SharedContentMap {
    dir: PathBuf,
    entries: Vec<Entry>,
}

impl SharedContentMap {
    /// Load the map from `<nand_root>/shared1`. A missing map is empty.
    pub fn load(dir: PathBuf) -> Result<Self> {
        let bytes = match fs::read(dir.join("content.map")) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let entries = bytes
            .chunks_exact(RECORD_SIZE)
            .map(|record| {
                let mut name = [0u8; 8];
                let mut sha1 = [0u8; 20];
                name.copy_from_slice(&record[..8]);
                sha1.copy_from_slice(&record[8..]);
                Entry { name, sha1 }
            })
            .collect();

        Ok(Self { dir, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path of the shared content with hash `sha1`, if it is registered.
    pub fn get_filename_from_sha1(&self, sha1: &[u8; 20]) -> Option<PathBuf> {
        self.entries
            .iter()
            .find(|e| &e.sha1 == sha1)
            .map(|e| self.path_for(&e.name))
    }

    /// Register `sha1` (if new) and return the path its data belongs at.
    pub fn add_shared_content(&mut self, sha1: &[u8; 20]) -> Result<PathBuf> {
        if let Some(path) = self.get_filename_from_sha1(sha1) {
            return Ok(path);
        }

        let mut name = [0u8; 8];
        name.copy_from_slice(format!("{:08x}", self.entries.len()).as_bytes());
        self.entries.push(Entry { name, sha1: *sha1 });
        self.write()?;

        Ok(self.path_for(&name))
    }

    fn path_for(&self, name: &[u8; 8]) -> PathBuf {
        self.dir
            .join(format!("{}.app", String::from_utf8_lossy(name)))
    }

    fn write(&self) -> Result<()> {
        let mut bytes = Vec::with_capacity(self.entries.len() * RECORD_SIZE);
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.name);
            bytes.extend_from_slice(&entry.sha1);
        }
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join("content.map"), bytes)?;
        Ok(())
    }
}
