//! `/sys/uid.sys` - registry of titles that have run on the console.
//!
//! ## Record (12 bytes)
//! ```text
//! [0x00] TitleId  (u64 BE)
//! [0x08] Uid      (u32 BE)
//! ```
//!
//! UIDs are handed out sequentially starting at `0x1000`.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::Result;

const RECORD_SIZE: usize = 12;
const FIRST_UID: u32 = 0x1000;

/// In-memory copy of `uid.sys`.
#[derive(Debug, Clone)]
pub struct UidSys {
    path: PathBuf,
    entries: Vec<(u64, u32)>,
}

impl UidSys {
    /// Load the registry at `path`. A missing file is an empty registry.
    pub fn load(path: PathBuf) -> Result<Self> {
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let entries = bytes
            .chunks_exact(RECORD_SIZE)
            .map(|record| {
                let mut title_id = [0u8; 8];
                let mut uid = [0u8; 4];
                title_id.copy_from_slice(&record[..8]);
                uid.copy_from_slice(&record[8..]);
                (u64::from_be_bytes(title_id), u32::from_be_bytes(uid))
            })
            .collect();

        Ok(Self { path, entries })
    }

    /// UID assigned to `title_id`, if any.
    pub fn get_uid(&self, title_id: u64) -> Option<u32> {
        self.entries
            .iter()
            .find(|(tid, _)| *tid == title_id)
            .map(|&(_, uid)| uid)
    }

    /// Register `title_id`, returning its (possibly existing) UID.
    pub fn add_title(&mut self, title_id: u64) -> Result<u32> {
        if let Some(uid) = self.get_uid(title_id) {
            tracing::debug!("title {title_id:016x} already has uid {uid:#x}");
            return Ok(uid);
        }

        let uid = self
            .entries
            .iter()
            .map(|&(_, uid)| uid + 1)
            .max()
            .unwrap_or(FIRST_UID);
        self.entries.push((title_id, uid));
        self.write()?;

        tracing::info!("registered title {title_id:016x} with uid {uid:#x}");
        Ok(uid)
    }

    fn write(&self) -> Result<()> {
        let mut bytes = Vec::with_capacity(self.entries.len() * RECORD_SIZE);
        for (title_id, uid) in &self.entries {
            bytes.extend_from_slice(&title_id.to_be_bytes());
            bytes.extend_from_slice(&uid.to_be_bytes());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, bytes)?;
        Ok(())
    }
}
