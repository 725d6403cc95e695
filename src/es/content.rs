//! Open-content table: streaming reads over decrypted contents.

use std::collections::BTreeMap;

use crate::es::{EsDevice, EsEnv, EsState, Reply, access_content, check_vectors};
use crate::formats::tmd::Content;
use crate::memory::{IoctlvRequest, IpcReply};
use crate::title::Tid;
use crate::{Error, Result};

/// Origin of a `SeekContent` offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Set,
    Cur,
    End,
    Unknown(u32),
}

impl From<u32> for SeekMode {
    fn from(v: u32) -> Self {
        match v {
            0 => Self::Set,
            1 => Self::Cur,
            2 => Self::End,
            x => Self::Unknown(x),
        }
    }
}

/// A content opened for reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenedContent {
    pub content: Content,
    pub title_id: u64,
    pub position: u32,
}

impl OpenedContent {
    pub fn new(content: Content, title_id: u64) -> Self {
        Self {
            content,
            title_id,
            position: 0,
        }
    }

    /// Bytes a read of `n` bytes returns: never past the end, zero once the
    /// position is at or beyond it.
    pub fn clamp_read(&self, n: u32) -> u32 {
        let left = self.content.size.saturating_sub(self.position as u64);
        n.min(u32::try_from(left).unwrap_or(u32::MAX))
    }

    /// Move the position. Offsets are not range checked; reads clamp.
    pub fn seek(&mut self, offset: u32, mode: SeekMode) -> u32 {
        match mode {
            SeekMode::Set => self.position = offset,
            SeekMode::Cur => self.position = self.position.wrapping_add(offset),
            SeekMode::End => self.position = (self.content.size as u32).wrapping_add(offset),
            SeekMode::Unknown(mode) => tracing::warn!("unknown seek mode {mode}"),
        }
        self.position
    }
}

/// Contents opened through `OpenContent`/`OpenTitleContent`, keyed by
/// content file descriptor (CFD).
#[derive(Debug, Clone, Default)]
pub struct ContentTable {
    entries: BTreeMap<u32, OpenedContent>,
    next_cfd: u32,
}

impl ContentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next CFD. Numbers are consumed even if the open fails.
    pub fn allocate(&mut self) -> u32 {
        let cfd = self.next_cfd;
        self.next_cfd = self.next_cfd.wrapping_add(1);
        cfd
    }

    pub fn insert(&mut self, cfd: u32, opened: OpenedContent) {
        self.entries.insert(cfd, opened);
    }

    pub fn get(&self, cfd: u32) -> Result<&OpenedContent> {
        self.entries.get(&cfd).ok_or(Error::BadContentHandle)
    }

    pub fn get_mut(&mut self, cfd: u32) -> Result<&mut OpenedContent> {
        self.entries.get_mut(&cfd).ok_or(Error::BadContentHandle)
    }

    pub fn remove(&mut self, cfd: u32) -> Result<OpenedContent> {
        self.entries.remove(&cfd).ok_or(Error::BadContentHandle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every open content and restart CFD numbering at 0.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_cfd = 0;
    }
}

impl EsDevice {
    /// Open content `index` of `title_id` under a fresh CFD.
    ///
    /// Every failure is reported as [`Error::BadContentHandle`].
    fn open_cfd(&mut self, state: &EsState, title_id: u64, index: u16) -> Result<u32> {
        let cfd = self.opened.allocate();
        let loader = access_content(&mut self.content, state, title_id).map_err(|e| {
            tracing::warn!("cannot open content {index} of {}: {e}", Tid(title_id));
            Error::BadContentHandle
        })?;
        if loader.ticket().is_none() {
            tracing::warn!("cannot open content {index} of {}: no ticket", Tid(title_id));
            return Err(Error::BadContentHandle);
        }
        let entry = loader
            .content_by_index(index)
            .ok_or(Error::BadContentHandle)?;
        entry.source.open().map_err(|e| {
            tracing::warn!("cannot open content {index} of {}: {e}", Tid(title_id));
            Error::BadContentHandle
        })?;

        let opened = OpenedContent::new(entry.metadata, title_id);
        self.opened.insert(cfd, opened);
        Ok(cfd)
    }

    pub(super) fn open_title_content(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 3, 0)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;
        let index = env.memory.read_u32(req.input(2)?.address)? as u16;

        let cfd = self.open_cfd(env.state, title_id, index)?;
        tracing::info!("OpenTitleContent: {} index {index} -> cfd {cfd}", Tid(title_id));
        Ok(IpcReply::new(cfd as i32))
    }

    pub(super) fn open_content(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 0)?;
        let title_id = env.state.title.title_id().ok_or(Error::NoActiveTitle)?;
        let index = env.memory.read_u32(req.input(0)?.address)? as u16;

        let cfd = self.open_cfd(env.state, title_id, index)?;
        tracing::info!("OpenContent: index {index} -> cfd {cfd}");
        Ok(IpcReply::new(cfd as i32))
    }

    pub(super) fn read_content(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 1)?;
        let cfd = env.memory.read_u32(req.input(0)?.address)?;
        let dest = req.output(0)?;

        let entry = self.opened.get_mut(cfd)?;
        let size = entry.clamp_read(dest.size);
        tracing::debug!("ReadContent: cfd {cfd}, {size:#x} bytes at {:#x}", entry.position);
        if size == 0 {
            return Ok(IpcReply::new(0));
        }

        if !env.memory.is_valid_range(dest.address, size) {
            env.state
                .panic_alert(&format!("ReadContent: invalid destination {:#010x}", dest.address));
            return Ok(IpcReply::new(size as i32));
        }

        let mut buf = vec![0u8; size as usize];
        match access_content(&mut self.content, env.state, entry.title_id)
            .and_then(|loader| {
                loader
                    .content_by_index(entry.content.index)
                    .ok_or(Error::ContentNotFound)
            })
            .and_then(|c| c.source.read_range(entry.position as u64, &mut buf))
        {
            Ok(()) => env.memory.copy_to_emu(dest.address, &buf)?,
            Err(e) => tracing::error!("ReadContent: cfd {cfd} read failed: {e}"),
        }
        entry.position = entry.position.wrapping_add(size);
        Ok(IpcReply::new(size as i32))
    }

    pub(super) fn close_content(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 0)?;
        let cfd = env.memory.read_u32(req.input(0)?.address)?;

        let entry = self.opened.remove(cfd)?;
        if let Ok(loader) = access_content(&mut self.content, env.state, entry.title_id)
            && let Some(c) = loader.content_by_index(entry.content.index)
        {
            c.source.close();
        }
        tracing::debug!("CloseContent: cfd {cfd}");
        Ok(IpcReply::new(0))
    }

    pub(super) fn seek_content(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 3, 0)?;
        let cfd = env.memory.read_u32(req.input(0)?.address)?;
        let offset = env.memory.read_u32(req.input(1)?.address)?;
        let mode = SeekMode::from(env.memory.read_u32(req.input(2)?.address)?);

        let position = self.opened.get_mut(cfd)?.seek(offset, mode);
        tracing::debug!("SeekContent: cfd {cfd} {mode:?} {offset:#x} -> {position:#x}");
        Ok(IpcReply::new(position as i32))
    }
}
