//! Title export: installed contents re-encrypted with the title key.
//!
//! ```text
//! ExportTitleInit(tid) ─┬─> ExportContentBegin(tid, id) -> ExportContentData* -> ExportContentEnd ─┐
//!                       │<─────────────────────────────────────────────────────────────────────────┘
//!                       └─> ExportTitleDone
//! ```
//!
//! Each exported content keeps its own CBC IV, seeded from the content index
//! and rolled forward by every `ExportContentData`, so the pieces handed out
//! concatenate to the content encrypted in one pass.

use std::collections::BTreeMap;

use crate::crypto::{content_iv, encrypt_cbc};
use crate::es::content::OpenedContent;
use crate::es::{EsDevice, EsEnv, Reply, access_content, check_vectors, ensure};
use crate::formats::tmd::Tmd;
use crate::memory::{IoctlvRequest, IpcReply};
use crate::title::Tid;
use crate::utils::align_up;
use crate::Error;

/// Alignment the exported ciphertext is padded to.
const EXPORT_ALIGNMENT: u64 = 32;

/// One content being exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportContent {
    pub content: OpenedContent,
    pub iv: [u8; 16],
}

/// State of an in-progress title export.
#[derive(Debug, Clone, Default)]
pub struct TitleExport {
    tmd: Option<Tmd>,
    title_key: [u8; 16],
    contents: BTreeMap<u32, ExportContent>,
}

impl TitleExport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an export session is open.
    pub fn is_valid(&self) -> bool {
        self.tmd.is_some()
    }

    pub fn tmd(&self) -> Option<&Tmd> {
        self.tmd.as_ref()
    }

    pub fn title_id(&self) -> Option<u64> {
        self.tmd.as_ref().map(Tmd::title_id)
    }

    pub fn content(&self, cid: u32) -> Option<&ExportContent> {
        self.contents.get(&cid)
    }

    /// Smallest content handle not in use.
    fn next_cid(&self) -> u32 {
        (0..)
            .find(|cid| !self.contents.contains_key(cid))
            .unwrap_or(u32::MAX)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl EsDevice {
    pub(super) fn export_title_init(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 1)?;
        ensure(req.input(0)?.size == 8)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;
        let out = req.output(0)?;

        if self.export.is_valid() {
            tracing::error!("ExportTitleInit: an export is already in progress");
            return Err(Error::InvalidExportState);
        }

        let loader = access_content(&mut self.content, env.state, title_id)?;
        let tmd = loader.tmd().clone();
        let ticket = loader.require_ticket()?;
        if ticket.title_id() != title_id || tmd.title_id() != title_id {
            return Err(Error::InvalidExportState);
        }
        let title_key = ticket.title_key(self.keys.common_key());

        ensure(out.size as usize == tmd.raw().len())?;
        env.memory.copy_to_emu(out.address, tmd.raw())?;

        tracing::info!("ExportTitleInit: {}", Tid(title_id));
        self.export.title_key = title_key;
        self.export.tmd = Some(tmd);
        Ok(IpcReply::new(0))
    }

    pub(super) fn export_content_begin(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 2, 0)?;
        ensure(req.input(0)?.size == 8 && req.input(1)?.size == 4)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;
        let content_id = env.memory.read_u32(req.input(1)?.address)?;

        if self.export.title_id() != Some(title_id) {
            tracing::error!("ExportContentBegin: {} is not being exported", Tid(title_id));
            return Err(Error::InvalidExportState);
        }

        let loader = access_content(&mut self.content, env.state, title_id)
            .map_err(|_| Error::TitleNotFound(title_id))?;
        let entry = loader.content_by_id(content_id).ok_or(Error::ContentNotFound)?;
        entry.source.open()?;
        let metadata = entry.metadata;

        let cid = self.export.next_cid();
        self.export.contents.insert(
            cid,
            ExportContent {
                content: OpenedContent::new(metadata, title_id),
                iv: content_iv(metadata.index),
            },
        );
        tracing::info!("ExportContentBegin: content {content_id:08x} -> cid {cid}");
        Ok(IpcReply::new(cid as i32))
    }

    pub(super) fn export_content_data(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 1)?;
        ensure(req.input(0)?.size == 4)?;
        let out = req.output(0)?;
        ensure(out.size > 0)?;
        let cid = env.memory.read_u32(req.input(0)?.address)?;

        if !self.export.is_valid() {
            return Err(Error::InvalidExportState);
        }
        let title_key = self.export.title_key;
        let entry = self
            .export
            .contents
            .get_mut(&cid)
            .ok_or(Error::InvalidExportState)?;
        let opened = &mut entry.content;
        let length = opened.clamp_read(out.size);
        if length == 0 {
            return Err(Error::InvalidExportState);
        }

        let mut buf = vec![0u8; align_up(length as u64, EXPORT_ALIGNMENT) as usize];
        let loader = access_content(&mut self.content, env.state, opened.title_id)
            .map_err(|_| Error::ShortRead)?;
        let content = loader
            .content_by_index(opened.content.index)
            .ok_or(Error::ShortRead)?;
        content
            .source
            .read_range(opened.position as u64, &mut buf[..length as usize])
            .map_err(|e| {
                tracing::error!("ExportContentData: cid {cid}: {e}");
                Error::ShortRead
            })?;

        let encrypted = encrypt_cbc(&title_key, &mut entry.iv, &buf)?;
        let n = encrypted.len().min(out.size as usize);
        env.memory.copy_to_emu(out.address, &encrypted[..n])?;
        opened.position = opened.position.wrapping_add(length);
        Ok(IpcReply::new(0))
    }

    pub(super) fn export_content_end(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 0)?;
        ensure(req.input(0)?.size == 4)?;
        let cid = env.memory.read_u32(req.input(0)?.address)?;

        let Some(entry) = self.export.content(cid).copied() else {
            return Err(Error::InvalidExportState);
        };
        let opened = entry.content;
        if !self.export.is_valid() || opened.position as u64 != opened.content.size {
            return Err(Error::InvalidExportState);
        }

        if let Ok(loader) = access_content(&mut self.content, env.state, opened.title_id)
            && let Some(c) = loader.content_by_index(opened.content.index)
        {
            c.source.close();
        }
        self.export.contents.remove(&cid);
        tracing::info!("ExportContentEnd: cid {cid}");
        Ok(IpcReply::new(0))
    }

    pub(super) fn export_title_done(&mut self, _env: &mut EsEnv, _req: &IoctlvRequest) -> Reply {
        if !self.export.is_valid() {
            return Err(Error::InvalidExportState);
        }
        tracing::info!("ExportTitleDone");
        self.export.clear();
        Ok(IpcReply::new(0))
    }
}
