//! Title import: tickets, TMDs and encrypted contents written to the NAND.
//!
//! ```text
//! AddTitleStart(tmd) ─┬─> AddContentStart(tid, cid) -> AddContentData* -> AddContentFinish ─┐
//!                     │<────────────────────────────────────────────────────────────────────┘
//!                     └─> AddTitleFinish
//! ```
//!
//! Only one content may be in flight. Contents arrive encrypted with the
//! title key and are stored decrypted.

use crate::crypto::{content_iv, decrypt_cbc};
use crate::es::{EsDevice, EsEnv, Reply, check_vectors};
use crate::formats::ticket::Ticket;
use crate::formats::tmd::Tmd;
use crate::memory::{IoctlvRequest, IpcReply};
use crate::nand::Nand;
use crate::title::Tid;
use crate::{Error, Result};

/// State of an in-progress title import.
#[derive(Debug, Clone, Default)]
pub struct TitleImport {
    tmd: Option<Tmd>,
    content_id: Option<u32>,
    data: Vec<u8>,
}

impl TitleImport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tmd(&self) -> Option<&Tmd> {
        self.tmd.as_ref()
    }

    /// Content currently being received.
    pub fn content_id(&self) -> Option<u32> {
        self.content_id
    }

    /// Validate and install a TMD, making it the import target.
    ///
    /// An invalid TMD leaves the import untouched.
    pub fn add_tmd(&mut self, nand: &Nand, raw: Vec<u8>) -> Result<()> {
        let tmd = Tmd::parse(raw).inspect_err(|_| tracing::error!("import: invalid TMD"))?;
        nand.write_tmd(&tmd)?;
        tracing::info!("import: installed TMD for {}", Tid(tmd.title_id()));
        self.tmd = Some(tmd);
        Ok(())
    }

    /// [`Self::add_tmd`] plus registration in `uid.sys`.
    pub fn start_title(&mut self, nand: &Nand, raw: Vec<u8>) -> Result<()> {
        self.add_tmd(nand, raw)?;
        if let Some(tmd) = &self.tmd {
            nand.add_title_to_uid_sys(tmd.title_id())?;
        }
        Ok(())
    }

    /// Begin receiving content `content_id`. Returns the content's fd,
    /// always 0.
    pub fn start_content(&mut self, title_id: u64, content_id: u32) -> Result<u32> {
        if let Some(current) = self.content_id {
            tracing::error!(
                "import: content {content_id:08x} started while {current:08x} is unfinished"
            );
            return Err(Error::ContentImportInProgress);
        }
        let tmd = self.tmd.as_ref().ok_or(Error::InvalidParameters)?;
        if tmd.title_id() != title_id {
            tracing::error!(
                "import: content for {} added to import of {}",
                Tid(title_id),
                Tid(tmd.title_id())
            );
        }

        self.content_id = Some(content_id);
        self.data.clear();
        Ok(0)
    }

    pub fn append(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// Decrypt and store the content received so far.
    ///
    /// On failure the content stays in flight.
    pub fn finish_content(&mut self, nand: &Nand, common_key: &[u8; 16]) -> Result<()> {
        let tmd = self.tmd.as_ref().ok_or(Error::InvalidParameters)?;
        let ticket = nand.find_signed_ticket(tmd.title_id())?;
        let content = self
            .content_id
            .and_then(|id| tmd.find_content_by_id(id))
            .ok_or(Error::InvalidTmd)?;

        let mut iv = content_iv(content.index);
        let plain = decrypt_cbc(&ticket.title_key(common_key), &mut iv, &self.data)?;
        let len = plain.len().min(usize::try_from(content.size).unwrap_or(usize::MAX));
        let path = nand.write_content(tmd.title_id(), content, &plain[..len])?;
        tracing::info!(
            "import: content {:08x} of {} written to {}",
            content.id,
            Tid(tmd.title_id()),
            path.display()
        );

        self.content_id = None;
        self.data.clear();
        Ok(())
    }

    /// End the import.
    pub fn finish_title(&mut self) -> Result<()> {
        let tmd = self.tmd.take().ok_or(Error::InvalidParameters)?;
        tracing::info!("import: finished {}", Tid(tmd.title_id()));
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl EsDevice {
    pub(super) fn add_ticket(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 3, 0)?;
        let input = req.input(0)?;
        let raw = env.memory.read_bytes(input.address, input.size)?;

        let ticket = Ticket::parse(raw).map_err(|_| Error::InvalidParameters)?;
        self.content.nand().add_ticket(&ticket)?;
        Ok(IpcReply::new(0))
    }

    pub(super) fn add_tmd(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 0)?;
        let input = req.input(0)?;
        let raw = env.memory.read_bytes(input.address, input.size)?;

        self.import.add_tmd(self.content.nand(), raw)?;
        Ok(IpcReply::new(0))
    }

    pub(super) fn add_title_start(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 4, 0)?;
        let input = req.input(0)?;
        let raw = env.memory.read_bytes(input.address, input.size)?;

        self.import.start_title(self.content.nand(), raw)?;
        Ok(IpcReply::new(0))
    }

    pub(super) fn add_content_start(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 2, 0)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;
        let content_id = env.memory.read_u32(req.input(1)?.address)?;

        let fd = self.import.start_content(title_id, content_id)?;
        tracing::info!("AddContentStart: {} content {content_id:08x}", Tid(title_id));
        Ok(IpcReply::new(fd as i32))
    }

    pub(super) fn add_content_data(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 2, 0)?;
        let input = req.input(1)?;
        let data = env.memory.read_bytes(input.address, input.size)?;

        tracing::debug!("AddContentData: {:#x} bytes", data.len());
        self.import.append(&data);
        Ok(IpcReply::new(0))
    }

    pub(super) fn add_content_finish(&mut self, _env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 0)?;
        let nand = self.content.nand();
        self.import.finish_content(nand, self.keys.common_key())?;
        Ok(IpcReply::new(0))
    }

    pub(super) fn add_title_finish(&mut self, _env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 0, 0)?;
        self.import.finish_title()?;
        Ok(IpcReply::new(0))
    }
}
