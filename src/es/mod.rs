//! The ES (ETicket Services) device.
//!
//! ES owns everything related to titles: installing and exporting them,
//! serving their contents to running software, answering metadata queries,
//! and launching them (reloading IOS when the title needs another version).
//!
//! | Module | Ioctlvs |
//! |--------|---------|
//! | [`import`] | `AddTicket`, `AddTMD`, `AddTitleStart`, `AddContent{Start,Data,Finish}`, `AddTitleFinish` |
//! | [`export`] | `ExportTitleInit`, `ExportContent{Begin,Data,End}`, `ExportTitleDone` |
//! | [`content`] | `OpenContent`, `OpenTitleContent`, `ReadContent`, `SeekContent`, `CloseContent` |
//! | `title_info` | title, view, TMD and stored-content queries |
//! | `delete` | `DeleteTitle`, `DeleteTicket`, `DeleteTitleContent` |
//! | `identity` | `GetDeviceID`, `GetDeviceCertificate`, `Sign`, `Encrypt`, `Decrypt`, `GetBoot2Version`, `CheckKoreaRegion` |
//! | `launch` | `Launch`, `LaunchBC`, plus [`EsDevice::di_verify`] and [`EsDevice::load_wad`] |
//! | [`ioctl`] | selector decoding and dispatch |
//!
//! A device is short-lived: the host builds a new one on every IOS reload
//! and keeps the cross-reload state in an [`EsState`].
//!
//! ```text
//! host ──handle_ipc(addr)──> EsDevice ──> EsEnv { state, kernel, memory }
//!                               │
//!                               ├── ContentManager (NAND + WAD loaders)
//!                               ├── ContentTable   (CFD -> position)
//!                               ├── TitleImport / TitleExport
//!                               └── KeyTable, ConsoleIdentity
//! ```

pub mod content;
pub mod context;
mod delete;
pub mod export;
mod identity;
pub mod import;
pub mod ioctl;
mod launch;
#[cfg(test)]
mod tests;
mod title_info;

use std::fs::File;

pub use self::content::{ContentTable, OpenedContent, SeekMode};
pub use self::context::{EsEnv, EsState, LaunchPhase, RunningGame, TitleContext};
pub use self::export::{ExportContent, TitleExport};
pub use self::import::TitleImport;
pub use self::ioctl::EsIoctl;

use crate::config::EsConfig;
use crate::host::ConsoleIdentity;
use crate::keys::KeyTable;
use crate::memory::{GuestMemory, IoVector, IoctlvRequest, IpcReply};
use crate::nand::Nand;
use crate::nand::loader::TitleLoader;
use crate::nand::manager::ContentManager;
use crate::{Error, Result};

/// Outcome of an ioctlv handler; errors become the matching IOS code.
type Reply = Result<IpcReply>;

/// An ES device instance.
pub struct EsDevice {
    config: EsConfig,
    keys: KeyTable,
    identity: Box<dyn ConsoleIdentity>,
    content: ContentManager,
    opened: ContentTable,
    import: TitleImport,
    export: TitleExport,
    is_active: bool,
}

impl std::fmt::Debug for EsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EsDevice")
            .field("config", &self.config)
            .field("content", &self.content)
            .field("opened", &self.opened)
            .field("import", &self.import)
            .field("export", &self.export)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

impl EsDevice {
    /// Build a device over the NAND at `config.nand_root`.
    ///
    /// Keys come from `config.keys_file` when set, the built-in table
    /// otherwise.
    pub fn new(config: EsConfig, identity: Box<dyn ConsoleIdentity>) -> Result<Self> {
        let mut keys = KeyTable::new();
        if let Some(path) = &config.keys_file {
            keys.load_keys(File::open(path)?)?;
            tracing::info!("loaded keys from {}", path.display());
        }
        let content = ContentManager::new(Nand::new(config.nand_root.clone()), *keys.common_key());

        Ok(Self {
            config,
            keys,
            identity,
            content,
            opened: ContentTable::new(),
            import: TitleImport::new(),
            export: TitleExport::new(),
            is_active: false,
        })
    }

    pub fn config(&self) -> &EsConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyTable {
        &self.keys
    }

    pub fn nand(&self) -> &Nand {
        self.content.nand()
    }

    pub fn opened(&self) -> &ContentTable {
        &self.opened
    }

    pub fn import(&self) -> &TitleImport {
        &self.import
    }

    pub fn export(&self) -> &TitleExport {
        &self.export
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Guest `IOS_Open("/dev/es")`.
    pub fn open(&mut self) -> IpcReply {
        if self.is_active {
            tracing::info!("/dev/es opened again while already open");
        }
        self.is_active = true;
        IpcReply::new(0)
    }

    /// Guest `IOS_Close`. Open contents and any import or export in
    /// progress are dropped.
    pub fn close(&mut self) -> IpcReply {
        self.opened.clear();
        self.import.clear();
        self.export.clear();
        self.content.clear_cache();
        self.is_active = false;
        IpcReply::new(0)
    }
}

/// Loader for `title_id`, served from the boot WAD when it is the active
/// title.
fn access_content<'a>(
    content: &'a mut ContentManager,
    state: &EsState,
    title_id: u64,
) -> Result<&'a mut TitleLoader> {
    let wad = state
        .content_file
        .as_deref()
        .filter(|_| state.title.title_id() == Some(title_id));
    content.access(title_id, wad)
}

/// Require exactly `in_count` input and `io_count` output buffers, all of
/// them in valid memory.
fn check_vectors(req: &IoctlvRequest, in_count: usize, io_count: usize) -> Result<()> {
    if req.has_number_of_valid_vectors(in_count, io_count) {
        Ok(())
    } else {
        Err(Error::InvalidParameters)
    }
}

fn ensure(condition: bool) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::InvalidParameters)
    }
}

/// Copy as much of `data` as fits in `out`.
fn write_clamped(memory: &mut dyn GuestMemory, out: IoVector, data: &[u8]) -> Result<()> {
    let n = data.len().min(out.size as usize);
    memory.copy_to_emu(out.address, &data[..n])
}
