//! Title launch, disc verification and WAD booting.
//!
//! Launching a PPC title takes two passes. The first reads the title's TMD
//! and reloads IOS into the version it requires; the ES device of the new
//! IOS then finishes the launch from [`EsDevice::init`], bootstrapping the
//! PPC without another reload.

use std::path::PathBuf;

use crate::es::context::{EsState, LaunchPhase, TitleContext};
use crate::es::{EsDevice, EsEnv, Reply, access_content, check_vectors};
use crate::formats::ticket::Ticket;
use crate::formats::tmd::Tmd;
use crate::memory::{IoctlvRequest, IpcReply};
use crate::title::{TITLEID_BC, TITLEID_MIOS, TITLEID_SYSMENU, Tid, TitleType, low};
use crate::{Error, Result};

impl EsDevice {
    /// Bring a freshly created device up.
    ///
    /// The host calls this once the IOS hosting the device has booted. It
    /// resets the title context and completes a launch that was waiting for
    /// this reload.
    pub fn init(&mut self, env: &mut EsEnv) {
        env.state.content_file = None;
        env.state.title = TitleContext::new();

        if let LaunchPhase::AwaitingServiceReload { target } = env.state.launch {
            tracing::info!("re-launching {} after IOS reload", Tid(target));
            env.state.launch = LaunchPhase::BootstrappingTitle { target };
            if let Err(e) = self.launch_title(env, target, true) {
                tracing::error!("re-launch of {} failed: {e}", Tid(target));
            }
            env.state.launch = LaunchPhase::Idle;
        }
    }

    /// Switch to `title_id`: an IOS is reloaded directly, any other title is
    /// launched on the PPC.
    pub fn launch_title(
        &mut self,
        env: &mut EsEnv,
        title_id: u64,
        skip_reload: bool,
    ) -> Result<()> {
        env.state.title.clear();
        tracing::info!("launch: title context changed: (none)");
        tracing::info!("launching title {}", Tid(title_id));

        // open contents must not survive a launch
        self.content.clear_cache();

        if TitleType::System.matches(title_id) && title_id != TITLEID_SYSMENU {
            return self.launch_ios(env, title_id);
        }
        self.launch_ppc_title(env, title_id, skip_reload)
    }

    fn launch_ios(&mut self, env: &mut EsEnv, ios_title_id: u64) -> Result<()> {
        if !env.kernel.reload_ios(ios_title_id) {
            tracing::error!("failed to reload IOS {}", Tid(ios_title_id));
            return Err(Error::TitleNotFound(ios_title_id));
        }
        Ok(())
    }

    fn launch_ppc_title(
        &mut self,
        env: &mut EsEnv,
        title_id: u64,
        skip_reload: bool,
    ) -> Result<()> {
        let loader = match access_content(&mut self.content, env.state, title_id) {
            Ok(loader) => loader,
            Err(e) => {
                env.state.panic_alert(&format!(
                    "Could not launch title {title_id:016x} because it is missing from the NAND.\n\
                     The emulated software will likely hang now."
                ));
                return Err(e);
            }
        };
        let ticket = loader.require_ticket()?.clone();
        let tmd = loader.tmd().clone();

        // IOS always reloads into the required version first, even when it
        // is already running.
        if !skip_reload {
            let required_ios = tmd.ios_id();
            if !TitleType::System.matches(required_ios) || required_ios == TITLEID_SYSMENU {
                tracing::error!("{} requires invalid IOS {required_ios:016x}", Tid(title_id));
                return Err(Error::InvalidTmd);
            }
            env.state.launch = LaunchPhase::AwaitingServiceReload { target: title_id };
            let result = self.launch_title(env, required_ios, false);
            if result.is_err() {
                env.state.launch = LaunchPhase::Idle;
            }
            return result;
        }

        env.state.update_title(tmd.clone(), ticket);
        tracing::info!("launch: title context changed: {}", Tid(title_id));
        self.bootstrap_ppc(env, &tmd)
    }

    /// Read the boot content and hand it to the kernel.
    fn bootstrap_ppc(&mut self, env: &mut EsEnv, tmd: &Tmd) -> Result<()> {
        let loader = access_content(&mut self.content, env.state, tmd.title_id())?;
        let boot = loader
            .content_by_index(tmd.boot_index())
            .ok_or(Error::ContentNotFound)?;
        let size = usize::try_from(boot.metadata.size).map_err(|_| Error::InvalidTmd)?;

        let mut dol = vec![0u8; size];
        boot.source.open()?;
        let read = boot.source.read_range(0, &mut dol);
        boot.source.close();
        read?;

        if !env.kernel.bootstrap_ppc(tmd, &dol) {
            tracing::error!("failed to bootstrap the PPC for {}", Tid(tmd.title_id()));
            return Err(Error::InvalidTmd);
        }
        tracing::info!("bootstrapped {} ({size:#x} byte boot content)", Tid(tmd.title_id()));
        Ok(())
    }

    /// Launch `title_id`; on success the reply is replaced by an
    /// acknowledgement, as the launch may tear this device down.
    fn launch_and_acknowledge(
        &mut self,
        env: &mut EsEnv,
        req: &IoctlvRequest,
        title_id: u64,
    ) -> Reply {
        if let Err(e) = self.launch_title(env, title_id, false) {
            tracing::error!("launch of {} failed: {e}", Tid(title_id));
            return Err(Error::InvalidTmd);
        }
        env.kernel.enqueue_command_acknowledgement(req.address);
        Ok(IpcReply::no_reply())
    }

    pub(super) fn launch(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 2, 0)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;

        // ticket view of the title; only logged
        let view = req.input(1)?.address;
        let memory = &*env.memory;
        tracing::info!(
            "Launch: {title_id:016x} view {:08x} ticket {:016x} device type {:08x} title {:016x} access {:04x}",
            memory.read_u32(view).unwrap_or_default(),
            memory.read_u64(view.wrapping_add(4)).unwrap_or_default(),
            memory.read_u32(view.wrapping_add(12)).unwrap_or_default(),
            memory.read_u64(view.wrapping_add(16)).unwrap_or_default(),
            memory.read_u16(view.wrapping_add(24)).unwrap_or_default(),
        );

        self.launch_and_acknowledge(env, req, title_id)
    }

    pub(super) fn launch_bc(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 0, 0)?;
        // not available in GameCube mode
        if env.kernel.version() as u32 == low(TITLEID_MIOS) {
            return Err(Error::InvalidParameters);
        }
        self.launch_and_acknowledge(env, req, TITLEID_BC)
    }

    /// Verify a disc title and make it active.
    ///
    /// Used by the disc drive rather than through an ioctlv. Installs the
    /// disc TMD if the title has none yet and registers the title.
    pub fn di_verify(&mut self, state: &mut EsState, tmd: Vec<u8>, ticket: Vec<u8>) -> Result<()> {
        state.title.clear();
        tracing::info!("DIVerify: title context changed: (none)");

        let (Ok(tmd), Ok(ticket)) = (Tmd::parse(tmd), Ticket::parse(ticket)) else {
            return Err(Error::InvalidParameters);
        };
        if tmd.title_id() != ticket.title_id() {
            return Err(Error::InvalidParameters);
        }

        let title_id = tmd.title_id();
        let nand = self.content.nand();
        if let Err(e) = nand.create_title_data_dir(title_id) {
            tracing::error!("DIVerify failed to create the data directory: {e}");
        }
        if !nand.has_tmd(title_id)
            && let Err(e) = nand.write_tmd(&tmd)
        {
            tracing::error!("DIVerify failed to write disc TMD to NAND: {e}");
        }
        if let Err(e) = nand.add_title_to_uid_sys(title_id) {
            tracing::error!("DIVerify failed to register {}: {e}", Tid(title_id));
        }
        // the cached loader may hold a stale TMD
        self.content.clear_cache();

        state.update_title(tmd, ticket);
        tracing::info!("DIVerify: title context changed: {}", Tid(title_id));
        Ok(())
    }

    /// Boot a title straight from a WAD file.
    ///
    /// Content requests for the title are served from the WAD until the next
    /// IOS reload.
    pub fn load_wad(&mut self, state: &mut EsState, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        state.content_file = Some(path.clone());

        let loader = self.content.wad(&path)?;
        let tmd = loader.tmd().clone();
        let ticket = loader.require_ticket()?.clone();
        let title_id = tmd.title_id();
        state.update_title(tmd, ticket);
        tracing::info!("LoadWAD: title context changed: {}", Tid(title_id));
        Ok(())
    }
}
