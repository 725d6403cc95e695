//! Title information queries: title lists, TMDs, views and stored contents.

use crate::es::{EsDevice, EsEnv, Reply, access_content, check_vectors, ensure, write_clamped};
use crate::formats::ticket::{SIGNED_TICKET_SIZE, TICKET_VIEW_SIZE, Ticket};
use crate::formats::tmd::Tmd;
use crate::memory::{GuestMemory, IoctlvRequest, IpcReply};
use crate::title::{Tid, TitleType};
use crate::{Error, Result};

/// Largest TMD accepted inline by the `DI*` queries.
const MAX_INLINE_TMD_SIZE: u32 = 4 * 1024 * 1024;

fn write_title_count(memory: &mut dyn GuestMemory, req: &IoctlvRequest, titles: &[u64]) -> Reply {
    check_vectors(req, 0, 1)?;
    let out = req.output(0)?;
    ensure(out.size == 4)?;
    memory.write_u32(out.address, titles.len() as u32)?;
    Ok(IpcReply::new(0))
}

fn write_titles(memory: &mut dyn GuestMemory, req: &IoctlvRequest, titles: &[u64]) -> Reply {
    check_vectors(req, 1, 1)?;
    let max_count = memory.read_u32(req.input(0)?.address)? as usize;
    let out = req.output(0)?;
    for (i, &title_id) in titles.iter().take(max_count).enumerate() {
        memory.write_u64(out.address + i as u32 * 8, title_id)?;
        tracing::debug!("     title {title_id:016x}");
    }
    Ok(IpcReply::new(0))
}

/// Inline TMD passed by the `GetTMDStoredContents*` and `DI*` queries.
fn read_inline_tmd(memory: &dyn GuestMemory, req: &IoctlvRequest) -> Result<Tmd> {
    let input = req.input(0)?;
    let raw = memory.read_bytes(input.address, input.size)?;
    Tmd::parse(raw).map_err(|_| Error::InvalidParameters)
}

impl EsDevice {
    pub(super) fn get_title_contents_count(
        &mut self,
        env: &mut EsEnv,
        req: &IoctlvRequest,
    ) -> Reply {
        check_vectors(req, 1, 1)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;

        let loader = access_content(&mut self.content, env.state, title_id)
            .map_err(|_| Error::InvalidParameters)?;
        let num_contents = loader.tmd().num_contents();
        // disc titles report no installed contents
        let count = if TitleType::Game.matches(title_id) {
            0
        } else {
            num_contents as u32
        };
        env.memory.write_u32(req.output(0)?.address, count)?;

        tracing::info!("GetTitleContentsCount: {} has {num_contents} contents", Tid(title_id));
        Ok(IpcReply::new(0))
    }

    pub(super) fn get_title_contents(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 2, 1)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;
        let out = req.output(0)?;

        let loader = access_content(&mut self.content, env.state, title_id)
            .map_err(|_| Error::InvalidParameters)?;
        for content in loader.tmd().contents() {
            let offset = content.index as u32 * 4;
            if offset + 4 > out.size {
                continue;
            }
            env.memory.write_u32(out.address + offset, content.id)?;
            tracing::debug!("GetTitleContents: index {}: {:08x}", content.index, content.id);
        }
        Ok(IpcReply::new(0))
    }

    pub(super) fn get_title_directory(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 1)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;

        let path = format!("/title/{}/data\0", Tid(title_id));
        write_clamped(env.memory, req.output(0)?, path.as_bytes())?;
        tracing::info!("GetTitleDirectory: {}", path.trim_end_matches('\0'));
        Ok(IpcReply::new(0))
    }

    pub(super) fn get_title_id(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 0, 1)?;
        let title_id = env.state.title.title_id().ok_or(Error::NoActiveTitle)?;
        env.memory.write_u64(req.output(0)?.address, title_id)?;
        tracing::info!("GetTitleID: {}", Tid(title_id));
        Ok(IpcReply::new(0))
    }

    pub(super) fn set_uid(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 0)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;
        tracing::info!("SetUID: {}", Tid(title_id));
        Ok(IpcReply::new(0))
    }

    pub(super) fn get_title_count(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        let titles = self.content.nand().installed_titles();
        tracing::info!("GetTitleCount: {} titles", titles.len());
        write_title_count(env.memory, req, &titles)
    }

    pub(super) fn get_titles(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        write_titles(env.memory, req, &self.content.nand().installed_titles())
    }

    pub(super) fn get_owned_title_count(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        let titles = self.content.nand().titles_with_tickets();
        tracing::info!("GetOwnedTitleCount: {} titles", titles.len());
        write_title_count(env.memory, req, &titles)
    }

    pub(super) fn get_owned_titles(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        write_titles(env.memory, req, &self.content.nand().titles_with_tickets())
    }

    pub(super) fn get_view_count(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 1)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;

        let view_count = access_content(&mut self.content, env.state, title_id)
            .ok()
            .and_then(|loader| loader.ticket())
            .map_or(0, Ticket::number_of_tickets);
        env.memory.write_u32(req.output(0)?.address, view_count)?;

        tracing::info!("GetViewCount: {} has {view_count} views", Tid(title_id));
        Ok(IpcReply::new(0))
    }

    pub(super) fn get_views(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 2, 1)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;
        let max_views = env.memory.read_u32(req.input(1)?.address)?;
        let out = req.output(0)?;

        if let Ok(loader) = access_content(&mut self.content, env.state, title_id)
            && let Some(ticket) = loader.ticket()
        {
            let count = max_views.min(ticket.number_of_tickets());
            for n in 0..count {
                let offset = n * TICKET_VIEW_SIZE as u32;
                if offset + TICKET_VIEW_SIZE as u32 > out.size {
                    break;
                }
                if let Some(view) = ticket.raw_view(n) {
                    env.memory.copy_to_emu(out.address.wrapping_add(offset), &view)?;
                }
            }
        }

        tracing::info!("GetViews: {} (max {max_views})", Tid(title_id));
        Ok(IpcReply::new(0))
    }

    pub(super) fn get_tmd_view_size(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 1)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;

        let loader = access_content(&mut self.content, env.state, title_id)
            .map_err(|_| Error::TitleNotFound(title_id))?;
        let view_size = loader.tmd().raw_view().len() as u32;
        env.memory.write_u32(req.output(0)?.address, view_size)?;

        tracing::info!("GetTMDViewSize: {} view size {view_size}", Tid(title_id));
        Ok(IpcReply::new(0))
    }

    pub(super) fn get_tmd_views(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 2, 1)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;
        let out = req.output(0)?;

        let loader = access_content(&mut self.content, env.state, title_id)
            .map_err(|_| Error::TitleNotFound(title_id))?;
        let view = loader.tmd().raw_view();
        ensure(view.len() == out.size as usize)?;
        env.memory.copy_to_emu(out.address, &view)?;

        tracing::info!("GetTMDViews: {} ({:#x} bytes)", Tid(title_id), view.len());
        Ok(IpcReply::new(0))
    }

    /// TMD view of the inline TMD if one is passed, of the active title
    /// otherwise.
    fn di_tmd_view(&self, env: &EsEnv, req: &IoctlvRequest) -> Result<Vec<u8>> {
        let input = req.input(0)?;
        ensure(input.size < MAX_INLINE_TMD_SIZE)?;
        if input.size != 0 {
            return Ok(read_inline_tmd(&*env.memory, req)?.raw_view());
        }
        env.state
            .title
            .tmd()
            .map(Tmd::raw_view)
            .ok_or(Error::NoActiveTitle)
    }

    pub(super) fn di_get_tmd_view_size(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 1)?;
        let out = req.output(0)?;
        ensure(req.input(0)?.size < MAX_INLINE_TMD_SIZE && out.size == 4)?;

        let view = self.di_tmd_view(env, req)?;
        env.memory.write_u32(out.address, view.len() as u32)?;
        Ok(IpcReply::new(0))
    }

    pub(super) fn di_get_tmd_view(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 2, 1)?;
        ensure(req.input(0)?.size < MAX_INLINE_TMD_SIZE)?;
        let size_vector = req.input(1)?;
        let out = req.output(0)?;
        ensure(size_vector.size == 4)?;
        ensure(env.memory.read_u32(size_vector.address)? == out.size)?;

        let view = self.di_tmd_view(env, req)?;
        ensure(view.len() == out.size as usize)?;
        env.memory.copy_to_emu(out.address, &view)?;
        Ok(IpcReply::new(0))
    }

    pub(super) fn get_consumption(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 2)?;
        env.memory.write_u32(req.output(1)?.address, 0)?;
        tracing::info!("GetConsumption");
        Ok(IpcReply::new(0))
    }

    pub(super) fn di_get_ticket_view(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 1)?;
        let input = req.input(0)?;
        let out = req.output(0)?;
        ensure(out.size as usize == TICKET_VIEW_SIZE)?;
        // a signed ticket, or nothing for the active title's ticket
        ensure(input.size as usize == SIGNED_TICKET_SIZE || input.size == 0)?;

        let view = if input.size == 0 {
            env.state
                .title
                .ticket()
                .ok_or(Error::NoActiveTitle)?
                .raw_view(0)
        } else {
            let raw = env.memory.read_bytes(input.address, input.size)?;
            Ticket::parse(raw)
                .map_err(|_| Error::InvalidParameters)?
                .raw_view(0)
        };
        let view = view.ok_or(Error::InvalidParameters)?;
        env.memory.copy_to_emu(out.address, &view)?;
        Ok(IpcReply::new(0))
    }

    pub(super) fn get_stored_tmd_size(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 1)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;

        let loader = access_content(&mut self.content, env.state, title_id)
            .map_err(|_| Error::TitleNotFound(title_id))?;
        let size = loader.tmd().raw().len() as u32;
        env.memory.write_u32(req.output(0)?.address, size)?;

        tracing::info!("GetStoredTMDSize: {} ({size:#x} bytes)", Tid(title_id));
        Ok(IpcReply::new(0))
    }

    pub(super) fn get_stored_tmd(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 2, 1)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;
        let out = req.output(0)?;

        let loader = access_content(&mut self.content, env.state, title_id)
            .map_err(|_| Error::TitleNotFound(title_id))?;
        let raw = loader.tmd().raw();
        ensure(raw.len() == out.size as usize)?;
        env.memory.copy_to_emu(out.address, raw)?;

        tracing::info!("GetStoredTMD: {}", Tid(title_id));
        Ok(IpcReply::new(0))
    }

    /// Write the number of stored contents of `tmd` to the first output.
    fn write_stored_contents_count(
        &self,
        env: &mut EsEnv,
        req: &IoctlvRequest,
        tmd: &Tmd,
    ) -> Reply {
        let out = req.output(0)?;
        ensure(out.size == 4)?;

        let count = self.content.nand().stored_contents(tmd)?.len() as u32;
        env.memory.write_u32(out.address, count)?;

        tracing::info!(
            "GetStoredContentsCount ({:#x}): {count} contents for {}",
            req.request,
            Tid(tmd.title_id())
        );
        Ok(IpcReply::new(0))
    }

    /// Write up to `max` stored content IDs of `tmd`, `max` being read from
    /// the second input.
    fn write_stored_contents(&self, env: &mut EsEnv, req: &IoctlvRequest, tmd: &Tmd) -> Reply {
        let max_vector = req.input(1)?;
        let out = req.output(0)?;
        ensure(max_vector.size == 4)?;
        let max_count = env.memory.read_u32(max_vector.address)?;
        ensure(max_count.checked_mul(4) == Some(out.size))?;

        let contents = self.content.nand().stored_contents(tmd)?;
        for (i, content) in contents.iter().take(max_count as usize).enumerate() {
            env.memory.write_u32(out.address + i as u32 * 4, content.id)?;
        }
        Ok(IpcReply::new(0))
    }

    /// TMD of an installed title named by an 8-byte first input.
    fn stored_title_tmd(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Result<Tmd> {
        let input = req.input(0)?;
        ensure(input.size == 8)?;
        let title_id = env.memory.read_u64(input.address)?;
        let loader = access_content(&mut self.content, env.state, title_id)
            .map_err(|_| Error::InvalidParameters)?;
        Ok(loader.tmd().clone())
    }

    pub(super) fn get_stored_content_count(
        &mut self,
        env: &mut EsEnv,
        req: &IoctlvRequest,
    ) -> Reply {
        check_vectors(req, 1, 1)?;
        let tmd = self.stored_title_tmd(env, req)?;
        self.write_stored_contents_count(env, req, &tmd)
    }

    pub(super) fn get_stored_contents(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 2, 1)?;
        let tmd = self.stored_title_tmd(env, req)?;
        self.write_stored_contents(env, req, &tmd)
    }

    pub(super) fn get_tmd_stored_content_count(
        &mut self,
        env: &mut EsEnv,
        req: &IoctlvRequest,
    ) -> Reply {
        check_vectors(req, 1, 1)?;
        let tmd = read_inline_tmd(&*env.memory, req)?;
        self.write_stored_contents_count(env, req, &tmd)
    }

    pub(super) fn get_tmd_stored_contents(
        &mut self,
        env: &mut EsEnv,
        req: &IoctlvRequest,
    ) -> Reply {
        check_vectors(req, 2, 1)?;
        let tmd = read_inline_tmd(&*env.memory, req)?;
        self.write_stored_contents(env, req, &tmd)
    }
}
