//! Title, ticket and content deletion.

use crate::es::{EsDevice, EsEnv, Reply, check_vectors, ensure};
use crate::memory::{IoctlvRequest, IpcReply};
use crate::nand::can_delete_title;
use crate::title::Tid;
use crate::Error;

impl EsDevice {
    pub(super) fn delete_title(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 0)?;
        ensure(req.input(0)?.size == 8)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;
        tracing::info!("DeleteTitle: {}", Tid(title_id));

        if !can_delete_title(title_id) {
            return Err(Error::ProtectedTitle(title_id));
        }
        if !self.content.nand().title_dir(title_id).is_dir() {
            return Err(Error::TitleNotFound(title_id));
        }
        self.content.remove_title(title_id).map_err(|e| {
            tracing::error!("DeleteTitle: {e}");
            Error::TitleNotFound(title_id)
        })?;
        self.content.nand().delete_title_dir(title_id)?;
        Ok(IpcReply::new(0))
    }

    pub(super) fn delete_ticket(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 0)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;
        tracing::info!("DeleteTicket: {}", Tid(title_id));

        self.content.nand().delete_ticket(title_id).map_err(|e| {
            tracing::error!("DeleteTicket: {e}");
            Error::InvalidParameters
        })?;
        Ok(IpcReply::new(0))
    }

    pub(super) fn delete_title_content(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 0)?;
        let title_id = env.memory.read_u64(req.input(0)?.address)?;
        tracing::info!("DeleteTitleContent: {}", Tid(title_id));

        self.content.remove_title(title_id).map_err(|e| {
            tracing::error!("DeleteTitleContent: {e}");
            Error::InvalidParameters
        })?;
        Ok(IpcReply::new(0))
    }
}
