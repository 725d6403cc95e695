//! Ioctlv selectors and the command dispatcher.

use crate::es::{EsDevice, EsEnv};
use crate::memory::{IoctlvRequest, IpcReply};
use crate::{Result, ReturnCode};

/// ES ioctlv selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EsIoctl {
    AddTicket,
    AddTitleStart,
    AddContentStart,
    AddContentData,
    AddContentFinish,
    AddTitleFinish,
    GetDeviceId,
    Launch,
    OpenContent,
    ReadContent,
    CloseContent,
    GetOwnedTitleCount,
    GetOwnedTitles,
    GetTitleCount,
    GetTitles,
    GetTitleContentsCount,
    GetTitleContents,
    GetViewCount,
    GetViews,
    GetTmdViewSize,
    GetTmdViews,
    GetConsumption,
    DeleteTitle,
    DeleteTicket,
    DiGetTmdViewSize,
    DiGetTmdView,
    DiGetTicketView,
    DiVerify,
    GetTitleDirectory,
    GetDeviceCertificate,
    ImportBoot,
    GetTitleId,
    SetUid,
    DeleteTitleContent,
    SeekContent,
    OpenTitleContent,
    LaunchBc,
    ExportTitleInit,
    ExportContentBegin,
    ExportContentData,
    ExportContentEnd,
    ExportTitleDone,
    AddTmd,
    Encrypt,
    Decrypt,
    GetBoot2Version,
    AddTitleCancel,
    Sign,
    VerifySign,
    GetStoredContentCount,
    GetStoredContents,
    GetStoredTmdSize,
    GetStoredTmd,
    GetSharedContentCount,
    GetSharedContents,
    DeleteSharedContent,
    GetTmdStoredContentCount,
    GetTmdStoredContents,
    CheckKoreaRegion,
    Unknown(u32),
}

impl From<u32> for EsIoctl {
    fn from(v: u32) -> Self {
        match v {
            0x01 => Self::AddTicket,
            0x02 => Self::AddTitleStart,
            0x03 => Self::AddContentStart,
            0x04 => Self::AddContentData,
            0x05 => Self::AddContentFinish,
            0x06 => Self::AddTitleFinish,
            0x07 => Self::GetDeviceId,
            0x08 => Self::Launch,
            0x09 => Self::OpenContent,
            0x0A => Self::ReadContent,
            0x0B => Self::CloseContent,
            0x0C => Self::GetOwnedTitleCount,
            0x0D => Self::GetOwnedTitles,
            0x0E => Self::GetTitleCount,
            0x0F => Self::GetTitles,
            0x10 => Self::GetTitleContentsCount,
            0x11 => Self::GetTitleContents,
            0x12 => Self::GetViewCount,
            0x13 => Self::GetViews,
            0x14 => Self::GetTmdViewSize,
            0x15 => Self::GetTmdViews,
            0x16 => Self::GetConsumption,
            0x17 => Self::DeleteTitle,
            0x18 => Self::DeleteTicket,
            0x19 => Self::DiGetTmdViewSize,
            0x1A => Self::DiGetTmdView,
            0x1B => Self::DiGetTicketView,
            0x1C => Self::DiVerify,
            0x1D => Self::GetTitleDirectory,
            0x1E => Self::GetDeviceCertificate,
            0x1F => Self::ImportBoot,
            0x20 => Self::GetTitleId,
            0x21 => Self::SetUid,
            0x22 => Self::DeleteTitleContent,
            0x23 => Self::SeekContent,
            0x24 => Self::OpenTitleContent,
            0x25 => Self::LaunchBc,
            0x26 => Self::ExportTitleInit,
            0x27 => Self::ExportContentBegin,
            0x28 => Self::ExportContentData,
            0x29 => Self::ExportContentEnd,
            0x2A => Self::ExportTitleDone,
            0x2B => Self::AddTmd,
            0x2C => Self::Encrypt,
            0x2D => Self::Decrypt,
            0x2E => Self::GetBoot2Version,
            0x2F => Self::AddTitleCancel,
            0x30 => Self::Sign,
            0x31 => Self::VerifySign,
            0x32 => Self::GetStoredContentCount,
            0x33 => Self::GetStoredContents,
            0x34 => Self::GetStoredTmdSize,
            0x35 => Self::GetStoredTmd,
            0x36 => Self::GetSharedContentCount,
            0x37 => Self::GetSharedContents,
            0x38 => Self::DeleteSharedContent,
            0x39 => Self::GetTmdStoredContentCount,
            0x3A => Self::GetTmdStoredContents,
            0x45 => Self::CheckKoreaRegion,
            x => Self::Unknown(x),
        }
    }
}

impl EsDevice {
    /// Handle one ioctlv.
    ///
    /// Errors never escape: they are logged and turned into the IOS result
    /// code for the condition.
    pub fn ioctlv(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> IpcReply {
        let ioctl = EsIoctl::from(req.request);
        tracing::debug!("ES ioctlv {:#04x} ({ioctl:?})", req.request);

        // output buffers start out zeroed, except where they alias an input
        for out in &req.io_vectors {
            if out.size != 0
                && !req.has_input_vector_with_address(out.address)
                && let Err(e) = env.memory.memset(out.address, 0, out.size)
            {
                tracing::warn!("ES ioctlv {ioctl:?}: cannot clear output buffer: {e}");
            }
        }

        match self.dispatch(env, req, ioctl) {
            Ok(reply) => reply,
            Err(e) => {
                let code = e.return_code();
                tracing::warn!("ES ioctlv {ioctl:?} failed with {code}: {e}");
                IpcReply::from(code)
            }
        }
    }

    /// Decode the ioctlv command buffer at `address` and handle it.
    pub fn handle_ipc(&mut self, env: &mut EsEnv, address: u32) -> IpcReply {
        match IoctlvRequest::read_from(&*env.memory, address) {
            Ok(req) => self.ioctlv(env, &req),
            Err(e) => {
                tracing::error!("malformed ioctlv command buffer at {address:#010x}: {e}");
                IpcReply::from(e.return_code())
            }
        }
    }

    fn dispatch(
        &mut self,
        env: &mut EsEnv,
        req: &IoctlvRequest,
        ioctl: EsIoctl,
    ) -> Result<IpcReply> {
        match ioctl {
            EsIoctl::AddTicket => self.add_ticket(env, req),
            EsIoctl::AddTmd => self.add_tmd(env, req),
            EsIoctl::AddTitleStart => self.add_title_start(env, req),
            EsIoctl::AddContentStart => self.add_content_start(env, req),
            EsIoctl::AddContentData => self.add_content_data(env, req),
            EsIoctl::AddContentFinish => self.add_content_finish(env, req),
            EsIoctl::AddTitleFinish => self.add_title_finish(env, req),
            EsIoctl::GetDeviceId => self.get_device_id(env, req),
            EsIoctl::Launch => self.launch(env, req),
            EsIoctl::LaunchBc => self.launch_bc(env, req),
            EsIoctl::OpenContent => self.open_content(env, req),
            EsIoctl::OpenTitleContent => self.open_title_content(env, req),
            EsIoctl::ReadContent => self.read_content(env, req),
            EsIoctl::SeekContent => self.seek_content(env, req),
            EsIoctl::CloseContent => self.close_content(env, req),
            EsIoctl::GetOwnedTitleCount => self.get_owned_title_count(env, req),
            EsIoctl::GetOwnedTitles => self.get_owned_titles(env, req),
            EsIoctl::GetTitleCount => self.get_title_count(env, req),
            EsIoctl::GetTitles => self.get_titles(env, req),
            EsIoctl::GetTitleContentsCount => self.get_title_contents_count(env, req),
            EsIoctl::GetTitleContents => self.get_title_contents(env, req),
            EsIoctl::GetViewCount => self.get_view_count(env, req),
            EsIoctl::GetViews => self.get_views(env, req),
            EsIoctl::GetTmdViewSize => self.get_tmd_view_size(env, req),
            EsIoctl::GetTmdViews => self.get_tmd_views(env, req),
            EsIoctl::GetConsumption => self.get_consumption(env, req),
            EsIoctl::DeleteTitle => self.delete_title(env, req),
            EsIoctl::DeleteTicket => self.delete_ticket(env, req),
            EsIoctl::DeleteTitleContent => self.delete_title_content(env, req),
            EsIoctl::DiGetTmdViewSize => self.di_get_tmd_view_size(env, req),
            EsIoctl::DiGetTmdView => self.di_get_tmd_view(env, req),
            EsIoctl::DiGetTicketView => self.di_get_ticket_view(env, req),
            EsIoctl::GetTitleDirectory => self.get_title_directory(env, req),
            EsIoctl::GetDeviceCertificate => self.get_device_certificate(env, req),
            EsIoctl::GetTitleId => self.get_title_id(env, req),
            EsIoctl::SetUid => self.set_uid(env, req),
            EsIoctl::ExportTitleInit => self.export_title_init(env, req),
            EsIoctl::ExportContentBegin => self.export_content_begin(env, req),
            EsIoctl::ExportContentData => self.export_content_data(env, req),
            EsIoctl::ExportContentEnd => self.export_content_end(env, req),
            EsIoctl::ExportTitleDone => self.export_title_done(env, req),
            EsIoctl::Encrypt => self.encrypt(env, req),
            EsIoctl::Decrypt => self.decrypt(env, req),
            EsIoctl::GetBoot2Version => self.get_boot2_version(env, req),
            EsIoctl::Sign => self.sign(env, req),
            EsIoctl::GetStoredContentCount => self.get_stored_content_count(env, req),
            EsIoctl::GetStoredContents => self.get_stored_contents(env, req),
            EsIoctl::GetStoredTmdSize => self.get_stored_tmd_size(env, req),
            EsIoctl::GetStoredTmd => self.get_stored_tmd(env, req),
            EsIoctl::GetTmdStoredContentCount => self.get_tmd_stored_content_count(env, req),
            EsIoctl::GetTmdStoredContents => self.get_tmd_stored_contents(env, req),
            EsIoctl::CheckKoreaRegion => self.check_korea_region(env, req),
            EsIoctl::DiVerify
            | EsIoctl::ImportBoot
            | EsIoctl::AddTitleCancel
            | EsIoctl::VerifySign
            | EsIoctl::GetSharedContentCount
            | EsIoctl::GetSharedContents
            | EsIoctl::DeleteSharedContent
            | EsIoctl::Unknown(_) => {
                tracing::warn!("unimplemented ES ioctlv {:#04x} ({ioctl:?})", req.request);
                Ok(IpcReply::from(ReturnCode::SUCCESS))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_decode() {
        assert_eq!(EsIoctl::from(0x01), EsIoctl::AddTicket);
        assert_eq!(EsIoctl::from(0x25), EsIoctl::LaunchBc);
        assert_eq!(EsIoctl::from(0x3A), EsIoctl::GetTmdStoredContents);
        assert_eq!(EsIoctl::from(0x45), EsIoctl::CheckKoreaRegion);
        assert_eq!(EsIoctl::from(0x40), EsIoctl::Unknown(0x40));
    }
}
