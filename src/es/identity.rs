//! Console identity, signing and key table crypto.

use crate::crypto::{decrypt_cbc, encrypt_cbc};
use crate::es::{EsDevice, EsEnv, Reply, check_vectors, ensure, write_clamped};
use crate::host::CERTIFICATE_SIZE;
use crate::keys::KeyIndex;
use crate::memory::{IoctlvRequest, IpcReply};
use crate::title::Tid;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

impl EsDevice {
    pub(super) fn get_device_id(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 0, 1)?;
        let device_id = self.identity.device_id();
        tracing::info!("GetDeviceID: {device_id:08X}");
        env.memory.write_u32(req.output(0)?.address, device_id)?;
        Ok(IpcReply::new(0))
    }

    pub(super) fn get_device_certificate(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 0, 1)?;
        let out = req.output(0)?;
        ensure(out.size as usize == CERTIFICATE_SIZE)?;

        tracing::info!("GetDeviceCertificate");
        env.memory
            .copy_to_emu(out.address, &self.identity.device_certificate())?;
        Ok(IpcReply::new(0))
    }

    pub(super) fn sign(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 1, 2)?;
        let title_id = env.state.title.title_id().ok_or(Error::NoActiveTitle)?;
        let input = req.input(0)?;
        let data = env.memory.read_bytes(input.address, input.size)?;

        tracing::info!("Sign: {:#x} bytes for {}", data.len(), Tid(title_id));
        let (signature, certificate) = self.identity.sign(title_id, &data);
        write_clamped(env.memory, req.output(0)?, &signature)?;
        write_clamped(env.memory, req.output(1)?, &certificate)?;
        Ok(IpcReply::new(0))
    }

    pub(super) fn get_boot2_version(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 0, 1)?;
        tracing::info!("GetBoot2Version");
        env.memory
            .write_u32(req.output(0)?.address, self.config.boot2_version)?;
        Ok(IpcReply::new(0))
    }

    /// IOS70 lets the system menu probe for Korean keys here; finding none
    /// is reported as -1017.
    pub(super) fn check_korea_region(&mut self, _env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        check_vectors(req, 0, 0)?;
        tracing::info!("CheckKoreaRegion: no Korean keys");
        Err(Error::InvalidParameters)
    }

    pub(super) fn encrypt(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        self.crypt(env, req, Direction::Encrypt)
    }

    pub(super) fn decrypt(&mut self, env: &mut EsEnv, req: &IoctlvRequest) -> Reply {
        self.crypt(env, req, Direction::Decrypt)
    }

    /// `in: key index, IV, data` / `io: new IV, output`.
    fn crypt(&mut self, env: &mut EsEnv, req: &IoctlvRequest, direction: Direction) -> Reply {
        check_vectors(req, 3, 2)?;
        let index = KeyIndex::try_from(env.memory.read_u32(req.input(0)?.address)?)?;
        let mut iv = [0u8; 16];
        env.memory.copy_from_emu(&mut iv, req.input(1)?.address)?;
        let source = req.input(2)?;
        let data = env.memory.read_bytes(source.address, source.size)?;

        if index != KeyIndex::Sd {
            tracing::warn!("{direction:?} with key {index:?}: only the SD key is supported");
        }
        let key = self.keys.aes_key(index);
        let output = match direction {
            Direction::Encrypt => encrypt_cbc(&key, &mut iv, &data),
            Direction::Decrypt => decrypt_cbc(&key, &mut iv, &data),
        }?;

        write_clamped(env.memory, req.output(0)?, &iv)?;
        write_clamped(env.memory, req.output(1)?, &output)?;
        Ok(IpcReply::new(0))
    }
}
