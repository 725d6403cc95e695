//! Collaborators the ES device calls back into.
//!
//! | Trait | Provided by the host | Used for |
//! |-------|----------------------|----------|
//! | [`Kernel`] | IOS kernel emulation | IOS reloads, PPC bootstrap, deferred acknowledgements |
//! | [`ConsoleIdentity`] | console key store | device ID, device certificate, signing |
//! | [`EmulatorHooks`] | emulator frontend | running-game change notifications, user-visible alerts |

use crate::es::RunningGame;
use crate::formats::tmd::Tmd;
use crate::title::{high, low};

/// The IOS kernel hosting the ES device.
pub trait Kernel {
    /// Low 16 bits of the running IOS title ID (e.g. `0x101` for MIOS).
    fn version(&self) -> u16;

    /// Tear down the running IOS and boot `ios_title_id`.
    ///
    /// Once the new IOS is up the host calls [`crate::es::EsDevice::init`]
    /// on the fresh ES device.
    fn reload_ios(&mut self, ios_title_id: u64) -> bool;

    /// Load `boot_content` (the title's boot DOL) and start the PowerPC.
    fn bootstrap_ppc(&mut self, tmd: &Tmd, boot_content: &[u8]) -> bool;

    /// Queue an acknowledgement for the IPC command at `address`.
    fn enqueue_command_acknowledgement(&mut self, address: u32);
}

/// Size of a device or AP certificate.
pub const CERTIFICATE_SIZE: usize = 0x180;
/// Size of an ECDSA signature.
pub const SIGNATURE_SIZE: usize = 0x3C;

/// Per-console identity and signing keys.
pub trait ConsoleIdentity {
    fn device_id(&self) -> u32;

    /// The console's device (NG) certificate.
    fn device_certificate(&self) -> [u8; CERTIFICATE_SIZE];

    /// Sign `data` on behalf of `title_id`, returning the signature and the
    /// application (AP) certificate that verifies it.
    fn sign(&self, title_id: u64, data: &[u8]) -> ([u8; SIGNATURE_SIZE], [u8; CERTIFICATE_SIZE]);
}

/// Identity of a default emulated console.
///
/// Certificates are well formed but carry zero signatures and public keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultIdentity {
    pub device_id: u32,
    pub key_id: u32,
}

impl Default for DefaultIdentity {
    fn default() -> Self {
        Self {
            device_id: 0x0403_AC68,
            key_id: 0x6AAB_8C59,
        }
    }
}

/// ECC certificate layout shared by NG and AP certificates.
///
/// ```text
/// [0x000] SignatureType (u32, 0x00010002)
/// [0x004] Signature     (0x3C)
/// [0x040] Padding       (0x40)
/// [0x080] Issuer        (0x40)
/// [0x0C0] KeyType       (u32, 2)
/// [0x0C4] Name          (0x40)
/// [0x104] KeyId         (u32)
/// [0x108] PublicKey     (0x3C)
/// [0x144] Padding       (0x3C)
/// ```
fn make_certificate(issuer: &str, name: &str, key_id: u32) -> [u8; CERTIFICATE_SIZE] {
    let mut cert = [0u8; CERTIFICATE_SIZE];
    cert[0..4].copy_from_slice(&0x0001_0002u32.to_be_bytes());
    copy_str(&mut cert[0x80..0xC0], issuer);
    cert[0xC0..0xC4].copy_from_slice(&2u32.to_be_bytes());
    copy_str(&mut cert[0xC4..0x104], name);
    cert[0x104..0x108].copy_from_slice(&key_id.to_be_bytes());
    cert
}

fn copy_str(dst: &mut [u8], s: &str) {
    let n = s.len().min(dst.len() - 1);
    dst[..n].copy_from_slice(&s.as_bytes()[..n]);
}

const ROOT_ISSUER: &str = "Root-CA00000001-MS00000002";

impl ConsoleIdentity for DefaultIdentity {
    fn device_id(&self) -> u32 {
        self.device_id
    }

    fn device_certificate(&self) -> [u8; CERTIFICATE_SIZE] {
        make_certificate(ROOT_ISSUER, &format!("NG{:08x}", self.device_id), self.key_id)
    }

    fn sign(&self, title_id: u64, _data: &[u8]) -> ([u8; SIGNATURE_SIZE], [u8; CERTIFICATE_SIZE]) {
        let issuer = format!("{ROOT_ISSUER}-NG{:08x}", self.device_id);
        let name = format!("AP{:08x}{:08x}", high(title_id), low(title_id));
        ([0u8; SIGNATURE_SIZE], make_certificate(&issuer, &name, 0))
    }
}

/// Frontend notifications.
pub trait EmulatorHooks {
    /// Called once per IOS boot when the first title becomes active.
    ///
    /// Hosts reload per-game state here (symbol maps, patches, texture packs).
    fn running_game_changed(&mut self, game: &RunningGame) {
        tracing::info!(game_id = %game.game_id, "running game changed");
    }

    /// Report a condition the user should see.
    fn panic_alert(&mut self, message: &str) {
        tracing::error!("{message}");
    }
}

/// Hooks that only log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHooks;

impl EmulatorHooks for LogHooks {}
