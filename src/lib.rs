//! **wii-es** - emulation of the Wii IOS ES (ETicket Services) module.
//!
//! ES manages titles on the emulated NAND: it installs and exports them,
//! streams their decrypted contents to running software, answers title and
//! ticket queries and launches titles, reloading IOS when needed.
//!
//! # Modules
//! | Module | Content |
//! |--------|---------|
//! | [`es`] | the `/dev/es` device and its ioctlv handlers |
//! | [`formats::tmd`] | TMD - title metadata |
//! | [`formats::ticket`] | signed tickets and ticket views |
//! | [`formats::wad`] | WAD - installable title package |
//! | [`nand`] | NAND layout, title loaders and the loader cache |
//! | [`crypto`] | AES-128-CBC helpers |
//! | [`keys`] | ES key table |
//! | [`memory`] | guest memory and IPC request decoding |
//! | [`host`] | kernel, console identity and frontend hooks |
//! | [`title`] | title ID helpers |
//! | [`config`] | device settings |
//!
//! # Usage
//! ```no_run
//! use wii_es::config::EsConfig;
//! use wii_es::es::{EsDevice, EsEnv, EsState};
//! use wii_es::host::{DefaultIdentity, LogHooks};
//! # fn run(kernel: &mut dyn wii_es::host::Kernel, memory: &mut dyn wii_es::memory::GuestMemory)
//! #     -> wii_es::Result<()> {
//! let mut state = EsState::new(Box::new(LogHooks));
//! let mut es = EsDevice::new(
//!     EsConfig::with_nand_root("/path/to/nand"),
//!     Box::new(DefaultIdentity::default()),
//! )?;
//! let mut env = EsEnv::new(&mut state, kernel, memory);
//! es.init(&mut env);
//! es.open();
//! let reply = es.handle_ipc(&mut env, 0x8000_1000);
//! println!("ES replied {}", reply.return_value);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod es;
pub mod formats;
pub mod host;
pub mod keys;
pub mod memory;
pub mod nand;
pub mod title;
mod utils;

pub use error::{Error, Result, ReturnCode};
