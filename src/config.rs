//! ES device configuration.

use std::path::PathBuf;

/// Settings for an [`crate::es::EsDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsConfig {
    /// Host directory holding the emulated NAND.
    pub nand_root: PathBuf,
    /// Optional `name = hex` key file overriding the built-in key table.
    pub keys_file: Option<PathBuf>,
    /// Value reported by `GetBoot2Version`.
    pub boot2_version: u32,
}

impl Default for EsConfig {
    fn default() -> Self {
        Self {
            nand_root: PathBuf::from("nand"),
            keys_file: None,
            boot2_version: 4,
        }
    }
}

impl EsConfig {
    /// Default settings with the NAND at `nand_root`.
    pub fn with_nand_root(nand_root: impl Into<PathBuf>) -> Self {
        Self {
            nand_root: nand_root.into(),
            ..Self::default()
        }
    }
}
