//! Cache of title loaders.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::nand::Nand;
use crate::nand::loader::TitleLoader;
use crate::{Error, Result};

/// Resolves title IDs (and WAD files) to [`TitleLoader`]s, caching them
/// until [`ContentManager::clear_cache`] drops every loader and with it
/// every open content file.
#[derive(Debug)]
pub struct ContentManager {
    nand: Nand,
    common_key: [u8; 16],
    titles: HashMap<u64, TitleLoader>,
    wads: HashMap<PathBuf, TitleLoader>,
}

impl ContentManager {
    pub fn new(nand: Nand, common_key: [u8; 16]) -> Self {
        Self {
            nand,
            common_key,
            titles: HashMap::new(),
            wads: HashMap::new(),
        }
    }

    pub fn nand(&self) -> &Nand {
        &self.nand
    }

    /// Loader for an installed title.
    pub fn title(&mut self, title_id: u64) -> Result<&mut TitleLoader> {
        if !self.titles.contains_key(&title_id) {
            let loader = TitleLoader::from_nand(&self.nand, title_id)?;
            self.titles.insert(title_id, loader);
        }
        self.titles
            .get_mut(&title_id)
            .ok_or(Error::TitleNotFound(title_id))
    }

    /// Loader for a WAD file on the host.
    pub fn wad(&mut self, path: &Path) -> Result<&mut TitleLoader> {
        if !self.wads.contains_key(path) {
            let loader = TitleLoader::from_wad(path, &self.common_key)?;
            self.wads.insert(path.to_path_buf(), loader);
        }
        self.wads
            .get_mut(path)
            .ok_or(Error::TitleNotFound(0))
    }

    /// Loader for `title_id`, read from `wad` when one is given.
    pub fn access(&mut self, title_id: u64, wad: Option<&Path>) -> Result<&mut TitleLoader> {
        match wad {
            Some(path) => self.wad(path),
            None => self.title(title_id),
        }
    }

    /// Drop every cached loader.
    pub fn clear_cache(&mut self) {
        self.titles.clear();
        self.wads.clear();
    }

    /// Delete an installed title's private contents.
    ///
    /// Fails with [`Error::TitleNotFound`] when the title has no TMD.
    pub fn remove_title(&mut self, title_id: u64) -> Result<()> {
        self.title(title_id)?;
        if let Some(loader) = self.titles.get(&title_id) {
            loader.remove_contents(&self.nand);
        }
        self.clear_cache();
        Ok(())
    }
}
