//! Title context and the state ES shares across IOS reloads.
//!
//! A fresh [`super::EsDevice`] is created every time the emulated IOS is
//! reloaded, but the active title, the pending launch and the WAD override
//! outlive it. They live in [`EsState`], which the host owns and lends to the
//! device together with the other collaborators through [`EsEnv`].

use std::path::{Path, PathBuf};

use crate::formats::ticket::Ticket;
use crate::formats::tmd::Tmd;
use crate::host::{EmulatorHooks, Kernel};
use crate::memory::GuestMemory;
use crate::title::{Tid, game_id};

/// Identity of the title the emulated console is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningGame {
    /// Six-character game code for disc games, upper-case hex title ID
    /// otherwise.
    pub game_id: String,
    pub title_id: u64,
}

impl RunningGame {
    pub fn from_tmd(tmd: &Tmd) -> Self {
        Self {
            game_id: game_id(tmd.title_id(), tmd.group_id()),
            title_id: tmd.title_id(),
        }
    }
}

/// The active title: at most one (TMD, ticket) pair.
#[derive(Debug, Clone)]
pub struct TitleContext {
    active: Option<(Tmd, Ticket)>,
    first_change: bool,
}

impl Default for TitleContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TitleContext {
    pub fn new() -> Self {
        Self {
            active: None,
            first_change: true,
        }
    }

    /// Drop the active title.
    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn tmd(&self) -> Option<&Tmd> {
        self.active.as_ref().map(|(tmd, _)| tmd)
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        self.active.as_ref().map(|(_, ticket)| ticket)
    }

    pub fn title_id(&self) -> Option<u64> {
        self.tmd().map(Tmd::title_id)
    }

    /// Make `(tmd, ticket)` the active title.
    ///
    /// Returns the new running game the first time a title becomes active
    /// after construction, `None` on every later update.
    pub fn update(&mut self, tmd: Tmd, ticket: Ticket) -> Option<RunningGame> {
        tracing::info!("title context changed: {}", Tid(tmd.title_id()));
        let game = self.first_change.then(|| RunningGame::from_tmd(&tmd));
        self.first_change = false;
        self.active = Some((tmd, ticket));
        game
    }
}

/// Where a title launch stands across the IOS reload it may need.
///
/// ```text
/// Idle --launch(T)--> AwaitingServiceReload { T }
///      --EsDevice::init--> BootstrappingTitle { T } --bootstrap--> Idle
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaunchPhase {
    #[default]
    Idle,
    /// The IOS required by `target` is being loaded; once it is up the new
    /// ES device launches `target` without another reload.
    AwaitingServiceReload { target: u64 },
    BootstrappingTitle { target: u64 },
}

/// ES state that survives IOS reloads.
pub struct EsState {
    pub(super) title: TitleContext,
    pub(super) launch: LaunchPhase,
    pub(super) content_file: Option<PathBuf>,
    pub(super) running_game: Option<RunningGame>,
    pub(super) hooks: Box<dyn EmulatorHooks>,
}

impl std::fmt::Debug for EsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EsState")
            .field("title", &self.title)
            .field("launch", &self.launch)
            .field("content_file", &self.content_file)
            .field("running_game", &self.running_game)
            .finish_non_exhaustive()
    }
}

impl EsState {
    pub fn new(hooks: Box<dyn EmulatorHooks>) -> Self {
        Self {
            title: TitleContext::new(),
            launch: LaunchPhase::Idle,
            content_file: None,
            running_game: None,
            hooks,
        }
    }

    pub fn title(&self) -> &TitleContext {
        &self.title
    }

    pub fn launch_phase(&self) -> LaunchPhase {
        self.launch
    }

    /// WAD file that overrides the NAND for the active title.
    pub fn content_file(&self) -> Option<&Path> {
        self.content_file.as_deref()
    }

    pub fn running_game(&self) -> Option<&RunningGame> {
        self.running_game.as_ref()
    }

    /// Update the title context and notify the frontend on the first change.
    pub(super) fn update_title(&mut self, tmd: Tmd, ticket: Ticket) {
        if let Some(game) = self.title.update(tmd, ticket) {
            self.hooks.running_game_changed(&game);
            self.running_game = Some(game);
        }
    }

    pub(super) fn panic_alert(&mut self, message: &str) {
        self.hooks.panic_alert(message);
    }
}

/// Everything an ES command may touch besides the device itself.
pub struct EsEnv<'a> {
    pub state: &'a mut EsState,
    pub kernel: &'a mut dyn Kernel,
    pub memory: &'a mut dyn GuestMemory,
}

impl<'a> EsEnv<'a> {
    pub fn new(
        state: &'a mut EsState,
        kernel: &'a mut dyn Kernel,
        memory: &'a mut dyn GuestMemory,
    ) -> Self {
        Self {
            state,
            kernel,
            memory,
        }
    }
}
