//! Title ID helpers.
//!
//! A title ID is a 64-bit value. The high 32 bits select the title type
//! (system, disc game, channel, ...); the low 32 bits identify the title
//! within that type. For games and channels the low half is the four ASCII
//! characters of the game code.

use std::fmt;

/// System menu title ID.
pub const TITLEID_SYSMENU: u64 = 0x0000_0001_0000_0002;
/// BC, the GameCube compatibility IOS launched by `LaunchBC`.
pub const TITLEID_BC: u64 = 0x0000_0001_0000_0100;
/// MIOS, the IOS that runs while in GameCube mode.
pub const TITLEID_MIOS: u64 = 0x0000_0001_0000_0101;

/// Title type stored in the high half of a title ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TitleType {
    System = 0x0000_0001,
    Game = 0x0001_0000,
    Channel = 0x0001_0001,
    SystemChannel = 0x0001_0002,
    GameWithChannel = 0x0001_0004,
    Dlc = 0x0001_0005,
    HiddenChannel = 0x0001_0008,
}

impl TitleType {
    /// Whether `title_id` belongs to this type.
    pub fn matches(self, title_id: u64) -> bool {
        high(title_id) == self as u32
    }
}

/// High half (title type) of a title ID.
#[inline]
pub fn high(title_id: u64) -> u32 {
    (title_id >> 32) as u32
}

/// Low half (title identifier) of a title ID.
#[inline]
pub fn low(title_id: u64) -> u32 {
    title_id as u32
}

/// Whether `title_id` names a disc game, with or without an installed channel.
pub fn is_disc_game(title_id: u64) -> bool {
    TitleType::Game.matches(title_id) || TitleType::GameWithChannel.matches(title_id)
}

/// Game identity shown for a running title.
///
/// Disc games get the six-character game code (four characters from the low
/// half of the title ID followed by the two-character group/maker ID); every
/// other title is identified by its full title ID in upper-case hex.
pub fn game_id(title_id: u64, group_id: u16) -> String {
    if is_disc_game(title_id) {
        let mut code = [0u8; 6];
        code[..4].copy_from_slice(&low(title_id).to_be_bytes());
        code[4..].copy_from_slice(&group_id.to_be_bytes());
        String::from_utf8_lossy(&code).into_owned()
    } else {
        format!("{title_id:016X}")
    }
}

/// Displays a title ID as `hhhhhhhh/llllllll`, the form used in NAND paths.
#[derive(Debug, Clone, Copy)]
pub struct Tid(pub u64);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}/{:08x}", high(self.0), low(self.0))
    }
}
