pub mod carry;
pub mod cartridge;
pub mod cpu;
pub mod machine;
pub mod memory;

pub use cartridge::{Cartridge, CartridgeError, MbcKind};
pub use cpu::{BootVariant, Cpu};
pub use machine::{GameBoy, HeadlessInput, HeadlessVideo, InputDevice, VideoUnit};
pub use memory::Memory;

/// Logical screen width in pixels for the Game Boy DMG.
///
/// The core does not render; these constants exist for video collaborators
/// implementing [`VideoUnit`].
pub const SCREEN_WIDTH: usize = 160;
/// Logical screen height in pixels.
pub const SCREEN_HEIGHT: usize = 144;
