//! Cartridge ROM/RAM buffers and the memory bank controller (MBC) state
//! machine.
//!
//! The bank controller remaps the switchable ROM window (0x4000..=0x7FFF) and
//! the external RAM window (0xA000..=0xBFFF) onto physical offsets in the
//! cartridge buffers. Writes into ROM address space never modify ROM; they are
//! bank-control commands interpreted per controller variant.

use thiserror::Error;

/// Size of one ROM bank (the fixed and switchable windows are one bank each).
pub const ROM_BANK_SIZE: usize = 0x4000;
/// Size of one external RAM bank.
pub const RAM_BANK_SIZE: usize = 0x2000;

/// Header offset of the controller-type byte.
const HEADER_TYPE: usize = 0x0147;
/// Header offset of the ROM-size code (`0x8000 << code` bytes).
const HEADER_ROM_SIZE: usize = 0x0148;
/// Header offset of the RAM-size code.
const HEADER_RAM_SIZE: usize = 0x0149;
/// The cartridge header ends at 0x014F; anything shorter cannot be parsed.
const HEADER_END: usize = 0x0150;

/// Bank controller variants.
///
/// MBC1 ships in two wiring modes: 16 ROM banks x 8 RAM banks, where the
/// 0x4000..=0x5FFF write sets the upper ROM bank bits, and 4 ROM banks x 32
/// RAM banks, where the same write selects the RAM bank instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MbcKind {
    RomOnly,
    Mbc1Mode16x8,
    Mbc1Mode4x32,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// Fatal cartridge construction errors. The core does not attempt partial
/// recovery from a malformed image.
#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("ROM image too short to contain a cartridge header ({0} bytes)")]
    ImageTooShort(usize),
    #[error("unrecognized cartridge controller type byte 0x{0:02X}")]
    UnknownControllerType(u8),
    #[error("unrecognized ROM size code 0x{0:02X}")]
    UnknownRomSize(u8),
    #[error("unrecognized RAM size code 0x{0:02X}")]
    UnknownRamSize(u8),
    #[error("ROM image truncated: header declares {expected} bytes, image has {actual}")]
    TruncatedRom { expected: usize, actual: usize },
}

pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    kind: MbcKind,
    /// Current switchable ROM bank. Never 0 on controllers that reserve
    /// bank 0 (a written value of 0 selects bank 1).
    rom_bank: usize,
    ram_bank: usize,
}

impl Cartridge {
    /// Parse a raw cartridge image, reading the controller type, ROM size,
    /// and RAM size from the header.
    pub fn from_image(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        if rom.len() < HEADER_END {
            return Err(CartridgeError::ImageTooShort(rom.len()));
        }

        let kind = match rom[HEADER_TYPE] {
            0x00 | 0x08 | 0x09 | 0x0B | 0x0C | 0x0D => MbcKind::RomOnly,
            // The 4x32 wiring mode is selected by the program at run time;
            // images start out in 16x8 mode.
            0x01..=0x03 => MbcKind::Mbc1Mode16x8,
            0x05 | 0x06 => MbcKind::Mbc2,
            0x0F..=0x13 => MbcKind::Mbc3,
            0x19..=0x1E => MbcKind::Mbc5,
            other => return Err(CartridgeError::UnknownControllerType(other)),
        };

        let rom_size_code = rom[HEADER_ROM_SIZE];
        if rom_size_code > 0x08 {
            return Err(CartridgeError::UnknownRomSize(rom_size_code));
        }
        let expected = (ROM_BANK_SIZE * 2) << rom_size_code;
        if rom.len() < expected {
            return Err(CartridgeError::TruncatedRom {
                expected,
                actual: rom.len(),
            });
        }

        let ram_banks = match rom[HEADER_RAM_SIZE] {
            0x00 => 0,
            // Code 0x01 is a quarter bank on hardware; both small codes get
            // one full bank here since banking never applies to them.
            0x01 | 0x02 => 1,
            0x03 => 4,
            0x04 => 16,
            other => return Err(CartridgeError::UnknownRamSize(other)),
        };
        // MBC2 carries its 512x4-bit cells on the controller itself and
        // ignores the header RAM code.
        let ram_banks = if kind == MbcKind::Mbc2 { 1 } else { ram_banks };

        log::info!(
            "cartridge: {:?}, {} ROM bytes, {} RAM bank(s)",
            kind,
            rom.len(),
            ram_banks
        );

        Ok(Self::with_layout(kind, rom, ram_banks))
    }

    /// Construct a cartridge with an explicit controller kind and RAM size,
    /// bypassing header parsing. Used by tests and tooling.
    pub fn with_layout(kind: MbcKind, rom: Vec<u8>, ram_banks: usize) -> Self {
        Self {
            rom,
            ram: vec![0; ram_banks * RAM_BANK_SIZE],
            kind,
            rom_bank: 1,
            ram_bank: 0,
        }
    }

    pub fn kind(&self) -> MbcKind {
        self.kind
    }

    pub fn rom_bank(&self) -> usize {
        self.rom_bank
    }

    pub fn ram_bank(&self) -> usize {
        self.ram_bank
    }

    #[inline]
    fn rom_offset(&self, addr: u16) -> usize {
        if (0x4000..=0x7FFF).contains(&addr) {
            ROM_BANK_SIZE * self.rom_bank + (addr as usize - 0x4000)
        } else {
            addr as usize
        }
    }

    #[inline]
    fn ram_offset(&self, addr: u16) -> usize {
        RAM_BANK_SIZE * self.ram_bank + (addr as usize - 0xA000)
    }

    /// Read a byte from ROM address space, translating the switchable window
    /// through the current ROM bank. Reads past the end of the image (a bank
    /// index beyond the ROM) return open-bus 0xFF.
    pub fn load_rom_byte(&self, addr: u16) -> u8 {
        self.rom.get(self.rom_offset(addr)).copied().unwrap_or(0xFF)
    }

    /// Interpret a write into ROM address space as a bank-control command.
    pub fn store_rom_byte(&mut self, addr: u16, val: u8) {
        match self.kind {
            MbcKind::RomOnly => {}

            MbcKind::Mbc1Mode16x8 => {
                if (0x2000..=0x3FFF).contains(&addr) {
                    let low = if val & 0x1F == 0 { 1 } else { val & 0x1F };
                    self.rom_bank = (self.rom_bank & 0x60) | low as usize;
                }
                if (0x4000..=0x5FFF).contains(&addr) {
                    self.rom_bank = (self.rom_bank & 0x1F) | ((val as usize & 0x03) << 5);
                }
            }

            MbcKind::Mbc1Mode4x32 => {
                if (0x2000..=0x3FFF).contains(&addr) {
                    let low = if val & 0x1F == 0 { 1 } else { val & 0x1F };
                    self.rom_bank = (self.rom_bank & 0x60) | low as usize;
                }
                if (0x4000..=0x5FFF).contains(&addr) {
                    self.ram_bank = val as usize & 0x0F;
                }
            }

            MbcKind::Mbc2 => {
                if (0x2000..=0x3FFF).contains(&addr) {
                    let bank = val & 0x0F;
                    self.rom_bank = if bank == 0 { 1 } else { bank as usize };
                }
            }

            MbcKind::Mbc3 => {
                if (0x2000..=0x3FFF).contains(&addr) {
                    let bank = val & 0x7F;
                    self.rom_bank = if bank == 0 { 1 } else { bank as usize };
                }
                if (0x4000..=0x5FFF).contains(&addr) {
                    self.ram_bank = val as usize & 0x0F;
                }
            }

            MbcKind::Mbc5 => {
                if (0x2000..=0x2FFF).contains(&addr) {
                    self.rom_bank = (self.rom_bank & 0x100) | val as usize;
                }
                if (0x3000..=0x3FFF).contains(&addr) {
                    self.rom_bank = (self.rom_bank & 0x0FF) | ((val as usize & 0x01) << 8);
                }
                if (0x4000..=0x5FFF).contains(&addr) {
                    self.ram_bank = val as usize & 0x0F;
                }
            }
        }
    }

    /// Read a byte from external RAM address space through the current RAM
    /// bank. Absent RAM reads as 0.
    pub fn load_ram_byte(&self, addr: u16) -> u8 {
        self.ram.get(self.ram_offset(addr)).copied().unwrap_or(0)
    }

    /// Write a byte into external RAM. A cartridge without RAM discards the
    /// write silently, matching hardware's behaviour for absent RAM. MBC2
    /// cells are 4 bits wide; the high nibble is masked off.
    pub fn store_ram_byte(&mut self, addr: u16, val: u8) {
        let val = if self.kind == MbcKind::Mbc2 {
            val & 0x0F
        } else {
            val
        };
        let offset = self.ram_offset(addr);
        if let Some(cell) = self.ram.get_mut(offset) {
            *cell = val;
        }
    }

    /// Little-endian word read from ROM space: low byte at `addr`, high byte
    /// at `addr + 1`, each translated through the bank mapping.
    pub fn load_rom_word(&self, addr: u16) -> u16 {
        let lo = self.load_rom_byte(addr) as u16;
        let hi = self.load_rom_byte(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// Word-granularity bank-control write: both bytes are presented to the
    /// controller at adjacent addresses, low byte first.
    pub fn store_rom_word(&mut self, addr: u16, val: u16) {
        self.store_rom_byte(addr, val as u8);
        self.store_rom_byte(addr.wrapping_add(1), (val >> 8) as u8);
    }

    pub fn load_ram_word(&self, addr: u16) -> u16 {
        let lo = self.load_ram_byte(addr) as u16;
        let hi = self.load_ram_byte(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn store_ram_word(&mut self, addr: u16, val: u16) {
        self.store_ram_byte(addr, val as u8);
        self.store_ram_byte(addr.wrapping_add(1), (val >> 8) as u8);
    }

    /// Direct unbanked ROM access for diagnostics and tests.
    pub fn peek_rom(&self, offset: usize) -> u8 {
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }

    /// Direct unbanked RAM access for diagnostics and tests.
    pub fn peek_ram(&self, offset: usize) -> u8 {
        self.ram.get(offset).copied().unwrap_or(0)
    }

    /// Direct unbanked RAM write. Used by the memory router's byte-reference
    /// contract; bank translation has already happened by then.
    pub(crate) fn poke_ram(&mut self, offset: usize, val: u8) {
        if let Some(cell) = self.ram.get_mut(offset) {
            *cell = val;
        }
    }

    /// Resolve an external-RAM address to its banked physical offset, or
    /// `None` when the cartridge has no RAM.
    pub(crate) fn ram_ref_offset(&self, addr: u16) -> Option<usize> {
        let offset = self.ram_offset(addr);
        (offset < self.ram.len()).then_some(offset)
    }

    /// Resolve a ROM address to its banked physical offset.
    pub(crate) fn rom_ref_offset(&self, addr: u16) -> usize {
        self.rom_offset(addr)
    }
}

#[cfg(test)]
mod tests;
