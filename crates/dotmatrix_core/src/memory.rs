//! The 64 KiB address-space router.
//!
//! Every 16-bit address maps to exactly one of cartridge ROM, cartridge RAM,
//! or the console-internal array (work RAM, VRAM, OAM, IO registers, HRAM).
//! Stores to a handful of IO registers have side effects beyond a plain RAM
//! write; those are handled here so that the CPU and the video/input
//! collaborators all observe the same register semantics.

use crate::cartridge::Cartridge;

/// Register addresses the router treats specially, plus the rest of the
/// documented IO map for post-boot initialization.
pub mod regs {
    pub const P1: u16 = 0xFF00;
    pub const SB: u16 = 0xFF01;
    pub const SC: u16 = 0xFF02;
    pub const DIV: u16 = 0xFF04;
    pub const TIMA: u16 = 0xFF05;
    pub const TMA: u16 = 0xFF06;
    pub const TAC: u16 = 0xFF07;
    pub const IF: u16 = 0xFF0F;
    pub const NR10: u16 = 0xFF10;
    pub const NR11: u16 = 0xFF11;
    pub const NR12: u16 = 0xFF12;
    pub const NR14: u16 = 0xFF14;
    pub const NR21: u16 = 0xFF16;
    pub const NR22: u16 = 0xFF17;
    pub const NR24: u16 = 0xFF19;
    pub const NR30: u16 = 0xFF1A;
    pub const NR31: u16 = 0xFF1B;
    pub const NR32: u16 = 0xFF1C;
    pub const NR34: u16 = 0xFF1E;
    pub const NR41: u16 = 0xFF20;
    pub const NR42: u16 = 0xFF21;
    pub const NR43: u16 = 0xFF22;
    pub const NR44: u16 = 0xFF23;
    pub const NR50: u16 = 0xFF24;
    pub const NR51: u16 = 0xFF25;
    pub const NR52: u16 = 0xFF26;
    pub const LCDC: u16 = 0xFF40;
    pub const STAT: u16 = 0xFF41;
    pub const SCY: u16 = 0xFF42;
    pub const SCX: u16 = 0xFF43;
    pub const LY: u16 = 0xFF44;
    pub const LYC: u16 = 0xFF45;
    pub const DMA: u16 = 0xFF46;
    pub const BGP: u16 = 0xFF47;
    pub const OBP0: u16 = 0xFF48;
    pub const OBP1: u16 = 0xFF49;
    pub const WY: u16 = 0xFF4A;
    pub const WX: u16 = 0xFF4B;
    pub const IE: u16 = 0xFFFF;
}

/// Total addressable memory (64 KiB).
pub const MEMORY_SIZE: usize = 0x10000;

/// Base of OAM (sprite attribute memory), the DMA copy target.
const OAM_BASE: u16 = 0xFE00;
/// Number of bytes copied by a DMA trigger.
const DMA_LENGTH: u16 = 0x9F;

/// Coordination latches between the CPU's timer tick and the router's
/// register store semantics. These are process-internal, never visible to
/// the emulated program.
#[derive(Clone, Copy, Debug)]
pub enum MemFlag {
    /// A store hit DIV; the CPU must zero its divider accumulator on the
    /// next timer tick.
    ResetDivCycles,
    /// TIMA overflowed; the reload value is latched but not yet committed.
    /// Stores to TIMA in this window replace the pending reload value.
    ReloadTimerA,
    /// The reload value was just committed into TIMA. Stores to TIMA in this
    /// window are dropped; stores to TMA also land in TIMA.
    ReloadTimerB,
}

#[derive(Default)]
struct LatchFlags {
    reset_div_cycles: bool,
    reload_timer_a: bool,
    reload_timer_b: bool,
}

/// A resolved handle into the backing storage for one address.
///
/// Resolution and application both live on [`Memory`]; no raw pointer ever
/// crosses the component boundary. `Rom` handles are read-only (ROM is
/// read-only media; bank-control semantics apply only to full stores).
#[derive(Clone, Copy, Debug)]
pub enum ByteRef {
    Internal(u16),
    BankedRom(usize),
    BankedRam(usize),
    /// Cartridge RAM address on a cartridge without RAM.
    Absent,
}

pub struct Memory {
    ram: [u8; MEMORY_SIZE],
    cartridge: Cartridge,
    flags: LatchFlags,
    /// The value TIMA will be reloaded with after an overflow. Latched from
    /// TMA at overflow time; overwritten by TIMA stores during the
    /// `ReloadTimerA` window.
    timer_reload: u8,
}

impl Memory {
    pub fn new(cartridge: Cartridge) -> Self {
        let mut memory = Self {
            ram: [0; MEMORY_SIZE],
            cartridge,
            flags: LatchFlags::default(),
            timer_reload: 0,
        };
        memory.initialize_registers();
        memory
    }

    /// Documented post-boot register values (DMG, LCD in V-Blank).
    fn initialize_registers(&mut self) {
        use regs::*;
        let defaults: &[(u16, u8)] = &[
            (P1, 0xCF),
            (SC, 0x7E),
            (TIMA, 0x00),
            (TMA, 0x00),
            (TAC, 0xF8),
            (IF, 0xE1),
            (NR10, 0x80),
            (NR11, 0xBF),
            (NR12, 0xF3),
            (NR14, 0xBF),
            (NR21, 0x3F),
            (NR22, 0x00),
            (NR24, 0xBF),
            (NR30, 0x7F),
            (NR31, 0xFF),
            (NR32, 0x9F),
            (NR34, 0xBF),
            (NR41, 0xFF),
            (NR42, 0x00),
            (NR43, 0x00),
            (NR44, 0xBF),
            (NR50, 0x77),
            (NR51, 0xF3),
            (NR52, 0xF1),
            (LCDC, 0x91),
            (SCY, 0x00),
            (SCX, 0x00),
            (LY, 0x90),
            (LYC, 0x00),
            (BGP, 0xFC),
            (OBP0, 0xFF),
            (OBP1, 0xFF),
            (WY, 0x00),
            (WX, 0x00),
            (IE, 0x00),
        ];
        for &(addr, val) in defaults {
            self.ram[addr as usize] = val;
        }
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    pub fn cartridge_mut(&mut self) -> &mut Cartridge {
        &mut self.cartridge
    }

    /// Read a byte from anywhere in the address space.
    pub fn load_byte(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self.cartridge.load_rom_byte(addr),
            0xA000..=0xBFFF => self.cartridge.load_ram_byte(addr),
            _ => self.ram[addr as usize],
        }
    }

    /// Write a byte, applying register-specific store semantics.
    pub fn store_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => self.cartridge.store_rom_byte(addr, val),
            0xA000..=0xBFFF => self.cartridge.store_ram_byte(addr, val),
            regs::DIV => {
                // Any store resets the register and the CPU-side cycle
                // accumulator.
                self.ram[addr as usize] = 0;
                self.flags.reset_div_cycles = true;
            }
            regs::TIMA => {
                if self.flags.reload_timer_a {
                    // Overflow pending: the store replaces the value that
                    // will be committed, not the register itself.
                    self.timer_reload = val;
                } else if self.flags.reload_timer_b {
                    // Store during the reload cycle is ignored.
                } else {
                    self.ram[addr as usize] = val;
                }
            }
            regs::TMA => {
                self.ram[addr as usize] = val;
                if self.flags.reload_timer_b {
                    // TMA written during the reload cycle propagates into the
                    // freshly reloaded TIMA.
                    self.ram[regs::TIMA as usize] = val;
                }
            }
            regs::IF => {
                // Top 3 bits are hard-wired high.
                self.ram[addr as usize] = 0xE0 | (val & 0x1F);
            }
            regs::DMA => self.copy_sprite_memory(val),
            regs::P1 => {
                // Only the select bits are program-writable; bits 6-7 read
                // back 1 and the input lines belong to the input device.
                let lines = self.ram[addr as usize] & 0x0F;
                self.ram[addr as usize] = 0xC0 | (val & 0x30) | lines;
            }
            regs::STAT => {
                // Bit 7 is unused-high; mode and coincidence bits are
                // read-only from the program's side.
                let status = self.ram[addr as usize] & 0x07;
                self.ram[addr as usize] = 0x80 | (val & 0x78) | status;
            }
            _ => self.ram[addr as usize] = val,
        }
    }

    /// Little-endian word read: low byte at `addr`, high byte at `addr + 1`.
    pub fn load_word(&self, addr: u16) -> u16 {
        let lo = self.load_byte(addr) as u16;
        let hi = self.load_byte(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// Little-endian word store as two sequential byte stores, so register
    /// side effects apply to each half.
    pub fn store_word(&mut self, addr: u16, val: u16) {
        self.store_byte(addr, val as u8);
        self.store_byte(addr.wrapping_add(1), (val >> 8) as u8);
    }

    /// Resolve an address to a storage handle for read-modify-write use.
    ///
    /// The handle pins the bank translation at resolution time; applying it
    /// bypasses register store semantics, which is exactly what the CPU's
    /// timer and serial ticks need when they update DIV/TIMA/SB internally.
    pub fn byte_ref(&self, addr: u16) -> ByteRef {
        match addr {
            0x0000..=0x7FFF => ByteRef::BankedRom(self.cartridge.rom_ref_offset(addr)),
            0xA000..=0xBFFF => match self.cartridge.ram_ref_offset(addr) {
                Some(offset) => ByteRef::BankedRam(offset),
                None => ByteRef::Absent,
            },
            _ => ByteRef::Internal(addr),
        }
    }

    pub fn read_ref(&self, handle: ByteRef) -> u8 {
        match handle {
            ByteRef::Internal(addr) => self.ram[addr as usize],
            ByteRef::BankedRom(offset) => self.cartridge.peek_rom(offset),
            ByteRef::BankedRam(offset) => self.cartridge.peek_ram(offset),
            ByteRef::Absent => 0,
        }
    }

    pub fn write_ref(&mut self, handle: ByteRef, val: u8) {
        match handle {
            ByteRef::Internal(addr) => self.ram[addr as usize] = val,
            // ROM is read-only media; a resolved handle cannot carry
            // bank-control semantics.
            ByteRef::BankedRom(_) => {}
            ByteRef::BankedRam(offset) => self.cartridge.poke_ram(offset, val),
            ByteRef::Absent => {}
        }
    }

    /// Raw copy out of internal RAM, used for OAM scans by video
    /// collaborators.
    pub fn bulk_copy(&self, dest: &mut [u8], addr: u16) {
        let start = addr as usize;
        dest.copy_from_slice(&self.ram[start..start + dest.len()]);
    }

    pub fn get_flag(&self, flag: MemFlag) -> bool {
        match flag {
            MemFlag::ResetDivCycles => self.flags.reset_div_cycles,
            MemFlag::ReloadTimerA => self.flags.reload_timer_a,
            MemFlag::ReloadTimerB => self.flags.reload_timer_b,
        }
    }

    pub fn set_flag(&mut self, flag: MemFlag, value: bool) {
        match flag {
            MemFlag::ResetDivCycles => self.flags.reset_div_cycles = value,
            MemFlag::ReloadTimerA => self.flags.reload_timer_a = value,
            MemFlag::ReloadTimerB => self.flags.reload_timer_b = value,
        }
    }

    /// Latch the current TMA value as the pending TIMA reload. The CPU calls
    /// this at overflow time, immediately before raising `ReloadTimerA`.
    pub fn latch_timer_reload(&mut self) {
        self.timer_reload = self.ram[regs::TMA as usize];
    }

    /// The value TIMA will receive when the pending reload commits.
    pub fn timer_reload_value(&self) -> u8 {
        self.timer_reload
    }

    /// Sprite DMA: synchronous copy of 0x9F bytes from `val << 8` into OAM.
    fn copy_sprite_memory(&mut self, val: u8) {
        let source = (val as u16) << 8;
        for i in 0..DMA_LENGTH {
            self.ram[(OAM_BASE + i) as usize] = self.load_byte(source.wrapping_add(i));
        }
    }
}
