//! The assembled machine: CPU plus address-space router, with seams for the
//! video and input peripherals.

use crate::cartridge::{Cartridge, CartridgeError};
use crate::cpu::{BootVariant, Cpu};
use crate::memory::Memory;

/// A peripheral that consumes elapsed CPU cycles and talks to the machine
/// through the shared address space (LY/STAT advancement, V-Blank and LCD
/// interrupt requests).
pub trait VideoUnit {
    fn emulate(&mut self, memory: &mut Memory, cycles: u32);
}

/// A peripheral that drives the joypad input lines in P1 and may raise the
/// joypad interrupt.
pub trait InputDevice {
    fn poll(&mut self, memory: &mut Memory);
}

/// No-op video peripheral for headless runs. The LCD-side registers keep
/// their post-boot values (LY parked in V-Blank).
#[derive(Default)]
pub struct HeadlessVideo;

impl VideoUnit for HeadlessVideo {
    fn emulate(&mut self, _memory: &mut Memory, _cycles: u32) {}
}

/// No-input peripheral for headless runs; all buttons read released.
#[derive(Default)]
pub struct HeadlessInput;

impl InputDevice for HeadlessInput {
    fn poll(&mut self, _memory: &mut Memory) {}
}

/// High-level Game Boy machine.
///
/// Holds the CPU core and the memory router (which owns the cartridge). One
/// `step` is one driver-loop iteration: execute an instruction, then run the
/// interrupt acknowledge sequence.
pub struct GameBoy {
    pub cpu: Cpu,
    pub memory: Memory,
}

impl GameBoy {
    pub fn new(cartridge: Cartridge) -> Self {
        Self {
            cpu: Cpu::new(),
            memory: Memory::new(cartridge),
        }
    }

    /// Build a machine from a raw ROM image, parsing the cartridge header.
    pub fn from_image(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        Ok(Self::new(Cartridge::from_image(rom)?))
    }

    pub fn with_boot(cartridge: Cartridge, variant: BootVariant) -> Self {
        Self {
            cpu: Cpu::with_boot(variant),
            memory: Memory::new(cartridge),
        }
    }

    /// One driver-loop iteration without peripherals. Returns the elapsed
    /// cycle count.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.memory);
        self.cpu.handle_interrupts(&mut self.memory);
        cycles
    }

    /// One driver-loop iteration feeding the peripherals: instruction, then
    /// the video unit with the elapsed cycles, then the input poll, then the
    /// interrupt acknowledge so that peripheral-raised interrupts are taken
    /// on the same iteration.
    pub fn step_with<V: VideoUnit, I: InputDevice>(
        &mut self,
        video: &mut V,
        input: &mut I,
    ) -> u32 {
        let cycles = self.cpu.step(&mut self.memory);
        video.emulate(&mut self.memory, cycles);
        input.poll(&mut self.memory);
        self.cpu.handle_interrupts(&mut self.memory);
        cycles
    }

    /// Run headless until `instruction_budget` instructions have executed.
    /// Returns the total elapsed cycles.
    ///
    /// A halt with every interrupt masked can never resume, so that state
    /// ends the run early instead of spinning.
    pub fn run(&mut self, instruction_budget: u64) -> u64 {
        use crate::memory::regs;

        let mut total = 0u64;
        while self.cpu.instruction_count() < instruction_budget {
            total += self.step() as u64;
            if self.cpu.halted && self.memory.load_byte(regs::IE) & 0x1F == 0 {
                log::warn!(
                    "halted with all interrupts masked after {} instructions",
                    self.cpu.instruction_count()
                );
                break;
            }
        }
        total
    }
}

#[cfg(test)]
mod tests;
