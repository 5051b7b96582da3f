use super::*;
use crate::cartridge::MbcKind;
use crate::memory::regs;

fn rom_with_header(program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0; 0x8000];
    rom[0x0147] = 0x00; // no controller
    rom[0x0148] = 0x00; // 32 KiB
    rom[0x0149] = 0x00; // no external RAM
    rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
    rom
}

#[test]
fn from_image_parses_the_header() {
    let gb = GameBoy::from_image(rom_with_header(&[])).expect("valid image");
    assert_eq!(gb.memory.cartridge().kind(), MbcKind::RomOnly);
    assert_eq!(gb.cpu.regs.pc, 0x0100);
}

#[test]
fn from_image_rejects_garbage() {
    assert!(GameBoy::from_image(vec![0; 0x10]).is_err());
}

#[test]
fn step_services_a_pending_interrupt_in_the_same_iteration() {
    let mut gb = GameBoy::from_image(rom_with_header(&[0x00])).expect("valid image");
    gb.cpu.ime = true;
    gb.memory.store_byte(regs::IE, 0x04);
    gb.memory.store_byte(regs::IF, 0x04);

    gb.step();
    assert_eq!(gb.cpu.regs.pc, 0x0050);
    // The handler entry pushed the post-NOP address.
    assert_eq!(gb.memory.load_word(gb.cpu.regs.sp), 0x0101);
    assert!(!gb.cpu.ime);
}

#[test]
fn step_with_runs_the_video_unit_before_the_acknowledge() {
    struct VBlankOnce {
        fired: bool,
        cycles_seen: u32,
    }

    impl VideoUnit for VBlankOnce {
        fn emulate(&mut self, memory: &mut Memory, cycles: u32) {
            self.cycles_seen += cycles;
            if !self.fired {
                self.fired = true;
                let flag = memory.load_byte(regs::IF);
                memory.store_byte(regs::IF, flag | 0x01);
            }
        }
    }

    let mut gb = GameBoy::from_image(rom_with_header(&[0x00])).expect("valid image");
    gb.cpu.ime = true;
    gb.memory.store_byte(regs::IE, 0x01);
    gb.memory.store_byte(regs::IF, 0x00);

    let mut video = VBlankOnce {
        fired: false,
        cycles_seen: 0,
    };
    let mut input = HeadlessInput;

    // The interrupt raised by the video unit is taken on this same
    // iteration.
    gb.step_with(&mut video, &mut input);
    assert_eq!(gb.cpu.regs.pc, 0x0040);
    assert_eq!(video.cycles_seen, 4);
    assert_eq!(gb.memory.load_byte(regs::IF) & 0x01, 0);
}

#[test]
fn run_stops_at_the_instruction_budget() {
    let mut gb = GameBoy::from_image(rom_with_header(&[])).expect("valid image");
    let cycles = gb.run(100);
    assert_eq!(gb.cpu.instruction_count(), 100);
    // A NOP sled spends exactly 4 cycles per instruction.
    assert_eq!(cycles, 400);
}

#[test]
fn run_ends_early_on_a_fully_masked_halt() {
    // HALT with IE empty can never wake.
    let mut gb = GameBoy::from_image(rom_with_header(&[0x76])).expect("valid image");
    gb.memory.store_byte(regs::IE, 0x00);
    gb.run(1_000);
    assert!(gb.cpu.halted);
    assert_eq!(gb.cpu.instruction_count(), 1);
}

#[test]
fn run_resumes_from_a_timer_interrupt() {
    // Program: HALT, then spin on NOPs after the wake-up. The timer is the
    // only enabled interrupt source; IME stays clear so the wake falls
    // through to the next instruction instead of a handler.
    let mut gb = GameBoy::from_image(rom_with_header(&[0x76, 0x00, 0x00])).expect("valid image");
    gb.memory.store_byte(regs::IE, 0x04);
    gb.memory.store_byte(regs::IF, 0x00);
    gb.memory.store_byte(regs::TAC, 0x05); // enabled, 16-cycle period
    gb.memory.store_byte(regs::TIMA, 0xFF);

    gb.run(10);
    assert!(!gb.cpu.halted);
    assert_eq!(gb.cpu.instruction_count(), 10);
    assert!(gb.cpu.regs.pc > 0x0101);
}
