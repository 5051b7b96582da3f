//! Sharp SM83 CPU core: register file, fetch/decode/execute, interrupt
//! acknowledge, and the timer/divider/serial update logic driven by elapsed
//! cycles.

use crate::memory::{regs, MemFlag, Memory};

mod exec;

const V_BLANK_INTERRUPT: u8 = 0x01;
const LCDC_INTERRUPT: u8 = 0x02;
const TIMER_INTERRUPT: u8 = 0x04;
const SERIAL_INTERRUPT: u8 = 0x08;
const JOYPAD_INTERRUPT: u8 = 0x10;

const V_BLANK_ADDRESS: u16 = 0x0040;
const LCDC_ADDRESS: u16 = 0x0048;
const TIMER_ADDRESS: u16 = 0x0050;
const SERIAL_ADDRESS: u16 = 0x0058;
const JOYPAD_ADDRESS: u16 = 0x0060;

/// TAC[1:0] selects the timer period in cycles.
const TIMER_THRESHOLDS: [u32; 4] = [1024, 16, 64, 256];

/// DIV increments once per 256 elapsed cycles.
const DIV_THRESHOLD: u32 = 256;

/// One serial bit is shifted every 512 cycles when the internal clock is
/// selected.
const SERIAL_THRESHOLD: u32 = 512;

/// Registers for the Game Boy CPU (Sharp SM83).
///
/// Eight 8-bit registers pairable into AF/BC/DE/HL, plus SP and PC. The low
/// nibble of F always reads back as zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct Registers {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    #[inline]
    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f & 0xF0])
    }

    #[inline]
    pub fn set_af(&mut self, value: u16) {
        let [a, f] = value.to_be_bytes();
        self.a = a;
        // Lower 4 bits of F are always zero.
        self.f = f & 0xF0;
    }

    #[inline]
    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    #[inline]
    pub fn set_bc(&mut self, value: u16) {
        let [b, c] = value.to_be_bytes();
        self.b = b;
        self.c = c;
    }

    #[inline]
    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    #[inline]
    pub fn set_de(&mut self, value: u16) {
        let [d, e] = value.to_be_bytes();
        self.d = d;
        self.e = e;
    }

    #[inline]
    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    #[inline]
    pub fn set_hl(&mut self, value: u16) {
        let [h, l] = value.to_be_bytes();
        self.h = h;
        self.l = l;
    }
}

/// Flag bits in the F register.
///
/// Layout (bit index in the byte, from MSB to LSB):
/// - bit 7: Z (zero)
/// - bit 6: N (subtract)
/// - bit 5: H (half carry)
/// - bit 4: C (carry)
/// - bits 0-3 are always zero.
#[derive(Clone, Copy, Debug)]
pub enum Flag {
    Z = 7,
    N = 6,
    H = 5,
    C = 4,
}

/// Which boot ROM handed control to the cartridge. Only the A/F power-on
/// values differ between the two.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BootVariant {
    #[default]
    Dmg,
    Cgb,
}

/// Game Boy CPU core.
///
/// `step` executes one instruction (or one halted bus cycle) and drives the
/// timer and serial units with the elapsed cycle count. The interrupt
/// acknowledge sequence is a separate entry point invoked once per driver
/// loop iteration.
pub struct Cpu {
    pub regs: Registers,
    /// Master interrupt enable. Gates servicing, not the halt wake-up.
    pub ime: bool,
    pub halted: bool,
    div_cycles: u32,
    timer_cycles: u32,
    serial_cycles: u32,
    serial_bits: u8,
    instructions: u64,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self::with_boot(BootVariant::Dmg)
    }

    pub fn with_boot(variant: BootVariant) -> Self {
        let mut regs = Registers::default();
        regs.set_af(match variant {
            BootVariant::Dmg => 0x0100,
            BootVariant::Cgb => 0x11B0,
        });
        regs.set_bc(0xFF13);
        regs.set_de(0x00C1);
        regs.set_hl(0x8403);
        regs.sp = 0xFFFE;
        regs.pc = 0x0100;

        Self {
            regs,
            ime: false,
            halted: false,
            div_cycles: 0,
            timer_cycles: 0,
            serial_cycles: 0,
            serial_bits: 0,
            instructions: 0,
        }
    }

    /// Number of instructions executed since power-on.
    pub fn instruction_count(&self) -> u64 {
        self.instructions
    }

    #[inline]
    pub fn get_flag(&self, flag: Flag) -> bool {
        (self.regs.f & (1 << flag as u8)) != 0
    }

    #[inline]
    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        if value {
            self.regs.f |= 1 << flag as u8;
        } else {
            self.regs.f &= !(1 << flag as u8);
        }
    }

    /// Execute one machine step and return the elapsed cycle count.
    ///
    /// While halted the CPU does not fetch; it burns 4 cycles of bus
    /// activity per step and still ticks the timer and serial units.
    pub fn step(&mut self, memory: &mut Memory) -> u32 {
        let cycles = if self.halted {
            4
        } else {
            if log::log_enabled!(log::Level::Trace) {
                self.trace_state(memory);
            }
            self.fetch_execute(memory)
        };

        self.update_timer(memory, cycles);
        self.update_serial(memory, cycles);
        cycles
    }

    /// Interrupt acknowledge protocol, invoked once per driver loop
    /// iteration after `step`.
    ///
    /// A pending enabled interrupt always wakes the CPU from halt; it is
    /// only serviced when IME is set, and then exactly one handler runs per
    /// call, highest priority first.
    pub fn handle_interrupts(&mut self, memory: &mut Memory) {
        let mut interrupt_flag = memory.load_byte(regs::IF);
        let pending = memory.load_byte(regs::IE) & interrupt_flag;

        if pending & 0x1F == 0 {
            return;
        }

        self.halted = false;

        if !self.ime {
            return;
        }

        self.ime = false;
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        memory.store_word(self.regs.sp, self.regs.pc);

        if pending & V_BLANK_INTERRUPT != 0 {
            self.regs.pc = V_BLANK_ADDRESS;
            interrupt_flag &= !V_BLANK_INTERRUPT;
        } else if pending & LCDC_INTERRUPT != 0 {
            self.regs.pc = LCDC_ADDRESS;
            interrupt_flag &= !LCDC_INTERRUPT;
        } else if pending & TIMER_INTERRUPT != 0 {
            self.regs.pc = TIMER_ADDRESS;
            interrupt_flag &= !TIMER_INTERRUPT;
        } else if pending & SERIAL_INTERRUPT != 0 {
            self.regs.pc = SERIAL_ADDRESS;
            interrupt_flag &= !SERIAL_INTERRUPT;
        } else if pending & JOYPAD_INTERRUPT != 0 {
            self.regs.pc = JOYPAD_ADDRESS;
            interrupt_flag &= !JOYPAD_INTERRUPT;
        }

        memory.store_byte(regs::IF, interrupt_flag);
    }

    /// Advance the divider and timer by `cycles`.
    ///
    /// The divider free-runs at one increment per 256 cycles. The timer runs
    /// at the TAC-selected threshold and feeds a two-stage reload pipeline:
    /// an overflow leaves TIMA at 0 for one tick window with the reload
    /// value latched (stage A), then commits the reload and raises the timer
    /// interrupt (stage B). The router's TIMA/TMA store semantics key off
    /// the same two latch flags.
    fn update_timer(&mut self, memory: &mut Memory, cycles: u32) {
        if memory.get_flag(MemFlag::ResetDivCycles) {
            self.div_cycles = 0;
            memory.set_flag(MemFlag::ResetDivCycles, false);
        }

        self.div_cycles += cycles;
        while self.div_cycles >= DIV_THRESHOLD {
            self.div_cycles -= DIV_THRESHOLD;
            // Raw increment: a store to DIV through the router would reset
            // it instead.
            let div = memory.byte_ref(regs::DIV);
            let value = memory.read_ref(div);
            memory.write_ref(div, value.wrapping_add(1));
        }

        if memory.get_flag(MemFlag::ReloadTimerB) {
            memory.set_flag(MemFlag::ReloadTimerB, false);
        }
        if memory.get_flag(MemFlag::ReloadTimerA) {
            memory.set_flag(MemFlag::ReloadTimerA, false);
            memory.set_flag(MemFlag::ReloadTimerB, true);
            let tima = memory.byte_ref(regs::TIMA);
            memory.write_ref(tima, memory.timer_reload_value());
            let interrupt_flag = memory.load_byte(regs::IF);
            memory.store_byte(regs::IF, interrupt_flag | TIMER_INTERRUPT);
        }

        let tac = memory.load_byte(regs::TAC);
        if tac & 0x04 == 0 {
            return;
        }

        self.timer_cycles += cycles;
        let threshold = TIMER_THRESHOLDS[(tac & 0x03) as usize];
        while self.timer_cycles >= threshold {
            self.timer_cycles -= threshold;
            let tima = memory.byte_ref(regs::TIMA);
            let value = memory.read_ref(tima);
            if value == 0xFF {
                // Overflow: TIMA reads 0 until the reload commits on the
                // next tick.
                memory.write_ref(tima, 0);
                memory.latch_timer_reload();
                memory.set_flag(MemFlag::ReloadTimerA, true);
            } else {
                memory.write_ref(tima, value.wrapping_add(1));
            }
        }
    }

    /// Advance the serial port by `cycles`.
    ///
    /// With no link cable attached, each shifted-out bit is replaced by a 1
    /// on the input side. After 8 bits the transfer-enable bit clears and
    /// the serial interrupt is requested.
    fn update_serial(&mut self, memory: &mut Memory, cycles: u32) {
        let sc = memory.load_byte(regs::SC);
        // Transfer enable (bit 7) and internal clock (bit 0).
        if sc & 0x81 != 0x81 {
            return;
        }

        self.serial_cycles += cycles;
        while self.serial_cycles >= SERIAL_THRESHOLD {
            self.serial_cycles -= SERIAL_THRESHOLD;
            let sb = memory.byte_ref(regs::SB);
            let value = memory.read_ref(sb);
            memory.write_ref(sb, (value << 1) | 0x01);
            self.serial_bits += 1;

            if self.serial_bits == 8 {
                self.serial_bits = 0;
                self.serial_cycles = 0;
                let sc_ref = memory.byte_ref(regs::SC);
                let sc_value = memory.read_ref(sc_ref);
                memory.write_ref(sc_ref, sc_value & !0x80);
                let interrupt_flag = memory.load_byte(regs::IF);
                memory.store_byte(regs::IF, interrupt_flag | SERIAL_INTERRUPT);
                return;
            }
        }
    }

    /// One-line execution trace in the style used when debugging against
    /// hardware test ROM logs.
    fn trace_state(&self, memory: &Memory) {
        log::trace!(
            "#{} op={:02X} {:02X} pc={:04X} af={:04X} bc={:04X} de={:04X} hl={:04X} sp={:04X} halted={} ime={} if={:02X}",
            self.instructions + 1,
            memory.load_byte(self.regs.pc),
            memory.load_byte(self.regs.pc.wrapping_add(1)),
            self.regs.pc,
            self.regs.af(),
            self.regs.bc(),
            self.regs.de(),
            self.regs.hl(),
            self.regs.sp,
            self.halted,
            self.ime,
            memory.load_byte(regs::IF),
        );
    }

    #[inline]
    fn fetch8(&mut self, memory: &Memory) -> u8 {
        let value = memory.load_byte(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    #[inline]
    fn fetch16(&mut self, memory: &Memory) -> u16 {
        let lo = self.fetch8(memory) as u16;
        let hi = self.fetch8(memory) as u16;
        (hi << 8) | lo
    }

    /// Read an 8-bit register or (HL) by decode index:
    /// 0=B, 1=C, 2=D, 3=E, 4=H, 5=L, 6=(HL), 7=A.
    ///
    /// Index 6 dereferences memory through HL on every call; it is never
    /// cached across uses within one instruction.
    #[inline]
    fn reg8(&self, memory: &Memory, index: u8) -> u8 {
        match index {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            6 => memory.load_byte(self.regs.hl()),
            7 => self.regs.a,
            _ => unreachable!("register index out of range: {index}"),
        }
    }

    /// Write an 8-bit register or (HL) by decode index. The encoding matches
    /// `reg8`; index 6 routes through the memory store contract so register
    /// side effects apply to `(HL)` targets.
    #[inline]
    fn set_reg8(&mut self, memory: &mut Memory, index: u8, value: u8) {
        match index {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            6 => memory.store_byte(self.regs.hl(), value),
            7 => self.regs.a = value,
            _ => unreachable!("register index out of range: {index}"),
        }
    }

    /// 16-bit register pair by decode index: 0=BC, 1=DE, 2=HL, 3=SP.
    #[inline]
    fn rp(&self, index: u8) -> u16 {
        match index {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            3 => self.regs.sp,
            _ => unreachable!("register pair index out of range: {index}"),
        }
    }

    #[inline]
    fn set_rp(&mut self, index: u8, value: u16) {
        match index {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            3 => self.regs.sp = value,
            _ => unreachable!("register pair index out of range: {index}"),
        }
    }

    /// The PUSH/POP register pair table: 0=BC, 1=DE, 2=HL, 3=AF.
    #[inline]
    fn rp2(&self, index: u8) -> u16 {
        match index {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            3 => self.regs.af(),
            _ => unreachable!("register pair index out of range: {index}"),
        }
    }

    #[inline]
    fn set_rp2(&mut self, index: u8, value: u16) {
        match index {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            3 => self.regs.set_af(value),
            _ => unreachable!("register pair index out of range: {index}"),
        }
    }

    /// Condition code by decode index: 0=NZ, 1=Z, 2=NC, 3=C.
    #[inline]
    fn cc(&self, index: u8) -> bool {
        match index {
            0 => !self.get_flag(Flag::Z),
            1 => self.get_flag(Flag::Z),
            2 => !self.get_flag(Flag::C),
            3 => self.get_flag(Flag::C),
            _ => unreachable!("condition code index out of range: {index}"),
        }
    }
}
