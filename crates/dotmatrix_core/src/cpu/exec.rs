//! Instruction decode and execution.
//!
//! Opcodes are decomposed into the canonical bitfields
//! `x = op[7:6]`, `y = op[5:3]`, `z = op[2:0]`, `p = y >> 1`, `q = y & 1`
//! and dispatched by a two-level match: the unprefixed table keyed on (x, z)
//! with y/p/q as secondary selectors, and the 0xCB-prefixed table applying
//! the same decomposition to the following byte. Keeping the decode in this
//! shape lets each arm be checked field-by-field against the public opcode
//! map rather than auditing a flat 512-entry table.

use super::{Cpu, Flag};
use crate::carry::{
    borrow_sub8, carry_add8, carry_add16, half_borrow_sub8, half_carry_add8, half_carry_add16,
};
use crate::memory::Memory;

impl Cpu {
    /// Fetch, decode, and execute one instruction. Returns the elapsed
    /// cycle count from the published timing table.
    pub(super) fn fetch_execute(&mut self, memory: &mut Memory) -> u32 {
        let opcode = self.fetch8(memory);
        let x = opcode >> 6;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = y >> 1;
        let q = y & 0x01;

        let cycles = if opcode == 0xCB {
            self.execute_cb(memory)
        } else {
            match x {
                0 => self.execute_x0(memory, y, z, p, q),
                1 => self.execute_x1(memory, opcode, y, z),
                2 => {
                    // ALU[y] r[z]
                    let val = self.reg8(memory, z);
                    self.alu(y, val);
                    if z == 6 {
                        8
                    } else {
                        4
                    }
                }
                3 => self.execute_x3(memory, y, z, p, q),
                _ => unreachable!("2-bit opcode field out of range"),
            }
        };

        // Low nibble of F is hard-wired to zero.
        self.regs.f &= 0xF0;
        self.instructions += 1;
        cycles
    }

    /// Unprefixed opcodes with x=0: loads, 16-bit arithmetic, relative
    /// jumps, and the accumulator/flag specials.
    fn execute_x0(&mut self, memory: &mut Memory, y: u8, z: u8, p: u8, q: u8) -> u32 {
        match z {
            0 => match y {
                // NOP
                0 => 4,
                1 => {
                    // LD (nn), SP
                    let addr = self.fetch16(memory);
                    memory.store_word(addr, self.regs.sp);
                    20
                }
                2 => {
                    // STOP: 2-byte encoding, padding byte discarded.
                    let _padding = self.fetch8(memory);
                    4
                }
                3 => {
                    // JR d
                    let d = self.fetch8(memory) as i8;
                    self.regs.pc = self.regs.pc.wrapping_add(d as i16 as u16);
                    12
                }
                4..=7 => {
                    // JR cc[y-4], d
                    let d = self.fetch8(memory) as i8;
                    if self.cc(y - 4) {
                        self.regs.pc = self.regs.pc.wrapping_add(d as i16 as u16);
                        12
                    } else {
                        8
                    }
                }
                _ => unreachable!("3-bit opcode field out of range"),
            },
            1 => {
                if q == 0 {
                    // LD rp[p], nn
                    let value = self.fetch16(memory);
                    self.set_rp(p, value);
                    12
                } else {
                    // ADD HL, rp[p]
                    let hl = self.regs.hl();
                    let value = self.rp(p);
                    self.set_flag(Flag::N, false);
                    self.set_flag(Flag::H, half_carry_add16(hl, value));
                    self.set_flag(Flag::C, carry_add16(hl, value));
                    self.regs.set_hl(hl.wrapping_add(value));
                    8
                }
            }
            2 => {
                if q == 0 {
                    // LD (BC)/(DE)/(HL+)/(HL-), A
                    match p {
                        0 => memory.store_byte(self.regs.bc(), self.regs.a),
                        1 => memory.store_byte(self.regs.de(), self.regs.a),
                        2 => {
                            let hl = self.regs.hl();
                            memory.store_byte(hl, self.regs.a);
                            self.regs.set_hl(hl.wrapping_add(1));
                        }
                        3 => {
                            let hl = self.regs.hl();
                            memory.store_byte(hl, self.regs.a);
                            self.regs.set_hl(hl.wrapping_sub(1));
                        }
                        _ => unreachable!("2-bit opcode field out of range"),
                    }
                } else {
                    // LD A, (BC)/(DE)/(HL+)/(HL-)
                    match p {
                        0 => self.regs.a = memory.load_byte(self.regs.bc()),
                        1 => self.regs.a = memory.load_byte(self.regs.de()),
                        2 => {
                            let hl = self.regs.hl();
                            self.regs.a = memory.load_byte(hl);
                            self.regs.set_hl(hl.wrapping_add(1));
                        }
                        3 => {
                            let hl = self.regs.hl();
                            self.regs.a = memory.load_byte(hl);
                            self.regs.set_hl(hl.wrapping_sub(1));
                        }
                        _ => unreachable!("2-bit opcode field out of range"),
                    }
                }
                8
            }
            3 => {
                // INC/DEC rp[p]
                let value = self.rp(p);
                if q == 0 {
                    self.set_rp(p, value.wrapping_add(1));
                } else {
                    self.set_rp(p, value.wrapping_sub(1));
                }
                8
            }
            4 => {
                // INC r[y]: C flag unaffected.
                let value = self.reg8(memory, y);
                self.set_flag(Flag::N, false);
                self.set_flag(Flag::H, half_carry_add8(value, 1));
                let result = value.wrapping_add(1);
                self.set_reg8(memory, y, result);
                self.set_flag(Flag::Z, result == 0);
                if y == 6 {
                    12
                } else {
                    4
                }
            }
            5 => {
                // DEC r[y]: C flag unaffected.
                let value = self.reg8(memory, y);
                self.set_flag(Flag::N, true);
                self.set_flag(Flag::H, half_borrow_sub8(value, 1));
                let result = value.wrapping_sub(1);
                self.set_reg8(memory, y, result);
                self.set_flag(Flag::Z, result == 0);
                if y == 6 {
                    12
                } else {
                    4
                }
            }
            6 => {
                // LD r[y], n
                let value = self.fetch8(memory);
                self.set_reg8(memory, y, value);
                if y == 6 {
                    12
                } else {
                    8
                }
            }
            7 => {
                match y {
                    0..=3 => {
                        // RLCA/RRCA/RLA/RRA: same bit pattern as the
                        // CB-prefixed rotates on A, but Z is always cleared.
                        self.rot(memory, y, 7);
                        self.set_flag(Flag::Z, false);
                    }
                    4 => self.daa(),
                    5 => {
                        // CPL
                        self.regs.a = !self.regs.a;
                        self.set_flag(Flag::N, true);
                        self.set_flag(Flag::H, true);
                    }
                    6 => {
                        // SCF
                        self.set_flag(Flag::C, true);
                        self.set_flag(Flag::N, false);
                        self.set_flag(Flag::H, false);
                    }
                    7 => {
                        // CCF
                        let carry = self.get_flag(Flag::C);
                        self.set_flag(Flag::C, !carry);
                        self.set_flag(Flag::N, false);
                        self.set_flag(Flag::H, false);
                    }
                    _ => unreachable!("3-bit opcode field out of range"),
                }
                4
            }
            _ => unreachable!("3-bit opcode field out of range"),
        }
    }

    /// x=1: the 8-bit register transfer block (LD r[y], r[z]), with 0x76
    /// repurposed as HALT.
    fn execute_x1(&mut self, memory: &mut Memory, opcode: u8, y: u8, z: u8) -> u32 {
        if opcode == 0x76 {
            self.halted = true;
            4
        } else {
            let value = self.reg8(memory, z);
            self.set_reg8(memory, y, value);
            if y == 6 || z == 6 {
                8
            } else {
                4
            }
        }
    }

    /// x=3: control flow, stack operations, IO-page loads, and immediate
    /// ALU forms.
    fn execute_x3(&mut self, memory: &mut Memory, y: u8, z: u8, p: u8, q: u8) -> u32 {
        match z {
            0 => match y {
                0..=3 => {
                    // RET cc[y]
                    if self.cc(y) {
                        self.regs.pc = memory.load_word(self.regs.sp);
                        self.regs.sp = self.regs.sp.wrapping_add(2);
                        20
                    } else {
                        8
                    }
                }
                4 => {
                    // LDH (n), A
                    let offset = self.fetch8(memory) as u16;
                    memory.store_byte(0xFF00 | offset, self.regs.a);
                    12
                }
                5 => {
                    // ADD SP, d
                    let d = self.fetch8(memory);
                    self.regs.sp = self.add16_signed(self.regs.sp, d);
                    16
                }
                6 => {
                    // LDH A, (n)
                    let offset = self.fetch8(memory) as u16;
                    self.regs.a = memory.load_byte(0xFF00 | offset);
                    12
                }
                7 => {
                    // LD HL, SP+d
                    let d = self.fetch8(memory);
                    let result = self.add16_signed(self.regs.sp, d);
                    self.regs.set_hl(result);
                    12
                }
                _ => unreachable!("3-bit opcode field out of range"),
            },
            1 => {
                if q == 0 {
                    // POP rp2[p]
                    let value = memory.load_word(self.regs.sp);
                    self.regs.sp = self.regs.sp.wrapping_add(2);
                    self.set_rp2(p, value);
                    12
                } else {
                    match p {
                        0 => {
                            // RET
                            self.regs.pc = memory.load_word(self.regs.sp);
                            self.regs.sp = self.regs.sp.wrapping_add(2);
                            16
                        }
                        1 => {
                            // RETI
                            self.regs.pc = memory.load_word(self.regs.sp);
                            self.regs.sp = self.regs.sp.wrapping_add(2);
                            self.ime = true;
                            16
                        }
                        2 => {
                            // JP HL
                            self.regs.pc = self.regs.hl();
                            4
                        }
                        3 => {
                            // LD SP, HL
                            self.regs.sp = self.regs.hl();
                            8
                        }
                        _ => unreachable!("2-bit opcode field out of range"),
                    }
                }
            }
            2 => match y {
                0..=3 => {
                    // JP cc[y], nn
                    let addr = self.fetch16(memory);
                    if self.cc(y) {
                        self.regs.pc = addr;
                        16
                    } else {
                        12
                    }
                }
                4 => {
                    // LD (0xFF00+C), A
                    memory.store_byte(0xFF00 | self.regs.c as u16, self.regs.a);
                    8
                }
                5 => {
                    // LD (nn), A
                    let addr = self.fetch16(memory);
                    memory.store_byte(addr, self.regs.a);
                    16
                }
                6 => {
                    // LD A, (0xFF00+C)
                    self.regs.a = memory.load_byte(0xFF00 | self.regs.c as u16);
                    8
                }
                7 => {
                    // LD A, (nn)
                    let addr = self.fetch16(memory);
                    self.regs.a = memory.load_byte(addr);
                    16
                }
                _ => unreachable!("3-bit opcode field out of range"),
            },
            3 => match y {
                0 => {
                    // JP nn
                    self.regs.pc = self.fetch16(memory);
                    16
                }
                6 => {
                    // DI
                    self.ime = false;
                    4
                }
                7 => {
                    // EI
                    self.ime = true;
                    4
                }
                // y=1 is the 0xCB prefix, handled before this table; the
                // rest (0xD3/0xE3/0xDB/0xEB) are unassigned and execute as
                // one-byte NOPs.
                _ => 4,
            },
            4 => {
                if y < 4 {
                    // CALL cc[y], nn
                    let addr = self.fetch16(memory);
                    if self.cc(y) {
                        self.regs.sp = self.regs.sp.wrapping_sub(2);
                        memory.store_word(self.regs.sp, self.regs.pc);
                        self.regs.pc = addr;
                        24
                    } else {
                        12
                    }
                } else {
                    // Unassigned (0xE4/0xEC/0xF4/0xFC).
                    4
                }
            }
            5 => {
                if q == 0 {
                    // PUSH rp2[p]
                    self.regs.sp = self.regs.sp.wrapping_sub(2);
                    memory.store_word(self.regs.sp, self.rp2(p));
                    16
                } else if p == 0 {
                    // CALL nn
                    let addr = self.fetch16(memory);
                    self.regs.sp = self.regs.sp.wrapping_sub(2);
                    memory.store_word(self.regs.sp, self.regs.pc);
                    self.regs.pc = addr;
                    24
                } else {
                    // Unassigned (0xDD/0xED/0xFD).
                    4
                }
            }
            6 => {
                // ALU[y], n
                let value = self.fetch8(memory);
                self.alu(y, value);
                8
            }
            7 => {
                // RST y*8
                self.regs.sp = self.regs.sp.wrapping_sub(2);
                memory.store_word(self.regs.sp, self.regs.pc);
                self.regs.pc = (y as u16) << 3;
                16
            }
            _ => unreachable!("3-bit opcode field out of range"),
        }
    }

    /// 0xCB-prefixed table: rotates/shifts (x=0), BIT (x=1), RES (x=2),
    /// SET (x=3) over the same (x, y, z) decomposition.
    fn execute_cb(&mut self, memory: &mut Memory) -> u32 {
        let opcode = self.fetch8(memory);
        let x = opcode >> 6;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;

        match x {
            0 => self.rot(memory, y, z),
            1 => {
                // BIT y, r[z]: C preserved.
                let value = self.reg8(memory, z);
                self.set_flag(Flag::Z, value & (1 << y) == 0);
                self.set_flag(Flag::N, false);
                self.set_flag(Flag::H, true);
            }
            2 => {
                // RES y, r[z]
                let value = self.reg8(memory, z);
                self.set_reg8(memory, z, value & !(1 << y));
            }
            3 => {
                // SET y, r[z]
                let value = self.reg8(memory, z);
                self.set_reg8(memory, z, value | (1 << y));
            }
            _ => unreachable!("2-bit opcode field out of range"),
        }

        // Base 8 cycles; (HL) operands add a read cycle, and the
        // read-modify-write forms add a write cycle on top.
        let mut cycles = 8;
        if z == 6 {
            cycles += if x == 1 { 4 } else { 8 };
        }
        cycles
    }

    /// The 8-operation ALU selected by a 3-bit code:
    /// 0=ADD, 1=ADC, 2=SUB, 3=SBC, 4=AND, 5=XOR, 6=OR, 7=CP.
    ///
    /// H and C are computed from the pre-operation operands; the
    /// carry-incorporating forms combine the flag from the raw operand pair
    /// with the flag from folding in the carry, matching the hardware's
    /// two-stage addition.
    fn alu(&mut self, op: u8, val: u8) {
        let a = self.regs.a;
        let carry = self.get_flag(Flag::C) as u8;
        match op {
            0 => {
                // ADD A, val
                self.set_flag(Flag::N, false);
                self.set_flag(Flag::H, half_carry_add8(a, val));
                self.set_flag(Flag::C, carry_add8(a, val));
                self.regs.a = a.wrapping_add(val);
            }
            1 => {
                // ADC A, val
                let partial = a.wrapping_add(val);
                self.set_flag(Flag::N, false);
                self.set_flag(
                    Flag::H,
                    half_carry_add8(a, val) || half_carry_add8(partial, carry),
                );
                self.set_flag(Flag::C, carry_add8(a, val) || carry_add8(partial, carry));
                self.regs.a = partial.wrapping_add(carry);
            }
            2 => {
                // SUB A, val
                self.set_flag(Flag::N, true);
                self.set_flag(Flag::H, half_borrow_sub8(a, val));
                self.set_flag(Flag::C, borrow_sub8(a, val));
                self.regs.a = a.wrapping_sub(val);
            }
            3 => {
                // SBC A, val
                let partial = a.wrapping_sub(val);
                self.set_flag(Flag::N, true);
                self.set_flag(
                    Flag::H,
                    half_borrow_sub8(a, val) || half_borrow_sub8(partial, carry),
                );
                self.set_flag(Flag::C, borrow_sub8(a, val) || borrow_sub8(partial, carry));
                self.regs.a = partial.wrapping_sub(carry);
            }
            4 => {
                // AND A, val
                self.set_flag(Flag::N, false);
                self.set_flag(Flag::H, true);
                self.set_flag(Flag::C, false);
                self.regs.a = a & val;
            }
            5 => {
                // XOR A, val
                self.set_flag(Flag::N, false);
                self.set_flag(Flag::H, false);
                self.set_flag(Flag::C, false);
                self.regs.a = a ^ val;
            }
            6 => {
                // OR A, val
                self.set_flag(Flag::N, false);
                self.set_flag(Flag::H, false);
                self.set_flag(Flag::C, false);
                self.regs.a = a | val;
            }
            7 => {
                // CP val: A is not modified.
                self.set_flag(Flag::N, true);
                self.set_flag(Flag::H, half_borrow_sub8(a, val));
                self.set_flag(Flag::C, borrow_sub8(a, val));
            }
            _ => unreachable!("ALU op out of range: {op}"),
        }
        if op == 7 {
            self.set_flag(Flag::Z, a == val);
        } else {
            self.set_flag(Flag::Z, self.regs.a == 0);
        }
    }

    /// The 8-operation rotate/shift table selected by a 3-bit code:
    /// 0=RLC, 1=RRC, 2=RL, 3=RR, 4=SLA, 5=SRA, 6=SWAP, 7=SRL.
    ///
    /// Z is recomputed from the post-shift value; N and H always clear.
    fn rot(&mut self, memory: &mut Memory, op: u8, index: u8) {
        let old = self.reg8(memory, index);
        let carry_in = self.get_flag(Flag::C) as u8;
        let (result, carry_out) = match op {
            0 => (old.rotate_left(1), old & 0x80 != 0),
            1 => (old.rotate_right(1), old & 0x01 != 0),
            2 => ((old << 1) | carry_in, old & 0x80 != 0),
            3 => ((old >> 1) | (carry_in << 7), old & 0x01 != 0),
            4 => (old << 1, old & 0x80 != 0),
            // SRA preserves the sign bit.
            5 => ((old & 0x80) | (old >> 1), old & 0x01 != 0),
            6 => ((old << 4) | (old >> 4), false),
            7 => (old >> 1, old & 0x01 != 0),
            _ => unreachable!("rotate op out of range: {op}"),
        };
        self.set_reg8(memory, index, result);
        self.set_flag(Flag::N, false);
        self.set_flag(Flag::H, false);
        self.set_flag(Flag::C, carry_out);
        self.set_flag(Flag::Z, result == 0);
    }

    /// Decimal adjust after BCD addition/subtraction.
    ///
    /// The correction is chosen from N/H/C and the accumulator value. C is
    /// set when the correction overflows bit 8 and is never cleared on the
    /// subtraction branch.
    fn daa(&mut self) {
        let mut a = self.regs.a as i32;
        if !self.get_flag(Flag::N) {
            if self.get_flag(Flag::H) || (a & 0x0F) > 0x09 {
                a += 0x06;
            }
            if self.get_flag(Flag::C) || a > 0x9F {
                a += 0x60;
            }
        } else {
            if self.get_flag(Flag::H) {
                a = (a - 0x06) & 0xFF;
            }
            if self.get_flag(Flag::C) {
                a -= 0x60;
            }
        }

        self.set_flag(Flag::H, false);
        if a & 0x100 == 0x100 {
            self.set_flag(Flag::C, true);
        }

        a &= 0xFF;
        self.set_flag(Flag::Z, a == 0);
        self.regs.a = a as u8;
    }

    /// Signed-immediate 16-bit add used by ADD SP,d and LD HL,SP+d. Z and N
    /// clear; H and C come from the low byte of the addition.
    fn add16_signed(&mut self, base: u16, imm8: u8) -> u16 {
        let offset = imm8 as i8 as i16 as u16;
        self.set_flag(Flag::Z, false);
        self.set_flag(Flag::N, false);
        self.set_flag(Flag::H, (base & 0x000F) + (offset & 0x000F) > 0x000F);
        self.set_flag(Flag::C, (base & 0x00FF) + (offset & 0x00FF) > 0x00FF);
        base.wrapping_add(offset)
    }
}
