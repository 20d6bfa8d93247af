//! Component E: the x86 instruction encoder (§4.E).
//!
//! Three entry points mirror the spec exactly: `emit_inst0` (zero operands),
//! `emit_inst1` (one operand — branches, `setcc`), `emit_inst2` (two
//! operands — everything else). All three take an explicit `&mut
//! EncoderCtx` per §9's adopted redesign rather than ambient global state.

mod addr;
pub mod rex;
pub mod vex;

use crate::buffer::Buffer;
use crate::operand::Operand;
use crate::options::Bitness;
use crate::regs::{self, RegSize};
use crate::reloc::{RelocKind, RelocSink, Section};
use addr::emit_modrm_for;
use rex::{emit_simm, encode_modrm, low8_will_sign_extend_to_32, RexFlags};
use vex::{LegacyPrefix, OpcodeMap, VexPrefix};

/// The three pieces of ambient state §4.E names (buffer, bitness, relocation
/// sink), reified as an explicit context passed by `&mut` reference.
pub struct EncoderCtx {
    pub buf: Buffer,
    pub bits: Bitness,
    pub relocs: RelocSink,
}

impl EncoderCtx {
    pub fn new(bits: Bitness) -> Self {
        EncoderCtx { buf: Buffer::new(), bits, relocs: RelocSink::new() }
    }

    fn bits64(&self) -> bool {
        self.bits == Bitness::Bits64
    }
}

/// Condition codes shared by `Jcc` and `Setcc` (the low nibble of `0F 8x`
/// and `0F 9x`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    O,
    No,
    B,
    Ae,
    E,
    Ne,
    Be,
    A,
    S,
    Ns,
    P,
    Np,
    L,
    Ge,
    Le,
    G,
}

impl Cond {
    fn code(self) -> u8 {
        match self {
            Cond::O => 0x0,
            Cond::No => 0x1,
            Cond::B => 0x2,
            Cond::Ae => 0x3,
            Cond::E => 0x4,
            Cond::Ne => 0x5,
            Cond::Be => 0x6,
            Cond::A => 0x7,
            Cond::S => 0x8,
            Cond::Ns => 0x9,
            Cond::P => 0xA,
            Cond::Np => 0xB,
            Cond::L => 0xC,
            Cond::Ge => 0xD,
            Cond::Le => 0xE,
            Cond::G => 0xF,
        }
    }
}

/// The six `add/or/and/sub/xor/cmp` opcodes, distinguished only by their
/// base opcode byte and ModR/M `/ext` (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Or,
    And,
    Sub,
    Xor,
    Cmp,
}

impl ArithOp {
    fn ext(self) -> u8 {
        match self {
            ArithOp::Add => 0,
            ArithOp::Or => 1,
            ArithOp::And => 4,
            ArithOp::Sub => 5,
            ArithOp::Xor => 6,
            ArithOp::Cmp => 7,
        }
    }

    fn base_opcode(self) -> u8 {
        match self {
            ArithOp::Add => 0x00,
            ArithOp::Or => 0x08,
            ArithOp::And => 0x20,
            ArithOp::Sub => 0x28,
            ArithOp::Xor => 0x30,
            ArithOp::Cmp => 0x38,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Shl,
    Shr,
    Sar,
}

impl ShiftOp {
    fn ext(self) -> u8 {
        match self {
            ShiftOp::Shl => 4,
            ShiftOp::Shr => 5,
            ShiftOp::Sar => 7,
        }
    }
}

/// VEX-encoded packed float/int ops (§4.E, AVX/AVX2). This encoder has no
/// three-address vector form (the AST never produces one, §3), so the
/// destination register doubles as the first source (`vvvv`) — the same
/// two-operand convention the rest of this API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecOp {
    Vaddps,
    Vsubps,
    Vmulps,
    Vdivps,
    Vpaddd,
    Vpsubd,
}

impl VecOp {
    fn opcode_and_prefix(self) -> (u8, LegacyPrefix) {
        match self {
            VecOp::Vaddps => (0x58, LegacyPrefix::None),
            VecOp::Vsubps => (0x5C, LegacyPrefix::None),
            VecOp::Vmulps => (0x59, LegacyPrefix::None),
            VecOp::Vdivps => (0x5E, LegacyPrefix::None),
            VecOp::Vpaddd => (0xFE, LegacyPrefix::P66),
            VecOp::Vpsubd => (0xFA, LegacyPrefix::P66),
        }
    }
}

/// The mnemonic set this encoder supports (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Mov,
    Arith(ArithOp),
    Shift(ShiftOp),
    Imul,
    Lea,
    Movzbl,
    Movzwl,
    Setcc(Cond),
    Jcc(Cond),
    Jmp,
    Call,
    Ret,
    Leave,
    Cqo,
    Cdq,
    Syscall,
    Ud2,
    Hlt,
    Vzeroupper,
    VecOp(VecOp),
}

fn width_rex(width: RegSize) -> RexFlags {
    if width == RegSize::Qword {
        RexFlags::set_w()
    } else {
        RexFlags::clear_w()
    }
}

fn rm_base_enc(rm: &Operand) -> u8 {
    match rm {
        Operand::Reg(name) => regs::reg_id(name).unwrap_or_else(|| panic!("unknown register {name}")),
        Operand::Mem { base, .. } => regs::reg_id(base).unwrap_or_else(|| panic!("unknown register {base}")),
        _ => 0,
    }
}

fn emit_rex_for(ctx: &mut EncoderCtx, rex: RexFlags, reg_enc: u8, rm: &Operand) {
    rex.emit_two_op(&mut ctx.buf, ctx.bits64(), reg_enc, rm_base_enc(rm));
}

/// `0x66`/`0x67`-equivalent operand-size override (§4.E prefix policy): a
/// 32-bit operand size in 16-bit mode, or a 16-bit operand size in 32-bit
/// mode, needs an explicit override; 64-bit mode never does (REX.W covers
/// the 64-bit case, and 32-bit is that mode's native width).
fn emit_operand_size_prefix(ctx: &mut EncoderCtx, width: RegSize) {
    match (ctx.bits, width) {
        (Bitness::Bits16, RegSize::Dword | RegSize::Qword) => ctx.buf.write_u8(0x66),
        (Bitness::Bits32, RegSize::Word) => ctx.buf.write_u8(0x66),
        _ => {}
    }
}

/// `0x67` address-size override (§4.E prefix policy), the AS counterpart to
/// `emit_operand_size_prefix`'s OS rule: a 32-bit address size in 16-bit
/// mode, or a 16-bit address size in 32-bit mode, needs an explicit
/// override. Only `Operand::Mem` carries an address size (a bare register
/// or immediate operand has none); 64-bit mode never needs this prefix,
/// since the operand model only ever produces 64-bit-wide addressing there.
fn emit_address_size_prefix(ctx: &mut EncoderCtx, operand: &Operand) {
    let Operand::Mem { base, .. } = operand else { return };
    let addr_width = regs::reg_size(base).unwrap_or_else(|| panic!("unknown register {base}"));
    match (ctx.bits, addr_width) {
        (Bitness::Bits16, RegSize::Dword) => ctx.buf.write_u8(0x67),
        (Bitness::Bits32, RegSize::Word) => ctx.buf.write_u8(0x67),
        _ => {}
    }
}

pub fn emit_inst0(ctx: &mut EncoderCtx, mnemonic: Mnemonic) {
    match mnemonic {
        Mnemonic::Ret => ctx.buf.write_u8(0xC3),
        Mnemonic::Leave => {
            // §4.E: "C9 with 32-bit OS prefix" — read as "request 32-bit
            // operand size", which only needs an explicit 0x66 in 16-bit
            // mode; 32/64-bit mode already default to a wide enough leave.
            if ctx.bits == Bitness::Bits16 {
                ctx.buf.write_u8(0x66);
            }
            ctx.buf.write_u8(0xC9);
        }
        Mnemonic::Cqo => {
            RexFlags::set_w().emit_one_op(&mut ctx.buf, ctx.bits64(), 0);
            ctx.buf.write_u8(0x99);
        }
        Mnemonic::Cdq => ctx.buf.write_u8(0x99),
        Mnemonic::Syscall => {
            ctx.buf.write_u8(0x0F);
            ctx.buf.write_u8(0x05);
        }
        Mnemonic::Ud2 => {
            ctx.buf.write_u8(0x0F);
            ctx.buf.write_u8(0x0B);
        }
        Mnemonic::Hlt => ctx.buf.write_u8(0xF4),
        Mnemonic::Vzeroupper => {
            let vex = VexPrefix::new(0, None, 0, None, false, LegacyPrefix::None, OpcodeMap::Of, false);
            vex.encode(&mut ctx.buf);
            ctx.buf.write_u8(0x77);
        }
        other => panic!("{other:?} is not a zero-operand mnemonic"),
    }
}

pub fn emit_inst1(ctx: &mut EncoderCtx, mnemonic: Mnemonic, op: &Operand) {
    match mnemonic {
        Mnemonic::Jmp => emit_rel32_branch(ctx, &[0xE9], op),
        Mnemonic::Call => emit_rel32_branch(ctx, &[0xE8], op),
        Mnemonic::Jcc(cond) => emit_rel32_branch(ctx, &[0x0F, 0x80 | cond.code()], op),
        Mnemonic::Setcc(cond) => emit_setcc(ctx, cond, op),
        other => panic!("{other:?} is not a one-operand mnemonic"),
    }
}

fn emit_rel32_branch(ctx: &mut EncoderCtx, opcode_bytes: &[u8], target: &Operand) {
    let Operand::Label(label) = target else {
        panic!("{target:?} is not a valid branch target");
    };
    for &byte in opcode_bytes {
        ctx.buf.write_u8(byte);
    }
    let offset = ctx.buf.size();
    ctx.buf.write_u32(0);
    ctx.relocs.add_reloc(offset, label, RelocKind::Relative, Section::Text);
}

fn emit_setcc(ctx: &mut EncoderCtx, cond: Cond, dst: &Operand) {
    let name = dst.as_reg().expect("setcc destination must be a register");
    let enc = regs::reg_id(name).unwrap_or_else(|| panic!("unknown register {name}"));
    let mut rex = RexFlags::clear_w();
    rex.always_emit_if_8bit_needed(enc);
    rex.emit_one_op(&mut ctx.buf, ctx.bits64(), enc);
    ctx.buf.write_u8(0x0F);
    ctx.buf.write_u8(0x90 | cond.code());
    ctx.buf.write_u8(encode_modrm(0b11, 0, enc));
}

pub fn emit_inst2(ctx: &mut EncoderCtx, mnemonic: Mnemonic, src: &Operand, dst: &Operand) {
    match mnemonic {
        Mnemonic::Mov => emit_mov(ctx, src, dst),
        Mnemonic::Arith(op) => emit_arith(ctx, op, src, dst),
        Mnemonic::Shift(op) => emit_shift(ctx, op, src, dst),
        Mnemonic::Imul => emit_imul(ctx, src, dst),
        Mnemonic::Lea => emit_lea(ctx, src, dst),
        Mnemonic::Movzbl => emit_movzx(ctx, 0xB6, src, dst),
        Mnemonic::Movzwl => emit_movzx(ctx, 0xB7, src, dst),
        Mnemonic::VecOp(op) => emit_vec_op(ctx, op, src, dst),
        other => panic!("{other:?} is not a two-operand mnemonic"),
    }
}

fn emit_mov(ctx: &mut EncoderCtx, src: &Operand, dst: &Operand) {
    match (src, dst) {
        (Operand::Imm(imm), Operand::Reg(name)) => emit_mov_imm(ctx, *imm, name),
        (Operand::MemLabel(label), Operand::Reg(name)) => emit_mov_label(ctx, label, name, true),
        (Operand::Reg(name), Operand::MemLabel(label)) => emit_mov_label(ctx, label, name, false),
        (Operand::Reg(_), Operand::Reg(_) | Operand::Mem { .. })
        | (Operand::Mem { .. }, Operand::Reg(_)) => emit_mov_reg_form(ctx, src, dst),
        _ => panic!("unsupported mov operand shapes: {src:?}, {dst:?}"),
    }
}

fn emit_mov_imm(ctx: &mut EncoderCtx, imm: i64, name: &str) {
    let enc = regs::reg_id(name).unwrap_or_else(|| panic!("unknown register {name}"));
    let width = regs::reg_size(name).unwrap_or_else(|| panic!("unknown register {name}"));
    let mut rex = width_rex(width);
    rex.always_emit_if_8bit_needed(enc);
    rex.emit_one_op(&mut ctx.buf, ctx.bits64(), enc);
    emit_operand_size_prefix(ctx, width);
    match width {
        RegSize::Byte => {
            ctx.buf.write_u8(0xB0 + (enc & 7));
            ctx.buf.write_u8(imm as u8);
        }
        RegSize::Qword => {
            ctx.buf.write_u8(0xB8 + (enc & 7));
            ctx.buf.write_u64(imm as u64);
        }
        RegSize::Word => {
            ctx.buf.write_u8(0xB8 + (enc & 7));
            emit_simm(&mut ctx.buf, 2, imm);
        }
        _ => {
            ctx.buf.write_u8(0xB8 + (enc & 7));
            emit_simm(&mut ctx.buf, 4, imm);
        }
    }
}

/// `mov reg, [label]` / `mov [label], reg` (§4.E): the `A0..A3` accumulator
/// form when `reg` is `AL`/`EAX`/`RAX`, otherwise the general `8A/8B`
/// (read) / `88/89` (write) form with the label addressed through
/// `Operand::MemLabel`'s ModR/M `mod=00 rm=101` + `ABSOLUTE` relocation.
fn emit_mov_label(ctx: &mut EncoderCtx, label: &str, reg_name: &str, load: bool) {
    let enc = regs::reg_id(reg_name).unwrap_or_else(|| panic!("unknown register {reg_name}"));
    let width = regs::reg_size(reg_name).unwrap_or_else(|| panic!("unknown register {reg_name}"));
    if enc == 0 {
        let mut rex = width_rex(width);
        rex.emit_one_op(&mut ctx.buf, ctx.bits64(), 0);
        emit_operand_size_prefix(ctx, width);
        let opcode = match (width, load) {
            (RegSize::Byte, true) => 0xA0,
            (RegSize::Byte, false) => 0xA2,
            (_, true) => 0xA1,
            (_, false) => 0xA3,
        };
        ctx.buf.write_u8(opcode);
        let offset = ctx.buf.size();
        ctx.buf.write_u32(0);
        ctx.relocs.add_reloc(offset, label, RelocKind::Absolute, Section::Data);
    } else {
        let mut rex = width_rex(width);
        rex.always_emit_if_8bit_needed(enc);
        rex.emit_one_op(&mut ctx.buf, ctx.bits64(), enc);
        emit_operand_size_prefix(ctx, width);
        let opcode = match (width, load) {
            (RegSize::Byte, true) => 0x8A,
            (RegSize::Byte, false) => 0x88,
            (_, true) => 0x8B,
            (_, false) => 0x89,
        };
        ctx.buf.write_u8(opcode);
        let target = Operand::mem_label(label);
        emit_modrm_for(&mut ctx.buf, &mut ctx.relocs, enc, &target);
    }
}

fn emit_mov_reg_form(ctx: &mut EncoderCtx, src: &Operand, dst: &Operand) {
    let (reg_side, rm_side, load) = match (src, dst) {
        (Operand::Reg(_), Operand::Mem { .. }) => (src, dst, false),
        (Operand::Mem { .. }, Operand::Reg(_)) => (dst, src, true),
        (Operand::Reg(_), Operand::Reg(_)) => (src, dst, false),
        _ => panic!("unsupported mov operand shapes: {src:?}, {dst:?}"),
    };
    let reg_name = reg_side.as_reg().expect("mov register operand");
    let reg_enc = regs::reg_id(reg_name).unwrap_or_else(|| panic!("unknown register {reg_name}"));
    let width = regs::reg_size(reg_name).unwrap_or_else(|| panic!("unknown register {reg_name}"));
    let mut rex = width_rex(width);
    rex.always_emit_if_8bit_needed(reg_enc);
    emit_rex_for(ctx, rex, reg_enc, rm_side);
    emit_operand_size_prefix(ctx, width);
    emit_address_size_prefix(ctx, rm_side);
    let opcode = match (width, load) {
        (RegSize::Byte, true) => 0x8A,
        (RegSize::Byte, false) => 0x88,
        (_, true) => 0x8B,
        (_, false) => 0x89,
    };
    ctx.buf.write_u8(opcode);
    emit_modrm_for(&mut ctx.buf, &mut ctx.relocs, reg_enc, rm_side);
}

fn emit_arith(ctx: &mut EncoderCtx, op: ArithOp, src: &Operand, dst: &Operand) {
    if let Operand::Imm(imm) = src {
        emit_arith_imm(ctx, op, *imm, dst);
        return;
    }
    let (reg_side, rm_side, reverse) = match (src, dst) {
        (Operand::Reg(_), Operand::Mem { .. } | Operand::MemLabel(_)) => (src, dst, false),
        (Operand::Mem { .. } | Operand::MemLabel(_), Operand::Reg(_)) => (dst, src, true),
        (Operand::Reg(_), Operand::Reg(_)) => (src, dst, false),
        _ => panic!("unsupported operand shapes for {op:?}: {src:?}, {dst:?}"),
    };
    let reg_name = reg_side.as_reg().expect("arithmetic register operand");
    let reg_enc = regs::reg_id(reg_name).unwrap_or_else(|| panic!("unknown register {reg_name}"));
    let width = regs::reg_size(reg_name).unwrap_or_else(|| panic!("unknown register {reg_name}"));
    let mut rex = width_rex(width);
    rex.always_emit_if_8bit_needed(reg_enc);
    emit_rex_for(ctx, rex, reg_enc, rm_side);
    emit_operand_size_prefix(ctx, width);
    emit_address_size_prefix(ctx, rm_side);
    let wide = u8::from(width != RegSize::Byte);
    let dir = u8::from(reverse) << 1;
    ctx.buf.write_u8(op.base_opcode() | dir | wide);
    emit_modrm_for(&mut ctx.buf, &mut ctx.relocs, reg_enc, rm_side);
}

fn emit_arith_imm(ctx: &mut EncoderCtx, op: ArithOp, imm: i64, dst: &Operand) {
    let name = dst
        .as_reg()
        .unwrap_or_else(|| panic!("immediate {op:?} requires a register destination, got {dst:?}"));
    let enc = regs::reg_id(name).unwrap_or_else(|| panic!("unknown register {name}"));
    let width = regs::reg_size(name).unwrap_or_else(|| panic!("unknown register {name}"));
    let mut rex = width_rex(width);
    rex.always_emit_if_8bit_needed(enc);
    rex.emit_one_op(&mut ctx.buf, ctx.bits64(), enc);
    emit_operand_size_prefix(ctx, width);
    if width == RegSize::Byte {
        ctx.buf.write_u8(0x80);
        ctx.buf.write_u8(encode_modrm(0b11, op.ext(), enc));
        emit_simm(&mut ctx.buf, 1, imm);
    } else if op != ArithOp::And && low8_will_sign_extend_to_32(imm) {
        ctx.buf.write_u8(0x83);
        ctx.buf.write_u8(encode_modrm(0b11, op.ext(), enc));
        emit_simm(&mut ctx.buf, 1, imm);
    } else {
        ctx.buf.write_u8(0x81);
        ctx.buf.write_u8(encode_modrm(0b11, op.ext(), enc));
        let size = if width == RegSize::Word { 2 } else { 4 };
        emit_simm(&mut ctx.buf, size, imm);
    }
}

fn emit_shift(ctx: &mut EncoderCtx, op: ShiftOp, src: &Operand, dst: &Operand) {
    let name = dst.as_reg().expect("shift destination must be a register");
    let enc = regs::reg_id(name).unwrap_or_else(|| panic!("unknown register {name}"));
    let width = regs::reg_size(name).unwrap_or_else(|| panic!("unknown register {name}"));
    let mut rex = width_rex(width);
    rex.always_emit_if_8bit_needed(enc);
    rex.emit_one_op(&mut ctx.buf, ctx.bits64(), enc);
    emit_operand_size_prefix(ctx, width);
    match src {
        Operand::Imm(1) => {
            ctx.buf.write_u8(0xD1);
            ctx.buf.write_u8(encode_modrm(0b11, op.ext(), enc));
        }
        Operand::Imm(count) => {
            ctx.buf.write_u8(0xC1);
            ctx.buf.write_u8(encode_modrm(0b11, op.ext(), enc));
            emit_simm(&mut ctx.buf, 1, *count);
        }
        Operand::Reg(name) if name == "cl" => {
            ctx.buf.write_u8(0xD3);
            ctx.buf.write_u8(encode_modrm(0b11, op.ext(), enc));
        }
        other => panic!("shift count must be an immediate or cl, got {other:?}"),
    }
}

fn emit_imul(ctx: &mut EncoderCtx, src: &Operand, dst: &Operand) {
    let name = dst.as_reg().expect("imul destination must be a register");
    let enc = regs::reg_id(name).unwrap_or_else(|| panic!("unknown register {name}"));
    let width = regs::reg_size(name).unwrap_or_else(|| panic!("unknown register {name}"));
    match src {
        Operand::Imm(imm) => {
            let rex = width_rex(width);
            rex.emit_one_op(&mut ctx.buf, ctx.bits64(), enc);
            emit_operand_size_prefix(ctx, width);
            // §9: both ModR/M `reg` and `rm` carry the destination's
            // encoding for this compressed two-operand `imul` form.
            if low8_will_sign_extend_to_32(*imm) {
                ctx.buf.write_u8(0x6B);
                ctx.buf.write_u8(encode_modrm(0b11, enc, enc));
                emit_simm(&mut ctx.buf, 1, *imm);
            } else {
                ctx.buf.write_u8(0x69);
                ctx.buf.write_u8(encode_modrm(0b11, enc, enc));
                let size = if width == RegSize::Word { 2 } else { 4 };
                emit_simm(&mut ctx.buf, size, *imm);
            }
        }
        Operand::Reg(src_name) => {
            let src_enc = regs::reg_id(src_name).unwrap_or_else(|| panic!("unknown register {src_name}"));
            let rex = width_rex(width);
            rex.emit_two_op(&mut ctx.buf, ctx.bits64(), enc, src_enc);
            emit_operand_size_prefix(ctx, width);
            ctx.buf.write_u8(0x0F);
            ctx.buf.write_u8(0xAF);
            ctx.buf.write_u8(encode_modrm(0b11, enc, src_enc));
        }
        other => panic!("imul source must be an immediate or register, got {other:?}"),
    }
}

fn emit_lea(ctx: &mut EncoderCtx, src: &Operand, dst: &Operand) {
    let name = dst.as_reg().expect("lea destination must be a register");
    let enc = regs::reg_id(name).unwrap_or_else(|| panic!("unknown register {name}"));
    let width = regs::reg_size(name).unwrap_or_else(|| panic!("unknown register {name}"));
    match src {
        Operand::Mem { .. } => {
            let rex = width_rex(width);
            emit_rex_for(ctx, rex, enc, src);
            emit_operand_size_prefix(ctx, width);
            emit_address_size_prefix(ctx, src);
            ctx.buf.write_u8(0x8D);
            emit_modrm_for(&mut ctx.buf, &mut ctx.relocs, enc, src);
        }
        Operand::Label(label) => {
            // B8+rd imm32, ABSOLUTE relocation: a no-relocation-safe
            // absolute materialization rather than a true `lea` rel32 form.
            let rex = width_rex(width);
            rex.emit_one_op(&mut ctx.buf, ctx.bits64(), enc);
            ctx.buf.write_u8(0xB8 + (enc & 7));
            let offset = ctx.buf.size();
            ctx.buf.write_u32(0);
            ctx.relocs.add_reloc(offset, label, RelocKind::Absolute, Section::Data);
        }
        other => panic!("lea source must be memory or a label, got {other:?}"),
    }
}

fn emit_movzx(ctx: &mut EncoderCtx, opcode: u8, src: &Operand, dst: &Operand) {
    let name = dst.as_reg().expect("movzx destination must be a register");
    let enc = regs::reg_id(name).unwrap_or_else(|| panic!("unknown register {name}"));
    let width = regs::reg_size(name).unwrap_or_else(|| panic!("unknown register {name}"));
    let rex = width_rex(width);
    emit_rex_for(ctx, rex, enc, src);
    emit_operand_size_prefix(ctx, width);
    emit_address_size_prefix(ctx, src);
    ctx.buf.write_u8(0x0F);
    ctx.buf.write_u8(opcode);
    emit_modrm_for(&mut ctx.buf, &mut ctx.relocs, enc, src);
}

fn emit_vec_op(ctx: &mut EncoderCtx, op: VecOp, src: &Operand, dst: &Operand) {
    let dst_name = dst.as_reg().expect("vector destination must be a register");
    let dst_enc = regs::reg_id(dst_name).unwrap_or_else(|| panic!("unknown register {dst_name}"));
    let is_256 = regs::reg_size(dst_name) == Some(RegSize::Ymm);
    let (opcode, pp) = op.opcode_and_prefix();
    match src {
        Operand::Reg(src_name) => {
            let src_enc = regs::reg_id(src_name).unwrap_or_else(|| panic!("unknown register {src_name}"));
            let vex = VexPrefix::new(dst_enc, Some(dst_enc), src_enc, None, is_256, pp, OpcodeMap::Of, false);
            vex.encode(&mut ctx.buf);
            ctx.buf.write_u8(opcode);
            ctx.buf.write_u8(encode_modrm(0b11, dst_enc, src_enc));
        }
        other => panic!("vector op source must be a register, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_mov_imm64() {
        let mut ctx = EncoderCtx::new(Bitness::Bits64);
        emit_inst2(&mut ctx, Mnemonic::Mov, &Operand::imm(0x1234567890abcdef_i64), &Operand::reg("rax"));
        assert_eq!(ctx.buf.as_slice(), &[0x48, 0xB8, 0xEF, 0xCD, 0xAB, 0x90, 0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn scenario_add_reg_reg() {
        let mut ctx = EncoderCtx::new(Bitness::Bits64);
        emit_inst2(&mut ctx, Mnemonic::Arith(ArithOp::Add), &Operand::reg("rbx"), &Operand::reg("rcx"));
        assert_eq!(ctx.buf.as_slice(), &[0x48, 0x01, 0xD9]);
    }

    #[test]
    fn scenario_jne_label() {
        let mut ctx = EncoderCtx::new(Bitness::Bits64);
        emit_inst1(&mut ctx, Mnemonic::Jcc(Cond::Ne), &Operand::label("label"));
        assert_eq!(ctx.buf.as_slice(), &[0x0F, 0x85, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(ctx.relocs.relocations().len(), 1);
        assert_eq!(ctx.relocs.relocations()[0].offset, 2);
        assert_eq!(ctx.relocs.relocations()[0].kind, RelocKind::Relative);
    }

    #[test]
    fn and_never_uses_sign_extended_imm8_form() {
        let mut ctx = EncoderCtx::new(Bitness::Bits64);
        emit_inst2(&mut ctx, Mnemonic::Arith(ArithOp::And), &Operand::imm(1), &Operand::reg("rax"));
        // REX.W, 0x81 /4, modrm, 4-byte immediate -- never the 0x83 form.
        assert_eq!(ctx.buf.as_slice(), &[0x48, 0x81, 0xE0, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn imul_reg_imm_shares_reg_and_rm() {
        let mut ctx = EncoderCtx::new(Bitness::Bits64);
        emit_inst2(&mut ctx, Mnemonic::Imul, &Operand::imm(3), &Operand::reg("rax"));
        assert_eq!(ctx.buf.as_slice(), &[0x48, 0x6B, 0xC0, 0x03]);
    }

    #[test]
    fn jmp_unconditional_uses_single_opcode_byte() {
        let mut ctx = EncoderCtx::new(Bitness::Bits64);
        emit_inst1(&mut ctx, Mnemonic::Jmp, &Operand::label("target"));
        assert_eq!(ctx.buf.as_slice()[0], 0xE9);
        assert_eq!(ctx.relocs.relocations()[0].offset, 1);
    }

    #[test]
    fn vzeroupper_uses_two_byte_vex() {
        let mut ctx = EncoderCtx::new(Bitness::Bits64);
        emit_inst0(&mut ctx, Mnemonic::Vzeroupper);
        assert_eq!(ctx.buf.as_slice(), &[0xC5, 0xF8, 0x77]);
    }

    #[test]
    fn bits16_mode_emits_address_size_override_for_a_32bit_base() {
        // mov bx, [ebx] in 16-bit mode: native address size is 16-bit, but
        // the base register is 32-bit, so 0x67 is required.
        let mut ctx = EncoderCtx::new(Bitness::Bits16);
        emit_inst2(&mut ctx, Mnemonic::Mov, &Operand::mem("ebx", 0), &Operand::reg("bx"));
        assert_eq!(ctx.buf.as_slice(), &[0x67, 0x8B, 0x1B]);
    }

    #[test]
    fn bits32_mode_emits_address_size_override_for_a_16bit_base() {
        // mov ecx, [bx] in 32-bit mode: native address size is 32-bit, but
        // the base register is 16-bit, so 0x67 is required.
        let mut ctx = EncoderCtx::new(Bitness::Bits32);
        emit_inst2(&mut ctx, Mnemonic::Mov, &Operand::mem("bx", 0), &Operand::reg("ecx"));
        assert_eq!(ctx.buf.as_slice(), &[0x67, 0x8B, 0x0B]);
    }
}
