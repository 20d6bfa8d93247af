//! ModR/M + SIB + displacement addressing (§4.E).
//!
//! The operand model (§3) only ever carries a bare `base + disp` memory
//! form (no index/scale), so the only SIB byte this encoder ever needs is
//! the fixed `scale=0, index=4 (none), base=RSP` byte required to express
//! plain `[rsp]`/`[r12]` addressing, exactly as called out in §4.E.

use super::rex::{encode_modrm, encode_sib};
use crate::buffer::Buffer;
use crate::operand::Operand;
use crate::regs;
use crate::reloc::{RelocKind, RelocSink, Section};

/// Emit the ModR/M byte (and SIB/displacement if needed) addressing `rm`,
/// with `reg_enc` placed in the ModR/M `reg` field (either a second
/// register operand or an opcode extension). Returns the full hardware
/// encoding of the base register referenced, for REX purposes (`0` if the
/// operand did not reference a base register, e.g. label addressing).
pub fn emit_modrm_for(buf: &mut Buffer, relocs: &mut RelocSink, reg_enc: u8, rm: &Operand) -> u8 {
    match rm {
        Operand::Reg(name) => {
            let enc = regs::reg_id(name).unwrap_or_else(|| panic!("unknown register {name}"));
            buf.write_u8(encode_modrm(0b11, reg_enc, enc));
            enc
        }
        Operand::Mem { base, disp } => {
            let base_enc = regs::reg_id(base).unwrap_or_else(|| panic!("unknown register {base}"));
            let base_low = base_enc & 7;
            // Base == 5 (rbp/r13) cannot express disp=0 with mod=00 (that
            // encoding is reserved for RIP-relative/disp32-only forms), so
            // it always takes an explicit disp8/32 (§4.E).
            let m0d = if *disp == 0 && base_low != 5 {
                0b00
            } else if (-128..=127).contains(disp) {
                0b01
            } else {
                0b10
            };
            buf.write_u8(encode_modrm(m0d, reg_enc, base_low));
            if base_low == 4 {
                buf.write_u8(encode_sib(0, 4, base_low));
            }
            match m0d {
                0b01 => buf.write_u8(*disp as u8),
                0b10 => buf.write_u32(*disp as u32),
                _ => {}
            }
            base_enc
        }
        Operand::MemLabel(label) => {
            // mod=00 rm=101: here repurposed, as §4.E directs, for an
            // absolute 32-bit displacement filled by an `ABSOLUTE`
            // relocation rather than true RIP-relative addressing.
            buf.write_u8(encode_modrm(0b00, reg_enc, 0b101));
            let offset = buf.size();
            buf.write_u32(0);
            relocs.add_reloc(offset, label, RelocKind::Absolute, Section::Data);
            0
        }
        Operand::Label(_) | Operand::Imm(_) => {
            panic!("{rm:?} is not a valid addressing operand")
        }
    }
}
