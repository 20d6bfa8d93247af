//! VEX prefix construction (§4.E), ported from
//! `cranelift-assembler-x64/src/vex.rs`.

use crate::buffer::Buffer;

/// The opcode-map selector encoded in `mmmmm` (three-byte form) or implied
/// by the two-byte form (always map `0F`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeMap {
    /// `0F`.
    Of,
    /// `0F 38`.
    Of38,
    /// `0F 3A`.
    Of3a,
}

impl OpcodeMap {
    fn mmmmm(self) -> u8 {
        match self {
            OpcodeMap::Of => 0b0_0001,
            OpcodeMap::Of38 => 0b0_0010,
            OpcodeMap::Of3a => 0b0_0011,
        }
    }
}

/// `pp` field: a mandatory legacy-SSE prefix folded into VEX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyPrefix {
    None,
    P66,
    Pf3,
    Pf2,
}

impl LegacyPrefix {
    fn pp(self) -> u8 {
        match self {
            LegacyPrefix::None => 0b00,
            LegacyPrefix::P66 => 0b01,
            LegacyPrefix::Pf3 => 0b10,
            LegacyPrefix::Pf2 => 0b11,
        }
    }
}

pub enum VexPrefix {
    TwoByte(u8),
    ThreeByte(u8, u8),
}

#[inline]
fn invert_top_bit(enc: u8) -> u8 {
    (!(enc >> 3)) & 1
}

/// §4.E: two-byte VEX is selected only when `X=0, B=0, W=0, map=0F` in
/// hardware terms — `x`/`b` here are already the *inverted* REX-style bits
/// (`1` = not extended, per `invert_top_bit`), so "X=0, B=0" (no extension)
/// is the `x == 1 && b == 1` case in this representation.
fn use_two_byte(x: u8, b: u8, w: bool, map: OpcodeMap) -> bool {
    x == 1 && b == 1 && !w && map == OpcodeMap::Of
}

impl VexPrefix {
    /// Construct a VEX prefix for an instruction with up to three register
    /// operands: `reg` (the ModR/M reg field), `vvvv` (the second source,
    /// `None` if unused), and `rm` (the ModR/M r/m field, possibly extended
    /// by an index register for a memory operand).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reg_enc: u8,
        vvvv_enc: Option<u8>,
        rm_enc: u8,
        index_enc: Option<u8>,
        is_256: bool,
        pp: LegacyPrefix,
        map: OpcodeMap,
        w: bool,
    ) -> Self {
        let r = invert_top_bit(reg_enc);
        let b = invert_top_bit(rm_enc);
        let x = invert_top_bit(index_enc.unwrap_or(0));
        let vvvv = vvvv_enc.unwrap_or(0) & 0b1111;
        let l = u8::from(is_256);

        if use_two_byte(x, b, w, map) {
            let last = (r << 7) | ((!vvvv & 0b1111) << 3) | (l << 2) | pp.pp();
            VexPrefix::TwoByte(last)
        } else {
            let second = (r << 7) | (x << 6) | (b << 5) | map.mmmmm();
            let last = ((w as u8) << 7) | ((!vvvv & 0b1111) << 3) | (l << 2) | pp.pp();
            VexPrefix::ThreeByte(second, last)
        }
    }

    pub fn encode(&self, buf: &mut Buffer) {
        match *self {
            VexPrefix::TwoByte(last) => {
                buf.write_u8(0xC5);
                buf.write_u8(last);
            }
            VexPrefix::ThreeByte(second, last) => {
                buf.write_u8(0xC4);
                buf.write_u8(second);
                buf.write_u8(last);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_byte_form_when_extension_bits_are_clear() {
        // vaddps xmm0, xmm1, xmm2: reg=0, vvvv=xmm1(1), rm=xmm2(2), map=0F, no 66/F2/F3, W=0.
        let vex = VexPrefix::new(0, Some(1), 2, None, false, LegacyPrefix::None, OpcodeMap::Of, false);
        assert!(matches!(vex, VexPrefix::TwoByte(_)));
    }

    #[test]
    fn three_byte_form_when_extended_register_is_used() {
        // rm = r8 (encoding 8) forces REX.B-equivalent, which cannot be
        // expressed in the two-byte VEX form.
        let vex = VexPrefix::new(0, Some(1), 8, None, false, LegacyPrefix::None, OpcodeMap::Of, false);
        assert!(matches!(vex, VexPrefix::ThreeByte(..)));
    }

    #[test]
    fn three_byte_form_for_0f38_map() {
        let vex = VexPrefix::new(0, None, 1, None, false, LegacyPrefix::P66, OpcodeMap::Of38, false);
        assert!(matches!(vex, VexPrefix::ThreeByte(..)));
    }
}
