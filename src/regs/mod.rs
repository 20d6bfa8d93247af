//! Component D: register name → id / size lookups.
//!
//! Grounded on `cranelift-assembler-x64/src/reg.rs` and `src/xmm.rs`: pure
//! tables mapping a register name to its 4-bit hardware encoding and its
//! byte width, with the `ah/ch/dh/bh` vs. `spl/bpl/sil/dil` collision (both
//! groups encode to 4..7) explicitly called out as resolved by REX.B at
//! encoding time rather than at lookup time.

pub mod gpr;
pub mod xmm;

/// Byte widths a register access can have (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegSize {
    Byte = 1,
    Word = 2,
    Dword = 4,
    Qword = 8,
    Xmm = 16,
    Ymm = 32,
}

impl RegSize {
    pub fn bytes(self) -> u32 {
        self as u32
    }
}

/// Resolve a register name to its 4-bit hardware encoding (§4.D
/// `reg_id`). Returns `None` (the id `-1` of §4.E's failure semantics) for
/// an unrecognized name; the encoder is the surface that must reject it.
pub fn reg_id(name: &str) -> Option<u8> {
    gpr::reg_id(name).or_else(|| xmm::reg_id(name))
}

/// Resolve a register name to its byte width (§4.D `reg_size`).
pub fn reg_size(name: &str) -> Option<RegSize> {
    gpr::reg_size(name).or_else(|| xmm::reg_size(name))
}

/// True if `name` names an XMM/YMM vector register rather than a GPR.
pub fn is_vector_reg(name: &str) -> bool {
    xmm::reg_id(name).is_some()
}
