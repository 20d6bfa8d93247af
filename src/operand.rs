//! Component C: the operand model the encoder consumes.
//!
//! Grounded on `cranelift-assembler-x64`'s `Amode`/`Gpr`/immediate types
//! (`src/mem.rs`, `src/reg.rs`, `src/imm.rs`), collapsed to the five cases
//! §3 specifies: a register, a base+displacement memory access, a
//! label-addressed memory access, a bare label (for `call`/`jmp` targets),
//! and an immediate.

/// An encoder operand (§3).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum Operand {
    /// A register referenced by name (resolved through `regs::reg_id`).
    Reg(String),
    /// `[base + disp]`.
    Mem { base: String, disp: i32 },
    /// `[label]`, a RIP-independent absolute or relocated label reference.
    MemLabel(String),
    /// A bare label, used as a branch/call target.
    Label(String),
    /// An immediate value, sign-extended as needed by the instruction form.
    Imm(i64),
}

impl Operand {
    pub fn reg(name: impl Into<String>) -> Self {
        Operand::Reg(name.into())
    }

    pub fn mem(base: impl Into<String>, disp: i32) -> Self {
        Operand::Mem { base: base.into(), disp }
    }

    pub fn mem_label(label: impl Into<String>) -> Self {
        Operand::MemLabel(label.into())
    }

    pub fn label(label: impl Into<String>) -> Self {
        Operand::Label(label.into())
    }

    pub fn imm(v: i64) -> Self {
        Operand::Imm(v)
    }

    pub fn as_reg(&self) -> Option<&str> {
        match self {
            Operand::Reg(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_imm(&self) -> Option<i64> {
        match self {
            Operand::Imm(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Operand::Mem { .. } | Operand::MemLabel(_))
    }
}
