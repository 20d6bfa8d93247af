//! General-purpose register name tables (§4.D).
//!
//! `ah/ch/dh/bh` alias to the same 4-bit encodings (4..7) as
//! `spl/bpl/sil/dil`; callers disambiguate at encode time via REX.B/REX
//! presence (`rex::RexFlags::always_emit_if_8bit_needed`, grounded on
//! `cranelift-assembler-x64/src/rex.rs`'s identically named method).

use super::RegSize;

const QWORD_NAMES: &[&str] = &[
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];
const DWORD_NAMES: &[&str] = &[
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d", "r12d",
    "r13d", "r14d", "r15d",
];
const WORD_NAMES: &[&str] = &[
    "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w", "r13w",
    "r14w", "r15w",
];
/// Low-byte forms for ids 0..7 that need REX to reach them unambiguously
/// from the legacy `ah/ch/dh/bh` high-byte forms at the same ids.
const BYTE_NAMES_REX: &[&str] =
    &["al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b", "r13b", "r14b", "r15b"];
/// Legacy high-byte forms, only valid without a REX prefix; they alias ids
/// 4..7 (§4.D).
const BYTE_NAMES_HIGH: &[&str] = &["ah", "ch", "dh", "bh"];

fn find(names: &[&str], name: &str) -> Option<u8> {
    names.iter().position(|&n| n == name).map(|i| i as u8)
}

pub fn reg_id(name: &str) -> Option<u8> {
    find(QWORD_NAMES, name)
        .or_else(|| find(DWORD_NAMES, name))
        .or_else(|| find(WORD_NAMES, name))
        .or_else(|| find(BYTE_NAMES_REX, name))
        .or_else(|| find(BYTE_NAMES_HIGH, name).map(|i| i + 4))
}

pub fn reg_size(name: &str) -> Option<RegSize> {
    if find(QWORD_NAMES, name).is_some() {
        Some(RegSize::Qword)
    } else if find(DWORD_NAMES, name).is_some() {
        Some(RegSize::Dword)
    } else if find(WORD_NAMES, name).is_some() {
        Some(RegSize::Word)
    } else if find(BYTE_NAMES_REX, name).is_some() || find(BYTE_NAMES_HIGH, name).is_some() {
        Some(RegSize::Byte)
    } else {
        None
    }
}

/// True if `name` is one of the legacy high-byte aliases (`ah`, `ch`, `dh`,
/// `bh`) that cannot be encoded once a REX prefix is present.
pub fn is_legacy_high_byte(name: &str) -> bool {
    BYTE_NAMES_HIGH.contains(&name)
}

/// True if `name` is one of the low-byte forms that requires a REX prefix
/// to disambiguate from the legacy high-byte aliases at the same id
/// (`spl`, `bpl`, `sil`, `dil`).
pub fn needs_rex_to_disambiguate(name: &str) -> bool {
    matches!(name, "spl" | "bpl" | "sil" | "dil")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_byte_aliases_collide_with_low_byte_ids() {
        assert_eq!(reg_id("ah"), Some(4));
        assert_eq!(reg_id("spl"), Some(4));
        assert_eq!(reg_id("ch"), Some(5));
        assert_eq!(reg_id("bpl"), Some(5));
    }

    #[test]
    fn widths_distinguish_r8_families() {
        assert_eq!(reg_size("r8"), Some(RegSize::Qword));
        assert_eq!(reg_size("r8d"), Some(RegSize::Dword));
        assert_eq!(reg_size("r8w"), Some(RegSize::Word));
        assert_eq!(reg_size("r8b"), Some(RegSize::Byte));
    }

    #[test]
    fn unknown_register_is_none() {
        assert_eq!(reg_id("notareg"), None);
    }
}
