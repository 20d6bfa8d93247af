//! Vector register name tables (§4.D): XMM (128-bit) and YMM (256-bit).

use super::RegSize;

const XMM_NAMES: &[&str] = &[
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];
const YMM_NAMES: &[&str] = &[
    "ymm0", "ymm1", "ymm2", "ymm3", "ymm4", "ymm5", "ymm6", "ymm7", "ymm8", "ymm9", "ymm10",
    "ymm11", "ymm12", "ymm13", "ymm14", "ymm15",
];

fn find(names: &[&str], name: &str) -> Option<u8> {
    names.iter().position(|&n| n == name).map(|i| i as u8)
}

pub fn reg_id(name: &str) -> Option<u8> {
    find(XMM_NAMES, name).or_else(|| find(YMM_NAMES, name))
}

pub fn reg_size(name: &str) -> Option<RegSize> {
    if find(XMM_NAMES, name).is_some() {
        Some(RegSize::Xmm)
    } else if find(YMM_NAMES, name).is_some() {
        Some(RegSize::Ymm)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xmm_and_ymm_share_ids_but_differ_in_width() {
        assert_eq!(reg_id("xmm3"), Some(3));
        assert_eq!(reg_id("ymm3"), Some(3));
        assert_eq!(reg_size("xmm3"), Some(RegSize::Xmm));
        assert_eq!(reg_size("ymm3"), Some(RegSize::Ymm));
    }
}
