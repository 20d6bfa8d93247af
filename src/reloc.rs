//! Component B: the relocation sink.
//!
//! Grounded on `cranelift-codegen`'s `binemit::RelocSink` trait
//! (`cranelift/codegen/src/binemit/memorysink.rs`), simplified to the two
//! relocation kinds this encoder needs (§6) and the symbol table that trait
//! assumed was external. Symbol indices are created on demand and are
//! monotonic per session (§5), mirroring how the teacher's `RelocSink`
//! forwards to an object writer that resolves symbol indices lazily.

use crate::fx::FxHashMap;

/// A relocation's requested fixup kind (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// PC-relative 32-bit, implicit −4 addend (the displacement is measured
    /// from the end of the 4-byte field itself).
    Relative,
    /// Direct 32-bit immediate or displacement.
    Absolute,
}

/// The object section a symbol or relocation belongs to. This crate does
/// not model a full section table (that belongs to the external object
/// writer, §1); it only needs enough of a tag to pass through to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Text,
    Data,
    Bss,
    Rodata,
}

/// Linkage class of a symbol, passed through to the external object writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolClass {
    Local,
    Global,
    Weak,
}

/// One resolved or pending symbol.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub value: i64,
    pub section: Section,
    pub flags: SymbolFlags,
    pub class: SymbolClass,
    pub defined: bool,
}

/// A recorded relocation: "patch the 4-byte field at `offset` once `symbol`
/// is known, per `kind`, in `section`".
#[derive(Debug, Clone)]
pub struct Relocation {
    pub offset: u32,
    pub symbol: u32,
    pub kind: RelocKind,
    pub section: Section,
}

/// Bit flags carried alongside a symbol (e.g. "this is a function"). Kept
/// minimal; the object writer interprets them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolFlags(pub u32);

impl SymbolFlags {
    pub const NONE: SymbolFlags = SymbolFlags(0);
    pub const FUNCTION: SymbolFlags = SymbolFlags(1 << 0);
}

/// The relocation sink (§4.B): accepts relocations, resolves or creates
/// symbol indices, and accumulates both for the external object writer.
#[derive(Debug, Clone, Default)]
pub struct RelocSink {
    symbols: Vec<Symbol>,
    by_name: FxHashMap<String, u32>,
    relocs: Vec<Relocation>,
}

impl RelocSink {
    pub fn new() -> Self {
        RelocSink::default()
    }

    /// Locate an existing symbol index for `name`, if any.
    pub fn find_symbol(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Register a new symbol (or return the existing index if already
    /// present — symbol names are unique within a session).
    pub fn add_symbol(
        &mut self,
        name: &str,
        value: i64,
        section: Section,
        flags: SymbolFlags,
        class: SymbolClass,
    ) -> u32 {
        if let Some(&idx) = self.by_name.get(name) {
            return idx;
        }
        let idx = self.symbols.len() as u32;
        self.symbols.push(Symbol {
            name: name.to_string(),
            value,
            section,
            flags,
            class,
            defined: true,
        });
        self.by_name.insert(name.to_string(), idx);
        idx
    }

    /// Locate or create an undefined placeholder symbol for `name` (§4.B:
    /// "locates or creates a symbol index for `name`"). Relocation failure
    /// is impossible (§7): an unresolved name becomes an undefined symbol
    /// the object writer must later resolve or report as unresolved.
    fn symbol_index_for(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.by_name.get(name) {
            return idx;
        }
        let idx = self.symbols.len() as u32;
        self.symbols.push(Symbol {
            name: name.to_string(),
            value: 0,
            section: Section::Text,
            flags: SymbolFlags::NONE,
            class: SymbolClass::Global,
            defined: false,
        });
        self.by_name.insert(name.to_string(), idx);
        idx
    }

    /// Record a relocation at `offset` against `symbol_name` (§4.B).
    pub fn add_reloc(&mut self, offset: u32, symbol_name: &str, kind: RelocKind, section: Section) {
        let symbol = self.symbol_index_for(symbol_name);
        log::trace!("reloc {kind:?} at +{offset:#x} against {symbol_name} ({section:?})");
        self.relocs.push(Relocation { offset, symbol, kind, section });
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn relocations(&self) -> &[Relocation] {
        &self.relocs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_symbols_are_created_on_demand() {
        let mut sink = RelocSink::new();
        assert_eq!(sink.find_symbol("label"), None);
        sink.add_reloc(4, "label", RelocKind::Relative, Section::Text);
        let idx = sink.find_symbol("label").unwrap();
        assert_eq!(sink.relocations()[0].symbol, idx);
        assert_eq!(sink.relocations()[0].offset, 4);
    }

    #[test]
    fn repeated_relocs_reuse_the_same_symbol() {
        let mut sink = RelocSink::new();
        sink.add_reloc(0, "f", RelocKind::Relative, Section::Text);
        sink.add_reloc(10, "f", RelocKind::Absolute, Section::Text);
        assert_eq!(sink.symbols().len(), 1);
        assert_eq!(sink.relocations().len(), 2);
    }
}
