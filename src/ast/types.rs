//! The minimal stand-in for the external type resolver (§3 "Type info").
//!
//! The real semantic analyzer is out of scope (§1); the optimizer only ever
//! reads through `resolved_type`, never constructs one for front-end
//! purposes, so this surface is kept intentionally small: just enough for
//! the vectorizer (§4.N) to ask "is this array's element an `i32` or an
//! `f32`?".

/// The element type of an array, as read by the vectorizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Int32,
    Float32,
}

/// Resolved type information attached to an AST node. Read-only after
/// semantic analysis (§3 invariant) — nothing in this crate ever constructs
/// a `TypeInfo` except test fixtures standing in for the external resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub size: u32,
    pub is_float: bool,
    pub is_pointer: bool,
    pub element_kind: Option<ElementKind>,
}

impl TypeInfo {
    pub fn int32() -> Self {
        TypeInfo { size: 4, is_float: false, is_pointer: false, element_kind: None }
    }

    pub fn float32() -> Self {
        TypeInfo { size: 4, is_float: true, is_pointer: false, element_kind: None }
    }

    pub fn array_of(element_kind: ElementKind) -> Self {
        TypeInfo {
            size: 8,
            is_float: false,
            is_pointer: true,
            element_kind: Some(element_kind),
        }
    }
}
