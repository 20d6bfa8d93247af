//! A self-contained AST optimizer and x86-32/64 instruction encoder for the
//! middle and back end of a self-hosting C compiler (§1).
//!
//! This crate owns two things: a multi-pass tree rewriter over a typed AST
//! (`opt`, driven by `opt::run_pipeline` per `CompilerOptions::opt_level`),
//! and an x86 instruction encoder (`encoder`) that turns abstract
//! register/memory/immediate operands into legal machine bytes plus
//! relocations. Lexing, parsing, semantic analysis, the object writer, and
//! the linker are external collaborators this crate never touches (§1).

pub mod ast;
pub mod buffer;
pub mod encoder;
mod fx;
pub mod error;
pub mod operand;
pub mod opt;
pub mod options;
pub mod pgo;
pub mod regs;
pub mod reloc;

pub use ast::{Expr, ExprKind, Function, Param, Program, Stmt, StmtKind};
pub use error::ProfileError;
pub use options::{AvxLevel, Bitness, CompilerOptions, OptLevel};
pub use pgo::{pgo_load_profile, PgoProfile};
