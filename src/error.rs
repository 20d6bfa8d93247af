//! Error types for this crate's one fallible boundary: PGO profile parsing.
//!
//! The optimizer and encoder are total (§7 of the design doc: every rewrite
//! falls back to an identity, every unsupported encoding silently emits no
//! bytes). Only parsing an external profile file can fail, so it gets the
//! crate's only `Result`-returning entry point and the crate's only error
//! type, hand-rolled rather than pulled in from an error-derive crate (the
//! same minimal-dependency tradeoff `cranelift-codegen` makes for its own
//! `PccError`).

use std::fmt;
use std::path::PathBuf;

/// An error encountered while loading a PGO profile.
#[derive(Debug, Clone)]
pub enum ProfileError {
    /// The profile file could not be opened or read.
    Io { path: PathBuf, message: String },
    /// A line was missing the `name,hot|cold` separator.
    MalformedLine { line_no: usize, text: String },
    /// A line's tag was neither `hot` nor `cold`.
    UnknownTag { line_no: usize, tag: String },
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::Io { path, message } => {
                write!(f, "failed to read profile {}: {message}", path.display())
            }
            ProfileError::MalformedLine { line_no, text } => {
                write!(f, "profile line {line_no} is not `name,hot|cold`: {text:?}")
            }
            ProfileError::UnknownTag { line_no, tag } => {
                write!(f, "profile line {line_no} has unknown tag {tag:?} (want `hot` or `cold`)")
            }
        }
    }
}

impl std::error::Error for ProfileError {}
