//! Fast, non-cryptographic hash maps for the optimizer's scratch tables.

pub use rustc_hash::{FxHashMap, FxHashSet};
