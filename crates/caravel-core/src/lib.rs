//! Core primitives shared across all Caravel crates

pub mod ident;
pub mod shortcuts;
pub mod value;

pub use ident::{ConfigId, InputId, ItemKind};
pub use value::Value;
