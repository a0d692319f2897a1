//! Fxrack Core - Real-time effect chain rack for live audio mixing

pub mod effect;
pub mod error;
pub mod rack;
pub mod types;

pub use types::*;
