//! Teller CLI - command orchestration over a local bank database
//!
//! The binary lives in `main.rs`; this crate exposes the commands so they can
//! be driven from tests.

pub mod commands;
pub mod context;

pub use context::AppContext;
