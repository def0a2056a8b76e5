//! Libris application library
//!
//! Book catalog modules and the bootstrap that wires them to the store,
//! the text generator, and the HTTP server.

pub mod app;
pub mod modules;

/// Re-export commonly used types
pub use modules::*;
