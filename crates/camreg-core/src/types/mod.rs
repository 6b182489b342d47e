//! Type system utilities and aliases.
//!
//! This module provides type aliases for the callback shapes used by the
//! event broker and the components built on it.
//!
//! ## Modules
//!
//! - [`aliases`]: Callback and shared-state aliases.

pub mod aliases;

pub use aliases::*;
