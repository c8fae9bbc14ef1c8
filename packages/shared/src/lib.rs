//! Shared utilities for Hiroba binaries and libraries.

pub mod logger;
pub mod time;
