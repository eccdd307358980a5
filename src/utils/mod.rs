//! Cross-platform utilities: path resolution and filesystem helpers.

pub mod fs;
pub mod platform;
