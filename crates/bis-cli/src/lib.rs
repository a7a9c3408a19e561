//! CLI library components for Brick Instruction Studio.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod summary;
pub mod types;
