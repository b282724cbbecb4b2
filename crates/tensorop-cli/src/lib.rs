//! tensorop command-line harness
//!
//! Reports compiled backends, checks the AWQ dequantization kernel against
//! reference answers and times it, and writes golden case files.

pub mod commands;
pub mod config;
pub mod exit;
pub mod golden;
pub mod harness;
pub mod output;
