//! CLI command implementations

pub mod check;
pub mod generate;
pub mod info;

pub use check::CheckCommand;
pub use generate::GenerateCommand;
pub use info::InfoCommand;
