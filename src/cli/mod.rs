//! CLI module for ralphloop - arguments, interactive controls, and output.

pub mod commands;
pub mod control;
pub mod render;

pub use commands::Cli;
pub use control::ControlCommand;
pub use render::Renderer;
