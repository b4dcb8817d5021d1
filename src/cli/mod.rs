pub mod args;
pub mod commands;

pub use args::{parse_invocation, Cli, Invocation, RunArgs};
