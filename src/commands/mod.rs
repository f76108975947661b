//! CLI subcommands.

pub mod command;
pub mod header;
pub mod view;
