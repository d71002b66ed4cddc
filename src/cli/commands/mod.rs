//! Subcommands of the `stageq` binary

pub mod inspect;
pub mod train;
