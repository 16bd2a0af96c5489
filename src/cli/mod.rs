//! Command-line interface: `clap`-derived subcommands over the pipeline
//! (schema init, one-shot collection, the scheduler loop, priority-index
//! registration, daily rollup) plus an interactive `dialoguer` menu.

mod commands;

pub use commands::*;
