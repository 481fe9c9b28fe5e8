//! CLI module
//!
//! Command-line interface for running data sets.
//!
//! # Commands
//!
//! - `validate` - Load and validate a data source definition
//! - `data-sets` - List data set names
//! - `fetch` - Fetch a data set, optionally following every page
//! - `plan` - Print the iteration plan of an iterator definition
//! - `iterate` - Run a data set once per element of an iteration plan

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
