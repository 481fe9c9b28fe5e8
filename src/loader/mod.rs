//! Loader module
//!
//! Parse data source definitions from JSON or YAML.
//!
//! # Overview
//!
//! The loader module provides:
//! - File and string loading for [`DataSourceConfig`](crate::config::DataSourceConfig)
//! - Fail-fast validation of references, paging schemes and expressions
//! - Generic document loading for companion files such as iterator layers

mod parser;

pub use parser::{
    load_data_source, load_data_source_from_str, load_document, parse_document,
    validate_data_source, Format,
};
