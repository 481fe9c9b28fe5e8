//! CLI commands and argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Dataset Connector Development Kit CLI
#[derive(Parser, Debug)]
#[command(name = "dataset-cdk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Data source definition file (JSON or YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides the data source's base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate the data source definition
    Validate,

    /// List data set names
    DataSets,

    /// Fetch a data set
    Fetch {
        /// Data set name
        #[arg(short, long)]
        data_set: String,

        /// Params as a JSON object
        #[arg(short, long)]
        params: Option<String>,

        /// Page to resume from (a previous `nextPage`)
        #[arg(long)]
        page: Option<String>,

        /// Follow `nextPage` until the data set is exhausted
        #[arg(long)]
        all_pages: bool,
    },

    /// Print the iteration plan of an iterator definition
    Plan {
        /// Iterator layers file (JSON or YAML)
        #[arg(short, long)]
        iterator: PathBuf,

        /// Data set params as a JSON object
        #[arg(short, long)]
        params: Option<String>,

        /// Iterator params as a JSON object
        #[arg(long)]
        iterator_params: Option<String>,
    },

    /// Run a data set once per element of an iteration plan
    Iterate {
        /// Iterator layers file (JSON or YAML)
        #[arg(short, long)]
        iterator: PathBuf,

        /// Data set run for every slice
        #[arg(short, long)]
        data_set: String,

        /// Data set params as a JSON object
        #[arg(short, long)]
        params: Option<String>,

        /// Iterator params as a JSON object
        #[arg(long)]
        iterator_params: Option<String>,
    },
}

/// Output format for results
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Compact JSON, one document per line
    #[default]
    Json,
    /// Indented JSON
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from([
            "dataset-cdk",
            "-c",
            "source.json",
            "fetch",
            "--data-set",
            "projects",
            "--params",
            r#"{"org":"acme"}"#,
            "--all-pages",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("source.json")));
        match cli.command {
            Commands::Fetch {
                data_set,
                params,
                page,
                all_pages,
            } => {
                assert_eq!(data_set, "projects");
                assert_eq!(params.as_deref(), Some(r#"{"org":"acme"}"#));
                assert!(page.is_none());
                assert!(all_pages);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dataset-cdk",
            "data-sets",
            "--config",
            "source.yaml",
            "--format",
            "pretty",
            "--verbose",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::DataSets));
        assert!(matches!(cli.format, OutputFormat::Pretty));
        assert!(cli.verbose);
    }

    #[test]
    fn test_iterate_requires_data_set() {
        let result = Cli::try_parse_from(["dataset-cdk", "iterate", "--iterator", "layers.json"]);
        assert!(result.is_err());
    }
}
