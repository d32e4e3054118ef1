use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log verbosity: trace, debug, info, warn, error. RUST_LOG overrides it.
    #[arg(short, long, global = true, default_value = "info")]
    pub verbosity: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Migrate the declared tables into PostgreSQL
    Migrate {
        /// PostgreSQL connection URI
        #[arg(short, long)]
        uri: String,

        /// Directory of exported entities (<entity>.json or <entity>.jsonl)
        #[arg(short, long)]
        source: PathBuf,

        /// YAML file of table declarations
        #[arg(short, long)]
        tables: PathBuf,

        /// Drop and recreate the public schema before migrating
        #[arg(long, default_value = "false")]
        reset_schema: bool,

        /// Source entities to ignore
        #[arg(long, value_delimiter = ',')]
        ignore: Vec<String>,
    },
    /// List source entities and their record counts
    Entities {
        /// Directory of exported entities
        #[arg(short, long)]
        source: PathBuf,

        /// Source entities to ignore
        #[arg(long, value_delimiter = ',')]
        ignore: Vec<String>,
    },
    /// Print the schema statements of the declared tables without running them
    Plan {
        /// YAML file of table declarations
        #[arg(short, long)]
        tables: PathBuf,
    },
}

pub fn get_args() -> Result<Args, clap::Error> {
    Args::try_parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_migrate() {
        let args = Args::try_parse_from([
            "doc-pg-migrate",
            "-v",
            "debug",
            "migrate",
            "--uri",
            "postgres://localhost/app",
            "--source",
            "dump",
            "--tables",
            "tables.yaml",
            "--reset-schema",
            "--ignore",
            "sessions,tokens",
        ])
        .unwrap();
        assert_eq!(args.verbosity, "debug");
        match args.command {
            Command::Migrate {
                reset_schema,
                ignore,
                source,
                ..
            } => {
                assert!(reset_schema);
                assert_eq!(ignore, vec!["sessions", "tokens"]);
                assert_eq!(source, PathBuf::from("dump"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn plan_needs_tables() {
        assert!(Args::try_parse_from(["doc-pg-migrate", "plan"]).is_err());
        let args = Args::try_parse_from(["doc-pg-migrate", "plan", "-t", "t.yaml"]).unwrap();
        assert_eq!(args.verbosity, "info");
    }
}
