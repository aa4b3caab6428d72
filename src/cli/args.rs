//! Command line argument parsing
//!
//! Subcommands:
//! - `run`: Run the coordinator until interrupted
//! - `show-config`: Show configuration discovery information and the effective configuration
//! - `init-config`: Write a default configuration file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Run(RunConfig),
    ShowConfig { config_override: Option<PathBuf> },
    InitConfig { path: PathBuf, force: bool },
}

#[derive(Debug)]
pub struct RunConfig {
    pub config_override: Option<PathBuf>,
    pub settings_override: Option<PathBuf>,
    pub worker_override: Option<usize>,
}

#[derive(Debug, Parser)]
#[command(name = "feedsync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Background synchronization coordinator for a feed reader backend")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the scheduler and worker pool until Ctrl-C
    Run {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Settings file used to persist task configuration
        #[arg(short = 's', long = "settings")]
        settings: Option<PathBuf>,
        /// Override the number of workers
        #[arg(short = 'w', long = "workers")]
        workers: Option<usize>,
    },
    /// Show configuration discovery information
    ShowConfig {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(short = 'f', long = "force")]
        force: bool,
    },
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Run {
                config,
                settings,
                workers,
            }) => {
                if *workers == Some(0) {
                    return Err("Worker count must be at least 1".to_string());
                }

                Ok(ExecutionMode::Run(RunConfig {
                    config_override: config.clone(),
                    settings_override: settings.clone(),
                    worker_override: *workers,
                }))
            }
            Some(Commands::ShowConfig { config }) => Ok(ExecutionMode::ShowConfig {
                config_override: config.clone(),
            }),
            Some(Commands::InitConfig { path, force }) => Ok(ExecutionMode::InitConfig {
                path: path.clone(),
                force: *force,
            }),
            None => Err(
                "No command specified. Use 'feedsync --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command() {
        let args = Args {
            command: Some(Commands::Run {
                config: Some(PathBuf::from("feedsync.toml")),
                settings: Some(PathBuf::from("/var/lib/feedsync/settings.toml")),
                workers: Some(2),
            }),
        };

        if let ExecutionMode::Run(config) = args.mode().unwrap() {
            assert_eq!(config.config_override, Some(PathBuf::from("feedsync.toml")));
            assert!(config.settings_override.is_some());
            assert_eq!(config.worker_override, Some(2));
        } else {
            panic!("Expected Run mode");
        }
    }

    #[test]
    fn test_run_rejects_zero_workers() {
        let args = Args {
            command: Some(Commands::Run {
                config: None,
                settings: None,
                workers: Some(0),
            }),
        };
        assert!(args.mode().is_err());
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from(["feedsync", "run", "--settings", "s.toml"]).unwrap();
        match args.mode().unwrap() {
            ExecutionMode::Run(config) => {
                assert_eq!(config.settings_override, Some(PathBuf::from("s.toml")));
                assert!(config.config_override.is_none());
            }
            other => panic!("Expected Run mode, got {:?}", other),
        }

        let args =
            Args::try_parse_from(["feedsync", "init-config", "out.toml", "--force"]).unwrap();
        assert!(matches!(
            args.mode().unwrap(),
            ExecutionMode::InitConfig { force: true, .. }
        ));

        let args = Args::try_parse_from(["feedsync", "show-config"]).unwrap();
        assert!(matches!(
            args.mode().unwrap(),
            ExecutionMode::ShowConfig {
                config_override: None
            }
        ));
    }

    #[test]
    fn test_no_command_error() {
        let args = Args { command: None };
        assert!(args.mode().is_err());
    }
}
