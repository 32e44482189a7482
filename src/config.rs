// Configuration management for the TGW route simulator
// Supports CLI arguments, config file (TOML), and environment variables

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

use crate::plan::{PlanOptions, DEFAULT_MIN_PREFIX_LEN};
use crate::simulate::report::{RenderOptions, ReportFormat};

/// TGW route simulator - check historical flows against a proposed route table design
#[derive(Parser, Debug, Clone)]
#[command(name = "tgw-route-simulator")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(short, long, env = "TGWSIM_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Path to configuration file
    #[arg(short, long, env = "TGWSIM_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Evaluate a flow log summary against a network plan
    Check {
        /// Network plan (.json or .toml)
        #[arg(long, env = "TGWSIM_PLAN")]
        plan: Option<PathBuf>,

        /// Flow log summary (.csv or .json)
        #[arg(long, env = "TGWSIM_FLOWS")]
        flows: Option<PathBuf>,

        /// Report format
        #[arg(long, value_enum)]
        format: Option<ReportFormat>,

        /// Show flows whose endpoints match no network
        #[arg(long)]
        show_warnings: bool,

        /// Show flows whose simulated outcome matches the observed one
        #[arg(long)]
        show_consistent: bool,

        /// Shortest accepted VPC prefix length
        #[arg(long)]
        min_prefix_len: Option<u8>,

        /// Worker threads used to evaluate flows
        #[arg(long, env = "TGWSIM_WORKERS")]
        workers: Option<usize>,
    },

    /// Generate a plan skeleton from an AWS Config VPC export
    Scaffold {
        /// AWS Config advanced query results (JSON)
        #[arg(long)]
        config_json: PathBuf,

        /// Plan file to write (TOML)
        #[arg(long)]
        output: PathBuf,

        /// Overwrite the output file if it exists
        #[arg(long)]
        force: bool,
    },
}

/// Configuration file structure (TOML format)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// Input files
    #[serde(default)]
    pub input: InputConfig,

    /// Plan validation settings
    #[serde(default)]
    pub plan: PlanConfig,

    /// Report settings
    #[serde(default)]
    pub report: ReportConfig,

    /// Evaluation settings
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InputConfig {
    pub plan: Option<PathBuf>,
    pub flows: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Shortest accepted VPC prefix length
    #[serde(default = "default_min_prefix_len")]
    pub min_prefix_len: u8,

    /// CIDRs skipped when scaffolding a plan
    #[serde(default)]
    pub exclude_cidrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportConfig {
    #[serde(default)]
    pub format: ReportFormat,

    #[serde(default)]
    pub show_warnings: bool,

    #[serde(default)]
    pub show_consistent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SimulationConfig {
    /// Worker threads; defaults to the available parallelism
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_min_prefix_len() -> u8 {
    DEFAULT_MIN_PREFIX_LEN
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_workers() -> usize {
    rayon::current_num_threads()
}

impl Default for PlanConfig {
    fn default() -> Self {
        PlanConfig {
            min_prefix_len: default_min_prefix_len(),
            exclude_cidrs: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

/// Settings for one `check` run
#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub plan_path: PathBuf,
    pub flows_path: PathBuf,
    pub plan_options: PlanOptions,
    pub format: ReportFormat,
    pub render: RenderOptions,
    pub workers: usize,
}

/// Settings for one `scaffold` run
#[derive(Debug, Clone)]
pub struct ScaffoldConfig {
    pub export_path: PathBuf,
    pub output_path: PathBuf,
    pub exclude_cidrs: Vec<String>,
    pub force: bool,
}

#[derive(Debug, Clone)]
pub enum Mode {
    Check(CheckConfig),
    Scaffold(ScaffoldConfig),
}

/// Merged configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: Level,
    pub mode: Mode,
}

impl Config {
    /// Load configuration from all sources (CLI args, config file, defaults)
    /// Priority: CLI args > Config file > Defaults
    pub fn load() -> anyhow::Result<Self> {
        let cli_args = CliArgs::parse();
        let config_file = load_config_file(cli_args.config.as_deref())?;
        Self::merge(cli_args, config_file)
    }

    pub fn merge(cli_args: CliArgs, config_file: ConfigFile) -> anyhow::Result<Self> {
        let level_str = cli_args
            .log_level
            .unwrap_or_else(|| config_file.logging.level.clone());
        let log_level = parse_log_level(&level_str)?;

        let mode = match cli_args.command {
            CliCommand::Check {
                plan,
                flows,
                format,
                show_warnings,
                show_consistent,
                min_prefix_len,
                workers,
            } => {
                let plan_path = plan
                    .or(config_file.input.plan)
                    .ok_or_else(|| anyhow::anyhow!("No plan file given (--plan or [input] plan)"))?;
                let flows_path = flows
                    .or(config_file.input.flows)
                    .ok_or_else(|| anyhow::anyhow!("No flow log given (--flows or [input] flows)"))?;

                let workers = workers
                    .or(config_file.simulation.workers)
                    .unwrap_or_else(default_workers)
                    .max(1);

                Mode::Check(CheckConfig {
                    plan_path,
                    flows_path,
                    plan_options: PlanOptions {
                        min_prefix_len: min_prefix_len.unwrap_or(config_file.plan.min_prefix_len),
                    },
                    format: format.unwrap_or(config_file.report.format),
                    render: RenderOptions {
                        show_warnings: show_warnings || config_file.report.show_warnings,
                        show_consistent: show_consistent || config_file.report.show_consistent,
                    },
                    workers,
                })
            }
            CliCommand::Scaffold {
                config_json,
                output,
                force,
            } => Mode::Scaffold(ScaffoldConfig {
                export_path: config_json,
                output_path: output,
                exclude_cidrs: config_file.plan.exclude_cidrs,
                force,
            }),
        };

        Ok(Config { log_level, mode })
    }
}

fn load_config_file(explicit: Option<&Path>) -> anyhow::Result<ConfigFile> {
    if let Some(config_path) = explicit {
        tracing::info!("Loading configuration from: {}", config_path.display());
        let config_content = std::fs::read_to_string(config_path)?;
        return Ok(toml::from_str::<ConfigFile>(&config_content)?);
    }

    // Try loading from default locations
    let default_paths = [
        PathBuf::from("tgw-route-simulator.toml"),
        PathBuf::from("config.toml"),
    ];

    for path in default_paths {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let config_content = std::fs::read_to_string(&path)?;
            return Ok(toml::from_str::<ConfigFile>(&config_content)?);
        }
    }

    Ok(ConfigFile::default())
}

fn parse_log_level(level_str: &str) -> anyhow::Result<Level> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(anyhow::anyhow!("Invalid log level: {}", level_str)),
    }
}
