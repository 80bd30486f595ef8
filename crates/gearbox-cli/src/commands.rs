//! CLI command definitions.

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a gear across the centers of a source project
    Batch(BatchArgs),

    /// Route uploaded files to their submission pipelines
    Dispatch(DispatchArgs),

    /// Run visit QC for participants
    Qc(QcArgs),

    /// Validate a configuration file
    Validate {
        #[arg(value_enum)]
        kind: ConfigKind,

        /// Path to the file (YAML or JSON)
        path: PathBuf,
    },

    /// Print the JSON Schema of a configuration file
    Schema {
        #[arg(value_enum)]
        kind: ConfigKind,
    },

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKind {
    Batch,
    Pipeline,
    Modules,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Batch config file
    pub config: PathBuf,

    /// Container the batch jobs run against
    #[arg(short, long)]
    pub destination: String,

    /// Skip centers with a run of the gear in the last N days (-1 disables)
    #[arg(long, default_value_t = 7, allow_negative_numbers = true)]
    pub time_interval: i64,

    /// Retry failed batches
    #[arg(long)]
    pub retry: bool,

    /// Total attempts per batch when retrying
    #[arg(long, default_value_t = 2)]
    pub max_attempts: u32,

    #[arg(long = "exclude-center")]
    pub exclude_centers: Vec<String>,

    #[arg(long = "exclude-study")]
    pub exclude_studies: Vec<String>,

    #[arg(long = "include-center")]
    pub include_centers: Vec<String>,

    #[arg(long = "include-study")]
    pub include_studies: Vec<String>,

    /// Seconds to wait for each batch job
    #[arg(long, default_value_t = 6 * 60 * 60)]
    pub deadline_secs: u64,

    /// Compute batches without dispatching
    #[arg(long)]
    pub dry_run: bool,

    /// Recipient of the failure report (repeatable)
    #[arg(long = "notify")]
    pub notify: Vec<String>,
}

#[derive(Args)]
pub struct DispatchArgs {
    /// Pipeline config file
    pub pipelines: PathBuf,

    /// Ids of the uploaded files, in arrival order
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Container jobs start in and are deduplicated against
    #[arg(long)]
    pub scope: Option<String>,

    /// Container holding templates and rule files
    #[arg(long)]
    pub resource_container: Option<String>,

    /// Wait for started pipelines and notify uploaders
    #[arg(short, long)]
    pub wait: bool,

    /// Seconds to wait for each started pipeline
    #[arg(long, default_value_t = 6 * 60 * 60)]
    pub deadline_secs: u64,
}

#[derive(Args)]
pub struct QcArgs {
    /// Module config file
    pub modules: PathBuf,

    /// Module to evaluate
    pub module: String,

    /// Participant container ids
    #[arg(required = true)]
    pub participants: Vec<String>,

    /// Re-evaluate from this modified visit file (single participant only)
    #[arg(long)]
    pub modified: Option<String>,

    /// Re-audit every visit
    #[arg(long)]
    pub check_all: bool,

    /// Pipeline stage recorded in progress metadata
    #[arg(long, default_value = "form-qc")]
    pub stage: String,

    /// QC gear to run per visit
    #[arg(long, default_value = "form-qc-checker")]
    pub gear: String,

    /// Gear input the visit file is bound to
    #[arg(long, default_value = "form_data_file")]
    pub input_label: String,

    /// Total attempts per visit on system errors
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Seconds to wait for each QC job
    #[arg(long, default_value_t = 60 * 60)]
    pub deadline_secs: u64,

    /// Recipient of the failure report (repeatable)
    #[arg(long = "notify")]
    pub notify: Vec<String>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}
