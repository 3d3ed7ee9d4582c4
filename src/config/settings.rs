//! Configuration settings for FoldBatch
//!
//! Defines all CLI arguments, defaults, and the runtime configuration
//! derived from them.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the AlphaFold3 entry point
pub const DEFAULT_EXECUTABLE: &str = "/data/AlphaFold/alphafold3/run_alphafold.py";

/// Default template cutoff forwarded to every invocation
pub const DEFAULT_TEMPLATE_DATE: &str = "3000-12-01";

/// Default per-job wall-clock ceiling in seconds
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;

/// Interpreter used for `.py` executables when none is configured
pub const DEFAULT_PYTHON: &str = "python3";

/// Environment variable the prediction tool reads to pick an accelerator
pub const DEFAULT_DEVICE_ENV_VAR: &str = "CUDA_VISIBLE_DEVICES";

/// FoldBatch - run structure prediction jobs in parallel across GPUs or CPU cores
#[derive(Parser, Debug, Clone)]
#[command(name = "foldbatch")]
#[command(author = "FoldBatch Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Batch dispatcher for AlphaFold3-style prediction jobs")]
#[command(long_about = r#"
FoldBatch runs one external prediction process per job descriptor found in
an input directory, spreading jobs round-robin over the detected GPUs (or
running on CPU when none are present), with a concurrency ceiling and a
per-job timeout. A summary report is written to the output directory.

Examples:
  foldbatch --input-dir ./inputs --output-dir ./results
  foldbatch --input-dir ./inputs --output-dir ./results --max-concurrent 8 --template-date 2023-12-01
  foldbatch --input-dir ./inputs --output-dir ./results --interpreter python3 -v
  foldbatch resources
"#)]
pub struct CliArgs {
    /// Directory containing job descriptor files
    #[arg(long, value_name = "PATH", env = "FOLDBATCH_INPUT_DIR")]
    pub input_dir: Option<PathBuf>,

    /// Root directory for per-job outputs and the summary report
    #[arg(long, value_name = "PATH", env = "FOLDBATCH_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Prediction executable (or script, with --interpreter)
    #[arg(long, value_name = "PATH", default_value = DEFAULT_EXECUTABLE, env = "FOLDBATCH_EXECUTABLE")]
    pub executable: PathBuf,

    /// Program used to run the executable [default: python3 for *.py]
    #[arg(long, value_name = "PROGRAM", env = "FOLDBATCH_INTERPRETER")]
    pub interpreter: Option<String>,

    /// Maximum number of jobs running at once
    #[arg(long, default_value = "4", value_name = "NUM", env = "FOLDBATCH_MAX_CONCURRENT")]
    pub max_concurrent: usize,

    /// Per-job timeout in seconds
    #[arg(long, default_value_t = DEFAULT_JOB_TIMEOUT_SECS, value_name = "SECS", env = "FOLDBATCH_JOB_TIMEOUT")]
    pub job_timeout_seconds: u64,

    /// Grace period between SIGTERM and SIGKILL for a timed-out job
    #[arg(long, default_value = "10", value_name = "SECS")]
    pub kill_grace_seconds: u64,

    /// Maximum template date forwarded to each invocation
    #[arg(long, default_value = DEFAULT_TEMPLATE_DATE, value_name = "DATE")]
    pub template_date: String,

    /// Glob selecting descriptor files in the input directory
    #[arg(long, default_value = "*.json", value_name = "PATTERN")]
    pub pattern: String,

    /// Override accelerator detection with a fixed device count (0 = CPU only)
    #[arg(long, value_name = "NUM", env = "FOLDBATCH_DEVICES")]
    pub devices: Option<usize>,

    /// Program queried for the accelerator list
    #[arg(long, default_value = "nvidia-smi", value_name = "PROGRAM")]
    pub device_query: String,

    /// Environment variable carrying the device hint to each job
    #[arg(long, default_value = DEFAULT_DEVICE_ENV_VAR, value_name = "NAME")]
    pub device_env_var: String,

    /// Summary report format
    #[arg(long, value_enum, default_value = "text")]
    pub report_format: ReportFormat,

    /// Accept every descriptor without validation
    #[arg(long)]
    pub no_validate: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show detected CPU, memory and accelerator resources
    #[command(name = "resources")]
    Resources {
        /// Program queried for the accelerator list
        #[arg(long, default_value = "nvidia-smi", value_name = "PROGRAM")]
        device_query: String,
    },
}

/// Output format for the summary report
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable text (run_summary.txt)
    #[default]
    Text,
    /// JSON document (run_summary.json)
    Json,
}

impl ReportFormat {
    /// File name of the report at the output root
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Text => "run_summary.txt",
            Self::Json => "run_summary.json",
        }
    }
}

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Directory of job descriptors
    pub input_dir: PathBuf,
    /// Output root
    pub output_dir: PathBuf,
    /// Prediction executable
    pub executable: PathBuf,
    /// Optional interpreter for the executable
    pub interpreter: Option<String>,
    /// Configured concurrency ceiling
    pub max_concurrent: usize,
    /// Per-job wall-clock ceiling
    pub job_timeout: Duration,
    /// Time between terminate and kill on timeout
    pub kill_grace: Duration,
    /// Template date passthrough
    pub template_date: String,
    /// Descriptor glob
    pub pattern: String,
    /// Fixed device count, bypassing detection
    pub device_override: Option<usize>,
    /// Accelerator query program
    pub device_query: String,
    /// Device hint variable
    pub device_env_var: String,
    /// Report format
    pub report_format: ReportFormat,
    /// Run descriptor validation
    pub validate: bool,
    /// Show progress bar
    pub progress: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            interpreter: resolve_interpreter(None, Path::new(DEFAULT_EXECUTABLE)),
            max_concurrent: 4,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            kill_grace: Duration::from_secs(10),
            template_date: DEFAULT_TEMPLATE_DATE.to_string(),
            pattern: "*.json".to_string(),
            device_override: None,
            device_query: "nvidia-smi".to_string(),
            device_env_var: DEFAULT_DEVICE_ENV_VAR.to_string(),
            report_format: ReportFormat::Text,
            validate: true,
            progress: false,
        }
    }
}

impl BatchConfig {
    /// Create config from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self, String> {
        let input_dir = args.input_dir.clone().ok_or("--input-dir is required")?;
        let output_dir = args.output_dir.clone().ok_or("--output-dir is required")?;

        if args.max_concurrent == 0 {
            return Err("--max-concurrent must be at least 1".to_string());
        }
        if args.job_timeout_seconds == 0 {
            return Err("--job-timeout-seconds must be at least 1".to_string());
        }
        if args.device_env_var.is_empty() || args.device_env_var.contains('=') {
            return Err(format!("Invalid device variable name: {:?}", args.device_env_var));
        }

        Ok(Self {
            input_dir,
            output_dir,
            executable: args.executable.clone(),
            interpreter: resolve_interpreter(args.interpreter.clone(), &args.executable),
            max_concurrent: args.max_concurrent,
            job_timeout: Duration::from_secs(args.job_timeout_seconds),
            kill_grace: Duration::from_secs(args.kill_grace_seconds),
            template_date: args.template_date.clone(),
            pattern: args.pattern.clone(),
            device_override: args.devices,
            device_query: args.device_query.clone(),
            device_env_var: args.device_env_var.clone(),
            report_format: args.report_format,
            validate: !args.no_validate,
            progress: !args.no_progress && !args.quiet,
        })
    }

    /// Path of the summary report
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(self.report_format.file_name())
    }
}

/// Explicit interpreter if given, else `python3` for Python scripts.
/// Any other executable is spawned directly.
pub fn resolve_interpreter(explicit: Option<String>, executable: &Path) -> Option<String> {
    match explicit {
        Some(interpreter) if !interpreter.trim().is_empty() => Some(interpreter),
        _ => executable
            .extension()
            .filter(|ext| *ext == "py")
            .map(|_| DEFAULT_PYTHON.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("foldbatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--input-dir", "in", "--output-dir", "out"]);
        let config = BatchConfig::from_cli(&args).unwrap();

        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.job_timeout, Duration::from_secs(3600));
        assert_eq!(config.template_date, "3000-12-01");
        assert_eq!(config.executable, PathBuf::from(DEFAULT_EXECUTABLE));
        assert_eq!(config.device_env_var, "CUDA_VISIBLE_DEVICES");
        assert!(config.validate);
        assert_eq!(config.interpreter.as_deref(), Some("python3"));
        assert_eq!(config.report_path(), PathBuf::from("out/run_summary.txt"));
    }

    #[test]
    fn test_default_command_runs_script_through_python() {
        let args = parse(&["--input-dir", "in", "--output-dir", "out"]);
        let config = BatchConfig::from_cli(&args).unwrap();
        let template = crate::core::InvocationTemplate::from_config(&config);
        let command = template.render(&crate::core::Job::new("in/protA.json"), Some(0));

        assert_eq!(command.program, PathBuf::from("python3"));
        assert_eq!(command.args[0], std::ffi::OsString::from(DEFAULT_EXECUTABLE));
        assert_eq!(BatchConfig::default().interpreter.as_deref(), Some("python3"));
    }

    #[test]
    fn test_interpreter_resolution() {
        assert_eq!(resolve_interpreter(None, Path::new("/opt/af3/run.py")).as_deref(), Some("python3"));
        assert_eq!(
            resolve_interpreter(Some("/venv/bin/python".into()), Path::new("run.py")).as_deref(),
            Some("/venv/bin/python")
        );
        assert_eq!(resolve_interpreter(Some("  ".into()), Path::new("run.py")).as_deref(), Some("python3"));
        assert!(resolve_interpreter(None, Path::new("/usr/local/bin/af3")).is_none());
    }

    #[test]
    fn test_missing_input_dir() {
        let args = parse(&["--output-dir", "out"]);
        assert!(BatchConfig::from_cli(&args).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let args = parse(&["--input-dir", "in", "--output-dir", "out", "--max-concurrent", "0"]);
        let err = BatchConfig::from_cli(&args).unwrap_err();
        assert!(err.contains("max-concurrent"));
    }

    #[test]
    fn test_overrides() {
        let args = parse(&[
            "--input-dir", "in",
            "--output-dir", "out",
            "--devices", "2",
            "--template-date", "2023-12-01",
            "--report-format", "json",
            "--interpreter", "python3",
            "-q",
        ]);
        let config = BatchConfig::from_cli(&args).unwrap();

        assert_eq!(config.device_override, Some(2));
        assert_eq!(config.template_date, "2023-12-01");
        assert_eq!(config.interpreter.as_deref(), Some("python3"));
        assert!(!config.progress);
        assert_eq!(config.report_path(), PathBuf::from("out/run_summary.json"));
    }

    #[test]
    fn test_resources_subcommand() {
        let args = parse(&["resources"]);
        assert!(matches!(args.command, Some(Commands::Resources { .. })));
    }
}
