//! molprint - featurize a molecule descriptor file into a fingerprint dataset.

use anyhow::{Context, Result};
use clap::Parser;
use molprint::fingerprint::TokenFingerprinter;
use molprint::logging::{self, LogConfig, LogFormat};
use molprint::{FeaturizeConfig, Featurizer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

/// Convert a delimited file of SMILES strings into a chunked fingerprint dataset.
#[derive(Parser, Debug)]
#[command(name = "molprint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input file (.csv, .smi, .txt, optionally .gz/.zst/.bz2/.xz compressed).
    input: PathBuf,

    /// Worker policy: N > 0 uses up to N workers, -1 all CPUs, -k all but k-1.
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    jobs: i64,

    /// Field delimiter (a single ASCII character).
    #[arg(short, long, default_value_t = ',')]
    delimiter: char,

    /// The input has no header line.
    #[arg(long)]
    no_header: bool,

    /// Zero-based column holding the descriptors; autodetected when omitted.
    #[arg(short, long)]
    column: Option<usize>,

    /// Directory to write the dataset to.
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Fingerprint width.
    #[arg(short, long, default_value_t = 2048)]
    length: usize,

    /// Seconds a single row may take before it is recorded invalid (0 disables).
    #[arg(long, default_value_t = 60)]
    row_timeout_secs: u64,

    /// Show a progress bar on stderr.
    #[arg(long)]
    progress: bool,

    /// Write run metrics as JSON to this file.
    #[arg(long)]
    metrics: Option<PathBuf>,

    /// Log format: pretty, compact or json.
    #[arg(long, env = "MOLPRINT_LOG_FORMAT", default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Enable verbose output (-v for info, -vv for debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let config = LogConfig::default().with_format(self.log_format);
        match self.verbose {
            0 => config.with_env_overrides(),
            1 => config.with_level(Level::INFO).with_filter("molprint=info"),
            _ => config
                .with_level(Level::DEBUG)
                .with_filter("molprint=debug")
                .with_target(true)
                .with_thread_names(true),
        }
    }

    fn featurize_config(&self) -> FeaturizeConfig {
        let timeout =
            (self.row_timeout_secs > 0).then(|| Duration::from_secs(self.row_timeout_secs));
        FeaturizeConfig::default()
            .with_delimiter(self.delimiter)
            .with_header(!self.no_header)
            .with_descriptor_column(self.column)
            .with_jobs(self.jobs)
            .with_output_dir(&self.output_dir)
            .with_row_timeout(timeout)
            .with_progress(self.progress)
    }
}

fn run(cli: &Cli) -> Result<()> {
    anyhow::ensure!(cli.length > 0, "--length must be positive");
    let encoder = Arc::new(TokenFingerprinter::new(cli.length));
    let output = Featurizer::new(encoder, cli.featurize_config())
        .run(&cli.input)
        .with_context(|| format!("featurizing {}", cli.input.display()))?;

    output.metrics.log_summary();
    if let Some(path) = &cli.metrics {
        output.metrics.save_to_file(path)?;
    }
    if !output.invalid_rows.is_empty() {
        eprintln!(
            "{} of {} rows could not be featurized",
            output.invalid_rows.len(),
            output.total_rows
        );
    }
    println!("{}", output.dataset_path.display());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_config());

    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        for cause in e.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_verbosity_shows_targets_and_threads() {
        let cli = Cli::parse_from(["molprint", "in.csv", "-vv"]);
        let config = cli.log_config();
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.show_target && config.show_thread_names);

        let cli = Cli::parse_from(["molprint", "in.csv", "-v"]);
        let config = cli.log_config();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.show_target && !config.show_thread_names);
    }
}
