//! CLI interface module
//!
//! Provides command-line interface using clap derive macros.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use crate::config::{CliOverrides, ConfigError};
use crate::deskew::{DeskewAlgorithm, DeskewError};
use crate::pdf_reader::PdfReaderError;
use crate::pipeline::PipelineError;
use crate::recognition::{RecognitionError, RecognitionFormat};

/// Exit codes for the CLI
///
/// These codes follow standard Unix conventions and provide
/// specific error categories for scripting and automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidArgs = 2,
    /// Input image, PDF or directory missing
    InputNotFound = 3,
    /// Output could not be written
    OutputError = 4,
    /// Page could not be processed
    ProcessingError = 5,
    /// Configuration file missing or malformed
    ConfigError = 6,
    /// Some pages of a batch failed
    PartialFailure = 7,
}

impl ExitCode {
    /// Convert to process exit code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Get human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::InvalidArgs => "Invalid arguments",
            ExitCode::InputNotFound => "Input file or directory not found",
            ExitCode::OutputError => "Output error (permission denied, disk full, etc.)",
            ExitCode::ProcessingError => "Processing error",
            ExitCode::ConfigError => "Configuration file error",
            ExitCode::PartialFailure => "Some pages failed",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.code()
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code() as u8)
    }
}

impl From<&PipelineError> for ExitCode {
    fn from(err: &PipelineError) -> Self {
        match err {
            PipelineError::InputNotFound(_)
            | PipelineError::Deskew(DeskewError::ImageNotFound(_))
            | PipelineError::PdfRead(PdfReaderError::FileNotFound(_))
            | PipelineError::Recognition(RecognitionError::NotFound(_)) => ExitCode::InputNotFound,
            PipelineError::Io(_) => ExitCode::OutputError,
            PipelineError::Glyph(_) => ExitCode::InvalidArgs,
            _ => ExitCode::ProcessingError,
        }
    }
}

impl From<&ConfigError> for ExitCode {
    fn from(_: &ConfigError) -> Self {
        ExitCode::ConfigError
    }
}

/// Add an invisible, searchable text layer to scanned PDF pages
#[derive(Parser, Debug)]
#[command(name = "textlayer-pdf")]
#[command(version)]
#[command(about = "Add an invisible text layer to scanned PDF pages", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a text layer to one page
    Compose(ComposeArgs),
    /// Add text layers to every page triple in a directory
    Batch(BatchArgs),
    /// Print the skew angle of an image
    Skew(SkewArgs),
    /// Show system information
    Info,
}

/// Skew algorithm names accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmArg {
    MinAreaRect,
    ProjectionProfile,
    Combined,
}

impl From<AlgorithmArg> for DeskewAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::MinAreaRect => DeskewAlgorithm::MinAreaRect,
            AlgorithmArg::ProjectionProfile => DeskewAlgorithm::ProjectionProfile,
            AlgorithmArg::Combined => DeskewAlgorithm::Combined,
        }
    }
}

/// Recognition document layouts accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Auto,
    AzureRead,
    WordList,
}

impl From<FormatArg> for RecognitionFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Auto => RecognitionFormat::Auto,
            FormatArg::AzureRead => RecognitionFormat::AzureRead,
            FormatArg::WordList => RecognitionFormat::WordList,
        }
    }
}

/// Options shared by `compose` and `batch`
#[derive(clap::Args, Debug, Clone)]
pub struct LayerArgs {
    /// Configuration file (default: ./textlayer.toml, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Do not estimate page skew
    #[arg(long = "no-skew")]
    pub no_skew: bool,

    /// Skew detection algorithm
    #[arg(long, value_enum)]
    pub skew_algorithm: Option<AlgorithmArg>,

    /// TrueType font used for glyph widths
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Recognition document layout
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Recognition attempts per page
    #[arg(long)]
    pub retry_attempts: Option<u32>,

    /// Render the text visibly (for checking alignment)
    #[arg(long)]
    pub visible_text: bool,

    /// Draw word outlines instead of text
    #[arg(long, alias = "debug-suppress-images")]
    pub debug_show_boxes: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl LayerArgs {
    /// Overrides for the flags given on the command line
    pub fn overrides(&self) -> CliOverrides {
        let mut overrides = CliOverrides::new();
        if self.no_skew {
            overrides = overrides.with_skew(false);
        }
        if let Some(algorithm) = self.skew_algorithm {
            overrides = overrides.with_skew_algorithm(algorithm.into());
        }
        if let Some(font) = &self.font {
            overrides = overrides.with_font(font.clone());
        }
        if let Some(format) = self.format {
            overrides = overrides.with_recognition_format(format.into());
        }
        if let Some(attempts) = self.retry_attempts {
            overrides = overrides.with_retry_attempts(attempts);
        }
        if self.visible_text {
            overrides.render_invisible = Some(false);
        }
        if self.debug_show_boxes {
            overrides = overrides.with_show_boxes(true);
        }
        overrides
    }
}

/// Arguments for the compose command
#[derive(clap::Args, Debug)]
pub struct ComposeArgs {
    /// Page image the recognizer saw
    pub image: PathBuf,

    /// PDF holding the original page
    pub pdf: PathBuf,

    /// Recognition result (JSON)
    pub recognition: PathBuf,

    /// Output PDF
    #[arg(short, long)]
    pub output: PathBuf,

    /// 0-indexed page within the input PDF
    #[arg(long, default_value_t = 0)]
    pub page: usize,

    /// Plain-text sidecar path (default: output with .txt extension)
    #[arg(long)]
    pub text: Option<PathBuf>,

    /// Do not write a plain-text sidecar
    #[arg(long, conflicts_with = "text")]
    pub no_text: bool,

    #[command(flatten)]
    pub layer: LayerArgs,
}

impl ComposeArgs {
    /// Sidecar path, if one should be written
    pub fn text_path(&self) -> Option<PathBuf> {
        if self.no_text {
            None
        } else {
            Some(
                self.text
                    .clone()
                    .unwrap_or_else(|| self.output.with_extension("txt")),
            )
        }
    }
}

/// Arguments for the batch command
#[derive(clap::Args, Debug)]
pub struct BatchArgs {
    /// Directory of `<stem>.png|jpg|tif` + `<stem>.pdf` + `<stem>.json` triples
    pub input: PathBuf,

    /// Output directory
    #[arg(default_value = "./output")]
    pub output: PathBuf,

    /// Number of parallel threads
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// List the jobs without processing
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub layer: LayerArgs,
}

impl BatchArgs {
    /// Get thread count (default to available CPUs)
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }

    pub fn overrides(&self) -> CliOverrides {
        let overrides = self.layer.overrides();
        match self.threads {
            Some(threads) => overrides.with_threads(threads),
            None => overrides,
        }
    }
}

/// Arguments for the skew command
#[derive(clap::Args, Debug)]
pub struct SkewArgs {
    /// Image to analyze
    pub image: PathBuf,

    #[arg(long, value_enum, default_value_t = AlgorithmArg::MinAreaRect)]
    pub algorithm: AlgorithmArg,

    /// Projection sweep range in degrees
    #[arg(long)]
    pub max_angle: Option<f64>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Create a styled progress bar for page processing
pub fn create_page_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] Page {pos}/{len} ({eta})")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::Path;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_help_display() {
        let mut cmd = Cli::command();
        let help = cmd.render_help().to_string();
        assert!(help.contains("textlayer-pdf"));
        assert!(help.contains("compose"));
        assert!(help.contains("batch"));
        assert!(help.contains("skew"));
    }

    #[test]
    fn test_version_display() {
        let cmd = Cli::command();
        let version = cmd.get_version().unwrap_or("unknown");
        assert!(!version.is_empty());
    }

    #[test]
    fn test_compose_missing_output() {
        let result = Cli::try_parse_from(["textlayer-pdf", "compose", "a.png", "a.pdf", "a.json"]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("required"));
    }

    #[test]
    fn test_compose_defaults() {
        let cli = Cli::try_parse_from([
            "textlayer-pdf",
            "compose",
            "a.png",
            "a.pdf",
            "a.json",
            "-o",
            "out/a.pdf",
        ])
        .unwrap();

        if let Commands::Compose(args) = cli.command {
            assert_eq!(args.page, 0);
            assert_eq!(args.text_path(), Some(PathBuf::from("out/a.txt")));
            assert!(!args.layer.no_skew);
            assert_eq!(args.layer.verbose, 0);
            let overrides = args.layer.overrides();
            assert_eq!(overrides.skew, None);
            assert_eq!(overrides.show_boxes, None);
            assert_eq!(overrides.render_invisible, None);
        } else {
            panic!("Expected Compose command");
        }
    }

    #[test]
    fn test_compose_options() {
        let cli = Cli::try_parse_from([
            "textlayer-pdf",
            "compose",
            "a.png",
            "a.pdf",
            "a.json",
            "-o",
            "a.out.pdf",
            "--page",
            "2",
            "--no-text",
            "--no-skew",
            "--skew-algorithm",
            "projection-profile",
            "--format",
            "azure-read",
            "--retry-attempts",
            "2",
            "--visible-text",
            "--debug-show-boxes",
            "-vv",
        ])
        .unwrap();

        if let Commands::Compose(args) = cli.command {
            assert_eq!(args.page, 2);
            assert_eq!(args.text_path(), None);
            assert_eq!(args.layer.verbose, 2);
            let overrides = args.layer.overrides();
            assert_eq!(overrides.skew, Some(false));
            assert_eq!(
                overrides.skew_algorithm,
                Some(DeskewAlgorithm::ProjectionProfile)
            );
            assert_eq!(overrides.recognition_format, Some(RecognitionFormat::AzureRead));
            assert_eq!(overrides.retry_attempts, Some(2));
            assert_eq!(overrides.render_invisible, Some(false));
            assert_eq!(overrides.show_boxes, Some(true));
        } else {
            panic!("Expected Compose command");
        }
    }

    #[test]
    fn test_debug_flag_alias() {
        let cli = Cli::try_parse_from([
            "textlayer-pdf",
            "compose",
            "a.png",
            "a.pdf",
            "a.json",
            "-o",
            "b.pdf",
            "--debug-suppress-images",
        ])
        .unwrap();

        if let Commands::Compose(args) = cli.command {
            assert!(args.layer.debug_show_boxes);
        } else {
            panic!("Expected Compose command");
        }
    }

    #[test]
    fn test_text_conflicts_with_no_text() {
        let result = Cli::try_parse_from([
            "textlayer-pdf",
            "compose",
            "a.png",
            "a.pdf",
            "a.json",
            "-o",
            "b.pdf",
            "--text",
            "b.txt",
            "--no-text",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_batch_arguments() {
        let cli = Cli::try_parse_from([
            "textlayer-pdf",
            "batch",
            "/tmp/pages",
            "--threads",
            "3",
            "--dry-run",
            "--config",
            "custom.toml",
        ])
        .unwrap();

        if let Commands::Batch(args) = cli.command {
            assert_eq!(args.output, PathBuf::from("./output"));
            assert_eq!(args.thread_count(), 3);
            assert!(args.dry_run);
            assert_eq!(args.layer.config.as_deref(), Some(Path::new("custom.toml")));
            assert_eq!(args.overrides().threads, Some(3));
        } else {
            panic!("Expected Batch command");
        }
    }

    #[test]
    fn test_skew_arguments() {
        let cli = Cli::try_parse_from(["textlayer-pdf", "skew", "page.png", "--json"]).unwrap();
        if let Commands::Skew(args) = cli.command {
            assert_eq!(args.algorithm, AlgorithmArg::MinAreaRect);
            assert!(args.json);
            assert_eq!(args.max_angle, None);
        } else {
            panic!("Expected Skew command");
        }
    }

    #[test]
    fn test_info_command() {
        let cli = Cli::try_parse_from(["textlayer-pdf", "info"]).unwrap();
        assert!(matches!(cli.command, Commands::Info));
    }

    #[test]
    fn test_page_progress_bar() {
        let pb = create_page_progress_bar(10);
        assert_eq!(pb.length(), Some(10));
        pb.set_position(5);
        assert_eq!(pb.position(), 5);
        pb.finish_and_clear();
    }

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::GeneralError.code(), 1);
        assert_eq!(ExitCode::InvalidArgs.code(), 2);
        assert_eq!(ExitCode::InputNotFound.code(), 3);
        assert_eq!(ExitCode::OutputError.code(), 4);
        assert_eq!(ExitCode::ProcessingError.code(), 5);
        assert_eq!(ExitCode::ConfigError.code(), 6);
        assert_eq!(ExitCode::PartialFailure.code(), 7);
    }

    #[test]
    fn test_exit_code_descriptions() {
        assert_eq!(ExitCode::Success.description(), "Success");
        assert!(!ExitCode::ConfigError.description().is_empty());
        assert!(!ExitCode::PartialFailure.description().is_empty());
    }

    #[test]
    fn test_exit_code_from_errors() {
        let missing = PipelineError::Deskew(DeskewError::ImageNotFound(PathBuf::from("a.png")));
        assert_eq!(ExitCode::from(&missing), ExitCode::InputNotFound);

        let pdf_missing = PipelineError::PdfRead(PdfReaderError::FileNotFound(PathBuf::from("a")));
        assert_eq!(ExitCode::from(&pdf_missing), ExitCode::InputNotFound);

        let json_missing = PipelineError::Recognition(RecognitionError::NotFound(PathBuf::from("a")));
        assert_eq!(ExitCode::from(&json_missing), ExitCode::InputNotFound);

        let json_invalid =
            PipelineError::Recognition(RecognitionError::InvalidDocument("no pages".to_string()));
        assert_eq!(ExitCode::from(&json_invalid), ExitCode::ProcessingError);

        let decode = PipelineError::Deskew(DeskewError::ImageDecode("bad".to_string()));
        assert_eq!(ExitCode::from(&decode), ExitCode::ProcessingError);

        let io = PipelineError::Io(std::io::Error::other("disk full"));
        assert_eq!(ExitCode::from(&io), ExitCode::OutputError);

        let config = ConfigError::NotFound(PathBuf::from("x.toml"));
        assert_eq!(ExitCode::from(&config), ExitCode::ConfigError);
    }

    #[test]
    fn test_exit_code_into_i32() {
        let code: i32 = ExitCode::PartialFailure.into();
        assert_eq!(code, 7);
    }
}
