//! textlayer-pdf - invisible text layers for scanned PDF pages
//!
//! CLI entry point

use clap::Parser;
use std::time::Instant;
use textlayer_pdf::util::{ensure_parent_dir, format_duration, format_file_size};
use textlayer_pdf::{
    create_page_progress_bar, discover_jobs, logging, BatchArgs, Cli, CliOverrides, Commands,
    ComposeArgs, Config, ConfigError, DeskewOptions, ExitCode, LayerArgs, PageJob, PageProcessor,
    PipelineConfig, PipelineError, SkewArgs, SkewEstimator,
};

/// Error reported to the user with the exit code it maps to
struct Failure {
    code: ExitCode,
    message: String,
}

impl From<PipelineError> for Failure {
    fn from(err: PipelineError) -> Self {
        Self {
            code: ExitCode::from(&err),
            message: err.to_string(),
        }
    }
}

impl From<ConfigError> for Failure {
    fn from(err: ConfigError) -> Self {
        Self {
            code: ExitCode::from(&err),
            message: err.to_string(),
        }
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compose(args) => run_compose(&args),
        Commands::Batch(args) => run_batch(&args),
        Commands::Skew(args) => run_skew(&args),
        Commands::Info => run_info(),
    };

    match result {
        Ok(code) => code.into(),
        Err(failure) => {
            eprintln!("Error: {}", failure.message);
            eprintln!("  ({}, exit code {})", failure.code.description(), failure.code.code());
            failure.code.into()
        }
    }
}

/// Config file merged with command-line overrides
fn pipeline_config(layer: &LayerArgs, overrides: &CliOverrides) -> Result<PipelineConfig, Failure> {
    let config = Config::load_or_search(layer.config.as_deref())?;
    let verbosity = layer.verbose.max(config.general.verbose.unwrap_or(0));
    logging::init(verbosity);
    Ok(config.merge_with_cli(overrides))
}

// ============ Compose Command ============

fn run_compose(args: &ComposeArgs) -> Result<ExitCode, Failure> {
    let config = pipeline_config(&args.layer, &args.layer.overrides())?;
    let text_path = args.text_path();
    for path in std::iter::once(&args.output).chain(text_path.as_ref()) {
        ensure_parent_dir(path).map_err(PipelineError::from)?;
    }

    let job = PageJob::new(&args.image, &args.pdf, &args.recognition, &args.output)
        .with_page_index(args.page)
        .with_output_text(text_path);
    let processor = PageProcessor::new(config)?;
    let report = processor.process(&job)?;

    let size = std::fs::metadata(&args.output).map(|m| m.len()).unwrap_or(0);
    println!(
        "{} ({}): {} words placed, {} dropped, {} rejected, skew {:.2}°",
        args.output.display(),
        format_file_size(size),
        report.placed,
        report.dropped,
        report.rejected,
        report.skew.angle
    );
    if report.no_recognition_result {
        println!("  no recognition result; page copied unchanged");
    }
    Ok(ExitCode::Success)
}

// ============ Batch Command ============

fn run_batch(args: &BatchArgs) -> Result<ExitCode, Failure> {
    let config = pipeline_config(&args.layer, &args.overrides())?;
    let jobs = discover_jobs(&args.input, &args.output)?;

    if jobs.is_empty() {
        println!("No page triples found in {}", args.input.display());
        return Ok(ExitCode::Success);
    }

    if args.dry_run {
        println!("Would process {} pages with {} threads:", jobs.len(), args.thread_count());
        for job in &jobs {
            println!("  {} -> {}", job.image.display(), job.output_pdf.display());
        }
        return Ok(ExitCode::Success);
    }

    std::fs::create_dir_all(&args.output).map_err(PipelineError::from)?;
    let processor = PageProcessor::new(config)?;
    let started = Instant::now();

    let progress_bar = (!args.quiet).then(|| create_page_progress_bar(jobs.len() as u64));
    let on_progress = |done: usize, _total: usize| {
        if let Some(pb) = &progress_bar {
            pb.set_position(done as u64);
        }
    };
    let results = processor.process_batch(&jobs, Some(&on_progress))?;
    if let Some(pb) = &progress_bar {
        pb.finish_and_clear();
    }

    let mut failed = 0;
    let mut placed = 0;
    for (job, result) in jobs.iter().zip(&results) {
        match result {
            Ok(report) => placed += report.placed,
            Err(e) => {
                failed += 1;
                eprintln!("  {}: {}", job.image.display(), e);
            }
        }
    }

    println!(
        "Processed {} pages ({} failed), {} words placed in {}",
        jobs.len(),
        failed,
        placed,
        format_duration(started.elapsed())
    );

    Ok(if failed == 0 {
        ExitCode::Success
    } else if failed == jobs.len() {
        ExitCode::ProcessingError
    } else {
        ExitCode::PartialFailure
    })
}

// ============ Skew Command ============

fn run_skew(args: &SkewArgs) -> Result<ExitCode, Failure> {
    logging::init(0);
    let mut builder = DeskewOptions::builder().algorithm(args.algorithm.into());
    if let Some(max_angle) = args.max_angle {
        builder = builder.max_angle(max_angle);
    }
    let detection =
        SkewEstimator::estimate_path(&args.image, &builder.build()).map_err(PipelineError::from)?;

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "angle": detection.angle,
                "confidence": detection.confidence,
                "feature_count": detection.feature_count,
            })
        );
    } else {
        println!(
            "{:.3}° (confidence {:.2}, {} pixels)",
            detection.angle, detection.confidence, detection.feature_count
        );
    }
    Ok(ExitCode::Success)
}

// ============ Info Command ============

fn run_info() -> Result<ExitCode, Failure> {
    println!("textlayer-pdf v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    println!();
    println!("Config Search Paths:");
    for path in Config::search_paths() {
        let marker = if path.exists() { "found" } else { "-" };
        println!("  {} ({})", path.display(), marker);
    }

    Ok(ExitCode::Success)
}
