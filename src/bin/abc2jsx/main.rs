//! abc2jsx CLI - convert Alembic cameras, transforms and locators into
//! After Effects scripts.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use abc2jsx::archive::{ArchiveAccessor, OgawaArchive};
use abc2jsx::config::ConverterConfig;
use abc2jsx::convert::{ConvertOptions, Converter, Outcome, SceneGraph};
use abc2jsx::logging::init_logging;

#[derive(Parser, Debug)]
#[command(
    name = "abc2jsx",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("ABC2JSX_BUILD_DATE"), ")")
)]
struct Cli {
    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an .abc archive into a .jsx script.
    Convert(ConvertArgs),
    /// Print the frame range and the convertible hierarchy.
    Info(InfoArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Input .abc archive.
    input: PathBuf,

    /// Output script path. Defaults to the input path with the backend's extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Composition name. Defaults to the input file stem.
    #[arg(long)]
    comp_name: Option<String>,

    /// Frame rate override.
    #[arg(long)]
    fps: Option<f64>,

    /// Duration override in frames.
    #[arg(long)]
    duration: Option<u32>,

    /// Configuration file instead of the standard location.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the conversion report as JSON to this path.
    #[arg(long)]
    report_json: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Input .abc archive.
    input: PathBuf,

    /// Configuration file instead of the standard location.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = match &cli.cmd {
        Command::Convert(args) => args.config.as_deref(),
        Command::Info(args) => args.config.as_deref(),
    };
    let mut config = match config_path {
        Some(path) => ConverterConfig::load_from(path),
        None => ConverterConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    } else if cli.quiet {
        config.logging.level = "warn".to_string();
    }
    init_logging(&config.logging);

    let result = match cli.cmd {
        Command::Convert(args) => cmd_convert(config, args),
        Command::Info(args) => cmd_info(config, args).map(|()| ExitCode::SUCCESS),
    };
    result.unwrap_or_else(|e| {
        eprintln!("error: {:#}", e);
        ExitCode::FAILURE
    })
}

fn cmd_convert(config: ConverterConfig, args: ConvertArgs) -> anyhow::Result<ExitCode> {
    let converter = Converter::new(config);
    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension(converter.backend().extension()));

    let options = ConvertOptions {
        composition_name: args.comp_name,
        frame_rate: args.fps,
        duration: args.duration,
        progress: Some(Arc::new(|fraction: f64, status: &str| {
            tracing::debug!("{:5.1}% {}", fraction * 100.0, status);
        })),
        ..ConvertOptions::default()
    };

    let outcome = converter.convert(&args.input, &output, &options);
    match &outcome {
        Outcome::Success(report) => {
            for skipped in &report.skipped {
                eprintln!("skipped {}: {}", skipped.name, skipped.reason);
            }
            if let Some(path) = &args.report_json {
                let json = serde_json::to_string_pretty(report)?;
                std::fs::write(path, json).with_context(|| format!("write report '{}'", path.display()))?;
            }
            eprintln!("{}", outcome);
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Cancelled => {
            eprintln!("{}", outcome);
            Ok(ExitCode::from(2))
        }
        _ => {
            eprintln!("error: {}", outcome);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn cmd_info(config: ConverterConfig, args: InfoArgs) -> anyhow::Result<()> {
    let archive = OgawaArchive::open(&args.input).with_context(|| format!("open '{}'", args.input.display()))?;
    let converter = Converter::new(config);
    let summary = converter.scan(&archive, &ConvertOptions::default())?;

    println!("{}", display_name(&args.input, &archive));
    println!("  version: {}", archive.version());
    println!(
        "  frames:  {}..{} at {} fps ({} frames)",
        summary.grid.start_frame,
        summary.grid.end_frame,
        summary.grid.frame_rate,
        summary.grid.frame_count()
    );
    print_graph(&summary.graph);
    Ok(())
}

fn display_name(path: &Path, archive: &OgawaArchive) -> String {
    if archive.name().is_empty() {
        path.display().to_string()
    } else {
        archive.name().to_string()
    }
}

fn print_graph(graph: &SceneGraph) {
    for node in &graph.nodes {
        let depth = std::iter::successors(node.parent, |&p| graph.nodes[p].parent).count();
        let target = if node.emitted {
            format!("-> {}", node.target_name)
        } else {
            "(folded into camera)".to_string()
        };
        println!("  {}{} [{}] {}", "  ".repeat(depth), node.full_name, node.kind.as_str(), target);
    }
    for skipped in &graph.skipped {
        println!("  skipped {}: {}", skipped.name, skipped.reason);
    }
}
