use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use utf8_sweep::{ConfigBuilder, ConfigFile, ConverterCommand, TargetEncoding};

#[derive(Parser, Debug)]
#[command(
    name = "utf8-sweep",
    version,
    about = "Convert every matching file under a directory to UTF-8",
    long_about = "Walk a directory tree and convert every file whose name ends with one of \
    the given extensions to UTF-8 (without byte order mark by default).\n\n\
    The conversion itself is done by an external program that reads the document \
    on stdin and writes the converted text to stdout. In its arguments, {encoding} \
    is replaced by the target charset and {path} by the document path.\n\n\
    USAGE EXAMPLES:\n  \
      # List what would be converted\n  \
      utf8-sweep ./site --dry-run\n\n  \
      # Convert Windows-1252 pages with iconv\n  \
      utf8-sweep ./site --converter \"iconv -f WINDOWS-1252 -t {encoding}\"\n\n  \
      # Only PHP files, skipping vendored code, with a JSON report\n  \
      utf8-sweep ./app -e .php -x '**/vendor' -c \"iconv -f LATIN1 -t {encoding}\" --report out/report.json"
)]
struct Cli {
    /// Root directory to scan
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,

    /// File name suffix to convert, tested in the given order (repeatable)
    #[arg(short, long = "ext", value_name = "SUFFIX")]
    extensions: Vec<String>,

    /// Glob of directories to skip, e.g. '**/.git' (repeatable)
    #[arg(short = 'x', long = "exclude-dir", value_name = "GLOB")]
    exclude_dirs: Vec<String>,

    /// Converter command line: program followed by its arguments
    #[arg(short, long, value_name = "COMMAND", env = "UTF8_SWEEP_CONVERTER")]
    converter: Option<String>,

    /// Write UTF-8 with a byte order mark instead of without
    #[arg(long)]
    bom: bool,

    /// Report matches without touching any file
    #[arg(long)]
    dry_run: bool,

    /// Convert even if the configuration file asks for a dry run
    #[arg(long, conflicts_with = "dry_run")]
    no_dry_run: bool,

    /// Keep file-system order instead of sorting entries by name
    #[arg(long)]
    no_sort: bool,

    /// Follow symbolic links
    #[arg(long)]
    follow_links: bool,

    /// Keep a timestamped copy of every file before replacing it
    #[arg(long)]
    backup: bool,

    /// Write a JSON report of the run to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Do not print the summary after the run
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(cli.verbose) {
        eprintln!("Error: {e:#}");
        return ExitCode::from(2);
    }

    let result = execute(&cli);
    if let Err(e) = &result {
        eprintln!("Error: {e:#}");
    }

    ExitCode::from(exit_status(&result))
}

/// 0 when every file converted, 1 when some failed, 2 on fatal errors.
fn exit_status(result: &anyhow::Result<bool>) -> u8 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(_) => 2,
    }
}

/// Runs the conversion; `Ok(false)` when some files failed.
fn execute(cli: &Cli) -> anyhow::Result<bool> {
    let config = builder_from(cli)?
        .build()
        .context("Failed to build configuration")?;

    let stdout = std::io::stdout();
    let mut console = stdout.lock();
    let report = utf8_sweep::run(config, &mut console).context("Conversion run failed")?;
    console.flush().context("Failed to flush output")?;
    drop(console);

    if !cli.quiet {
        report.print_summary();
    }

    Ok(!report.has_failures())
}

/// Loads the configuration file, if any, and lays the flags over it.
fn builder_from(cli: &Cli) -> anyhow::Result<ConfigBuilder> {
    let mut builder = match &cli.config {
        Some(path) => ConfigBuilder::from_file(
            ConfigFile::load(path).context("Failed to load configuration file")?,
        ),
        None => ConfigBuilder::default(),
    };

    if let Some(root) = &cli.root {
        builder = builder.root_dir(root);
    }
    if !cli.extensions.is_empty() {
        builder = builder.extensions(cli.extensions.iter().cloned());
    }
    if !cli.exclude_dirs.is_empty() {
        builder = builder.exclude_directories(cli.exclude_dirs.clone());
    }
    if let Some(command_line) = &cli.converter {
        let converter = ConverterCommand::parse(command_line)
            .context("--converter must name a program")?;
        builder = builder.converter(converter);
    }
    if cli.bom {
        builder = builder.target_encoding(TargetEncoding::Utf8Bom);
    }
    if cli.dry_run {
        builder = builder.dry_run(true);
    }
    if cli.no_dry_run {
        builder = builder.dry_run(false);
    }
    if cli.no_sort {
        builder = builder.sort_entries(false);
    }
    if cli.follow_links {
        builder = builder.follow_links(true);
    }
    if cli.backup {
        builder = builder.backup_existing(true);
    }
    if let Some(report) = &cli.report {
        builder = builder.report_path(report);
    }

    Ok(builder)
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbosity {
        0 => EnvFilter::new("utf8_sweep=warn"),
        1 => EnvFilter::new("utf8_sweep=info"),
        2 => EnvFilter::new("utf8_sweep=debug"),
        _ => EnvFilter::new("utf8_sweep=trace"),
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}
