//! Command-line interface for mailbundle.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use mailbundle::archive::sink::ZipSink;
use mailbundle::config::{self, Config};
use mailbundle::fetch::DirFetcher;
use mailbundle::{build_archive, suggested_archive_name, Entity, SelectedItem};

#[derive(Parser)]
#[command(
    name = "mailbundle",
    version,
    about = "Bundle selected emails into a downloadable ZIP archive"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an archive from a JSON selection file
    Bundle {
        /// JSON file with the selected items
        #[arg(long, value_name = "FILE")]
        items: PathBuf,

        /// JSON file with entity definitions
        #[arg(long, value_name = "FILE")]
        entities: Option<PathBuf>,

        /// Directory holding fetched attachments as <message-id>/<attachment-id>
        #[arg(long, value_name = "DIR")]
        attachments_dir: PathBuf,

        /// Output ZIP path (defaults to ./<prefix>_<today>.zip)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Write the man page to stdout
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();

    let level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let _guard = setup_logging(&level, &config);

    match cli.command {
        Commands::Bundle {
            items,
            entities,
            attachments_dir,
            output,
        } => cmd_bundle(&config, items, entities, attachments_dir, output),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "mailbundle", &mut std::io::stdout());
            Ok(())
        }
        Commands::Manpage => {
            let man = clap_mangen::Man::new(Cli::command());
            let mut out = Vec::new();
            man.render(&mut out)?;
            std::io::stdout().write_all(&out)?;
            Ok(())
        }
    }
}

/// Log to stderr and, when the log dir is writable, to a daily rolling file.
fn setup_logging(
    level: &str,
    config: &Config,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let log_dir = config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_err() {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&log_dir, "mailbundle.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false);
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Some(guard)
}

fn cmd_bundle(
    config: &Config,
    items_path: PathBuf,
    entities_path: Option<PathBuf>,
    attachments_dir: PathBuf,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&items_path)
        .with_context(|| format!("reading {}", items_path.display()))?;
    let items: Vec<SelectedItem> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", items_path.display()))?;

    let entities: Vec<Entity> = match entities_path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => Vec::new(),
    };

    let output = output.unwrap_or_else(|| {
        PathBuf::from(suggested_archive_name(
            &config.archive.name_prefix,
            chrono::Local::now().date_naive(),
        ))
    });

    let file = std::fs::File::create(&output)
        .with_context(|| format!("creating {}", output.display()))?;
    let mut sink = ZipSink::new(
        std::io::BufWriter::new(file),
        config.archive.compression_level,
    );
    let fetcher = DirFetcher::new(&attachments_dir);

    let bar = ProgressBar::new(items.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    bar.set_message("bundling");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let progress = |done: usize, _total: usize| bar.set_position(done as u64);
    let summary = runtime.block_on(build_archive(
        &items,
        &entities,
        &fetcher,
        &mut sink,
        &config.naming,
        Some(&progress),
    ))?;
    bar.finish_and_clear();

    let size = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
    println!("Archive written to {}", output.display());
    println!(
        "  {} units, {} files, {}",
        summary.units,
        summary.files_written,
        format_size(size, BINARY)
    );
    if summary.attachments_skipped > 0 {
        println!(
            "  {} attachment(s) skipped (see log)",
            summary.attachments_skipped
        );
    }
    if summary.previews_skipped > 0 {
        println!(
            "  {} preview page(s) omitted (see log)",
            summary.previews_skipped
        );
    }
    Ok(())
}
