//! Command-line interface for invoice ingestion.
//!
//! Queues documents and archives, runs extraction one document at a time,
//! and writes the requested exports.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use ingest::{
    list_archive, EmptyExtractionPolicy, ExportFormat, HttpExtractor, IngestConfig, PaymentStatus,
    QueueObserver, Session, UnitStatus, EXPORT_COLUMNS,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "invoice-ingest")]
#[command(version, about = "Extract invoice data from documents and archives", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract invoices from documents, archives or directories
    Process {
        /// PDF, DOC, DOCX or ZIP files, or directories containing them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory for exports
        #[arg(short, long)]
        out: PathBuf,

        /// Export format
        #[arg(long, value_enum, default_value = "all")]
        format: FormatArg,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Mark documents with no invoice entries as done instead of failed
        #[arg(long)]
        accept_empty: bool,
    },

    /// List the documents a ZIP archive would queue
    Expand {
        /// Archive file to inspect
        archive: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Size limit in bytes
        #[arg(long)]
        size_limit: Option<u64>,
    },

    /// Print the export column order
    Columns,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Csv,
    Xlsx,
    Zip,
    All,
}

impl FormatArg {
    fn formats(self) -> Vec<ExportFormat> {
        match self {
            FormatArg::Csv => vec![ExportFormat::Csv],
            FormatArg::Xlsx => vec![ExportFormat::Xlsx],
            FormatArg::Zip => vec![ExportFormat::Zip],
            FormatArg::All => ExportFormat::ALL.to_vec(),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Process {
            inputs,
            out,
            format,
            config,
            accept_empty,
        } => handle_process(inputs, out, format, config, accept_empty).await,
        Commands::Expand {
            archive,
            json,
            size_limit,
        } => handle_expand(archive, json, size_limit).await,
        Commands::Columns => {
            handle_columns();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Progress bar driven by queue notifications.
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.green/dim}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        Self { bar }
    }
}

impl QueueObserver for ProgressObserver {
    fn on_unit_queued(&self, _unit_id: &str, _name: &str) {
        self.bar.inc_length(1);
    }

    fn on_unit_started(&self, _unit_id: &str, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_unit_completed(&self, _unit_id: &str, name: &str, records: usize) {
        self.bar.println(format!("✓ {} ({} records)", name, records));
        self.bar.inc(1);
    }

    fn on_unit_failed(&self, _unit_id: &str, name: &str, error: &str) {
        self.bar.println(format!("✗ {}: {}", name, error));
        self.bar.inc(1);
    }

    fn on_drain_finished(&self, processed: usize) {
        self.bar
            .finish_with_message(format!("{} documents processed", processed));
    }
}

async fn handle_process(
    inputs: Vec<PathBuf>,
    out: PathBuf,
    format: FormatArg,
    config_path: Option<PathBuf>,
    accept_empty: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &config_path {
        Some(path) => IngestConfig::load(path).await?,
        None => IngestConfig::default(),
    };
    if accept_empty {
        config.empty_extraction = EmptyExtractionPolicy::Accept;
    }

    let extractor = Arc::new(HttpExtractor::new(config.extractor.clone())?);
    let session = Session::new(config, extractor, Arc::new(ProgressObserver::new()));

    // Ctrl-C discards everything; the call in flight finishes and is ignored.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        let session = session.clone();
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            session.clear_all();
        })
        .ok();
    }

    for input in &inputs {
        match session.ingest_path(input).await {
            Ok(ids) => info!(input = %input.display(), documents = ids.len(), "queued"),
            Err(e) => eprintln!("Skipping {}: {}", input.display(), e),
        }
    }

    if session.stats().total() == 0 {
        return Err("No documents to process".into());
    }

    session.drain().await;

    if interrupted.load(Ordering::SeqCst) {
        return Err("Interrupted; session cleared".into());
    }

    print_summary(&session);

    tokio::fs::create_dir_all(&out).await?;
    for format in format.formats() {
        let bytes = session.export(format)?;
        let path = out.join(session.export_file_name(format));
        tokio::fs::write(&path, bytes).await?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}

fn print_summary(session: &Session) {
    let stats = session.stats();
    let records = session.records();

    println!();
    println!(
        "{} documents: {} done, {} failed; {} invoice entries",
        stats.total(),
        stats.done,
        stats.failed,
        records.len()
    );

    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    for record in &records {
        *by_status
            .entry(PaymentStatus::from_fields(&record.fields).to_string())
            .or_default() += 1;
    }
    for (status, count) in &by_status {
        println!("  {:<16} {}", status, count);
    }

    for unit in session.units().iter().filter(|u| u.status == UnitStatus::Failed) {
        println!(
            "  failed: {} ({})",
            unit.name,
            unit.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!();
}

async fn handle_expand(
    archive: PathBuf,
    json: bool,
    size_limit: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(&archive).await?;
    let entries = tokio::task::spawn_blocking(move || list_archive(bytes, size_limit)).await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Archive: {}", archive.display());
    println!("Documents: {}", entries.len());
    for entry in &entries {
        println!("  {:<6} {:>10}  {}", entry.media_type.to_string(), entry.size, entry.path);
    }
    Ok(())
}

fn handle_columns() {
    for (i, column) in EXPORT_COLUMNS.iter().enumerate() {
        println!("{:>2}. {}", i + 1, column);
    }
}
