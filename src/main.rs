use clap::{Args, Parser, Subcommand, ValueEnum};
use license_issuer::application::orchestrator::IssuanceOrchestrator;
use license_issuer::config::{self, DurationPolicy, EngineConfig};
use license_issuer::domain::ports::IssuanceStoreBox;
use license_issuer::domain::record::{IssuanceStatus, RecordFilter};
use license_issuer::domain::request::RawLicenseRequest;
use license_issuer::infrastructure::in_memory::InMemoryIssuanceStore;
use license_issuer::infrastructure::process_engine::ProcessEngine;
#[cfg(feature = "storage-rocksdb")]
use license_issuer::infrastructure::rocksdb::RocksDBIssuanceStore;
use license_issuer::infrastructure::sqlite::SqliteIssuanceStore;
use license_issuer::interfaces::csv::record_writer::RecordWriter;
use license_issuer::interfaces::csv::request_reader::RequestReader;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue a single license and print it
    Issue(IssueArgs),
    /// Issue a license for every row of a requests CSV file
    IssueBatch(BatchArgs),
    /// List recent issuance records as CSV
    Audit(AuditArgs),
}

#[derive(Args)]
struct IssueArgs {
    /// License request fingerprint produced by the client installation
    #[arg(long)]
    fingerprint: Option<String>,

    #[command(flatten)]
    identity: IdentityArgs,

    /// Print the issued license as JSON instead of the bare license string
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(flatten)]
    storage: StorageArgs,
}

#[derive(Args)]
struct IdentityArgs {
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    email: Option<String>,
}

#[derive(Args)]
struct BatchArgs {
    /// Requests CSV file (fingerprint,first_name,last_name,title,company,email)
    input: PathBuf,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(flatten)]
    storage: StorageArgs,
}

#[derive(Args)]
struct AuditArgs {
    /// Maximum number of records to list, newest first
    #[arg(long, default_value_t = RecordFilter::DEFAULT_LIMIT)]
    limit: usize,

    /// Only list records with this status
    #[arg(long, value_enum)]
    status: Option<StatusArg>,

    /// Only list records for this fingerprint
    #[arg(long)]
    fingerprint: Option<String>,

    /// HTML-escape identity fields for pasting into web pages
    #[arg(long)]
    escape_html: bool,

    #[command(flatten)]
    storage: StorageArgs,
}

#[derive(Args)]
struct EngineArgs {
    /// Path to the license signing engine executable
    #[arg(long, env = "LICENSE_ISSUER_ENGINE")]
    engine: PathBuf,

    /// Fixed argument passed to the engine before the fingerprint (repeatable)
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Seconds an engine run may take before it is killed
    #[arg(
        long,
        env = "LICENSE_ISSUER_ENGINE_TIMEOUT_SECS",
        default_value_t = config::DEFAULT_ENGINE_TIMEOUT.as_secs()
    )]
    engine_timeout_secs: u64,

    /// Marker the engine prints on a logical error
    #[arg(long, env = "LICENSE_ISSUER_SENTINEL", default_value = config::DEFAULT_ERROR_SENTINEL)]
    sentinel: String,

    /// Maximum number of engine processes running at once
    #[arg(long, default_value_t = config::DEFAULT_MAX_ENGINE_PROCESSES)]
    max_engine_processes: usize,

    /// License validity granted to every request, in days
    #[arg(long, env = "LICENSE_ISSUER_DURATION_DAYS", default_value_t = config::DEFAULT_DURATION_DAYS)]
    duration_days: u32,

    #[arg(long, default_value_t = config::DEFAULT_MIN_DURATION_DAYS)]
    min_duration_days: u32,

    #[arg(long, default_value_t = config::DEFAULT_MAX_DURATION_DAYS)]
    max_duration_days: u32,
}

#[derive(Args)]
struct StorageArgs {
    /// Storage backend for the issuance audit trail
    #[arg(long, value_enum, env = "LICENSE_ISSUER_BACKEND", default_value_t = Backend::Sqlite)]
    backend: Backend,

    /// Path to the persistent database
    #[arg(long, env = "LICENSE_ISSUER_DB_PATH", default_value = "issuances.db")]
    db_path: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Memory,
    Sqlite,
    Rocksdb,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Issued,
    Failed,
}

impl From<StatusArg> for IssuanceStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Issued => IssuanceStatus::Issued,
            StatusArg::Failed => IssuanceStatus::Failed,
        }
    }
}

impl EngineArgs {
    fn into_orchestrator(self, store: IssuanceStoreBox) -> Result<IssuanceOrchestrator> {
        let policy = DurationPolicy::new(
            self.duration_days,
            self.min_duration_days,
            self.max_duration_days,
        )
        .into_diagnostic()?;

        let config = EngineConfig::new(self.engine)
            .with_leading_args(self.engine_args)
            .with_timeout(Duration::from_secs(self.engine_timeout_secs))
            .with_sentinel(self.sentinel)
            .with_max_concurrent(self.max_engine_processes);
        let engine = ProcessEngine::new(config).into_diagnostic()?;

        Ok(IssuanceOrchestrator::new(policy, Box::new(engine), store))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Issue(args) => issue(args).await,
        Command::IssueBatch(args) => issue_batch(args).await,
        Command::Audit(args) => audit(args).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn issue(args: IssueArgs) -> Result<()> {
    let store = open_store(&args.storage)?;
    let orchestrator = args.engine.into_orchestrator(store)?;

    let raw = RawLicenseRequest {
        fingerprint: args.fingerprint,
        first_name: args.identity.first_name,
        last_name: args.identity.last_name,
        title: args.identity.title,
        company: args.identity.company,
        email: args.identity.email,
    };
    let issued = orchestrator.issue(raw).await.into_diagnostic()?;

    if args.json {
        println!("{}", serde_json::to_string(&issued).into_diagnostic()?);
    } else {
        println!("{}", issued.license);
    }
    Ok(())
}

async fn issue_batch(args: BatchArgs) -> Result<()> {
    let store = open_store(&args.storage)?;
    let orchestrator = Arc::new(args.engine.into_orchestrator(store)?);

    let file = File::open(&args.input).into_diagnostic()?;
    let rows = RequestReader::new(file).requests().collect();

    let results = orchestrator.issue_rows(rows).await;

    let stdout = io::stdout();
    let mut writer = RecordWriter::new(stdout.lock());
    writer.write_results(&results).into_diagnostic()?;

    Ok(())
}

async fn audit(args: AuditArgs) -> Result<()> {
    let store = open_store(&args.storage)?;

    let mut filter = RecordFilter::default().with_limit(args.limit);
    if let Some(status) = args.status {
        filter = filter.with_status(status.into());
    }
    if let Some(fingerprint) = args.fingerprint {
        filter = filter.with_fingerprint(fingerprint);
    }
    let mut records = store.list_recent(&filter).await.into_diagnostic()?;
    if args.escape_html {
        for record in &mut records {
            record.identity = record.identity.html_escaped();
        }
    }

    let stdout = io::stdout();
    let mut writer = RecordWriter::new(stdout.lock());
    writer.write_records(&records).into_diagnostic()?;

    Ok(())
}

fn open_store(args: &StorageArgs) -> Result<IssuanceStoreBox> {
    let store: IssuanceStoreBox = match args.backend {
        Backend::Memory => Box::new(InMemoryIssuanceStore::new()),
        Backend::Sqlite => Box::new(SqliteIssuanceStore::open(&args.db_path).into_diagnostic()?),
        Backend::Rocksdb => open_rocksdb(&args.db_path)?,
    };
    Ok(store)
}

#[cfg(feature = "storage-rocksdb")]
fn open_rocksdb(path: &Path) -> Result<IssuanceStoreBox> {
    let store = RocksDBIssuanceStore::open(path).into_diagnostic()?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_rocksdb(path: &Path) -> Result<IssuanceStoreBox> {
    tracing::warn!(
        "RocksDB storage requested, but 'storage-rocksdb' feature is not enabled. Falling back to SQLite storage."
    );
    let store = SqliteIssuanceStore::open(path).into_diagnostic()?;
    Ok(Box::new(store))
}
