use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_catalog::{
    config::{Config, ConfigError},
    metadata::GpsCoordinates,
    scan,
    storage::{Catalog, CatalogOptions, Constraint, DatabaseError, Field, MediaType, Predicate},
    sync::{self, DiffOptions, MergeOptions},
    update::{self, UpdateOp},
};

#[derive(Parser)]
#[command(name = "media-catalog")]
#[command(version, about = "Catalog, query, diff and merge media file trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Catalog root directory
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    media_dir: PathBuf,

    /// Catalog file path (defaults to <media-dir>/$CATALOG_FILE)
    #[arg(long = "db", global = true, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Do not report elapsed time
    #[arg(long, global = true)]
    no_timeit: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the media directory into its catalog
    Build,

    /// Catalog a single file
    Add {
        path: PathBuf,
    },

    /// Apply an update operator to selected records
    Update {
        #[command(subcommand)]
        op: UpdateCommand,
    },

    /// Print records matching a query as JSON lines
    Query(Selector),

    /// Compare two catalogs by content identity
    Diff(DiffArgs),

    /// Copy files missing from the right catalog into it
    Merge(MergeArgs),

    /// Fingerprint a file without touching any catalog
    Get {
        path: PathBuf,

        /// Also print extracted metadata
        #[arg(long)]
        metadata: bool,
    },
}

#[derive(Subcommand)]
enum UpdateCommand {
    /// Recompute identity, location and metadata
    Reload(UpdateTarget),
    /// Recompute capture time and metadata
    ReloadMetadata(UpdateTarget),
    /// Recompute content hash, size and relative path
    ReloadIdentity(UpdateTarget),
    /// Set GPS coordinates
    SetGps {
        /// "latitude,longitude,altitude"; empty components clear the field
        #[arg(value_name = "GPS", allow_hyphen_values = true)]
        coordinates: String,

        #[command(flatten)]
        target: UpdateTarget,
    },
}

#[derive(Args)]
struct UpdateTarget {
    #[command(flatten)]
    selector: Selector,

    /// Report what would change without writing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
#[cfg_attr(test, derive(Default))]
struct Selector {
    #[arg(long)]
    id: Option<u64>,
    /// Content hash
    #[arg(long)]
    hash: Option<String>,
    #[arg(long)]
    relpath: Option<String>,
    /// Absolute or working-directory-relative file path
    #[arg(long)]
    path: Option<PathBuf>,
    #[arg(long)]
    filename: Option<String>,
    /// Extension without the dot
    #[arg(long)]
    ext: Option<String>,
    /// Camera make
    #[arg(long)]
    make: Option<String>,
    /// "latitude,longitude,altitude"
    #[arg(long, allow_hyphen_values = true)]
    gps: Option<String>,
    #[arg(long, conflicts_with = "non_gps")]
    has_gps: bool,
    #[arg(long)]
    non_gps: bool,
    #[arg(long, conflicts_with = "non_time")]
    has_time: bool,
    #[arg(long)]
    non_time: bool,
    /// image or video
    #[arg(long = "type", value_name = "TYPE")]
    media_type: Option<String>,
    /// Capture day, YYYY-MM-DD
    #[arg(long)]
    date: Option<String>,
    /// Captured on or after this day
    #[arg(long)]
    after: Option<String>,
    /// Captured on or before this day
    #[arg(long)]
    before: Option<String>,
    /// Select every record when no other selector is given
    #[arg(long)]
    all: bool,
}

#[derive(Args)]
struct DiffArgs {
    #[arg(long, value_name = "DIR")]
    left: PathBuf,
    #[arg(long, value_name = "DIR")]
    right: PathBuf,
    /// Only report files missing from the right
    #[arg(long, conflicts_with = "only_right")]
    only_left: bool,
    /// Only report files missing from the left
    #[arg(long)]
    only_right: bool,
}

#[derive(Args)]
struct MergeArgs {
    /// Source tree
    #[arg(long, value_name = "DIR")]
    left: PathBuf,
    /// Destination tree
    #[arg(long, value_name = "DIR")]
    right: PathBuf,
    #[arg(long)]
    dry_run: bool,
}

/// Invocation failures with dedicated exit codes.
#[derive(Debug, Error)]
enum CliError {
    #[error("Catalog not found at {0}, run build first")]
    MissingCatalog(PathBuf),
    #[error("{0} is not a directory")]
    MissingDirectory(PathBuf),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::MalformedInput(e.to_string())
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<CliError>() {
            return match e {
                CliError::MissingCatalog(_) => 1,
                CliError::MissingDirectory(_) => 2,
                CliError::MalformedInput(_) => 3,
            };
        }
        if let Some(e) = cause.downcast_ref::<DatabaseError>() {
            match e {
                DatabaseError::CatalogNotFound(_) => return 1,
                DatabaseError::NotADirectory(_) => return 2,
                _ => {}
            }
        }
    }
    4
}

fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    // Logs go to stderr; stdout carries query output
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer().with_writer(std::io::stderr))
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(3);
        }
        Err(e) => e.exit(),
    };

    init_tracing();

    let started = Instant::now();
    let result = run(&cli);
    if !cli.no_timeit {
        info!("Elapsed time: {:.3?}", started.elapsed());
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = Config::load().map_err(CliError::from)?;
    let options = CatalogOptions::new(&config.catalog);

    match &cli.command {
        Commands::Build => {
            let mut catalog = Catalog::create(&cli.media_dir, &single_options(cli, &options))?;
            info!("Building catalog {}", catalog.db_path().display());
            scan::build(&mut catalog)?;
        }
        Commands::Add { path } => {
            let mut catalog = open_single(cli, &options)?;
            scan::add_one(&mut catalog, path)?;
        }
        Commands::Update { op } => {
            let (op, target) = match op {
                UpdateCommand::Reload(target) => (UpdateOp::Reload, target),
                UpdateCommand::ReloadMetadata(target) => (UpdateOp::ReloadMetadata, target),
                UpdateCommand::ReloadIdentity(target) => (UpdateOp::ReloadIdentity, target),
                UpdateCommand::SetGps {
                    coordinates,
                    target,
                } => (UpdateOp::SetGps(parse_gps(coordinates)?), target),
            };
            let mut catalog = open_single(cli, &options)?;
            match build_predicate(&catalog, &target.selector, &config)? {
                Some(predicate) => {
                    update::run(&mut catalog, op, &predicate, target.dry_run)?;
                }
                None => info!("Found 0 files, 0 updated."),
            }
        }
        Commands::Query(selector) => {
            let catalog = open_single(cli, &options)?;
            let mut count = 0u64;
            if let Some(predicate) = build_predicate(&catalog, selector, &config)? {
                for record in catalog.iter(&predicate) {
                    println!("{}", serde_json::to_string(&record?)?);
                    count += 1;
                }
            }
            info!("Found {} file{}.", count, if count == 1 { "" } else { "s" });
        }
        Commands::Diff(args) => {
            let left = open_multi(&args.left, &options)?;
            let right = open_multi(&args.right, &options)?;
            let directions = DiffOptions {
                left: !args.only_right,
                right: !args.only_left,
            };
            sync::diff(&left, &right, directions)?;
        }
        Commands::Merge(args) => {
            let source = open_multi(&args.left, &options)?;
            let mut dest = open_multi(&args.right, &options)?;
            sync::merge(
                &source,
                &mut dest,
                MergeOptions {
                    dry_run: args.dry_run,
                },
            )?;
        }
        Commands::Get { path, metadata } => {
            let fingerprint = options
                .engine
                .fingerprint(path)
                .with_context(|| format!("Cannot fingerprint {}", path.display()))?;
            println!("{}", serde_json::to_string(&fingerprint)?);
            if *metadata {
                let extracted = options.extractor.extract(path)?;
                println!("{}", serde_json::to_string(&extracted)?);
            }
        }
    }
    Ok(())
}

fn single_options(cli: &Cli, options: &CatalogOptions) -> CatalogOptions {
    match &cli.db_path {
        Some(db_path) => options.clone().with_db_path(db_path),
        None => options.clone(),
    }
}

/// Open the catalog of `--media-dir` for a single-catalog command.
fn open_single(cli: &Cli, options: &CatalogOptions) -> anyhow::Result<Catalog> {
    let options = single_options(cli, options);
    let db_path = options.catalog_path(&cli.media_dir);
    match Catalog::open(&cli.media_dir, &options) {
        Err(DatabaseError::CatalogNotFound(_)) | Err(DatabaseError::NotADirectory(_)) => {
            Err(CliError::MissingCatalog(db_path).into())
        }
        other => Ok(other?),
    }
}

/// Open one side of a two-catalog command.
fn open_multi(root: &Path, options: &CatalogOptions) -> anyhow::Result<Catalog> {
    if !root.is_dir() {
        return Err(CliError::MissingDirectory(root.to_path_buf()).into());
    }
    match Catalog::open(root, options) {
        Err(DatabaseError::CatalogNotFound(path)) => Err(CliError::MissingCatalog(path).into()),
        other => Ok(other?),
    }
}

fn parse_gps(raw: &str) -> Result<GpsCoordinates, CliError> {
    raw.parse()
        .map_err(|e| CliError::MalformedInput(format!("GPS {raw:?}: {e}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| CliError::MalformedInput(format!("date {raw:?}: {e}")))
}

/// Translate selectors into a predicate. `None` means the query selects
/// nothing: no selector was given and neither `--all` nor
/// `QUERY_EMPTY_MATCHES_ALL` asks for everything.
fn build_predicate(
    catalog: &Catalog,
    selector: &Selector,
    config: &Config,
) -> anyhow::Result<Option<Predicate>> {
    let mut predicate = Predicate::all();

    if let Some(id) = selector.id {
        predicate = predicate.equals(Field::Id, id);
    }
    if let Some(hash) = &selector.hash {
        predicate = predicate.equals(Field::ContentHash, hash.as_str());
    }
    if let Some(relpath) = &selector.relpath {
        predicate = predicate.equals(Field::RelativePath, relpath.as_str());
    }
    if let Some(path) = &selector.path {
        // Stored paths are relative, so the same file matches after the root moves
        let abs = media_catalog::fsutil::normalize(path)?;
        let relpath = catalog
            .relpath(&abs)
            .map_err(|e| CliError::MalformedInput(e.to_string()))?;
        predicate = predicate.equals(Field::RelativePath, relpath);
    }
    if let Some(filename) = &selector.filename {
        predicate = predicate.equals(Field::Filename, filename.as_str());
    }
    if let Some(ext) = &selector.ext {
        predicate = predicate.equals(Field::Extension, ext.trim_start_matches('.'));
    }
    if let Some(make) = &selector.make {
        predicate = predicate.equals(Field::CameraMake, make.as_str());
    }
    if let Some(gps) = &selector.gps {
        predicate = predicate.gps(parse_gps(gps)?);
    }
    if selector.has_gps {
        predicate = predicate.with(Field::GpsLatitude, Constraint::IsNotNull);
    } else if selector.non_gps {
        predicate = predicate.with(Field::GpsLatitude, Constraint::IsNull);
    }
    if selector.has_time {
        predicate = predicate.with(Field::CaptureTime, Constraint::IsNotNull);
    } else if selector.non_time {
        predicate = predicate.with(Field::CaptureTime, Constraint::IsNull);
    }
    if let Some(media_type) = &selector.media_type {
        let media_type: MediaType = media_type
            .parse()
            .map_err(CliError::MalformedInput)?;
        predicate = predicate.equals(Field::MediaType, media_type);
    }
    if let Some(date) = &selector.date {
        predicate = predicate.equals(Field::CaptureDate, parse_date(date)?);
    }
    if let Some(after) = &selector.after {
        predicate = predicate.with(
            Field::CaptureDate,
            Constraint::AtLeast(parse_date(after)?.into()),
        );
    }
    if let Some(before) = &selector.before {
        predicate = predicate.with(
            Field::CaptureDate,
            Constraint::AtMost(parse_date(before)?.into()),
        );
    }

    if predicate.is_empty() && !(selector.all || config.query.empty_matches_all) {
        return Ok(None);
    }
    Ok(Some(predicate))
}
