use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use fieldmemo_pipeline::{EngineConfig, ResolutionPipeline};
use fieldmemo_protocol::{ControlType, FieldDescriptor, IndexSource, RawField, SectionType};
use fieldmemo_semantics::{FieldClassifier, FuzzyKeyMatcher, RepeaterRegistry, SemanticKeyGenerator};
use fieldmemo_store::{JsonFileRepository, MemoryRepository, TieredCacheStore, WriteOutcome};
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod dry_run;
mod profile;

pub use dry_run::DryRunExecutor;
pub use profile::ProfileRuleEngine;

const DEFAULT_CACHE_PATH: &str = ".fieldmemo/cache.json";

#[derive(Parser)]
#[command(name = "fieldmemo")]
#[command(about = "Remembers form answers and replays them on the next form", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Engine config file (overrides FIELDMEMO_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache snapshot file
    #[arg(long, global = true, default_value = DEFAULT_CACHE_PATH)]
    cache: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify and key scanned fields without touching the cache
    Classify(FieldsArgs),

    /// Run a full resolution pass over scanned fields (fills are logged, not performed)
    Resolve(ResolveArgs),

    /// Look up the remembered value for a single label
    Lookup(FieldArgs),

    /// Remember a value for a single label
    Remember(RememberArgs),

    /// Show bucket sizes and lock contention of the cache
    Stats,

    /// Drop cache entries idle for longer than the configured TTL
    Sweep,

    /// Print the effective engine config
    Config,

    /// Print the JSON schema of a scanned field record
    Schema,
}

#[derive(Args)]
struct FieldsArgs {
    /// JSON array of scanned field records ("-" for stdin)
    fields: PathBuf,
}

#[derive(Args)]
struct ResolveArgs {
    #[command(flatten)]
    input: FieldsArgs,

    /// Profile JSON object (key -> value) answering as the rule engine
    #[arg(long)]
    profile: Option<PathBuf>,
}

#[derive(Args)]
struct FieldArgs {
    /// Field label as shown on the form
    #[arg(long)]
    label: String,

    /// Control type (text, select, checkbox, ...)
    #[arg(long, default_value = "text")]
    control: String,

    /// Repeating section the field sits in (work, education, ...)
    #[arg(long, requires = "index")]
    section: Option<String>,

    /// Row index within the section
    #[arg(long, requires = "section")]
    index: Option<u32>,
}

#[derive(Args)]
struct RememberArgs {
    #[command(flatten)]
    field: FieldArgs,

    /// Value to remember; parsed as JSON when possible, else taken as a string
    #[arg(long)]
    value: String,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = EngineConfig::load_or_default(cli.config.as_deref())
        .await
        .context("Failed to load engine config")?;

    match cli.command {
        Commands::Classify(args) => run_classify(args, &config).await?,
        Commands::Resolve(args) => run_resolve(args, &cli.cache, &config).await?,
        Commands::Lookup(args) => run_lookup(args, &cli.cache, &config).await?,
        Commands::Remember(args) => run_remember(args, &cli.cache, &config).await?,
        Commands::Stats => {
            let store = open_store(&cli.cache, &config).await?;
            print_json(&store.stats().await?)?;
        }
        Commands::Sweep => {
            let store = open_store(&cli.cache, &config).await?;
            let report = store.sweep_expired().await?;
            log::info!("Swept {} expired entries", report.removed);
            print_json(&report)?;
        }
        Commands::Config => print_json(&config)?,
        Commands::Schema => print_json(&schemars::schema_for!(RawField))?,
    }

    Ok(())
}

async fn run_classify(args: FieldsArgs, config: &EngineConfig) -> Result<()> {
    let fields = read_fields(&args.fields)?;
    let store = TieredCacheStore::open(Arc::new(MemoryRepository::new()), config.store).await?;
    let pipeline = ResolutionPipeline::builder(Arc::new(store))
        .engine_config(config)
        .build();
    print_json(&pipeline.prepare(fields).await)
}

async fn run_resolve(args: ResolveArgs, cache: &Path, config: &EngineConfig) -> Result<()> {
    let fields = read_fields(&args.input.fields)?;
    let store = open_store(cache, config).await?;

    let mut builder = ResolutionPipeline::builder(store)
        .engine_config(config)
        .executor(Arc::new(DryRunExecutor));
    if let Some(path) = &args.profile {
        let profile = Arc::new(ProfileRuleEngine::load(path, config)?);
        log::info!("Loaded {} profile answers from {}", profile.len(), path.display());
        builder = builder
            .rule_engine(profile.clone())
            .composite_handler(profile);
    }

    let report = builder.build().run(fields).await?;
    print_json(&report)
}

async fn run_lookup(args: FieldArgs, cache: &Path, config: &EngineConfig) -> Result<()> {
    let field = describe_field(&args, config)?;
    let store = open_store(cache, config).await?;
    let hit = store.read(&field, "").await;
    if hit.is_none() {
        log::info!("No remembered value for '{}'", args.label);
    }
    print_json(&hit)
}

async fn run_remember(args: RememberArgs, cache: &Path, config: &EngineConfig) -> Result<()> {
    let field = describe_field(&args.field, config)?;
    let value =
        serde_json::from_str::<Value>(&args.value).unwrap_or_else(|_| Value::String(args.value));
    let store = open_store(cache, config).await?;

    if field.is_multi_valued() {
        let set = store.update_multi_selection(&field, "", value, true).await?;
        return print_json(&set);
    }
    let outcome = store.write(&field, "", value).await?;
    if let WriteOutcome::Rejected { reason } = &outcome {
        log::warn!("Value for '{}' not stored: {reason}", args.field.label);
    }
    print_json(&outcome)
}

async fn open_store(path: &Path, config: &EngineConfig) -> Result<Arc<TieredCacheStore>> {
    let repository = JsonFileRepository::open(path)
        .await
        .with_context(|| format!("Failed to open cache {}", path.display()))?;
    let store = TieredCacheStore::open(Arc::new(repository), config.store)
        .await?
        .with_semantics(
            SemanticKeyGenerator::new(config.keys),
            FuzzyKeyMatcher::new(config.matcher),
        );
    Ok(Arc::new(store))
}

fn read_fields(path: &Path) -> Result<Vec<FieldDescriptor>> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read fields from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    let records: Value = serde_json::from_str(&raw).context("Fields are not valid JSON")?;
    let fields = FieldDescriptor::from_json_records(&records)?;
    log::debug!("Read {} fields", fields.len());
    Ok(fields)
}

/// A one-off field, classified as a lone occurrence so reads and writes pick the bucket a
/// scan pass would.
fn describe_field(args: &FieldArgs, config: &EngineConfig) -> Result<FieldDescriptor> {
    let mut field = FieldDescriptor::new("#cli")
        .with_label(args.label.as_str())
        .with_control(ControlType::from_str_lossy(&args.control));
    if let (Some(section), Some(index)) = (&args.section, args.index) {
        let section_type = SectionType::parse(section).unwrap_or(SectionType::Work);
        field = field.in_section(section_type, index, IndexSource::Structural);
        field.is_strong_repeater = true;
    }
    FieldClassifier::new(config.classifier).classify(&mut field, 1, &mut RepeaterRegistry::new())?;
    Ok(field)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
