use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use ripple_core::{
    AssociationName, AssociationRegistry, AssociationResolver, ConfigManager, DeclarationFile,
    Entity, EntityKey, EntityType, LifecycleEvent, LifecycleHook, LoadEvent, LoggingConfig,
    Notification, NotificationCalculator, RippleConfig,
};
use ripple_store::{Dataset, MemoryStore};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "ripple")]
#[command(about = "Ripple CLI - change notification over declared associations", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Config file (defaults to ./.ripple.toml, then ~/.ripple/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Association declarations (TOML)
    #[arg(long, global = true)]
    declarations: Option<PathBuf>,

    /// Records and links to load into the in-memory store (JSON)
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the association declarations
    Check,

    /// Show which associations are eager-loaded on notify
    Plan {
        /// Entity type
        #[arg(short = 't', long = "type")]
        entity_type: String,

        /// Associations to leave out (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        skip: Vec<String>,
    },

    /// List every record to notify when a record changes
    Propagate(RecordArgs),

    /// Run the after-save hook for a record
    Save(RecordArgs),

    /// Run the before-destroy hook for a record, then delete it
    Destroy(RecordArgs),
}

#[derive(Args)]
struct RecordArgs {
    /// Entity type
    #[arg(short = 't', long = "type")]
    entity_type: String,

    /// Record id
    #[arg(short, long)]
    id: String,
}

impl RecordArgs {
    fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type.as_str(), self.id.as_str())
    }
}

#[derive(Serialize)]
struct CheckResult {
    status: String,
    entity_types: usize,
    associations: usize,
    notifying_types: Vec<String>,
}

#[derive(Serialize)]
struct PlanResult {
    entity_type: String,
    skip: Vec<String>,
    plan: Vec<String>,
}

#[derive(Serialize)]
struct PropagateResult {
    source: String,
    needs_to_notify: bool,
    targets: Vec<String>,
    store_fetches: usize,
}

#[derive(Serialize)]
struct HookResult {
    event: String,
    source: String,
    dispatched: bool,
    targets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<bool>,
}

impl HookResult {
    fn new(event: LifecycleEvent, key: &EntityKey, notification: Option<Notification>) -> Self {
        Self {
            event: event.to_string(),
            source: key.to_string(),
            dispatched: notification.is_some(),
            targets: notification
                .map(|n| target_keys(&n.targets))
                .unwrap_or_default(),
            deleted: None,
        }
    }
}

/// Registry, store and hook wired together from the loaded configuration.
struct Engine {
    registry: Arc<AssociationRegistry>,
    store: Arc<MemoryStore>,
    hook: LifecycleHook,
}

impl Engine {
    fn build(config: &RippleConfig) -> Result<Self> {
        let registry = Arc::new(load_registry(config)?);
        let store = Arc::new(load_store(config)?);

        let resolver = AssociationResolver::new(registry.clone(), store.clone());
        let hook = LifecycleHook::new(NotificationCalculator::new(resolver), &config.propagation);

        Ok(Self {
            registry,
            store,
            hook,
        })
    }

    fn record(&self, args: &RecordArgs) -> Result<Entity> {
        let key = args.key();
        self.store
            .get(&key)
            .with_context(|| format!("{} not found in dataset", key))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(output) => {
            print_output(&cli.output, &output)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> Result<serde_json::Value> {
    let config = load_config(cli)?;
    init_tracing(&config.logging, cli.verbose);

    let engine = Engine::build(&config)?;
    debug!(
        entity_types = engine.registry.entity_types().count(),
        records = engine.store.len(),
        "engine ready"
    );
    execute_command(&cli.command, &engine).await
}

fn load_config(cli: &Cli) -> Result<RippleConfig> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::from_path(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;

    let mut config = manager.into_config();
    if let Some(path) = &cli.declarations {
        config.declarations = Some(path.clone());
    }
    if let Some(path) = &cli.dataset {
        config.dataset = Some(path.clone());
    }
    Ok(config)
}

// Logs go to stderr so `--output json` stays machine readable.
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let fallback = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match logging.format.as_str() {
        "compact" => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        "full" => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.ok();
}

fn load_registry(config: &RippleConfig) -> Result<AssociationRegistry> {
    let path = config
        .declarations
        .as_deref()
        .context("No declarations file given (use --declarations or RIPPLE_DECLARATIONS)")?;
    let file = DeclarationFile::from_file(path)
        .with_context(|| format!("Failed to read declarations from {}", path.display()))?;
    AssociationRegistry::from_declarations(&file).context("Invalid association declarations")
}

fn load_store(config: &RippleConfig) -> Result<MemoryStore> {
    let Some(path) = config.dataset.as_deref() else {
        return Ok(MemoryStore::new());
    };
    let dataset = Dataset::from_file(path)
        .with_context(|| format!("Failed to read dataset from {}", path.display()))?;
    Ok(MemoryStore::from_dataset(&dataset))
}

async fn execute_command(command: &Commands, engine: &Engine) -> Result<serde_json::Value> {
    match command {
        Commands::Check => execute_check_command(engine),
        Commands::Plan { entity_type, skip } => execute_plan_command(engine, entity_type, skip),
        Commands::Propagate(args) => execute_propagate_command(engine, args).await,
        Commands::Save(args) => execute_save_command(engine, args).await,
        Commands::Destroy(args) => execute_destroy_command(engine, args).await,
    }
}

fn execute_check_command(engine: &Engine) -> Result<serde_json::Value> {
    let registry = &engine.registry;
    let mut types: Vec<&EntityType> = registry.entity_types().collect();
    types.sort();

    let mut associations = 0;
    let mut notifying_types = Vec::new();
    for entity_type in types.iter().copied() {
        associations += registry.declarations_for(entity_type)?.len();
        if !registry.notify_associations(entity_type)?.is_empty() {
            notifying_types.push(entity_type.to_string());
        }
    }

    let result = CheckResult {
        status: "ok".to_string(),
        entity_types: types.len(),
        associations,
        notifying_types,
    };
    Ok(serde_json::to_value(result)?)
}

fn execute_plan_command(
    engine: &Engine,
    entity_type: &str,
    skip: &[String],
) -> Result<serde_json::Value> {
    let skip_names: Vec<AssociationName> = skip.iter().map(|s| s.as_str().into()).collect();
    let plan = engine.hook.calculator().planner().plan(
        &EntityType::from(entity_type),
        LoadEvent::OnNotify,
        &skip_names,
    )?;

    let result = PlanResult {
        entity_type: entity_type.to_string(),
        skip: skip.to_vec(),
        plan: plan.iter().map(ToString::to_string).collect(),
    };
    Ok(serde_json::to_value(result)?)
}

async fn execute_propagate_command(engine: &Engine, args: &RecordArgs) -> Result<serde_json::Value> {
    let entity = engine.record(args)?;
    let calculator = engine.hook.calculator();

    engine.store.reset_counts();
    let needs_to_notify = calculator.needs_to_notify(&entity)?;
    let targets = calculator
        .propagate(&entity)
        .await
        .with_context(|| format!("Propagation from {} failed", entity.key()))?;

    let result = PropagateResult {
        source: entity.key().to_string(),
        needs_to_notify,
        targets: target_keys(&targets),
        store_fetches: engine.store.fetch_count(),
    };
    Ok(serde_json::to_value(result)?)
}

async fn execute_save_command(engine: &Engine, args: &RecordArgs) -> Result<serde_json::Value> {
    let entity = engine.record(args)?;
    let notification = engine.hook.on_after_save(&entity).await?;

    let result = HookResult::new(LifecycleEvent::Saved, &entity.key(), notification);
    Ok(serde_json::to_value(result)?)
}

async fn execute_destroy_command(engine: &Engine, args: &RecordArgs) -> Result<serde_json::Value> {
    let entity = engine.record(args)?;
    let key = entity.key();
    let notification = engine.hook.on_before_destroy(&entity).await?;
    let deleted = engine.store.delete(&key).is_some();

    let mut result = HookResult::new(LifecycleEvent::Destroyed, &key, notification);
    result.deleted = Some(deleted);
    Ok(serde_json::to_value(result)?)
}

fn target_keys(targets: &[Entity]) -> Vec<String> {
    targets.iter().map(|t| t.key().to_string()).collect()
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => {
                        println!("{}: {}", key_colored, s.green());
                    }
                    serde_json::Value::Number(n) => {
                        println!("{}: {}", key_colored, n.to_string().yellow());
                    }
                    serde_json::Value::Bool(b) => {
                        let val_colored = if *b {
                            "true".green()
                        } else {
                            "false".red()
                        };
                        println!("{}: {}", key_colored, val_colored);
                    }
                    serde_json::Value::Array(items) if items.is_empty() => {
                        println!("{}: {}", key_colored, "(none)".dimmed());
                    }
                    serde_json::Value::Array(items) => {
                        println!("{}:", key_colored);
                        for item in items {
                            match item.as_str() {
                                Some(s) => println!("  - {}", s.green()),
                                None => println!("  - {}", item),
                            }
                        }
                    }
                    _ => {
                        println!("{}: {}", key_colored, val);
                    }
                }
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}
