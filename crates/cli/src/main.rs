use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use rigger_engine::{
    ConsoleSink, OutputContext, PrintSink, StepPipeline, StepRegistry, TracingSink, load_pipeline_file,
    templates::{PlaceholderRef, collect_placeholders_from_value, parse_reference},
};
use rigger_types::{PipelineDocument, StepSpec};
use rigger_util::{InMemoryReferenceStore, KeychainReferenceStore, ProcessEnvironment, ReferenceStore};
use serde_json::{Map as JsonMap, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rigger")]
#[command(version)]
#[command(about = "Run deployment preparation steps")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one section of a pipeline document
    Run(RunArgs),
    /// Validate a section and list its placeholders without running anything
    Check(CheckArgs),
    /// List registered steps and deprecated aliases
    Steps,
    /// Write blocks and variables to the keychain-backed store
    Store {
        #[command(subcommand)]
        command: StoreCommand,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Pipeline document (YAML or JSON)
    file: PathBuf,
    /// Section to run; defaults to the only section, then `pull`, then `steps`
    #[arg(long)]
    section: Option<String>,
    /// Read blocks and variables from this YAML file instead of the keychain
    #[arg(long)]
    store: Option<PathBuf>,
    /// Seed the output context (`KEY=VALUE`, VALUE parsed as JSON when possible)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
    /// Keep stdout for the JSON result; progress goes to the log
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CheckArgs {
    /// Pipeline document (YAML or JSON)
    file: PathBuf,
    #[arg(long)]
    section: Option<String>,
}

#[derive(Subcommand)]
enum StoreCommand {
    /// Store a variable (VALUE parsed as JSON when possible)
    SetVariable { name: String, value: String },
    /// Store a block document given as JSON
    SetBlock {
        block_type: String,
        name: String,
        document: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_command(args).await,
        Commands::Check(args) => check_command(args),
        Commands::Steps => {
            list_steps(&StepRegistry::with_builtin_steps());
            Ok(())
        }
        Commands::Store { command } => store_command(command),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_command(args: RunArgs) -> Result<()> {
    let document = load_pipeline_file(&args.file)?;
    let section = section_name(&document, args.section.as_deref())?;
    let steps = document.section(&section)?;
    info!(file = %args.file.display(), section = %section, steps = steps.len(), "running pipeline section");

    let store: Arc<dyn ReferenceStore> = match &args.store {
        Some(path) => Arc::new(InMemoryReferenceStore::from_file(path)?),
        None => Arc::new(KeychainReferenceStore::default()),
    };
    let pipeline = StepPipeline::new(Arc::new(StepRegistry::with_builtin_steps()))
        .with_environment(Arc::new(ProcessEnvironment))
        .with_reference_store(store);

    let upstream = if args.set.is_empty() {
        None
    } else {
        Some(OutputContext::seeded(parse_assignments(&args.set)?))
    };
    let sink: &dyn PrintSink = if args.json { &TracingSink } else { &ConsoleSink };

    let outputs = pipeline.run_steps(steps, upstream, sink).await?;
    println!("{}", serde_json::to_string_pretty(&outputs.into_merged())?);
    Ok(())
}

fn check_command(args: CheckArgs) -> Result<()> {
    let document = load_pipeline_file(&args.file)?;
    let section = section_name(&document, args.section.as_deref())?;
    let registry = StepRegistry::with_builtin_steps();

    let mut problems = 0usize;
    for (index, entry) in document.section(&section)?.iter().enumerate() {
        let spec = match StepSpec::from_value(entry) {
            Ok(spec) => spec,
            Err(error) => {
                println!("[{index}] invalid: {error}");
                problems += 1;
                continue;
            }
        };

        let registration = match registry.resolve(&spec.name) {
            Some(resolved) if resolved.deprecated_name.is_some() => format!("deprecated, use {}", resolved.name),
            Some(_) => "registered".to_string(),
            None => "not registered".to_string(),
        };
        let id = spec.id.as_deref().map(|id| format!(" id={id}")).unwrap_or_default();
        println!("[{index}] {}{id} ({registration})", spec.name);

        let mut placeholders: Vec<PlaceholderRef> = Vec::new();
        collect_placeholders_from_value(&Value::Object(spec.parameters.clone()), "parameters", &mut placeholders);
        for placeholder in placeholders {
            let namespace = match parse_reference(&placeholder.expression) {
                Some(reference) => reference.namespace(),
                None => {
                    problems += 1;
                    "malformed"
                }
            };
            println!("    {}: {{{{ {} }}}} ({namespace})", placeholder.source_path, placeholder.expression);
        }
    }

    if problems > 0 {
        bail!("section '{section}' has {problems} problem(s)");
    }
    Ok(())
}

fn list_steps(registry: &StepRegistry) {
    println!("Steps:");
    for name in registry.names() {
        let kind = registry.operation(name).map(|operation| operation.kind()).unwrap_or_default();
        println!("  {name} ({kind})");
    }
    println!("Deprecated aliases:");
    for (deprecated, target) in registry.aliases() {
        println!("  {deprecated} -> {target}");
    }
}

fn store_command(command: StoreCommand) -> Result<()> {
    let store = KeychainReferenceStore::default();
    match command {
        StoreCommand::SetVariable { name, value } => {
            store.store_variable(&name, &parse_value(&value))?;
            debug!(variable = %name, "stored variable");
            println!("Stored variable '{name}'");
        }
        StoreCommand::SetBlock {
            block_type,
            name,
            document,
        } => {
            let document: Value =
                serde_json::from_str(&document).with_context(|| format!("block document for '{block_type}/{name}' is not valid JSON"))?;
            store.store_block(&block_type, &name, &document)?;
            debug!(block_type = %block_type, block = %name, "stored block");
            println!("Stored block '{block_type}/{name}'");
        }
    }
    Ok(())
}

fn section_name(document: &PipelineDocument, requested: Option<&str>) -> Result<String> {
    match requested {
        Some(section) => Ok(section.to_string()),
        None => document
            .default_section_name()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("the document has several sections; choose one with --section")),
    }
}

/// Parse repeated `KEY=VALUE` flags into a root-view seed.
fn parse_assignments(assignments: &[String]) -> Result<JsonMap<String, Value>> {
    let mut seed = JsonMap::new();
    for assignment in assignments {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{assignment}'"))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("expected KEY=VALUE, got '{assignment}'");
        }
        seed.insert(key.to_string(), parse_value(value));
    }
    Ok(seed)
}

/// JSON when it parses, otherwise the raw text.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
