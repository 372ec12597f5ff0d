//! TopoForge CLI - template store front end
//!
//! Commands: list, show, create, update, delete, export, import, seed, instantiate
//! Outputs JSON to stdout, logs to stderr (RUST_LOG)
//! Returns non-zero on any failure

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use topoforge_core::{
    fingerprint, templates::decode_descriptor, InstantiationEngine, LayoutConfig, MemoryGraph,
    Position, StoreError, TemplateKind, TemplatePatch, TemplateStore,
};

#[derive(Parser)]
#[command(name = "topoforge-cli", version)]
#[command(about = "TopoForge CLI - Topology Template Store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the template store root
    #[arg(short, long, env = "TOPOFORGE_TEMPLATES_DIR", default_value = "templates")]
    templates_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List templates
    List {
        /// Only templates of this kind (node or stack)
        #[arg(short, long)]
        kind: Option<TemplateKind>,
    },

    /// Show one template
    Show { id: String },

    /// Create a template from a YAML descriptor file
    Create {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Merge a JSON object of fields into a template
    Update {
        id: String,

        #[arg(short, long)]
        payload: String,
    },

    /// Delete a template and its files
    Delete { id: String },

    /// Copy a template directory to TARGET
    Export { id: String, target: PathBuf },

    /// Import a template directory under a fresh id
    Import {
        source: PathBuf,

        #[arg(short, long)]
        name: Option<String>,
    },

    /// Seed the built-in catalog into an empty store
    Seed,

    /// Instantiate a template onto an empty in-memory graph
    Instantiate {
        id: String,

        #[arg(long, default_value_t = 0.0)]
        x: f64,

        #[arg(long, default_value_t = 0.0)]
        y: f64,

        #[arg(long)]
        nodes_per_row: Option<usize>,

        #[arg(long)]
        spacing: Option<f64>,
    },
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("failed to render output: {}", e),
    }
}

fn fail(message: impl ToString) -> ExitCode {
    print_json(&serde_json::json!({
        "success": false,
        "error": message.to_string(),
    }));
    ExitCode::FAILURE
}

fn report<T: Serialize>(result: Result<T, StoreError>) -> ExitCode {
    match result {
        Ok(value) => {
            print_json(&value);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let store = match TemplateStore::open(&cli.templates_dir) {
        Ok(store) => store,
        Err(e) => return fail(e),
    };

    match cli.command {
        Commands::List { kind } => {
            let catalog = store.catalog();
            let templates: Vec<_> = catalog
                .iter()
                .filter(|t| kind.map_or(true, |k| t.kind() == k))
                .map(|t| {
                    serde_json::json!({
                        "id": t.id,
                        "name": t.name(),
                        "kind": t.kind(),
                        "description": t.descriptor.description(),
                        "fingerprint": fingerprint(&t.descriptor).ok(),
                    })
                })
                .collect();
            print_json(&templates);
            ExitCode::SUCCESS
        }

        Commands::Show { id } => match store.get(&id) {
            Some(template) => {
                print_json(&template);
                ExitCode::SUCCESS
            }
            None => fail(StoreError::NotFound(id)),
        },

        Commands::Create { file } => {
            let text = match fs::read_to_string(&file) {
                Ok(t) => t,
                Err(e) => return fail(format!("cannot read {}: {}", file.display(), e)),
            };
            let descriptor = match decode_descriptor(&text) {
                Ok(d) => d,
                Err(e) => return fail(format!("invalid descriptor {}: {}", file.display(), e)),
            };
            report(store.create(descriptor))
        }

        Commands::Update { id, payload } => {
            let patch: TemplatePatch = match serde_json::from_str(&payload) {
                Ok(p) => p,
                Err(e) => return fail(format!("invalid payload: {}", e)),
            };
            report(store.update(&id, &patch))
        }

        Commands::Delete { id } => report(
            store
                .delete(&id)
                .map(|()| serde_json::json!({ "success": true, "deleted": id })),
        ),

        Commands::Export { id, target } => report(store.export(&id, &target).map(|()| {
            serde_json::json!({ "success": true, "exported": id, "target": target })
        })),

        Commands::Import { source, name } => report(store.import(&source, name.as_deref())),

        Commands::Seed => report(
            store
                .seed_defaults()
                .map(|count| serde_json::json!({ "success": true, "seeded": count })),
        ),

        Commands::Instantiate { id, x, y, nodes_per_row, spacing } => {
            let defaults = LayoutConfig::default();
            let engine = InstantiationEngine::with_layout(LayoutConfig {
                nodes_per_row: nodes_per_row.unwrap_or(defaults.nodes_per_row),
                spacing: spacing.unwrap_or(defaults.spacing),
            });

            let mut graph = MemoryGraph::new();
            let result =
                engine.instantiate_by_id(&store.catalog(), &id, Position::new(x, y), &mut graph);
            print_json(&serde_json::json!({
                "result": result,
                "graph": graph,
            }));
            ExitCode::SUCCESS
        }
    }
}
