//! Command-line interface for strata.
//!
//! Inspection and maintenance of an artifact store: list executions, print
//! provenance trees, follow references, browse template history, and move
//! executions between stores as JSONL.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

use crate::config;
use crate::core::{export, hashing::short_hash, ArtifactService, ArtifactTree};
use crate::domain::{Artifact, ArtifactKey};
use crate::store::SqliteArtifactStore;

/// strata - content-deduplicating provenance store for agent runs
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database file (overrides the config file)
    #[arg(long, global = true, env = "STRATA_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List executions started recently
    Executions {
        /// How many days back to look
        #[arg(short, long, default_value = "7")]
        days: i64,

        /// Maximum number of executions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print the provenance tree of an execution, or one branch of it
    Tree {
        /// Execution key, or any artifact key to print only its branch
        key: String,

        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one artifact
    Show {
        /// Artifact key
        key: String,

        /// Follow a reference to the canonical content
        #[arg(short, long)]
        resolve: bool,
    },

    /// List template names
    Templates,

    /// Show every stored version of a template, newest first
    History {
        /// Template name
        name: String,
    },

    /// Show store statistics
    Stats,

    /// Export an execution as JSONL
    Export {
        /// Execution key
        execution_key: String,

        /// Output file (defaults to $STRATA_HOME/exports/<key>.jsonl)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a JSONL export
    Import {
        /// Export file
        path: PathBuf,
    },

    /// Delete an execution from the store
    Delete {
        /// Execution key
        execution_key: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let db = self.db;
        match self.command {
            Commands::Executions { days, limit } => list_executions(db, days, limit).await,
            Commands::Tree { key, json } => show_tree(db, &key, json).await,
            Commands::Show { key, resolve } => show_artifact(db, &key, resolve).await,
            Commands::Templates => list_templates(db).await,
            Commands::History { name } => show_history(db, &name).await,
            Commands::Stats => show_stats(db).await,
            Commands::Export {
                execution_key,
                output,
            } => export_execution(db, &execution_key, output).await,
            Commands::Import { path } => import_file(db, &path).await,
            Commands::Delete { execution_key } => delete_execution(db, &execution_key).await,
            Commands::Config => show_config(db).await,
        }
    }
}

/// Open the configured store, or the one given with --db
fn open_service(db: Option<PathBuf>) -> Result<ArtifactService> {
    let cfg = config::config()?;
    let path = db.unwrap_or_else(|| cfg.database.clone());

    let store = SqliteArtifactStore::open(&path, &cfg.store)
        .with_context(|| format!("Failed to open artifact store: {}", path.display()))?;
    Ok(ArtifactService::new(Arc::new(store)))
}

fn parse_key(value: &str) -> Result<ArtifactKey> {
    ArtifactKey::parse(value).with_context(|| format!("Invalid artifact key: {}", value))
}

/// One-line description of an artifact for listings
fn describe(artifact: &Artifact) -> String {
    match artifact {
        Artifact::Execution(e) => format!("run {} ({:?})", e.run_id, e.status),
        Artifact::Group(g) => format!("{:?} {}", g.kind, g.name),
        Artifact::Prompt(p) => format!("{:?}: {}", p.role, truncate(&p.text, 60)),
        Artifact::ToolCall(t) => format!("{}({})", t.tool_name, truncate(&t.arguments.to_string(), 50)),
        Artifact::AgentResult(r) => {
            let outcome = if r.success { "ok" } else { "failed" };
            format!("{} [{}]: {}", r.agent, outcome, truncate(&r.output, 50))
        }
        Artifact::Event(e) => e.name.clone(),
        Artifact::Evidence(e) => format!("{}: {}", e.source, truncate(&e.excerpt, 50)),
        Artifact::ConfigSnapshot(c) => c.name.clone(),
        Artifact::Template(t) => format!("{} v{}", t.name, t.version),
        Artifact::Reference(r) => format!("-> {} ({})", r.canonical_key, r.target_type),
        Artifact::TemplateReference(t) => format!("{} v{} -> {}", t.name, t.version, t.canonical_key),
    }
}

fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > max || line.len() < text.len() {
        let cut: String = line.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

fn print_tree(tree: &ArtifactTree, indent: usize) {
    let artifact = &tree.artifact;
    // UUIDv7 segments share their leading timestamp bits, so show the tail
    let segment = artifact.key().as_str();
    let tail = segment.get(segment.len().saturating_sub(12)..).unwrap_or(segment);
    println!(
        "{}{:<18} {}  {}",
        "  ".repeat(indent),
        artifact.artifact_type().as_str(),
        tail,
        describe(artifact)
    );
    for child in &tree.children {
        print_tree(child, indent + 1);
    }
}

/// List recent executions
async fn list_executions(db: Option<PathBuf>, days: i64, limit: usize) -> Result<()> {
    let service = open_service(db)?;
    let to = Utc::now();
    let from = to - Duration::days(days);

    let executions = service.list_executions(from, to)?;
    if executions.is_empty() {
        println!("No executions in the last {} days", days);
        return Ok(());
    }

    println!("{:<34} {:<26} {:<20}", "EXECUTION", "STARTED", "RUN");
    println!("{}", "-".repeat(80));

    // Newest first
    for artifact in executions.iter().rev().take(limit) {
        if let Artifact::Execution(e) = artifact {
            println!(
                "{:<34} {:<26} {:<20}",
                e.key.as_str(),
                e.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                e.run_id
            );
        }
    }

    Ok(())
}

/// Print a stored execution tree, or the branch below one artifact
async fn show_tree(db: Option<PathBuf>, key: &str, json: bool) -> Result<()> {
    let service = open_service(db)?;
    let key = parse_key(key)?;

    let tree = if key.is_root() {
        service.load_execution_tree(&key)?
    } else {
        service.load_subtree(&key)?
    };
    let tree = tree.with_context(|| format!("Artifact not found: {}", key))?;

    if json {
        let artifacts: Vec<&Artifact> = flatten(&tree);
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
    } else {
        print_tree(&tree, 0);
        println!("\n{} artifacts", tree.size());
    }

    Ok(())
}

fn flatten(tree: &ArtifactTree) -> Vec<&Artifact> {
    let mut out = vec![&tree.artifact];
    for child in &tree.children {
        out.extend(flatten(child));
    }
    out
}

/// Show one artifact and where its content is reused
async fn show_artifact(db: Option<PathBuf>, key: &str, resolve: bool) -> Result<()> {
    let service = open_service(db)?;
    let key = parse_key(key)?;

    let artifact = if resolve {
        service.resolve(&key)?
    } else {
        service.load_artifact(&key)?
    };
    let artifact = artifact.with_context(|| format!("Artifact not found or unreadable: {}", key))?;

    println!("{}", serde_json::to_string_pretty(&artifact)?);
    println!("\nExecution: {}", artifact.key().root());

    let usages = service.usages(artifact.key())?;
    if !usages.is_empty() {
        println!("\nReused at {} other keys:", usages.len());
        for usage in usages {
            println!("  {}", usage);
        }
    }

    Ok(())
}

async fn list_templates(db: Option<PathBuf>) -> Result<()> {
    let service = open_service(db)?;
    let names = service.template_names()?;

    if names.is_empty() {
        println!("No templates stored");
        return Ok(());
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

/// Show the version history of one template
async fn show_history(db: Option<PathBuf>, name: &str) -> Result<()> {
    let service = open_service(db)?;
    let versions = service.template_history(name)?;

    if versions.is_empty() {
        println!("No history for template '{}'", name);
        return Ok(());
    }

    println!("{:<8} {:<14} {:<10} {}", "VERSION", "HASH", "STORED", "KEY");
    println!("{}", "-".repeat(80));
    for artifact in &versions {
        let (version, stored) = match artifact {
            Artifact::Template(t) => (t.version, "full"),
            Artifact::TemplateReference(t) => (t.version, "reference"),
            _ => continue,
        };
        println!(
            "{:<8} {:<14} {:<10} {}",
            version,
            short_hash(artifact.content_hash().unwrap_or_default()),
            stored,
            artifact.key()
        );
    }

    Ok(())
}

async fn show_stats(db: Option<PathBuf>) -> Result<()> {
    let service = open_service(db)?;
    let stats = service.stats()?;

    println!("Executions:     {}", stats.executions);
    println!("Rows:           {}", stats.total_rows);
    println!("  Canonical:    {}", stats.canonical_rows);
    println!("  References:   {}", stats.reference_rows);
    println!("Payload bytes:  {}", stats.payload_bytes);

    Ok(())
}

async fn export_execution(
    db: Option<PathBuf>,
    execution_key: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let service = open_service(db)?;
    let key = parse_key(execution_key)?;

    let path = match output {
        Some(path) => path,
        None => config::exports_dir()?.join(format!("{}.jsonl", key)),
    };

    let rows = export::export_execution(&service, &key, &path).await?;
    if rows == 0 {
        anyhow::bail!("Execution not found: {}", execution_key);
    }

    eprintln!("Exported {} rows to {}", rows, path.display());
    Ok(())
}

async fn import_file(db: Option<PathBuf>, path: &Path) -> Result<()> {
    let service = open_service(db)?;
    let report = export::import_entities(&service, path).await?;

    eprintln!(
        "Imported {} rows ({} already present, {} stored as references)",
        report.imported, report.skipped, report.demoted
    );
    Ok(())
}

async fn delete_execution(db: Option<PathBuf>, execution_key: &str) -> Result<()> {
    let service = open_service(db)?;
    let key = parse_key(execution_key)?;

    let removed = service.delete_execution(&key)?;
    if removed == 0 {
        anyhow::bail!("Execution not found: {}", execution_key);
    }

    eprintln!("Deleted {} rows", removed);
    Ok(())
}

async fn show_config(db: Option<PathBuf>) -> Result<()> {
    let cfg = config::config()?;

    println!("Config file: {}", cfg.config_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none - using defaults)".to_string()));
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", db.as_ref().unwrap_or(&cfg.database).display());
    println!("  Exports:  {}", config::exports_dir()?.display());
    println!();
    println!("Store:");
    println!("  Busy timeout: {}ms", cfg.store.busy_timeout_ms);
    println!("  WAL:          {}", cfg.store.wal);

    Ok(())
}
