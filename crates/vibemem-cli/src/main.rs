//! vibemem - Universal memory for AI coding tools
//!
//! The `vibemem` command keeps a token-budgeted project memory and syncs it
//! into the instruction files AI coding tools read.
//!
//! ## Commands
//!
//! - `init`: Create a project (or global) memory store
//! - `add` / `forget`: Record or remove a memory item
//! - `show` / `stats`: Inspect the store
//! - `sync`: Write compressed memory into each tool's artifact
//! - `context`: Preview what would be loaded for a query
//! - `learn`: Extract memories from a conversation log

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use vibemem_core::config::{global_root, project_root};
use vibemem_core::extract::{self, LlmExtractor};
use vibemem_core::obs::StoreSpan;
use vibemem_core::telemetry;
use vibemem_core::{
    initialize_layout, open_or_initialize, refresh_store_artifacts, sync_pool, Config, MemoryItem,
    MemoryStore, Priority, RelevanceScorer, SyncEngine, Tokenizer, Tool,
};

const PREVIEW_CHARS: usize = 60;

#[derive(Parser)]
#[command(name = "vibemem")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Universal memory layer for AI coding tools", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize vibemem in the current project or globally
    Init {
        /// Initialize global memory instead of project
        #[arg(long)]
        global: bool,
    },

    /// Add a memory item
    ///
    /// Categories: arch, gotcha, api, cred, style, error, platform, or
    /// custom. Use `category:sub` for a subcategory.
    Add {
        /// Category, optionally `category:subcategory`
        category: String,

        /// The fact to remember
        content: String,

        /// critical, normal or low
        #[arg(short, long, default_value = "normal")]
        priority: Priority,

        /// Add to global memory
        #[arg(long)]
        global: bool,
    },

    /// Show current memory
    Show {
        /// Filter by category
        #[arg(short, long)]
        category: Option<String>,

        /// Show global memory
        #[arg(long)]
        global: bool,
    },

    /// Sync memory into each AI tool's instruction file
    Sync {
        /// Tools to sync (default: detected tools, else claude-code)
        #[arg(short, long = "tools")]
        tools: Vec<Tool>,

        /// Show what would be synced without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove a memory item by id or content match
    Forget {
        /// Item id or a substring of its content
        item: String,

        /// Remove from global memory
        #[arg(long)]
        global: bool,
    },

    /// Preview what memory would be loaded for a query
    Context {
        query: String,
    },

    /// Extract memories from a conversation log or session file
    Learn {
        /// Plain-text transcript or JSON session
        file: PathBuf,

        /// Model used for LLM extraction (default: from config)
        #[arg(short, long)]
        model: Option<String>,

        /// Pattern extraction only
        #[arg(long)]
        no_llm: bool,

        /// Add without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Show memory statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = telemetry::level_for(cli.verbose);
    telemetry::init_tracing(cli.json, level);

    let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
    let tokenizer = Arc::new(Tokenizer::new());

    match cli.command {
        Commands::Init { global } => cmd_init(&cwd, global, tokenizer),
        Commands::Add {
            category,
            content,
            priority,
            global,
        } => cmd_add(&cwd, global, &category, &content, priority, tokenizer),
        Commands::Show { category, global } => {
            cmd_show(&cwd, global, category.as_deref(), tokenizer)
        }
        Commands::Sync { tools, dry_run } => cmd_sync(&cwd, &tools, dry_run, tokenizer),
        Commands::Forget { item, global } => cmd_forget(&cwd, global, &item, tokenizer),
        Commands::Context { query } => cmd_context(&cwd, &query, tokenizer),
        Commands::Learn {
            file,
            model,
            no_llm,
            yes,
        } => cmd_learn(&cwd, &file, model.as_deref(), no_llm, yes, tokenizer).await,
        Commands::Stats => cmd_stats(&cwd, tokenizer),
    }
}

fn store_root(cwd: &Path, global: bool) -> Result<PathBuf> {
    if global {
        Ok(global_root()?)
    } else {
        Ok(project_root(cwd))
    }
}

/// Open the selected store, laying it out on first use the same way `init`
/// does.
fn open_store(
    cwd: &Path,
    global: bool,
    tokenizer: Arc<Tokenizer>,
    config: &Config,
) -> Result<MemoryStore> {
    let root = store_root(cwd, global)?;
    open_or_initialize(&root, tokenizer, config)
        .with_context(|| format!("Failed to open store at {:?}", root))
}

/// The global store, if one has been initialized. Read-only commands never
/// create it.
fn existing_global(tokenizer: Arc<Tokenizer>) -> Result<Option<MemoryStore>> {
    let Ok(root) = global_root() else {
        return Ok(None);
    };
    if !root.join(MemoryStore::MEMORY_FILE).exists() {
        return Ok(None);
    }
    let store = MemoryStore::load(&root, tokenizer)
        .with_context(|| format!("Failed to load global store at {:?}", root))?;
    Ok(Some(store))
}

/// Persist the snapshot and regenerate `hot.md` / `index.md`.
fn commit(store: &MemoryStore, config: &Config) -> Result<()> {
    store.save().context("Failed to save memory store")?;
    refresh_store_artifacts(store, config).context("Failed to refresh store artifacts")?;
    Ok(())
}

fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let head: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

fn category_label(item: &MemoryItem) -> String {
    match item.subcategory() {
        Some(sub) => format!("{}:{}", item.category(), sub),
        None => item.category().to_string(),
    }
}

/// Initialize a project or global store
fn cmd_init(cwd: &Path, global: bool, tokenizer: Arc<Tokenizer>) -> Result<()> {
    let root = store_root(cwd, global)?;
    let _span = StoreSpan::enter(&root);
    let scope = if global { "global" } else { "project" };

    if root.join(MemoryStore::MEMORY_FILE).exists() {
        println!("vibemem already initialized at {:?}", root);
        return Ok(());
    }

    let config = Config::load(cwd)?;
    initialize_layout(&root, tokenizer, &config)
        .with_context(|| format!("Failed to initialize store at {:?}", root))?;

    println!("Initialized {} vibemem at {:?}", scope, root);
    println!();
    println!("Next steps:");
    println!("  vibemem add arch 'Your architecture overview'");
    println!("  vibemem add gotcha 'Something to remember'");
    println!("  vibemem sync");
    Ok(())
}

/// Add one memory item
fn cmd_add(
    cwd: &Path,
    global: bool,
    category: &str,
    content: &str,
    priority: Priority,
    tokenizer: Arc<Tokenizer>,
) -> Result<()> {
    let config = Config::load(cwd)?;
    let mut store = open_store(cwd, global, tokenizer, &config)?;
    let _span = StoreSpan::enter(store.root());

    let item = store.add(category, content, priority)?;
    commit(&store, &config)?;

    println!(
        "Added to {} ({} tokens) [{}]",
        category_label(&item),
        item.token_count(),
        item.id()
    );
    Ok(())
}

/// List items, newest first
fn cmd_show(cwd: &Path, global: bool, category: Option<&str>, tokenizer: Arc<Tokenizer>) -> Result<()> {
    let config = Config::load(cwd)?;
    let store = open_store(cwd, global, tokenizer, &config)?;
    let _span = StoreSpan::enter(store.root());

    println!("vibemem{}", if global { " (global)" } else { "" });
    println!();
    let items = store.list(category);
    if items.is_empty() {
        println!("  (no memories)");
    }
    for item in &items {
        println!(
            "  {}  {:<14} {:<8} {:>6}  {}",
            item.id(),
            category_label(item),
            item.priority(),
            item.token_count(),
            preview(item.content())
        );
    }
    println!();
    println!("Total: {} tokens", store.total_tokens());
    Ok(())
}

/// Write compressed artifacts for each selected tool
fn cmd_sync(cwd: &Path, tools: &[Tool], dry_run: bool, tokenizer: Arc<Tokenizer>) -> Result<()> {
    let config = Config::load(cwd)?;
    let project = open_store(cwd, false, Arc::clone(&tokenizer), &config)?;
    let _span = StoreSpan::enter(project.root());
    let global = existing_global(Arc::clone(&tokenizer))?;

    let pool = sync_pool(&project, global.as_ref(), &config);
    debug!(items = pool.len(), "sync pool assembled");

    let engine = SyncEngine::new(cwd, config, tokenizer);
    let reports = engine.sync(&pool, tools, dry_run);

    if dry_run {
        println!("Dry run - no files written");
        println!();
    }

    let mut failed = 0;
    for report in &reports {
        let status = if report.success() { "ok" } else { "FAILED" };
        println!(
            "[{}] {}: {:?} ({} tokens)",
            status,
            report.tool,
            report.path,
            report.tokens
        );
        if report.compressed {
            println!("  Compressed from {} tokens", report.original_tokens);
        }
        if let Some(err) = &report.error {
            println!("  {}", err);
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} tools failed to sync", failed, reports.len());
    }
    Ok(())
}

/// Remove the first item matching an id or content substring
fn cmd_forget(cwd: &Path, global: bool, needle: &str, tokenizer: Arc<Tokenizer>) -> Result<()> {
    let config = Config::load(cwd)?;
    let mut store = open_store(cwd, global, tokenizer, &config)?;
    let _span = StoreSpan::enter(store.root());

    match store.remove(needle) {
        Some(removed) => {
            commit(&store, &config)?;
            println!("Removed: {}", preview(removed.content()));
        }
        None => println!("No matching item found"),
    }
    Ok(())
}

/// Show the project and global items a query would pull in
fn cmd_context(cwd: &Path, query: &str, tokenizer: Arc<Tokenizer>) -> Result<()> {
    let config = Config::load(cwd)?;
    let project = open_store(cwd, false, Arc::clone(&tokenizer), &config)?;
    let _span = StoreSpan::enter(project.root());
    let global = existing_global(tokenizer)?;

    let scorer = RelevanceScorer::default();
    let mut relevant = scorer.rank(query, project.items());
    if let Some(global) = &global {
        relevant.extend(scorer.rank(query, global.items()));
    }

    println!("Query: {}", query);
    println!();
    println!("Would load:");
    for scored in &relevant {
        println!(
            "  - [{}] {} (score {})",
            scored.item.category(),
            preview(scored.item.content()),
            scored.score
        );
    }

    let total: usize = relevant.iter().map(|s| s.item.token_count()).sum();
    println!();
    println!("Total context: {} tokens", total);
    Ok(())
}

/// Extract candidate memories from a transcript and optionally add them
async fn cmd_learn(
    cwd: &Path,
    file: &Path,
    model: Option<&str>,
    no_llm: bool,
    yes: bool,
    tokenizer: Arc<Tokenizer>,
) -> Result<()> {
    let config = Config::load(cwd)?;
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read transcript: {:?}", file))?;

    println!("Analyzing {:?}...", file);

    let llm = if no_llm || !config.extraction.use_llm {
        None
    } else {
        let model = model.unwrap_or(&config.extraction.model);
        let llm = LlmExtractor::from_env(model);
        if llm.is_none() {
            debug!("no llm api key set; using pattern extraction only");
        }
        llm
    };

    let candidates = extract::extract(&raw, llm.as_ref()).await;
    if candidates.is_empty() {
        println!("No new memories extracted");
        return Ok(());
    }

    println!();
    println!("Found {} potential memories:", candidates.len());
    println!();
    for (i, candidate) in candidates.iter().enumerate() {
        println!("{}. [{}] {}", i + 1, candidate.category, candidate.content);
    }
    println!();

    let accepted = yes
        || dialoguer::Confirm::new()
            .with_prompt("Add these to memory?")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
    if !accepted {
        println!("Nothing added");
        return Ok(());
    }

    let mut store = open_store(cwd, false, tokenizer, &config)?;
    let _span = StoreSpan::enter(store.root());
    let mut added = 0;
    for candidate in &candidates {
        store.add(&candidate.category, &candidate.content, candidate.priority)?;
        added += 1;
    }
    commit(&store, &config)?;

    println!("Added {} memories", added);
    Ok(())
}

/// Token totals and configured budgets
fn cmd_stats(cwd: &Path, tokenizer: Arc<Tokenizer>) -> Result<()> {
    let config = Config::load(cwd)?;
    let project = open_store(cwd, false, Arc::clone(&tokenizer), &config)?;
    let _span = StoreSpan::enter(project.root());
    let global = existing_global(tokenizer)?;

    let (global_len, global_tokens) = global
        .as_ref()
        .map_or((0, 0), |g| (g.len(), g.total_tokens()));

    println!("Memory Statistics");
    println!();
    println!("Project memories: {} ({} tokens)", project.len(), project.total_tokens());
    println!("Global memories: {} ({} tokens)", global_len, global_tokens);
    println!("Combined: {} tokens", project.total_tokens() + global_tokens);

    println!();
    println!("Categories:");
    for (category, agg) in project.aggregates() {
        if agg.count() > 0 {
            println!("  {}: {} items ({} tokens)", category, agg.count(), agg.tokens());
        }
    }

    println!();
    println!("Token Budgets:");
    for (tool, budget) in &config.token_budgets {
        println!("  {}: {} tokens", tool, budget);
    }
    Ok(())
}
