//! docfork CLI
//!
//! Reads and writes documents in a SQLite-backed docfork database,
//! resolving conflicting writes with a selectable resolver.
//!
//! # Usage
//!
//! ```bash
//! # Create a document
//! docfork --db docs.db put user:1 '{"name": "Scott"}'
//!
//! # Edit it, naming the revision the edit is based on
//! docfork --db docs.db put user:1 '{"name": "Scotty"}' --base 1-4f0c...
//!
//! # Resolve conflicts with a three-way merge
//! docfork --db docs.db --resolver merge put user:1 '{"age": 31}' --base 1-4f0c...
//!
//! # Change one nested field
//! docfork --db docs.db set user:1 address.city '"Toronto"' --base 2-9a1e...
//!
//! # Inspect
//! docfork --db docs.db get user:1
//! docfork --db docs.db get user:1 --path address.city
//! docfork --db docs.db history user:1
//!
//! # With configuration file
//! docfork --config /etc/docfork/docfork.toml get user:1
//! ```

mod config;

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use docfork_core::codec::{body_from_json, body_to_json, value_from_json, value_to_json};
use docfork_core::{
    Database, DocumentId, MutableDocument, ReadOnlyDocument, ResolverKind, RevisionId, RevisionRef,
};
use docfork_storage::SqliteStore;

use crate::config::{FileConfig, Overrides, Settings};

/// docfork - multi-master document store with pluggable conflict resolution
#[derive(Parser, Debug)]
#[command(name = "docfork")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database path
    #[arg(long, env = "DOCFORK_DB", global = true)]
    db: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, env = "DOCFORK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Conflict resolver (default, source-wins, target-wins, give-up, merge)
    #[arg(long, env = "DOCFORK_RESOLVER", global = true, value_parser = ResolverKind::from_str)]
    resolver: Option<ResolverKind>,

    /// Reject resolutions slower than this many milliseconds (0 = no limit)
    #[arg(long, env = "DOCFORK_RESOLVER_TIMEOUT_MS", global = true)]
    resolver_timeout_ms: Option<u64>,

    /// Log level or filter directives (e.g. "debug", "docfork_core=trace")
    #[arg(long, env = "DOCFORK_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save a document body given as a JSON object
    Put {
        id: String,
        json: String,
        /// Revision the edit is based on (omit to create)
        #[arg(long)]
        base: Option<String>,
    },
    /// Set one field, addressed by a path such as `address.city` or `tags[0]`
    Set {
        id: String,
        path: String,
        /// New value as JSON
        json: String,
        /// Revision the edit is based on
        #[arg(long)]
        base: String,
    },
    /// Print the current revision of a document
    Get {
        id: String,
        /// Print this revision instead of the current one
        #[arg(long)]
        rev: Option<String>,
        /// Print only the value at this path
        #[arg(long)]
        path: Option<String>,
    },
    /// Delete a document
    Delete {
        id: String,
        /// Revision the deletion is based on
        #[arg(long)]
        base: String,
    },
    /// List the revision history of a document, newest first
    History { id: String },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(
        file,
        Overrides {
            db: args.db.clone(),
            resolver: args.resolver,
            resolver_timeout_ms: args.resolver_timeout_ms,
            log_level: args.log_level.clone(),
        },
    )?;

    init_logging(&settings.log_level);

    let store = SqliteStore::new(&settings.db)
        .with_context(|| format!("opening database {}", settings.db.display()))?;
    let db = Database::with_config(store, settings.database_config());
    if let Some(resolver) = settings.resolver.into_resolver() {
        db.set_resolver(resolver);
    }
    debug!(db = %settings.db.display(), resolver = %settings.resolver, "Database opened");

    match args.command {
        Command::Put { id, json, base } => {
            let id = DocumentId::new(id)?;
            let body = body_from_json(&json)?;

            let doc = match base {
                Some(base) => {
                    let mut doc = db.get_revision(&id, &base.parse::<RevisionId>()?)?.edit();
                    doc.replace_body(body);
                    doc
                }
                None => MutableDocument::with_body(id, body),
            };
            print_document(&db.save(&doc)?)?;
        }
        Command::Set { id, path, json, base } => {
            let id = DocumentId::new(id)?;
            let value = value_from_json(&json)?;
            let mut doc = db.get_revision(&id, &base.parse::<RevisionId>()?)?.edit();
            doc.set_path(&path, value)?;
            print_document(&db.save(&doc)?)?;
        }
        Command::Get { id, rev, path } => {
            let id = DocumentId::new(id)?;
            let doc = match rev {
                Some(rev) => db.get_revision(&id, &rev.parse::<RevisionId>()?)?,
                None => db.get(&id)?,
            };
            match path {
                Some(path) => {
                    let value = doc
                        .get_path(&path)
                        .with_context(|| format!("{} has no value at {}", id, path))?;
                    println!("{}", value_to_json(value)?);
                }
                None => print_document(&doc)?,
            }
        }
        Command::Delete { id, base } => {
            let id = DocumentId::new(id)?;
            let base = lookup_revision(&db, &id, &base)?;
            print_document(&db.delete(&id, Some(&base))?)?;
        }
        Command::History { id } => {
            let id = DocumentId::new(id)?;
            for rev in db.history(&id)? {
                let marker = if rev.deleted { " (deleted)" } else { "" };
                println!("{}{}", rev, marker);
            }
        }
    }

    Ok(())
}

/// Resolve a textual revision to the stored reference, deletion flag included
fn lookup_revision(db: &Database<SqliteStore>, id: &DocumentId, rev: &str) -> Result<RevisionRef> {
    let rev: RevisionId = rev.parse()?;
    let doc = db.get_revision(id, &rev)?;
    doc.revision()
        .copied()
        .with_context(|| format!("revision {} of {} has no identity", rev, id))
}

fn print_document(doc: &ReadOnlyDocument) -> Result<()> {
    if let Some(rev) = doc.revision() {
        println!("_id: {}", doc.id());
        println!("_rev: {}", rev);
        if rev.deleted {
            println!("_deleted: true");
        }
    }
    println!("{}", body_to_json(doc.body())?);
    Ok(())
}

fn init_logging(log_level: &str) {
    FmtSubscriber::builder()
        .with_env_filter(log_filter(log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Bare levels and per-crate directives both work; anything unparsable
/// falls back to `warn`
fn log_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("warn"))
}
