//! champ CLI - Command line interface for champ_db
//!
//! Every mutating command publishes the new root of the named index before
//! it exits, so each invocation is a complete transaction.

use anyhow::Context;
use champ_db::model::key_label;
use champ_db::{ChampConfig, Database, DiffEntry, Hash, KeyHashing};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "champ")]
#[command(about = "A content-addressed CHAMP index with compare-and-swap updates")]
#[command(version)]
struct Cli {
    /// Path to the database file
    #[arg(short, long, default_value = "index.champ")]
    database: PathBuf,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum KeyHashingArg {
    Blake3,
    Identity,
}

impl From<KeyHashingArg> for KeyHashing {
    fn from(arg: KeyHashingArg) -> Self {
        match arg {
            KeyHashingArg::Blake3 => KeyHashing::Blake3,
            KeyHashingArg::Identity => KeyHashing::Identity,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new database
    Init {
        /// Digest bits consumed per trie level (1-8)
        #[arg(long, default_value_t = champ_db::DEFAULT_BIT_WIDTH)]
        bit_width: u8,
        /// How keys are digested
        #[arg(long, value_enum, default_value = "blake3")]
        key_hashing: KeyHashingArg,
    },

    /// Store a value under a key
    Put {
        /// Index name
        index: String,
        /// The key
        key: String,
        /// The value
        value: String,
        /// Value hash the key must currently map to, or "absent"
        ///
        /// Without this flag the current value is used, so the write wins
        /// unless another writer publishes first.
        #[arg(long)]
        expect: Option<String>,
    },

    /// Look up a key
    Get {
        /// Index name
        index: String,
        /// The key
        key: String,
    },

    /// Remove a key
    Remove {
        /// Index name
        index: String,
        /// The key
        key: String,
        /// Value hash the key must currently map to
        #[arg(long)]
        expect: Option<String>,
    },

    /// Count the keys in an index
    Size {
        /// Index name
        index: String,
    },

    /// List every key in an index
    List {
        /// Index name
        index: String,
        /// Maximum number of entries to return
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List all named indexes
    Roots,

    /// Start a new index at the current root of another
    Fork {
        /// Source index
        from: String,
        /// New index name
        to: String,
    },

    /// Show the changes between two versions (index names or root hashes)
    Diff {
        from: String,
        to: String,
    },

    /// Merge a divergent version into an index
    Merge {
        /// Index to merge into
        index: String,
        /// Common ancestor (index name or root hash)
        #[arg(long)]
        ancestor: String,
        /// Version to merge (index name or root hash)
        #[arg(long)]
        remote: String,
    },

    /// Show database status
    Status,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            bit_width,
            key_hashing,
        } => {
            let config = ChampConfig::default()
                .with_bit_width(bit_width)
                .with_key_hashing(key_hashing.into());
            let db = Database::create_with_config(&cli.database, config)?;
            db.sync()?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Created database at {}", cli.database.display())
                }),
            )?;
        }

        Commands::Put {
            index,
            key,
            value,
            expect,
        } => {
            let db = open_db(&cli.database)?;
            let expected = match expect {
                Some(expect) => parse_expect(&expect)?,
                None => db.get(&index, key.as_bytes())?,
            };
            let value_hash = db.put_value(value.as_bytes())?;
            let root = db.put(&index, key.as_bytes(), expected, value_hash)?;
            db.sync()?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "index": index,
                    "key": key,
                    "hash": value_hash.to_hex(),
                    "root": root.to_hex()
                }),
            )?;
        }

        Commands::Get { index, key } => {
            let db = open_db(&cli.database)?;
            match db.get(&index, key.as_bytes())? {
                Some(hash) => {
                    let value = db
                        .get_value(&hash)?
                        .with_context(|| format!("Value block {} is missing", hash))?;
                    output(
                        &cli.format,
                        &serde_json::json!({
                            "key": key,
                            "hash": hash.to_hex(),
                            "value": String::from_utf8_lossy(&value)
                        }),
                    )?;
                }
                None => {
                    output(
                        &cli.format,
                        &serde_json::json!({
                            "error": "not_found",
                            "key": key
                        }),
                    )?;
                    std::process::exit(1);
                }
            }
        }

        Commands::Remove { index, key, expect } => {
            let db = open_db(&cli.database)?;
            let expected = match expect {
                Some(expect) => parse_expect(&expect)?,
                None => db.get(&index, key.as_bytes())?,
            };
            let root = db.remove(&index, key.as_bytes(), expected)?;
            db.sync()?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "index": index,
                    "key": key,
                    "root": root.to_hex()
                }),
            )?;
        }

        Commands::Size { index } => {
            let db = open_db(&cli.database)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "index": index,
                    "size": db.size(&index)?
                }),
            )?;
        }

        Commands::List { index, limit } => {
            let db = open_db(&cli.database)?;
            let entries = db.entries(&index)?;
            let items: Vec<_> = entries
                .iter()
                .take(limit.unwrap_or(usize::MAX))
                .map(|(key, hash)| {
                    serde_json::json!({
                        "key": key_label(key),
                        "hash": hash.to_hex()
                    })
                })
                .collect();
            output(
                &cli.format,
                &serde_json::json!({
                    "count": entries.len(),
                    "entries": items
                }),
            )?;
        }

        Commands::Roots => {
            let db = open_db(&cli.database)?;
            let items: Vec<_> = db
                .roots()
                .iter()
                .map(|(name, hash)| {
                    serde_json::json!({
                        "name": name,
                        "root": hash.to_hex()
                    })
                })
                .collect();
            output(&cli.format, &serde_json::json!({ "roots": items }))?;
        }

        Commands::Fork { from, to } => {
            let db = open_db(&cli.database)?;
            let root = db.fork(&from, &to)?;
            db.sync()?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "index": to,
                    "root": root.to_hex()
                }),
            )?;
        }

        Commands::Diff { from, to } => {
            let db = open_db(&cli.database)?;
            let from_hash = resolve_ref(&db, &from)?;
            let to_hash = resolve_ref(&db, &to)?;

            let diff = db.diff(from_hash, to_hash)?;
            let entries: Vec<_> = diff
                .entries
                .iter()
                .map(|e| match e {
                    DiffEntry::Added { key, new_hash } => {
                        serde_json::json!({
                            "type": "added",
                            "key": key_label(key),
                            "hash": new_hash.to_hex()
                        })
                    }
                    DiffEntry::Removed { key, old_hash } => {
                        serde_json::json!({
                            "type": "removed",
                            "key": key_label(key),
                            "hash": old_hash.to_hex()
                        })
                    }
                    DiffEntry::Modified {
                        key,
                        old_hash,
                        new_hash,
                    } => {
                        serde_json::json!({
                            "type": "modified",
                            "key": key_label(key),
                            "old_hash": old_hash.to_hex(),
                            "new_hash": new_hash.to_hex()
                        })
                    }
                })
                .collect();
            output(
                &cli.format,
                &serde_json::json!({
                    "from": from_hash.to_hex(),
                    "to": to_hash.to_hex(),
                    "added": diff.added_count(),
                    "removed": diff.removed_count(),
                    "modified": diff.modified_count(),
                    "entries": entries
                }),
            )?;
        }

        Commands::Merge {
            index,
            ancestor,
            remote,
        } => {
            let db = open_db(&cli.database)?;
            let ancestor = resolve_ref(&db, &ancestor)?;
            let remote = resolve_ref(&db, &remote)?;
            let root = db.merge(&index, ancestor, remote)?;
            db.sync()?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "index": index,
                    "root": root.to_hex()
                }),
            )?;
        }

        Commands::Status => {
            let db = open_db(&cli.database)?;
            let mut status = serde_json::to_value(db.status())?;
            status["database"] = serde_json::json!(cli.database.display().to_string());
            output(&cli.format, &status)?;
        }
    }

    Ok(())
}

fn open_db(path: &Path) -> anyhow::Result<Database> {
    Database::open_or_create(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))
}

fn output(format: &OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

/// Parse an `--expect` argument: a value hash, or "absent"
fn parse_expect(expect: &str) -> anyhow::Result<Option<Hash>> {
    if expect == "absent" {
        return Ok(None);
    }
    Ok(Some(expect.parse::<Hash>()?))
}

/// Resolve an index name or a hex root hash
fn resolve_ref(db: &Database, reference: &str) -> anyhow::Result<Hash> {
    if let Some(root) = db.root(reference) {
        return Ok(root);
    }
    reference
        .parse::<Hash>()
        .map_err(|_| anyhow::anyhow!("Invalid reference: {}", reference))
}
