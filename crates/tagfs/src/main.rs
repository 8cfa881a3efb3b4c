//! # tagfs CLI
//!
//! Command-line interface for tagfs, a virtual filesystem of tags.
//!
//! Files are tagged from the command line and browsed through a FUSE mount
//! where every tag is a directory.
//!
//! ## Commands
//!
//! - `tagfs init [PATH]` - Create an empty database
//! - `tagfs tag <FILE> <TAG[=VALUE]>...` - Tag a file
//! - `tagfs imply <TAG[=VALUE]> <TAG[=VALUE]>` - Add an implication
//! - `tagfs tags [FILE]` - List tags, or the tags of a file
//! - `tagfs files <QUERY>` - List files matching a query
//! - `tagfs mount <MOUNTPOINT>` - Mount as FUSE filesystem
//!
//! ## Examples
//!
//! ```bash
//! tagfs init
//! tagfs tag beach.jpg photo holiday year=2019
//! tagfs imply cat animal
//! tagfs files "photo and year > 2018"
//! tagfs mount ~/tags
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use daemonize::Daemonize;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tagfs_core::{FileSort, TagValuePair};
use tagfs_fuse::{TagFs, Vfs};
use tagfs_imply::{REPOSITORY_DIR, Storage, Tx};
use tagfs_store::MemoryStore;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

mod config;

use config::{Config, cache_dir, data_dir, find_repository};

#[derive(Parser)]
#[command(name = "tagfs")]
#[command(about = "Browse files through a virtual filesystem of tags")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/tagfs/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file
    #[arg(short, long, global = true, env = "TAGFS_DB")]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty database
    Init {
        /// Database file (default: ./.tagfs/db.json)
        path: Option<PathBuf>,
    },

    /// Mount the tag filesystem
    Mount {
        /// Mount point
        mountpoint: PathBuf,

        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,

        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,
    },

    /// Apply tags to a file
    Tag {
        /// File to tag
        file: PathBuf,

        /// Tags to apply, as TAG or TAG=VALUE
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Add an implication: applying the first tag also applies the second
    Imply {
        /// Implying tag, as TAG or TAG=VALUE
        implying: String,

        /// Implied tag, as TAG or TAG=VALUE
        implied: String,
    },

    /// List all tags, or the tags of a file
    Tags {
        /// File whose tags to list
        file: Option<PathBuf>,
    },

    /// List files matching a query
    Files {
        /// Query text
        query: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// One tag of a file.
#[derive(Serialize)]
struct FileTagItem {
    tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    explicit: bool,
    implicit: bool,
}

impl FileTagItem {
    fn label(&self) -> String {
        let mut label = self.tag.clone();
        if let Some(value) = &self.value {
            label.push('=');
            label.push_str(value);
        }
        if !self.explicit {
            label.push_str(" (implied)");
        }
        label
    }
}

/// Split `tag=value`.
fn split_pair(text: &str) -> (&str, Option<&str>) {
    match text.split_once('=') {
        Some((tag, value)) => (tag, Some(value)),
        None => (text, None),
    }
}

/// Hash-derived name for files belonging to one mount point.
fn mount_key(mountpoint: &Path) -> String {
    let hash = blake3::hash(mountpoint.to_string_lossy().as_bytes());
    hash.to_hex()[..16].to_string()
}

/// Get the PID file path for a mount.
///
/// Uses `$XDG_RUNTIME_DIR/tagfs/` if available, otherwise falls back to
/// `$XDG_CACHE_HOME/tagfs/run/`.
fn get_pid_path(mountpoint: &Path) -> Result<PathBuf> {
    let key = mount_key(mountpoint);

    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        let dir = PathBuf::from(runtime_dir).join("tagfs");
        std::fs::create_dir_all(&dir).ok();
        return Ok(dir.join(format!("{key}.pid")));
    }

    let dir = cache_dir()
        .context("Failed to get cache directory")?
        .join("run");
    std::fs::create_dir_all(&dir).context("Failed to create PID directory")?;
    Ok(dir.join(format!("{key}.pid")))
}

/// Get the log file path for daemon output.
fn get_log_path(mountpoint: &Path) -> Result<PathBuf> {
    let dir = cache_dir()
        .context("Failed to get cache directory")?
        .join("logs");
    std::fs::create_dir_all(&dir).context("Failed to create log directory")?;
    Ok(dir.join(format!("{}.log", mount_key(mountpoint))))
}

/// Where the database is, and whether it may be created on first use.
///
/// `--database` or `$TAGFS_DB`, then the config file, then the nearest
/// `.tagfs/db.json`, then `<data dir>/default.json`.
fn resolve_database(cli_database: Option<PathBuf>, config: &Config) -> Result<(PathBuf, bool)> {
    if let Some(path) = cli_database.or_else(|| config.database.path.clone()) {
        return Ok((path, false));
    }

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    if let Some(path) = find_repository(&cwd) {
        return Ok((path, false));
    }

    let data = data_dir().context("Failed to get data directory")?;
    Ok((data.join("default.json"), true))
}

async fn open_storage(path: &Path, create_if_missing: bool) -> Result<Storage> {
    let store = if path.exists() {
        MemoryStore::open(path)
            .await
            .with_context(|| format!("Failed to open database {}", path.display()))?
    } else if create_if_missing {
        info!("Creating database {}", path.display());
        MemoryStore::create(path)
            .await
            .with_context(|| format!("Failed to create database {}", path.display()))?
    } else {
        anyhow::bail!(
            "Database not found: {}. Run 'tagfs init' first.",
            path.display()
        );
    };
    Ok(Storage::new(Arc::new(store)))
}

async fn resolve_pair(
    tx: &mut Tx,
    text: &str,
    settings: &tagfs_core::Settings,
) -> Result<TagValuePair> {
    let (tag, value) = split_pair(text);
    tx.resolve_pair(tag, value, settings)
        .await
        .with_context(|| format!("Cannot use '{text}'"))
}

async fn tag_file(storage: &Storage, file: &Path, tags: &[String]) -> Result<()> {
    let path = file
        .canonicalize()
        .with_context(|| format!("No such file: {}", file.display()))?;
    let metadata = std::fs::metadata(&path)?;
    let mod_time: DateTime<Utc> = metadata.modified()?.into();

    let mut tx = storage.begin().await?;
    let settings = tx.settings().await?;
    let record = match tx.file_by_path(&path).await? {
        Some(record) => record,
        None => {
            tx.add_file(&path, mod_time, metadata.len(), metadata.is_dir())
                .await?
        }
    };

    let mut pairs = Vec::with_capacity(tags.len());
    for text in tags {
        pairs.push(resolve_pair(&mut tx, text, &settings).await?);
    }
    let applied = tx.apply_tags(record.id, &pairs).await?;
    tx.commit().await?;

    info!(
        "Applied {} of {} tags to {}",
        applied.len(),
        pairs.len(),
        path.display()
    );
    Ok(())
}

async fn add_implication(storage: &Storage, implying: &str, implied: &str) -> Result<()> {
    let mut tx = storage.begin().await?;
    let settings = tx.settings().await?;
    let implying_pair = resolve_pair(&mut tx, implying, &settings).await?;
    let implied_pair = resolve_pair(&mut tx, implied, &settings).await?;

    tx.add_implication(implying_pair, implied_pair)
        .await
        .with_context(|| format!("Cannot add '{implying} => {implied}'"))?;
    tx.commit().await?;
    info!("{} now implies {}", implying, implied);
    Ok(())
}

async fn list_tags(storage: &Storage, file: Option<&Path>) -> Result<Vec<FileTagItem>> {
    let mut tx = storage.begin_read().await?;

    let Some(file) = file else {
        return Ok(tx
            .tags()
            .await?
            .into_iter()
            .map(|tag| FileTagItem {
                tag: tag.name,
                value: None,
                explicit: true,
                implicit: false,
            })
            .collect());
    };

    let path = file
        .canonicalize()
        .with_context(|| format!("No such file: {}", file.display()))?;
    let record = tx
        .file_by_path(&path)
        .await?
        .with_context(|| format!("{} is not tagged", path.display()))?;

    let mut items = Vec::new();
    for file_tag in tx.file_tags_by_file_id(record.id, false).await? {
        let Some(tag) = tx.tag(file_tag.tag_id).await? else {
            continue;
        };
        let value = if file_tag.value_id.is_none() {
            None
        } else {
            tx.value(file_tag.value_id).await?.map(|v| v.name)
        };
        items.push(FileTagItem {
            tag: tag.name,
            value,
            explicit: file_tag.explicit,
            implicit: file_tag.implicit,
        });
    }
    items.sort_by_key(FileTagItem::label);
    Ok(items)
}

async fn list_files(storage: &Storage, query: &str) -> Result<Vec<PathBuf>> {
    let expression = tagfs_query::parse(query).context("Invalid query")?;
    let mut tx = storage.begin_read().await?;
    let files = tx
        .files_for_query(&expression, None, false, false, FileSort::Name)
        .await?;
    Ok(files.iter().map(tagfs_core::File::path).collect())
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

fn mount(
    database: &Path,
    create_if_missing: bool,
    mountpoint: &Path,
    foreground: bool,
    allow_other: bool,
) -> Result<()> {
    if !mountpoint.exists() {
        anyhow::bail!("Mount point does not exist: {}", mountpoint.display());
    }
    let mountpoint = mountpoint.canonicalize()?;
    let database = std::path::absolute(database)?;
    info!("Mounting {:?} at {:?}", database, mountpoint);

    let mut options = vec![
        fuser::MountOption::FSName("tagfs".to_string()),
        fuser::MountOption::AutoUnmount,
    ];
    if allow_other {
        options.push(fuser::MountOption::AllowOther);
    }

    if foreground {
        info!("Running in foreground (Ctrl+C to unmount)");
    } else {
        // Daemonize before any runtime threads exist
        let pid_path = get_pid_path(&mountpoint)?;
        let log_path = get_log_path(&mountpoint)?;

        println!("Mounting in background...");
        println!("PID file: {}", pid_path.display());
        println!("Log file: {}", log_path.display());
        println!("Try: ls {}/tags", mountpoint.display());
        println!("Unmount: fusermount -u {}", mountpoint.display());

        let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
        let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

        Daemonize::new()
            .pid_file(&pid_path)
            .chown_pid_file(true)
            .working_directory("/")
            .stdout(stdout)
            .stderr(stderr)
            .start()
            .map_err(|e| anyhow::anyhow!("Failed to daemonize: {e}"))?;
    }

    let runtime = build_runtime()?;
    let storage = runtime.block_on(open_storage(&database, create_if_missing))?;
    let vfs = Arc::new(Vfs::new(storage.clone(), &mountpoint));
    let fs = TagFs::new(vfs, runtime.handle().clone());

    fuser::mount2(fs, &mountpoint, &options)?;

    runtime
        .block_on(storage.close())
        .context("Failed to close database")?;
    info!("Unmounted {:?}", mountpoint);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        Config::load_from(Some(path.clone()))
            .context(format!("Failed to load config from {}", path.display()))?
    } else {
        Config::load().context("Failed to load config")?
    };

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.logging.level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Init { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(REPOSITORY_DIR).join("db.json"));
            build_runtime()?.block_on(async {
                MemoryStore::create(&path)
                    .await
                    .with_context(|| format!("Failed to create {}", path.display()))
            })?;
            println!("Created {}", path.display());
        }
        Commands::Mount {
            mountpoint,
            foreground,
            allow_other,
        } => {
            let (database, create) = resolve_database(cli.database, &config)?;
            mount(
                &database,
                create,
                &mountpoint,
                foreground,
                allow_other || config.mount.allow_other,
            )?;
        }
        Commands::Tag { file, tags } => {
            let (database, create) = resolve_database(cli.database, &config)?;
            build_runtime()?.block_on(async {
                let storage = open_storage(&database, create).await?;
                tag_file(&storage, &file, &tags).await?;
                storage.close().await?;
                Ok::<_, anyhow::Error>(())
            })?;
        }
        Commands::Imply { implying, implied } => {
            let (database, create) = resolve_database(cli.database, &config)?;
            build_runtime()?.block_on(async {
                let storage = open_storage(&database, create).await?;
                add_implication(&storage, &implying, &implied).await?;
                storage.close().await?;
                Ok::<_, anyhow::Error>(())
            })?;
        }
        Commands::Tags { file } => {
            let (database, create) = resolve_database(cli.database, &config)?;
            let items = build_runtime()?.block_on(async {
                let storage = open_storage(&database, create).await?;
                list_tags(&storage, file.as_deref()).await
            })?;

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
                OutputFormat::Text => {
                    for item in &items {
                        println!("{}", item.label());
                    }
                }
            }
        }
        Commands::Files { query } => {
            let (database, create) = resolve_database(cli.database, &config)?;
            let files = build_runtime()?.block_on(async {
                let storage = open_storage(&database, create).await?;
                list_files(&storage, &query).await
            })?;

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&files)?),
                OutputFormat::Text => {
                    for path in &files {
                        println!("{}", path.display());
                    }
                }
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&config)
                            .context("Failed to serialize config")?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "{}",
                        toml::to_string_pretty(&config).context("Failed to serialize config")?
                    );
                }
            },
            ConfigAction::Init => {
                println!("{}", Config::sample_toml());
            }
            ConfigAction::Path => {
                if let Some(path) = Config::config_path() {
                    println!("{}", path.display());
                } else {
                    println!("Could not determine config directory");
                }
            }
        },
    }

    Ok(())
}
