use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tubefeed::config::{user_config_dir, Config, LoadedConfig, SYSTEM_CONFIG_DIR};
use tubefeed::download::CommandDownloader;
use tubefeed::feed::HttpFeedSource;
use tubefeed::storage::{Database, DatabaseError, Item, SessionEnd};
use tubefeed::sync::{ChannelSummary, SyncEngine, SyncOptions, SyncReport};
use tubefeed::util::{pad_to_width, truncate_to_width};

const NAME_WIDTH: usize = 30;
const TITLE_WIDTH: usize = 50;

#[derive(Parser, Debug)]
#[command(name = "tubefeed", version, about = "Follow channel feeds and download new videos")]
struct Args {
    /// Use this config file instead of searching the default locations
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a channel by its web page URL
    Subscribe {
        url: String,
        /// Do not download new items from this channel automatically
        #[arg(long)]
        no_autodownload: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Subscribe to a channel by its channel id
    SubscribeId {
        channel_id: String,
        #[arg(long)]
        no_autodownload: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Check every channel for new items
    Update {
        /// Show what would happen without saving anything
        #[arg(long)]
        dry_run: bool,
        /// Record new items without downloading any of them
        #[arg(long)]
        no_download: bool,
    },
    /// List subscribed channels
    Channels,
    /// List stored items, newest first
    Items {
        /// Only items of this channel (id, url, or name)
        #[arg(long, value_name = "REF")]
        channel: Option<String>,
        #[arg(long, value_name = "N")]
        limit: Option<i64>,
    },
    /// Remove a channel and its items
    Unsubscribe {
        channel: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Turn a channel's automatic downloads on or off
    Autodownload {
        channel: String,
        state: Toggle,
        #[arg(long)]
        dry_run: bool,
    },
    /// Download a single item by id
    Download {
        item_id: String,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let loaded = Config::resolve(
        args.config.as_deref(),
        user_config_dir,
        Path::new(SYSTEM_CONFIG_DIR),
    )
    .context("Failed to load configuration")?;
    if let Some(path) = &loaded.created {
        println!("Config file created in {}", path.display());
    }
    if loaded.user_dir.as_ref() == Some(&loaded.base_dir) {
        restrict_permissions(&loaded.base_dir);
    }
    let LoadedConfig {
        config, base_dir, ..
    } = loaded;

    let db_path = config.database_path(&base_dir);
    let db = open_database(&db_path).await?;

    let source = HttpFeedSource::new(&config).context("Failed to build HTTP client")?;
    let downloader = CommandDownloader::new(&config.download);
    let engine = SyncEngine::new(
        db,
        Arc::new(source),
        Arc::new(downloader),
        config.poll_concurrency(),
    );

    match args.command {
        Command::Subscribe {
            url,
            no_autodownload,
            dry_run,
        } => {
            let sub = engine.subscribe_url(&url, !no_autodownload, dry_run).await?;
            print_subscription(&sub.channel.name, &sub.channel.id, sub.items, sub.end);
        }
        Command::SubscribeId {
            channel_id,
            no_autodownload,
            dry_run,
        } => {
            let sub = engine
                .subscribe_id(&channel_id, !no_autodownload, dry_run)
                .await?;
            print_subscription(&sub.channel.name, &sub.channel.id, sub.items, sub.end);
        }
        Command::Update {
            dry_run,
            no_download,
        } => {
            let report = engine
                .update(SyncOptions {
                    dry_run,
                    download_enabled: !no_download,
                })
                .await?;
            print_report(&report);
        }
        Command::Channels => {
            print_channels(&engine.list_channels().await?);
        }
        Command::Items { channel, limit } => {
            print_items(&engine.list_items(channel.as_deref(), limit).await?);
        }
        Command::Unsubscribe { channel, dry_run } => {
            let removed = engine.unsubscribe(&channel, dry_run).await?;
            println!(
                "{} {} ({} items)",
                verb(removed.end, "Unsubscribed from", "Would unsubscribe from"),
                removed.channel.name,
                removed.items_removed
            );
        }
        Command::Autodownload {
            channel,
            state,
            dry_run,
        } => {
            let enabled = matches!(state, Toggle::On);
            let (channel, end) = engine.set_autodownload(&channel, enabled, dry_run).await?;
            println!(
                "{} autodownload {} for {}",
                verb(end, "Turned", "Would turn"),
                if enabled { "on" } else { "off" },
                channel.name
            );
        }
        Command::Download { item_id, dry_run } => {
            let (item, end) = engine.download_item(&item_id, dry_run).await?;
            println!(
                "{} {}",
                verb(end, "Downloaded", "Would download"),
                item.title
            );
        }
    }

    Ok(())
}

async fn open_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(e @ DatabaseError::Locked) => Err(e.into()),
        Err(e) => Err(anyhow::anyhow!("Failed to open database {}: {}", path.display(), e)),
    }
}

// The database holds the subscription list; keep it private to the user
fn restrict_permissions(dir: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(dir, perms) {
                    tracing::warn!(path = %dir.display(), error = %e, "Failed to set config directory permissions to 0700");
                }
            }
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to read config directory metadata");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

fn verb(end: SessionEnd, done: &'static str, would: &'static str) -> &'static str {
    if end.is_committed() {
        done
    } else {
        would
    }
}

fn print_subscription(name: &str, id: &str, items: usize, end: SessionEnd) {
    println!(
        "{} {} ({}), {} existing items marked as downloaded",
        verb(end, "Subscribed to", "Would subscribe to"),
        name,
        id,
        items
    );
}

fn print_report(report: &SyncReport) {
    let dry_run = !report.end.is_committed();

    for failure in &report.failures {
        eprintln!(
            "Failed to update {} ({}): {}",
            failure.channel_name, failure.channel_id, failure.error
        );
    }

    for item in &report.new_items {
        let prefix = if dry_run { "Would be added" } else { "New" };
        let downloaded = match (&item.download_error, item.downloaded) {
            (Some(e), _) => format!("  [download failed: {e}]"),
            (None, true) => "  [downloaded]".to_string(),
            (None, false) => String::new(),
        };
        println!(
            "{prefix}: {}  {}  {}{downloaded}",
            pad_to_width(&truncate_to_width(&item.channel_name, NAME_WIDTH), NAME_WIDTH),
            pad_to_width(&truncate_to_width(&item.title, TITLE_WIDTH), TITLE_WIDTH),
            item.url
        );
    }

    let summary = format!(
        "{} new items, {} downloaded, {} channels failed",
        report.new_items.len(),
        report.downloads(),
        report.failures.len()
    );
    if dry_run {
        println!("Dry run: {summary} (nothing saved, {} would be added)", report.new_items.len());
    } else {
        println!("{summary}");
    }
}

fn print_channels(channels: &[ChannelSummary]) {
    if channels.is_empty() {
        println!("No channels. Add one with `tubefeed subscribe <URL>`.");
        return;
    }
    for summary in channels {
        let channel = &summary.channel;
        println!(
            "{}  {}  {}  {:>5}  {}",
            channel.id,
            pad_to_width(&truncate_to_width(&channel.name, NAME_WIDTH), NAME_WIDTH),
            if channel.autodownload { "auto  " } else { "manual" },
            summary.items,
            channel.url
        );
    }
}

fn print_items(items: &[Item]) {
    for item in items {
        println!(
            "{}  {}  {}  {}  {}",
            item.published.format("%Y-%m-%d"),
            if item.downloaded { "*" } else { " " },
            item.id,
            pad_to_width(&truncate_to_width(&item.title, TITLE_WIDTH), TITLE_WIDTH),
            item.url
        );
    }
}
