#![forbid(unsafe_code)]

//! Operator CLI: add and remove videos, rebuild and publish the site.

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use clipsite_tools::{
    config::{DEFAULT_ENV_PATH, RuntimeOverrides, resolve_site_runtime},
    embed_cache::EmbedCache,
    init_tracing,
    package::Export,
    record::VideoDraft,
    site::{RegenerateOptions, RegenerateOutcome, Site, init_env, legacy_source},
    source::{DirSource, HttpSource, PageSource},
};

#[derive(Parser, Debug)]
#[command(name = "clipsite")]
#[command(about = "Maintain and publish a static video listing site")]
#[command(version)]
struct Cli {
    /// Path of the .env file to read settings from
    #[arg(long, default_value = DEFAULT_ENV_PATH, global = true)]
    env_file: PathBuf,

    /// Published site directory (overrides SITE_ROOT)
    #[arg(long, global = true)]
    site_root: Option<PathBuf>,

    /// Record directory (overrides CONTENT_ROOT)
    #[arg(long, global = true)]
    content_root: Option<PathBuf>,

    /// Videos per listing page (overrides CLIPSITE_PAGE_SIZE)
    #[arg(long, global = true)]
    page_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct OutputArgs {
    /// Also bundle the generated pages into this tar archive
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Compress the archive with xz
    #[arg(long, requires = "archive")]
    xz: bool,

    /// Remove detail pages that no longer belong to any video
    #[arg(long)]
    prune_stale: bool,
}

impl From<OutputArgs> for RegenerateOptions {
    fn from(args: OutputArgs) -> Self {
        Self {
            archive: args.archive,
            xz: args.xz,
            prune_stale: args.prune_stale,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a video and republish
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// Comma-separated tags
        #[arg(long)]
        tags: String,
        /// Thumbnail URL
        #[arg(long)]
        thumbnail: String,
        /// Player embed markup
        #[arg(long)]
        embed: String,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Delete videos by id and republish
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Delete every video whose embed cannot be recovered
    PruneMissingEmbeds {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show the working set
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Import videos from already-published pages
    ImportLegacy {
        /// Read pages from this URL instead of the configured source
        #[arg(long, conflicts_with = "from_dir")]
        from_url: Option<String>,
        /// Read pages from this directory instead of the configured source
        #[arg(long)]
        from_dir: Option<PathBuf>,
    },

    /// Rebuild every page and publish
    Regenerate {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Write SITE_ROOT (and CONTENT_ROOT) into the .env file
    Init {
        /// Published site directory
        #[arg(value_name = "SITE_ROOT")]
        site_dir: PathBuf,
        /// Record directory, if not <SITE_ROOT>/content
        #[arg(value_name = "CONTENT_ROOT")]
        content_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_tracing("info");
    let cli = Cli::parse();

    if let Commands::Init {
        site_dir,
        content_dir,
    } = &cli.command
    {
        init_env(&cli.env_file, site_dir, content_dir.as_deref())?;
        println!("Wrote site settings to {}", cli.env_file.display());
        return Ok(());
    }

    let runtime = resolve_site_runtime(RuntimeOverrides {
        site_root: cli.site_root.clone(),
        content_root: cli.content_root.clone(),
        page_size: cli.page_size,
        env_path: Some(cli.env_file.clone()),
        ..RuntimeOverrides::default()
    })?;
    let site = Site::open(&runtime, Arc::new(EmbedCache::new()))?;

    match cli.command {
        Commands::Add {
            title,
            description,
            tags,
            thumbnail,
            embed,
            output,
        } => {
            let draft = VideoDraft {
                title,
                description,
                tags,
                thumbnail,
                embed,
            };
            let (record, outcome) = site.add(draft, Utc::now(), &output.into())?;
            println!("Added {} ({})", record.title, record.id);
            print_outcome(&outcome);
        }
        Commands::Delete { ids, output } => {
            let outcome = site.delete(&ids, &output.into())?;
            for id in &outcome.removed {
                println!("Deleted {id}");
            }
            for id in &outcome.unknown {
                println!("Not found: {id}");
            }
            print_outcome(&outcome.regenerated);
        }
        Commands::PruneMissingEmbeds { output } => {
            let outcome = site.prune_missing_embeds(&output.into())?;
            if outcome.removed.is_empty() {
                println!("No videos without an embed.");
            } else {
                println!(
                    "Deleted {} video(s) without an embed: {}",
                    outcome.removed.len(),
                    outcome.removed.join(", ")
                );
            }
            print_outcome(&outcome.regenerated);
        }
        Commands::List { json } => {
            let videos = site.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&videos)?);
            } else {
                for video in &videos {
                    let marker = if video.missing_embed { "  [missing embed]" } else { "" };
                    println!(
                        "{}  {:<40} videos/{}{}",
                        video.created.format("%Y-%m-%d"),
                        video.id,
                        video.file_name,
                        marker
                    );
                }
                println!("{} video(s)", videos.len());
            }
        }
        Commands::ImportLegacy { from_url, from_dir } => {
            let source: Box<dyn PageSource> = match (from_url, from_dir) {
                (Some(url), _) => Box::new(HttpSource::new(&url)),
                (None, Some(dir)) => Box::new(DirSource::new(dir)),
                (None, None) => legacy_source(&runtime.settings, &runtime.site_root),
            };
            println!("Importing from {}", source.describe());
            let report = site.import_legacy(source.as_ref(), Utc::now())?;
            println!(
                "Imported {} video(s), {} already stored, {} without an embed",
                report.imported.len(),
                report.already_stored.len(),
                report.reconcile.missing.len()
            );
            for id in &report.reconcile.missing {
                println!("  missing embed: {id}");
            }
        }
        Commands::Regenerate { output } => {
            let outcome = site.regenerate(&output.into())?;
            print_outcome(&outcome);
        }
        Commands::Init { .. } => {}
    }

    Ok(())
}

fn print_outcome(outcome: &RegenerateOutcome) {
    println!(
        "Generated {} listing page(s) and {} detail page(s)",
        outcome.listing_pages, outcome.detail_pages
    );
    println!(
        "Published: {} written, {} unchanged, {} removed",
        outcome.publish.written.len(),
        outcome.publish.unchanged.len(),
        outcome.publish.removed.len()
    );
    if outcome.filled_embeds > 0 {
        println!("Recovered {} embed(s)", outcome.filled_embeds);
    }
    if !outcome.missing_embeds.is_empty() {
        println!(
            "Missing embeds ({}): {}",
            outcome.missing_embeds.len(),
            outcome.missing_embeds.join(", ")
        );
    }
    match &outcome.export {
        Some(Export::Archive(path)) => println!("Archive: {}", path.display()),
        Some(Export::Files { dir, count }) => {
            println!("Archive failed; wrote {count} file(s) to {}", dir.display())
        }
        None => {}
    }
}
