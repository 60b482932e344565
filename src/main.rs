use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

use portal_obras::media::ImageFile;
use portal_obras::state::reconciler::BootstrapSource;
use portal_obras::{FormInput, Portal, PortalConfig, Record};

/// Image extensions picked up from `--extras-dir`
const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff"];

/// Command-line options
#[derive(Parser)]
#[command(name = "portal-obras", version)]
struct Cli {
    /// Path to a config.json (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Skip the remote store and work from the local cache
    #[arg(long)]
    offline: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load records and print the filtered view
    List {
        #[arg(long, default_value = "all")]
        year: String,
        #[arg(long, default_value = "all")]
        status: String,
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Print the start years present in the list
    Years,
    /// Create or edit a record and upload it
    Save(SaveArgs),
}

#[derive(clap::Args)]
struct SaveArgs {
    /// Existing record id to edit; omit to create
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    engineer: String,
    #[arg(long, default_value = "")]
    location: String,
    #[arg(long, default_value = "")]
    start_date: String,
    #[arg(long, default_value = "")]
    end_date: String,
    #[arg(long, default_value = "Em andamento")]
    status: String,
    #[arg(long, default_value = "0")]
    completion: String,
    /// Primary photo (required when creating)
    #[arg(long)]
    cover: Option<PathBuf>,
    /// Additional photos
    #[arg(long = "extra")]
    extras: Vec<PathBuf>,
    /// Folder scanned recursively for additional photos
    #[arg(long)]
    extras_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = PortalConfig::load(cli.config.as_deref()).context("loading config")?;
    if cli.offline {
        config.endpoint.url.clear();
    }

    let mut portal = Portal::from_config(&config);
    match portal.bootstrap().await {
        BootstrapSource::Remote => info!("☁️  Using remote list"),
        BootstrapSource::Cache => info!("💾 Using local cache"),
    }

    match cli.command {
        Command::List {
            year,
            status,
            query,
        } => {
            let view = portal.apply_filters(&year, &status, &query);
            if view.is_empty() {
                println!("No records match.");
            }
            for (position, record) in view.iter().enumerate() {
                print_record(position, record);
            }
        }
        Command::Years => {
            for year in portal.reconciler().year_options() {
                println!("{year}");
            }
        }
        Command::Save(args) => {
            let form = build_form(args)?;
            let report = portal.save_form(form).await?;
            println!("{} {}", if report.created { "Created" } else { "Updated" }, report.id);
            if report.upload.ok() && report.refreshed {
                println!("✅ Synced with the remote store");
            } else if report.upload.ok() {
                println!("✅ Uploaded, but the list could not be reloaded; showing local copies");
            } else if report.should_warn_user() {
                println!("⚠️  Saved locally. Could not sync with the remote store right now.");
            }
        }
    }

    Ok(())
}

fn print_record(position: usize, record: &Record) {
    println!(
        "[{position}] {} • {}% • {} — {} ({}) {} → {} [{} photos]",
        if record.title.is_empty() { "Sem título" } else { record.title.as_str() },
        record.completion,
        if record.status.is_empty() { "—" } else { record.status.as_str() },
        if record.engineer.is_empty() { "—" } else { record.engineer.as_str() },
        if record.location.is_empty() { "—" } else { record.location.as_str() },
        if record.start_date.is_empty() { "—" } else { record.start_date.as_str() },
        record.end_date.as_deref().unwrap_or("—"),
        record.photos.len(),
    );
}

fn build_form(args: SaveArgs) -> anyhow::Result<FormInput> {
    if args.id.is_none() && args.cover.is_none() {
        bail!("select the primary photo with --cover");
    }

    let cover_file = args
        .cover
        .as_deref()
        .map(|path| ImageFile::from_path(path).with_context(|| format!("reading {}", path.display())))
        .transpose()?;

    let mut paths = args.extras;
    if let Some(dir) = &args.extras_dir {
        paths.extend(collect_images(dir));
    }
    let mut extra_files = Vec::with_capacity(paths.len());
    for path in &paths {
        extra_files.push(
            ImageFile::from_path(path).with_context(|| format!("reading {}", path.display()))?,
        );
    }

    Ok(FormInput {
        editing_id: args.id,
        title: args.title,
        engineer: args.engineer,
        location: args.location,
        start_date: args.start_date,
        end_date: args.end_date,
        status: args.status,
        completion: args.completion,
        cover_file,
        extra_files,
    })
}

/// Walk a folder and return image files in a stable order
fn collect_images(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_string_lossy().to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    found.sort();

    if found.is_empty() {
        warn!("No images found in {}", dir.display());
    } else {
        info!("🔍 Found {} images in {}", found.len(), dir.display());
    }
    found
}
