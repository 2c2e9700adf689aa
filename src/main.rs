// src/main.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{bail, Context, Result};
use clap::Parser;
use fuser::mount2;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use beetfs::config::{Config, Overrides};
use beetfs::core::{Identity, InodeStore};
use beetfs::{BeetDrive, BeetFs, BeetsLibrary, Library, TreeBuilder};

/// Mount a beets library as a read-only tree of freshly tagged audio files.
#[derive(Parser, Debug)]
#[command(name = "beetfs", version, about)]
struct Args {
    /// Directory to mount on
    mountpoint: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// beets library database
    #[arg(long)]
    library: Option<PathBuf>,

    /// Path format, e.g. '$albumartist/$album/$track $title'
    #[arg(long)]
    path_format: Option<String>,

    /// File that keeps inode numbers stable across mounts
    #[arg(long)]
    inode_map: Option<PathBuf>,

    /// Let other users see the mount
    #[arg(long)]
    allow_other: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Refuse to mount over the directory holding the database: every lookup
/// would then go back through our own mount.
fn check_feedback(mountpoint: &Path, library: &Path) -> Result<()> {
    let abs_mount = std::fs::canonicalize(mountpoint)
        .with_context(|| format!("mountpoint {} is not accessible", mountpoint.display()))?;
    let abs_library = std::fs::canonicalize(library).unwrap_or_else(|_| library.to_path_buf());

    tracing::debug!("Safety Check: Mount={:?}, Library={:?}", abs_mount, abs_library);
    if abs_library.starts_with(&abs_mount) {
        bail!(
            "library {} is inside mountpoint {}",
            abs_library.display(),
            abs_mount.display()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::resolve(args.config.as_deref(), Overrides {
        library: args.library,
        path_format: args.path_format,
        inode_map: args.inode_map,
        allow_other: args.allow_other,
    })?;
    let template = config.path_template()?;

    tracing::info!("beetfs starting");
    tracing::info!("Mountpoint: {}", args.mountpoint.display());
    tracing::info!("Library: {}", config.library.display());
    tracing::info!("Path format: {}", config.path_format);

    check_feedback(&args.mountpoint, &config.library)?;

    let library: Arc<dyn Library> = Arc::new(
        BeetsLibrary::open(&config.library)
            .with_context(|| format!("cannot open {}", config.library.display()))?,
    );
    tracing::info!("✓ Library opened");

    let inodes = match &config.inode_map {
        Some(path) => InodeStore::load(path)?,
        None => InodeStore::new(),
    };
    let builder = TreeBuilder::new(template, Arc::new(inodes));
    let tree = builder.build_from(library.as_ref())?;
    tracing::info!("✓ Tree built: {} nodes", tree.len());

    if let Some(path) = &config.inode_map {
        builder.inodes().save(path)?;
        tracing::info!("✓ Inode map saved: {}", path.display());
    }

    let identity = Identity::capture();
    let options = identity.mount_options(&config.fsname, config.allow_other);
    let drive = BeetDrive::new(BeetFs::new(Arc::new(tree), library, identity));

    tracing::info!("Mounting FUSE (read-only)...");
    mount2(drive, &args.mountpoint, &options)
        .with_context(|| format!("FUSE mount on {} failed", args.mountpoint.display()))?;

    tracing::info!("beetfs shutting down...");
    Ok(())
}
