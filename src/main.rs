//! covmap-patcher - Rewrites source path prefixes in Mach-O coverage maps.
//!
//! Patches the `__llvm_covmap` section of an object file in place so coverage
//! reports produced elsewhere resolve against local sources.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use covmap_patcher::macho::{SECT_LLVM_COVMAP, SEG_DATA};
use covmap_patcher::{list_paths, patch_file, PatchOptions, PrefixMap};

/// Rewrites source path prefixes in Mach-O LLVM coverage maps.
#[derive(Parser, Debug)]
#[command(name = "covmap-patcher")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Mach-O object file to patch in place
    object_file: PathBuf,

    /// Path prefix to replace
    #[arg(required_unless_present_any = ["prefix_map", "list"])]
    old_prefix: Option<String>,

    /// Replacement prefix, no longer than OLD_PREFIX
    #[arg(required_unless_present_any = ["prefix_map", "list"])]
    new_prefix: Option<String>,

    /// File of sed-style `,old,new,` rules (the first character is the delimiter)
    #[arg(short = 'm', long)]
    prefix_map: Option<PathBuf>,

    /// Segment holding the coverage map
    #[arg(long, default_value = SEG_DATA)]
    segment: String,

    /// Coverage map section
    #[arg(long, default_value = SECT_LLVM_COVMAP)]
    section: String,

    /// Report how many paths would change without writing
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Print the embedded paths instead of patching
    #[arg(short, long, conflicts_with = "dry_run")]
    list: bool,

    /// Verbosity level (0=error, 1=warn, 2=info, 3=debug, 4=trace)
    #[arg(short, long, default_value = "1")]
    verbosity: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbosity);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            let code = err
                .downcast_ref::<covmap_patcher::Error>()
                .map_or(1, covmap_patcher::Error::exit_code);
            ExitCode::from(code)
        }
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

fn prefixes(cli: &Cli) -> Result<PrefixMap> {
    let mut prefixes = match &cli.prefix_map {
        Some(path) => PrefixMap::load(path)
            .with_context(|| format!("Failed to load prefix map: {}", path.display()))?,
        None => PrefixMap::new(),
    };
    if let (Some(old), Some(new)) = (&cli.old_prefix, &cli.new_prefix) {
        prefixes.insert(old.as_str(), new.as_str())?;
    }
    Ok(prefixes)
}

fn run(cli: Cli) -> Result<()> {
    let start = Instant::now();

    let options = PatchOptions::new(prefixes(&cli)?)
        .with_section(cli.segment.as_str(), cli.section.as_str())
        .with_dry_run(cli.dry_run);

    if cli.list {
        let listing = list_paths(&cli.object_file, &options)
            .with_context(|| format!("Failed to read: {}", cli.object_file.display()))?;
        for arch in listing {
            println!("{} ({}):", arch.width, arch.arch);
            match arch.paths {
                Some(paths) => {
                    for path in paths.iter().filter(|p| !p.iter().all(|&b| b == 0)) {
                        println!("  {}", String::from_utf8_lossy(path));
                    }
                }
                None => println!("  no {},{} section", options.segment, options.section),
            }
        }
        return Ok(());
    }

    info!("Patching {}", cli.object_file.display());
    let report = patch_file(&cli.object_file, &options)
        .with_context(|| format!("Failed to patch: {}", cli.object_file.display()))?;

    info!(
        "{} {} paths in {:.2}s",
        if options.dry_run { "Would patch" } else { "Patched" },
        report.total_patched(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
