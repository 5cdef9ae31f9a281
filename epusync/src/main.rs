use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "epusync",
    version,
    about = "Mirror EPU/Tomo5 session metadata into dataset directories",
    long_about = "`epusync` copies the metadata EPU and Tomo5 write for each dataset (XML files, \
search maps, acquisition logs, the overview atlas) next to the recorded movies.

Only datasets present under both the output and the metadata directory are synced. Preview \
directories are skipped and existing files are never overwritten, so re-running picks up \
where the previous run stopped.

EXAMPLE:
    # Sync metadata for all datasets, copying atlases from the mounted EPU drive
    epusync -o /data/session -i /epu/metadata/session -a /mnt/epu --summary"
)]
struct Args {
    // Sync options
    /// Directory holding one subdirectory per dataset, metadata is copied into it
    #[arg(short = 'o', long = "output", value_name = "DIR", help_heading = "Sync options")]
    output: std::path::PathBuf,

    /// Directory EPU / Tomo5 write the session metadata to, one subdirectory per dataset
    #[arg(short = 'i', long = "input", value_name = "DIR", help_heading = "Sync options")]
    input: std::path::PathBuf,

    /// Local mount of the drive holding the atlases
    ///
    /// When given, the atlas named in each dataset's session descriptor is copied into the
    /// dataset directory. The reference recorded by EPU is a Windows path, its drive letter
    /// is replaced by this directory.
    #[arg(short = 'a', long = "atlas", value_name = "DIR", help_heading = "Sync options")]
    atlas: Option<std::path::PathBuf>,

    /// Stop at the first dataset that fails
    #[arg(short = 'e', long = "fail-early", help_heading = "Sync options")]
    fail_early: bool,

    // Progress & output
    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Performance
    /// Number of concurrent file copies
    #[arg(
        long,
        default_value_t = common::queue::DEFAULT_WORKERS,
        value_name = "N",
        help_heading = "Performance"
    )]
    workers: usize,

    /// Number of copy tasks that can wait for a worker before the traversal blocks
    #[arg(
        long,
        default_value_t = common::queue::DEFAULT_QUEUE_CAPACITY,
        value_name = "N",
        help_heading = "Performance"
    )]
    queue_capacity: usize,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,
}

struct Roots {
    output: std::path::PathBuf,
    metadata: std::path::PathBuf,
}

fn validate(args: &Args) -> Result<(Roots, common::sync::Settings), common::ConfigError> {
    let roots = Roots {
        output: common::config::resolve_root("-o", &args.output)?,
        metadata: common::config::resolve_root("-i", &args.input)?,
    };
    let settings = common::sync::Settings {
        workers: args.workers,
        queue_capacity: args.queue_capacity,
        atlas_mount: args.atlas.clone(),
        fail_early: args.fail_early,
        ..Default::default()
    };
    settings.validate()?;
    Ok((roots, settings))
}

#[instrument(skip(roots, settings))]
async fn async_main(
    roots: Roots,
    settings: common::sync::Settings,
    print_summary: bool,
) -> Result<common::sync::Summary> {
    let cancel = tokio_util::sync::CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, waiting for copies in flight to finish");
                cancel.cancel();
            }
        })
    };
    let res = common::sync(&roots.output, &roots.metadata, &settings, cancel).await;
    interrupt.abort();
    match res {
        Ok(summary) => Ok(summary),
        Err(error) => {
            if print_summary {
                return Err(anyhow!("{}\n\n{}", error, &error.summary));
            }
            Err(anyhow!("{}", error))
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (roots, settings) = match validate(&args) {
        Ok(validated) => validated,
        Err(error) => {
            if !args.quiet {
                eprintln!("epusync: {error}");
            }
            std::process::exit(1);
        }
    };
    let print_summary = args.summary || args.verbose > 0;
    let func = || async_main(roots, settings, print_summary);
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let res = common::run(output, runtime, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
