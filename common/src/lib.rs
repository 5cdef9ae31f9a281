//! Engine behind `epusync`: selective mirroring of EPU / Tomo5 session metadata
//!
//! The instrument writes its session metadata (XML files, previews, search maps, acquisition
//! logs) into one tree and the recorded movies into another, both organized by dataset. This
//! crate walks the metadata tree of every dataset and copies the parts worth keeping next to
//! the data.
//!
//! # Overview
//!
//! - [`classify`] decides, from name and type alone, what happens to each entry
//! - [`traverse`] walks a dataset and turns those decisions into directory creation and copy
//!   tasks
//! - [`queue`] carries copy tasks from the walk to a fixed pool of workers
//! - [`copy`] copies a single file
//! - [`flipnote`] records the movie format Tomo5 used next to the movies
//! - [`atlas`] finds the overview atlas through the session descriptor and copies it
//! - [`sync`] ties it together for every dataset present in both trees
//!
//! # Idempotence
//!
//! Nothing in the destination is ever overwritten. A file is queued only if its destination
//! doesn't exist yet, so re-running a sync over a partially synced tree copies only what is
//! missing. There are no retries, re-running is the retry mechanism.
//!
//! # Logging
//!
//! All modules log through `tracing`. [`run`] installs a `tracing-subscriber` formatter whose
//! level follows the `-v` count (ERROR / INFO / DEBUG / TRACE); `RUST_LOG` takes precedence
//! when set.

pub mod atlas;
pub mod classify;
pub mod config;
pub mod copy;
pub mod flipnote;
pub mod queue;
pub mod sync;
pub mod traverse;
pub mod tree;

#[cfg(test)]
mod testutils;

pub use config::{ConfigError, OutputConfig, RuntimeConfig};
pub use sync::sync;

fn log_level(output: &OutputConfig) -> tracing_subscriber::filter::LevelFilter {
    use tracing_subscriber::filter::LevelFilter;
    if output.quiet {
        return LevelFilter::OFF;
    }
    match output.verbose {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global `tracing` subscriber, can only succeed once per process.
///
/// Unit tests must not call this (or [`run`]), `#[traced_test]` needs the global slot.
fn init_logging(output: &OutputConfig) {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(log_level(output).into())
        .from_env_lossy();
    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("failed to set up logging: {error}");
    }
}

/// Runs `func` on a freshly built tokio runtime with logging set up.
///
/// Returns `None` if the runtime couldn't be created or `func` failed, the error is logged.
/// On success the summary is printed when requested (or implied by `-v`).
pub fn run<Fut, Summary, Error>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Error: std::fmt::Display,
    Fut: std::future::Future<Output = Result<Summary, Error>>,
{
    init_logging(&output);
    run_on_runtime(output, runtime, func)
}

fn run_on_runtime<Fut, Summary, Error>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Error: std::fmt::Display,
    Fut: std::future::Future<Output = Result<Summary, Error>>,
{
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let tokio_runtime = match builder.build() {
        Ok(tokio_runtime) => tokio_runtime,
        Err(error) => {
            tracing::error!("failed to create tokio runtime: {}", &error);
            return None;
        }
    };
    match tokio_runtime.block_on(func()) {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            if !output.quiet {
                tracing::error!("{}", &error);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn verbosity_maps_to_level() {
        let level = |quiet, verbose| {
            log_level(&OutputConfig {
                quiet,
                verbose,
                print_summary: false,
            })
        };
        assert_eq!(level(false, 0), LevelFilter::ERROR);
        assert_eq!(level(false, 1), LevelFilter::INFO);
        assert_eq!(level(false, 2), LevelFilter::DEBUG);
        assert_eq!(level(false, 3), LevelFilter::TRACE);
        assert_eq!(level(false, 9), LevelFilter::TRACE);
        assert_eq!(level(true, 3), LevelFilter::OFF);
    }

    #[test]
    fn runtime_returns_summary() {
        let runtime = RuntimeConfig {
            max_workers: 2,
            max_blocking_threads: 4,
        };
        let res = run_on_runtime(OutputConfig::default(), runtime, || async {
            Ok::<_, anyhow::Error>(42)
        });
        assert_eq!(res, Some(42));
    }

    #[test]
    fn runtime_reports_failure() {
        let res = run_on_runtime(OutputConfig::default(), RuntimeConfig::default(), || async {
            Err::<u32, _>(anyhow::anyhow!("boom"))
        });
        assert_eq!(res, None);
    }
}
