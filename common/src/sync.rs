use anyhow::{Context, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::atlas;
use crate::classify::Rules;
use crate::config::ConfigError;
use crate::queue::{self, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS, QueueError};
use crate::traverse::{self, Dataset};

/// Error type for a sync run that preserves the summary of the work done before failing.
///
/// # Logging Convention
/// The Display implementation shows the full error chain:
/// ```ignore
/// tracing::error!("sync failed: {}", &error);
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    #[source]
    pub source: anyhow::Error,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(source: anyhow::Error, summary: Summary) -> Self {
        Error { source, summary }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Number of concurrent copy workers.
    pub workers: usize,
    /// Number of copy tasks that can wait in the queue.
    pub queue_capacity: usize,
    /// Local mount of the drive EPU writes atlases to, enables the atlas step.
    pub atlas_mount: Option<std::path::PathBuf>,
    /// Cancel the whole run on the first dataset that fails.
    pub fail_early: bool,
    pub rules: Rules,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            atlas_mount: None,
            fail_early: false,
            rules: Rules::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Zero("number of copy workers"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue capacity"));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub datasets_synced: usize,
    pub datasets_failed: usize,
    pub atlases_copied: usize,
    pub atlas_errors: usize,
    pub traverse: traverse::Summary,
    pub copy: queue::Summary,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            datasets_synced: self.datasets_synced + other.datasets_synced,
            datasets_failed: self.datasets_failed + other.datasets_failed,
            atlases_copied: self.atlases_copied + other.atlases_copied,
            atlas_errors: self.atlas_errors + other.atlas_errors,
            traverse: self.traverse + other.traverse,
            copy: self.copy + other.copy,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "datasets synced: {}\n\
            datasets failed: {}\n\
            atlas files copied: {}\n\
            atlas errors: {}\n\
            {}{}",
            self.datasets_synced,
            self.datasets_failed,
            self.atlases_copied,
            self.atlas_errors,
            &self.traverse,
            &self.copy,
        )
    }
}

/// Pairs every directory under `output_root` with the same-named directory under
/// `metadata_root`. Entries present on one side only are ignored.
pub async fn find_datasets(
    output_root: &std::path::Path,
    metadata_root: &std::path::Path,
) -> anyhow::Result<Vec<Dataset>> {
    let mut entries = tokio::fs::read_dir(output_root)
        .await
        .with_context(|| format!("cannot open output directory {output_root:?} for reading"))?;
    let mut datasets = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing output directory {output_root:?}"))?
    {
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("failed reading file type of {:?}", entry.path()))?;
        if !file_type.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let source = metadata_root.join(&file_name);
        match tokio::fs::metadata(&source).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => continue,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => continue,
            Err(error) => {
                tracing::warn!("skipping {:?}: {}", &source, &error);
                continue;
            }
        }
        datasets.push(Dataset {
            name: file_name.to_string_lossy().into_owned(),
            source,
            destination: entry.path(),
        });
    }
    datasets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(datasets)
}

/// Syncs metadata from `metadata_root` into the datasets under `output_root`.
///
/// One queue and worker pool serve the whole run. A dataset that fails to traverse is
/// logged and the run moves on to the next one (unless `fail_early` is set); the first such
/// failure is returned once all queued copies are done. Failing to list `output_root` is
/// fatal, as are invalid `settings`. Cancelling `cancel` stops the run: no new copies are
/// started, copies in flight finish.
#[instrument(skip(settings, cancel))]
pub async fn sync(
    output_root: &std::path::Path,
    metadata_root: &std::path::Path,
    settings: &Settings,
    cancel: CancellationToken,
) -> Result<Summary, Error> {
    settings
        .validate()
        .map_err(|error| Error::new(anyhow::Error::new(error), Summary::default()))?;
    let (task_queue, pool) =
        queue::spawn(settings.workers, settings.queue_capacity, cancel.clone());
    let mut summary = Summary::default();
    let res = sync_datasets(
        output_root,
        metadata_root,
        settings,
        &task_queue,
        &cancel,
        &mut summary,
    )
    .await;
    task_queue.close();
    tracing::debug!("waiting for workers to finish");
    match pool.join().await {
        Ok(copy_summary) => summary.copy = copy_summary,
        Err(error) => return Err(Error::new(error, summary)),
    }
    match res {
        Ok(()) => Ok(summary),
        Err(error) => Err(Error::new(error, summary)),
    }
}

async fn sync_datasets(
    output_root: &std::path::Path,
    metadata_root: &std::path::Path,
    settings: &Settings,
    task_queue: &queue::TaskQueue,
    cancel: &CancellationToken,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    let datasets = find_datasets(output_root, metadata_root).await?;
    tracing::info!("found {} dataset(s)", datasets.len());
    let mut first_error = None;
    for dataset in datasets {
        if cancel.is_cancelled() {
            break;
        }
        tracing::info!("Currently working on dataset: {}", &dataset.name);
        if let Some(mount) = &settings.atlas_mount {
            match atlas::copy_atlas(&dataset.source, mount, &dataset.destination).await {
                Ok(copied) => summary.atlases_copied += copied,
                Err(error) => {
                    tracing::error!(
                        "couldn't obtain the atlas for {:?}: {}",
                        &dataset.name,
                        &error
                    );
                    summary.atlas_errors += 1;
                }
            }
        }
        match traverse::walk_dataset(&dataset, &settings.rules, task_queue).await {
            Ok(traverse_summary) => {
                summary.traverse = summary.traverse + traverse_summary;
                summary.datasets_synced += 1;
            }
            Err(error) if error.is_cancelled() => break,
            Err(error) => {
                tracing::error!("failed syncing dataset {:?}: {}", &dataset.name, &error);
                summary.datasets_failed += 1;
                let error = anyhow::Error::new(error)
                    .context(format!("failed syncing dataset {:?}", &dataset.name));
                if settings.fail_early {
                    cancel.cancel();
                    return Err(error);
                }
                first_error.get_or_insert(error);
            }
        }
    }
    if let Some(error) = first_error {
        return Err(error);
    }
    if cancel.is_cancelled() {
        return Err(anyhow!(QueueError::Cancelled));
    }
    Ok(())
}
