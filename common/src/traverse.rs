//! Depth-first walk of one dataset's metadata tree
//!
//! Every entry is classified with [`Rules::classify`] and the resulting [`Decision`] is turned
//! into filesystem work: directories created in the destination, copy tasks pushed onto the
//! queue, flip notes written. Each entry handler reports a [`Visit`] telling the walk whether
//! to descend.
//!
//! The walk is sequential; entries of a directory are visited in name order.

use async_recursion::async_recursion;
use tracing::instrument;

use crate::classify::{Decision, EntryKind, Rules};
use crate::copy::CopyTask;
use crate::flipnote;
use crate::queue::{QueueError, TaskQueue};

/// A top-level directory present under both the metadata root and the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub name: String,
    /// Directory under the metadata root.
    pub source: std::path::PathBuf,
    /// Directory under the output root.
    pub destination: std::path::PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum TraversalError {
    #[error("cannot read directory {path:?}: {source}")]
    ReadDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create directory {path:?}: {source}")]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed queueing {path:?}: {source}")]
    Queue {
        path: std::path::PathBuf,
        #[source]
        source: QueueError,
    },
}

impl TraversalError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            TraversalError::Queue {
                source: QueueError::Cancelled,
                ..
            }
        )
    }
}

/// Outcome of handling a single entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Visit {
    Recurse,
    Prune,
    Handled,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files_queued: usize,
    /// Files that would be queued but already exist in the destination.
    pub files_unchanged: usize,
    pub files_skipped: usize,
    pub directories_created: usize,
    pub directories_unchanged: usize,
    pub subtrees_pruned: usize,
    pub flip_notes_written: usize,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            files_queued: self.files_queued + other.files_queued,
            files_unchanged: self.files_unchanged + other.files_unchanged,
            files_skipped: self.files_skipped + other.files_skipped,
            directories_created: self.directories_created + other.directories_created,
            directories_unchanged: self.directories_unchanged + other.directories_unchanged,
            subtrees_pruned: self.subtrees_pruned + other.subtrees_pruned,
            flip_notes_written: self.flip_notes_written + other.flip_notes_written,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "files queued: {}\n\
            files unchanged: {}\n\
            files skipped: {}\n\
            directories created: {}\n\
            directories unchanged: {}\n\
            subtrees pruned: {}\n\
            flip notes written: {}\n",
            self.files_queued,
            self.files_unchanged,
            self.files_skipped,
            self.directories_created,
            self.directories_unchanged,
            self.subtrees_pruned,
            self.flip_notes_written,
        )
    }
}

struct Entry {
    name: String,
    kind: EntryKind,
    src: std::path::PathBuf,
    dst: std::path::PathBuf,
}

struct Walker {
    rules: Rules,
    queue: TaskQueue,
    summary: Summary,
}

/// Walks `dataset.source`, queueing copies into `dataset.destination`.
///
/// Directories that can't be listed because of missing permissions are skipped with a
/// warning. Any other listing failure, a failure creating a mirrored directory, or a
/// cancelled queue aborts the walk of this dataset.
#[instrument(skip(rules, queue))]
pub async fn walk_dataset(
    dataset: &Dataset,
    rules: &Rules,
    queue: &TaskQueue,
) -> Result<Summary, TraversalError> {
    let mut walker = Walker {
        rules: rules.clone(),
        queue: queue.clone(),
        summary: Summary::default(),
    };
    walker
        .walk_dir(&dataset.source, &dataset.destination)
        .await?;
    Ok(walker.summary)
}

/// Reads the entries of `dir` sorted by name.
///
/// Returns `Ok(None)` when the directory can't be read because of permissions.
async fn read_sorted(
    src_dir: &std::path::Path,
    dst_dir: &std::path::Path,
) -> Result<Option<Vec<Entry>>, TraversalError> {
    let read_err = |source| TraversalError::ReadDir {
        path: src_dir.to_path_buf(),
        source,
    };
    let mut read_dir = match tokio::fs::read_dir(src_dir).await {
        Ok(read_dir) => read_dir,
        Err(error) if error.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!("cannot open {:?} for reading: Permission denied", src_dir);
            return Ok(None);
        }
        Err(error) => return Err(read_err(error)),
    };
    let mut entries = vec![];
    while let Some(entry) = read_dir.next_entry().await.map_err(read_err)? {
        let file_type = entry.file_type().await.map_err(read_err)?;
        let file_name = entry.file_name();
        entries.push(Entry {
            name: file_name.to_string_lossy().into_owned(),
            kind: EntryKind::from_file_type(&file_type),
            src: entry.path(),
            dst: dst_dir.join(&file_name),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Some(entries))
}

async fn exists(path: &std::path::Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

impl Walker {
    #[async_recursion]
    async fn walk_dir(
        &mut self,
        src_dir: &std::path::Path,
        dst_dir: &std::path::Path,
    ) -> Result<(), TraversalError> {
        tracing::trace!("walking {:?}", src_dir);
        let Some(entries) = read_sorted(src_dir, dst_dir).await? else {
            self.summary.subtrees_pruned += 1;
            return Ok(());
        };
        for entry in entries {
            if self.visit(&entry).await? == Visit::Recurse {
                self.walk_dir(&entry.src, &entry.dst).await?;
            }
        }
        Ok(())
    }

    async fn visit(&mut self, entry: &Entry) -> Result<Visit, TraversalError> {
        let visit = match self.rules.classify(&entry.name, entry.kind) {
            Decision::Recurse => Visit::Recurse,
            Decision::Prune => {
                tracing::debug!("pruning {:?}", &entry.src);
                self.summary.subtrees_pruned += 1;
                Visit::Prune
            }
            Decision::MirrorTree => {
                self.mirror_dir(&entry.dst).await?;
                self.mirror_tree(&entry.src, &entry.dst).await?;
                Visit::Handled
            }
            Decision::MirrorShell => {
                self.mirror_dir(&entry.dst).await?;
                Visit::Handled
            }
            Decision::Enqueue => {
                self.enqueue(&entry.src, &entry.dst).await?;
                Visit::Handled
            }
            Decision::FlipNote => {
                self.flip_note(&entry.dst).await;
                Visit::Handled
            }
            Decision::SkipFile => {
                self.summary.files_skipped += 1;
                Visit::Handled
            }
        };
        Ok(visit)
    }

    /// Copies everything below `src_dir`, creating directories as needed.
    #[async_recursion]
    async fn mirror_tree(
        &mut self,
        src_dir: &std::path::Path,
        dst_dir: &std::path::Path,
    ) -> Result<(), TraversalError> {
        let Some(entries) = read_sorted(src_dir, dst_dir).await? else {
            self.summary.subtrees_pruned += 1;
            return Ok(());
        };
        for entry in entries {
            match entry.kind {
                EntryKind::Dir => {
                    self.mirror_dir(&entry.dst).await?;
                    self.mirror_tree(&entry.src, &entry.dst).await?;
                }
                EntryKind::File => self.enqueue(&entry.src, &entry.dst).await?,
            }
        }
        Ok(())
    }

    async fn mirror_dir(&mut self, dst: &std::path::Path) -> Result<(), TraversalError> {
        let res = match tokio::fs::create_dir(dst).await {
            // parents are only walked, never created, so they may be missing here
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(dst).await
            }
            res => res,
        };
        match res {
            Ok(()) => {
                tracing::info!("created {:?}", dst);
                self.summary.directories_created += 1;
                Ok(())
            }
            // someone else may have created it in the meantime, that's fine
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                self.summary.directories_unchanged += 1;
                Ok(())
            }
            Err(source) => Err(TraversalError::CreateDir {
                path: dst.to_path_buf(),
                source,
            }),
        }
    }

    async fn enqueue(
        &mut self,
        src: &std::path::Path,
        dst: &std::path::Path,
    ) -> Result<(), TraversalError> {
        if exists(dst).await {
            tracing::trace!("{:?} already exists, skipping", dst);
            self.summary.files_unchanged += 1;
            return Ok(());
        }
        self.queue
            .push(CopyTask::new(src, dst))
            .await
            .map_err(|source| TraversalError::Queue {
                path: src.to_path_buf(),
                source,
            })?;
        self.summary.files_queued += 1;
        Ok(())
    }

    async fn flip_note(&mut self, dst: &std::path::Path) {
        let Some(dst_dir) = dst.parent() else {
            return;
        };
        match flipnote::write_flip_note(dst_dir).await {
            Ok(flipnote::Outcome::Written(_)) => self.summary.flip_notes_written += 1,
            Ok(_) => {}
            Err(error) => tracing::warn!("{}", &error),
        }
    }
}
