use tokio::io::AsyncWriteExt;
use tracing::instrument;

/// A single pending file copy.
///
/// Both paths are absolute. Tasks are created by the traversal (or the atlas step) and
/// consumed exactly once by a worker; they are never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    pub src: std::path::PathBuf,
    pub dst: std::path::PathBuf,
}

impl CopyTask {
    #[must_use]
    pub fn new(src: impl Into<std::path::PathBuf>, dst: impl Into<std::path::PathBuf>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

/// Step of [`copy_file`] that failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CopyPhase {
    Open,
    Create,
    Transfer,
}

impl std::fmt::Display for CopyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CopyPhase::Open => write!(f, "open source"),
            CopyPhase::Create => write!(f, "create destination"),
            CopyPhase::Transfer => write!(f, "transfer data to"),
        }
    }
}

/// Error type for a single file copy.
///
/// `path` is the source for [`CopyPhase::Open`] and the destination otherwise.
#[derive(Debug, thiserror::Error)]
#[error("failed to {phase} {path:?}: {source}")]
pub struct CopyError {
    pub phase: CopyPhase,
    pub path: std::path::PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl CopyError {
    fn new(phase: CopyPhase, path: &std::path::Path, source: std::io::Error) -> Self {
        Self {
            phase,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Streams the contents of `src` into `dst` and returns the number of bytes copied.
///
/// The destination is created (or truncated) with default permissions. Callers are
/// expected to have checked that `dst` does not exist yet. A failed transfer leaves
/// whatever was written in place.
#[instrument]
pub async fn copy_file(src: &std::path::Path, dst: &std::path::Path) -> Result<u64, CopyError> {
    tracing::debug!("opening 'src' for reading and 'dst' for writing");
    let mut reader = tokio::fs::File::open(src)
        .await
        .map_err(|err| CopyError::new(CopyPhase::Open, src, err))?;
    let mut writer = tokio::fs::File::create(dst)
        .await
        .map_err(|err| CopyError::new(CopyPhase::Create, dst, err))?;
    tracing::debug!("copying data");
    let bytes = tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(|err| CopyError::new(CopyPhase::Transfer, dst, err))?;
    // tokio::fs::File buffers writes in the background, flush to surface late errors
    writer
        .flush()
        .await
        .map_err(|err| CopyError::new(CopyPhase::Transfer, dst, err))?;
    Ok(bytes)
}
