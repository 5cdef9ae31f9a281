//! Orientation note for Tomo5 acquisitions
//!
//! Tomo5 flips the Y axis depending on the format it wrote the movies in. When an acquisition
//! log (`.mdoc`) is found, the destination directory holding the movies is inspected and a
//! one-line `HowToFlipMyTomoData.txt` records which format was used.

use std::sync::LazyLock;

use tokio::io::AsyncWriteExt;
use tracing::instrument;

pub const NOTE_NAME: &str = "HowToFlipMyTomoData.txt";

static POSITION_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^Position_.*$").expect("valid regex"));

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Tiff,
    Eer,
}

impl SourceFormat {
    /// Format of a `Position_*` movie, judged by its (case-sensitive) extension.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        if !POSITION_RE.is_match(name) {
            return None;
        }
        match std::path::Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
        {
            Some("tiff") => Some(SourceFormat::Tiff),
            Some("eer") => Some(SourceFormat::Eer),
            _ => None,
        }
    }

    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            SourceFormat::Tiff => "This data was originally written as tiff by Tomo5!\n",
            SourceFormat::Eer => "This data is orginially written as eer by Tomo5!\n",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("cannot read directory {path:?}: {source}")]
    ReadDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed writing flip instructions to {path:?}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Written(SourceFormat),
    AlreadyPresent,
    NoMovies,
}

/// Writes the orientation note into `dir` unless one is already there.
///
/// The first `Position_*` entry (in name order) with a recognized extension decides the
/// message. The note is created with create-new semantics so it is never rewritten.
#[instrument]
pub async fn write_flip_note(dir: &std::path::Path) -> Result<Outcome, WriteError> {
    let note_path = dir.join(NOTE_NAME);
    if tokio::fs::symlink_metadata(&note_path).await.is_ok() {
        tracing::debug!("flip note already present");
        return Ok(Outcome::AlreadyPresent);
    }
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| WriteError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
    let mut names = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| WriteError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
    {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    let Some(format) = names
        .iter()
        .find_map(|name| SourceFormat::from_file_name(name))
    else {
        tracing::debug!("no Position_* movies found");
        return Ok(Outcome::NoMovies);
    };
    let map_write_err = |source| WriteError::Write {
        path: note_path.clone(),
        source,
    };
    let mut note = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&note_path)
        .await
    {
        Ok(note) => note,
        Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
            return Ok(Outcome::AlreadyPresent);
        }
        Err(error) => return Err(map_write_err(error)),
    };
    note.write_all(format.message().as_bytes())
        .await
        .map_err(map_write_err)?;
    note.flush().await.map_err(map_write_err)?;
    tracing::info!("wrote {:?} ({:?})", &note_path, format);
    Ok(Outcome::Written(format))
}
