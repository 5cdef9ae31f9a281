//! Locating and copying the overview atlas of a session
//!
//! EPU stores the atlas outside the session directory. The session descriptor
//! (`EpuSession.dm`, or `Session.dm` for Tomo5) is an XML document whose first `AtlasId`
//! element holds the Windows path of the atlas descriptor, e.g.
//! `D:\EPU\Atlas\Atlas_20240101\Atlas.dm`. The path is rebased onto a local mount and every
//! `Atlas_*.mrc` next to the descriptor is copied into the dataset root.

use std::sync::LazyLock;

use quick_xml::events::Event;
use tracing::instrument;

use crate::copy::{CopyError, copy_file};

pub const SESSION_DESCRIPTORS: [&str; 2] = ["EpuSession.dm", "Session.dm"];
pub const ATLAS_FIELD: &str = "AtlasId";

static ATLAS_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^Atlas_.*\.mrc$").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("cannot read session descriptor {path:?}: {source}")]
    Unreadable {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed session descriptor {path:?}: {source}")]
    Malformed {
        path: std::path::PathBuf,
        #[source]
        source: quick_xml::Error,
    },
    #[error("element {field:?} not found in {path:?}")]
    FieldNotFound {
        field: String,
        path: std::path::PathBuf,
    },
    #[error("cannot use {raw:?} as an atlas location: {reason}")]
    InvalidReference { raw: String, reason: &'static str },
    #[error("cannot list atlas directory {path:?}: {source}")]
    ListDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Copy(#[from] CopyError),
}

/// Raw `AtlasId` value as found in the session descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasReference {
    pub raw: String,
}

impl AtlasReference {
    /// Converts the stored path into one relative to the atlas mount.
    ///
    /// Backslashes become the platform separator and a leading drive designation (`D:`) is
    /// dropped. Values without a drive (already POSIX style) are used as they are. Empty
    /// values and values with `..` components are rejected since they can't name a location
    /// under the mount.
    pub fn normalize(&self) -> Result<std::path::PathBuf, MetadataError> {
        let invalid = |reason| MetadataError::InvalidReference {
            raw: self.raw.clone(),
            reason,
        };
        let value = self.raw.trim().replace('\\', std::path::MAIN_SEPARATOR_STR);
        let bytes = value.as_bytes();
        let value = if bytes.len() > 1 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            &value[2..]
        } else {
            value.as_str()
        };
        let relative = value.trim_start_matches(std::path::MAIN_SEPARATOR);
        if relative.is_empty() {
            return Err(invalid("no path after the drive designation"));
        }
        let relative = std::path::PathBuf::from(relative);
        if relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir))
        {
            return Err(invalid("path escapes the atlas mount"));
        }
        Ok(relative)
    }
}

/// Returns the text of the first `field` element (document order), ignoring namespaces.
pub fn find_field(
    document: &[u8],
    field: &str,
    path: &std::path::Path,
) -> Result<String, MetadataError> {
    let malformed = |source| MetadataError::Malformed {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = quick_xml::Reader::from_reader(document);
    let mut value: Option<String> = None;
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) if value.is_none() => {
                if start.local_name().as_ref() == field.as_bytes() {
                    value = Some(String::new());
                }
            }
            Event::Empty(start) if value.is_none() => {
                if start.local_name().as_ref() == field.as_bytes() {
                    return Ok(String::new());
                }
            }
            Event::Text(text) => {
                if let Some(value) = value.as_mut() {
                    value.push_str(&text.unescape().map_err(malformed)?);
                }
            }
            Event::CData(cdata) => {
                if let Some(value) = value.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                }
            }
            Event::End(end) if value.is_some() => {
                if end.local_name().as_ref() == field.as_bytes() {
                    return Ok(value.unwrap_or_default());
                }
            }
            Event::Eof => {
                return Err(MetadataError::FieldNotFound {
                    field: field.to_string(),
                    path: path.to_path_buf(),
                });
            }
            _ => {}
        }
    }
}

/// Reads the atlas reference from the session descriptor in `session_dir`.
///
/// Returns `Ok(None)` when the directory holds no session descriptor.
#[instrument]
pub async fn read_reference(
    session_dir: &std::path::Path,
) -> Result<Option<AtlasReference>, MetadataError> {
    for name in SESSION_DESCRIPTORS {
        let path = session_dir.join(name);
        let document = match tokio::fs::read(&path).await {
            Ok(document) => document,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => return Err(MetadataError::Unreadable { path, source }),
        };
        tracing::debug!("found session descriptor {:?}", &path);
        let raw = find_field(&document, ATLAS_FIELD, &path)?;
        return Ok(Some(AtlasReference { raw }));
    }
    Ok(None)
}

/// Copies the atlas referenced by the session in `session_dir` into `dataset_dir`.
///
/// Atlas files already present in `dataset_dir` are left alone. Returns the number of files
/// copied.
#[instrument]
pub async fn copy_atlas(
    session_dir: &std::path::Path,
    mount: &std::path::Path,
    dataset_dir: &std::path::Path,
) -> Result<usize, MetadataError> {
    let Some(reference) = read_reference(session_dir).await? else {
        tracing::debug!("no session descriptor, skipping atlas");
        return Ok(0);
    };
    let descriptor = mount.join(reference.normalize()?);
    // the reference names the atlas descriptor, the images sit next to it
    let atlas_dir = descriptor.parent().unwrap_or(mount).to_path_buf();
    tracing::debug!("looking for atlas images in {:?}", &atlas_dir);
    let list_err = |source| MetadataError::ListDir {
        path: atlas_dir.clone(),
        source,
    };
    let mut entries = tokio::fs::read_dir(&atlas_dir).await.map_err(list_err)?;
    let mut names = vec![];
    while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if ATLAS_RE.is_match(&name) {
            names.push(name);
        }
    }
    names.sort();
    let mut copied = 0;
    for name in names {
        let dst = dataset_dir.join(&name);
        if tokio::fs::symlink_metadata(&dst).await.is_ok() {
            tracing::debug!("{:?} already exists, skipping", &dst);
            continue;
        }
        copy_file(&atlas_dir.join(&name), &dst).await?;
        tracing::info!("copied atlas {:?}", &dst);
        copied += 1;
    }
    Ok(copied)
}
