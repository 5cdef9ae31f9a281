//! Per-entry rules deciding what the traversal does with a directory or file
//!
//! Classification looks only at the entry name and type, no filesystem access happens here.
//! Rules are evaluated in a fixed order:
//!
//! 1. derived-preview directory (`FoilHoles`, `Thumbnails`) - prune
//! 2. search-overview directory (`SearchMaps`) - mirror the whole subtree
//! 3. batch directory (`Batch`) - mirror the directory shell only
//! 4. any other directory - recurse
//! 5. acquisition log (`*.mdoc`, any case) - FlipNote side effect
//! 6. per-tile image (name contains `GridSquare`) - skip
//! 7. structured metadata (`*.xml`, any case) - enqueue for copy
//! 8. anything else - skip

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
}

impl EntryKind {
    #[must_use]
    pub fn from_file_type(file_type: &std::fs::FileType) -> Self {
        // symlinks are not followed, a link is treated like any other file
        if file_type.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Descend without creating anything in the destination.
    Recurse,
    /// Skip the entire subtree.
    Prune,
    /// Mirror every directory and copy every file below, then stop the outer walk here.
    MirrorTree,
    /// Create the matching destination directory, don't descend.
    MirrorShell,
    /// Queue the file for copying unless the destination already has it.
    Enqueue,
    /// Acquisition log: write the orientation note, don't copy.
    FlipNote,
    SkipFile,
}

/// Names and patterns recognized in an EPU / Tomo5 metadata tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rules {
    /// Directories holding derived previews (one alias per acquisition mode).
    pub preview_dirs: Vec<String>,
    pub search_overview_dir: String,
    pub batch_dir: String,
    /// Compared case-insensitively, including the leading dot.
    pub acquisition_log_suffix: String,
    /// Compared case-insensitively, including the leading dot.
    pub metadata_suffix: String,
    /// Case-sensitive substring.
    pub tile_image_marker: String,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            preview_dirs: vec!["FoilHoles".to_string(), "Thumbnails".to_string()],
            search_overview_dir: "SearchMaps".to_string(),
            batch_dir: "Batch".to_string(),
            acquisition_log_suffix: ".mdoc".to_string(),
            metadata_suffix: ".xml".to_string(),
            tile_image_marker: "GridSquare".to_string(),
        }
    }
}

impl Rules {
    #[must_use]
    pub fn classify(&self, name: &str, kind: EntryKind) -> Decision {
        match kind {
            EntryKind::Dir => {
                if self.preview_dirs.iter().any(|dir| dir == name) {
                    Decision::Prune
                } else if name == self.search_overview_dir {
                    Decision::MirrorTree
                } else if name == self.batch_dir {
                    Decision::MirrorShell
                } else {
                    Decision::Recurse
                }
            }
            EntryKind::File => {
                if has_suffix_ignore_case(name, &self.acquisition_log_suffix) {
                    Decision::FlipNote
                } else if name.contains(self.tile_image_marker.as_str()) {
                    Decision::SkipFile
                } else if has_suffix_ignore_case(name, &self.metadata_suffix) {
                    Decision::Enqueue
                } else {
                    Decision::SkipFile
                }
            }
        }
    }
}

fn has_suffix_ignore_case(name: &str, suffix: &str) -> bool {
    let (name, suffix) = (name.as_bytes(), suffix.as_bytes());
    name.len() >= suffix.len() && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
