use anyhow::{Context, Result};
use async_recursion::async_recursion;

use crate::traverse::Dataset;

pub struct SessionTree {
    pub tmp_dir: tempfile::TempDir,
    /// Output root (`X`).
    pub output: std::path::PathBuf,
    /// Metadata root (`Y`).
    pub metadata: std::path::PathBuf,
}

impl SessionTree {
    pub fn dataset(&self, name: &str) -> Dataset {
        Dataset {
            name: name.to_string(),
            source: self.metadata.join(name),
            destination: self.output.join(name),
        }
    }
}

pub async fn setup_session_tree() -> Result<SessionTree> {
    let tmp_dir = tempfile::tempdir()?;
    // X
    // |- ds1
    // Y
    // |- ds1
    //    |- Batch
    //    |- FoilHoles
    //       |- a.xml
    //    |- GridSquare_01.xml
    //    |- SearchMaps
    //       |- s1
    //          |- img.xml
    //    |- meta.xml
    let output = tmp_dir.path().join("X");
    let metadata = tmp_dir.path().join("Y");
    tokio::fs::create_dir_all(output.join("ds1")).await?;
    let ds1 = metadata.join("ds1");
    tokio::fs::create_dir_all(ds1.join("Batch")).await?;
    tokio::fs::create_dir_all(ds1.join("FoilHoles")).await?;
    tokio::fs::write(ds1.join("FoilHoles").join("a.xml"), "foil hole").await?;
    tokio::fs::write(ds1.join("GridSquare_01.xml"), "grid square").await?;
    tokio::fs::create_dir_all(ds1.join("SearchMaps").join("s1")).await?;
    tokio::fs::write(
        ds1.join("SearchMaps").join("s1").join("img.xml"),
        "search map",
    )
    .await?;
    tokio::fs::write(ds1.join("meta.xml"), "meta").await?;
    Ok(SessionTree {
        tmp_dir,
        output,
        metadata,
    })
}

pub async fn entry_names(dir: &std::path::Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = vec![];
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

pub async fn entry_count(dir: &std::path::Path) -> Result<usize> {
    Ok(entry_names(dir).await?.len())
}

/// Checks that everything in `src` is present in `dst` with the same contents.
#[async_recursion]
pub async fn check_dirs_identical(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    let mut src_entries = tokio::fs::read_dir(src).await?;
    while let Some(src_entry) = src_entries.next_entry().await? {
        let src_entry_path = src_entry.path();
        let dst_entry_path = dst.join(src_entry.file_name());
        let src_md = tokio::fs::metadata(&src_entry_path)
            .await
            .context(format!("Source file {:?} is missing!", &src_entry_path))?;
        let dst_md = tokio::fs::metadata(&dst_entry_path).await.context(format!(
            "Destination file {:?} is missing!",
            &dst_entry_path
        ))?;
        assert_eq!(src_md.is_file(), dst_md.is_file());
        if src_md.is_file() {
            let src_contents = tokio::fs::read(&src_entry_path).await?;
            let dst_contents = tokio::fs::read(&dst_entry_path).await?;
            assert_eq!(src_contents, dst_contents, "{:?} differs", &dst_entry_path);
        } else {
            check_dirs_identical(&src_entry_path, &dst_entry_path).await?;
        }
    }
    Ok(())
}

/// Checks that `a` and `b` hold exactly the same entries and contents.
pub async fn check_trees_equal(a: &std::path::Path, b: &std::path::Path) -> Result<()> {
    check_dirs_identical(a, b).await?;
    check_dirs_identical(b, a).await
}
