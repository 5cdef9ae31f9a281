use anyhow::{Context, Result};
use async_recursion::async_recursion;

/// Recursively copies `src` to `dst`, keeping the permission bits of every file and directory.
///
/// Unlike the sync engine this copies everything and fails on the first error. `dst` may
/// already exist as a directory. Used to stage fixture trees.
#[async_recursion]
pub async fn copy_tree(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    let src_metadata = tokio::fs::metadata(src)
        .await
        .with_context(|| format!("failed reading metadata from {:?}", &src))?;
    if src_metadata.is_file() {
        tokio::fs::copy(src, dst)
            .await
            .with_context(|| format!("failed copying {:?} to {:?}", &src, &dst))?;
        // tokio::fs::copy already carries the permission bits over
        return Ok(());
    }
    let mut entries = tokio::fs::read_dir(src)
        .await
        .with_context(|| format!("cannot open directory {src:?} for reading"))?;
    if let Err(error) = tokio::fs::create_dir(dst).await {
        if error.kind() != std::io::ErrorKind::AlreadyExists {
            return Err(error).with_context(|| format!("cannot create directory {dst:?}"));
        }
    }
    let mut join_set = tokio::task::JoinSet::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing directory {:?}", &src))?
    {
        let entry_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        join_set.spawn(async move { copy_tree(&entry_path, &dst_path).await });
    }
    while let Some(res) = join_set.join_next().await {
        res??;
    }
    // set permissions last so a read-only source directory doesn't block filling the copy
    tokio::fs::set_permissions(dst, src_metadata.permissions())
        .await
        .with_context(|| format!("failed setting permissions on {:?}", &dst))?;
    Ok(())
}
