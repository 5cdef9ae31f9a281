//! Configuration types for runtime and execution settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{flag} path {path:?} cannot be resolved: {source}")]
    Unresolvable {
        flag: &'static str,
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{flag} path {path:?} is not a directory")]
    NotADirectory {
        flag: &'static str,
        path: std::path::PathBuf,
    },
    #[error("{0} must be greater than 0")]
    Zero(&'static str),
}

/// Makes a root directory given on the command line absolute and checks that it's a
/// directory.
pub fn resolve_root(
    flag: &'static str,
    path: &std::path::Path,
) -> Result<std::path::PathBuf, ConfigError> {
    let absolute = std::path::absolute(path).map_err(|source| ConfigError::Unresolvable {
        flag,
        path: path.to_path_buf(),
        source,
    })?;
    match std::fs::metadata(&absolute) {
        Ok(metadata) if metadata.is_dir() => Ok(absolute),
        Ok(_) => Err(ConfigError::NotADirectory {
            flag,
            path: absolute,
        }),
        Err(source) => Err(ConfigError::Unresolvable {
            flag,
            path: absolute,
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn resolves_existing_directory() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let resolved = resolve_root("-o", tmp_dir.path())?;
        assert!(resolved.is_absolute());
        assert_eq!(resolved, tmp_dir.path());
        Ok(())
    }

    #[test]
    fn rejects_missing_and_files() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let missing = tmp_dir.path().join("missing");
        assert!(matches!(
            resolve_root("-i", &missing),
            Err(ConfigError::Unresolvable { flag: "-i", .. })
        ));
        let file = tmp_dir.path().join("file");
        std::fs::write(&file, "")?;
        let error = resolve_root("-o", &file).unwrap_err();
        assert!(matches!(error, ConfigError::NotADirectory { .. }));
        assert!(error.to_string().starts_with("-o path"));
        Ok(())
    }
}
