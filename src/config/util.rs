//! Configuration utility functions.

use std::path::{Path, PathBuf};

/// Find config file by searching upward from `start`
///
/// Returns the path of the first `config_name` found in `start` or one of
/// its ancestors.
///
/// # Example
/// ```text
/// /home/user/site/src/js/      ← start
/// /home/user/site/simmer.toml  ← found!
/// ```
pub fn find_config_file(start: &Path, config_name: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    let mut current = start;
    loop {
        let candidate = current.join(config_name);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = current.parent()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_config_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("src/js");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("simmer.toml"), "").unwrap();

        let found = find_config_file(&nested, Path::new("simmer.toml")).unwrap();
        assert_eq!(found, dir.path().join("simmer.toml"));
    }

    #[test]
    fn test_find_config_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_config_file(dir.path(), Path::new("no-such-simmer-config.toml")).is_none());
    }

    #[test]
    fn test_find_config_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        assert!(find_config_file(Path::new("/"), &path).is_none());
        std::fs::write(&path, "").unwrap();
        assert_eq!(find_config_file(Path::new("/"), &path), Some(path));
    }
}
