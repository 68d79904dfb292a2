use anyhow::Result;
use log::debug;
use std::fs;
use std::path::Path;

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Empties `path`, creating it when missing.
pub fn reset_dir(path: &Path) -> Result<()> {
    if path.exists() {
        debug!("Clearing {}", path.display());
        fs::remove_dir_all(path)?;
    }
    ensure_dir(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_reset_dir_clears_contents() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("filing");
        ensure_dir(&dir).unwrap();
        fs::write(dir.join("stale.csv"), "x").unwrap();

        reset_dir(&dir).unwrap();
        assert!(dir.exists());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }
}
