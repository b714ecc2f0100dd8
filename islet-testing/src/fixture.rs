// Temporary static roots for dispatcher tests

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A static directory that is removed when dropped.
pub struct StaticDir {
    dir: TempDir,
}

impl StaticDir {
    pub fn new() -> io::Result<Self> {
        Ok(Self { dir: TempDir::new()? })
    }

    /// Write `contents` at `url_path` (e.g. `/css/site.css`), creating parent directories.
    pub fn file(self, url_path: &str, contents: impl AsRef<[u8]>) -> io::Result<Self> {
        let target = self.dir.path().join(url_path.trim_start_matches('/'));
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, contents)?;
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_file() {
        let dir = StaticDir::new().unwrap().file("/css/site.css", "body{}").unwrap();
        let written = std::fs::read_to_string(dir.path().join("css/site.css")).unwrap();
        assert_eq!(written, "body{}");
    }
}
