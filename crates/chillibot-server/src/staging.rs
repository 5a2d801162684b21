//! Temporary storage for inbound images

use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Creates staged image files under one directory
#[derive(Debug, Clone)]
pub struct ImageStaging {
    dir: PathBuf,
}

impl ImageStaging {
    /// Use `dir`, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A fresh, uniquely named, empty file
    pub fn create(&self) -> io::Result<StagedImage> {
        let file = tempfile::Builder::new()
            .prefix("inbound-")
            .suffix(".img")
            .tempfile_in(&self.dir)?;
        Ok(StagedImage { file })
    }
}

/// An inbound image on disk; deleted when dropped
#[derive(Debug)]
pub struct StagedImage {
    file: NamedTempFile,
}

impl StagedImage {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Async writer over the same file
    ///
    /// The writer shares the descriptor; dropping it leaves the file in place.
    pub fn writer(&self) -> io::Result<tokio::fs::File> {
        Ok(tokio::fs::File::from_std(self.file.as_file().try_clone()?))
    }
}
