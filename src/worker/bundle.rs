use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

/// Creates one compressed bundle from a set of files
pub trait BundleWriter: Send + Sync {
    /// Write `files` into a new bundle at `destination`
    ///
    /// Either a complete bundle exists at `destination` afterwards or nothing
    /// does. The source files are left untouched.
    fn write_bundle(&self, destination: &Path, files: &[PathBuf]) -> Result<()>;
}

/// Gzip-compressed tarball, one entry per source file
#[derive(Debug, Clone, Copy)]
pub struct TarGzBundle {
    compression: Compression,
}

impl Default for TarGzBundle {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
        }
    }
}

impl TarGzBundle {
    /// Create a bundler with the given gzip level (0-9)
    pub fn with_level(level: u32) -> Self {
        Self {
            compression: Compression::new(level.min(9)),
        }
    }

    fn write_partial(&self, partial: &Path, files: &[PathBuf]) -> Result<()> {
        let file = File::create(partial)?;
        let mut archive = tar::Builder::new(GzEncoder::new(file, self.compression));

        for path in files {
            let name = path
                .file_name()
                .ok_or_else(|| Error::archive(format!("Not a file: {}", path.display())))?;
            archive.append_path_with_name(path, name)?;
        }

        let file = archive.into_inner()?.finish()?;
        file.sync_all()?;
        Ok(())
    }
}

impl BundleWriter for TarGzBundle {
    fn write_bundle(&self, destination: &Path, files: &[PathBuf]) -> Result<()> {
        let partial = partial_path(destination);

        if let Err(e) = self.write_partial(&partial, files) {
            let _ = fs::remove_file(&partial);
            return Err(Error::archive(format!(
                "Failed to write bundle {}: {}",
                destination.display(),
                e
            )));
        }

        fs::rename(&partial, destination).map_err(|e| {
            let _ = fs::remove_file(&partial);
            Error::archive(format!("Failed to finalize bundle {}: {}", destination.display(), e))
        })
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}
