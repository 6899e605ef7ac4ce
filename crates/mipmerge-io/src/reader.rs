//! Acquisition readers.

use std::path::Path;

use mipmerge_pipeline::MultichannelImage;

use crate::error::ReadError;

/// Reads one acquisition file into a multichannel image.
///
/// Implementations must be shareable across threads so independent
/// images can be read concurrently.
pub trait AcquisitionReader: Send + Sync {
    /// Whether `path` looks like a file this reader handles.
    ///
    /// Only the name is inspected; the file is not opened.
    fn accepts(&self, path: &Path) -> bool;

    /// Read and decode the acquisition at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError`] if the file cannot be read or decoded.
    fn read(&self, path: &Path) -> Result<MultichannelImage, ReadError>;
}

/// Reader for ImageJ TIFF hyperstacks (`.tif` / `.tiff`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffHyperstackReader;

impl AcquisitionReader for TiffHyperstackReader {
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
    }

    fn read(&self, path: &Path) -> Result<MultichannelImage, ReadError> {
        let bytes = std::fs::read(path)?;
        log::debug!("read {} ({} bytes)", path.display(), bytes.len());
        Ok(mipmerge_tiff::decode_hyperstack(&bytes)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_tiff_extensions_only() {
        let reader = TiffHyperstackReader;
        assert!(reader.accepts(Path::new("a/b/cells.tif")));
        assert!(reader.accepts(Path::new("CELLS.TIFF")));
        assert!(reader.accepts(Path::new("cells.1.Tif")));
        assert!(!reader.accepts(Path::new("cells.nd2")));
        assert!(!reader.accepts(Path::new("cells.tif.partial")));
        assert!(!reader.accepts(Path::new("tif")));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TiffHyperstackReader.read(&dir.path().join("absent.tif"));
        assert!(matches!(result, Err(ReadError::Io(_))));
    }

    #[test]
    fn corrupt_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.tif");
        std::fs::write(&path, b"II*\0garbage").unwrap();
        assert!(matches!(
            TiffHyperstackReader.read(&path),
            Err(ReadError::Decode(_))
        ));
    }
}
