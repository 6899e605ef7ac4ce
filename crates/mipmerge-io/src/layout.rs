//! Output directory layout.
//!
//! ```text
//! <destination>/<label>_output/
//!     Green/<identifier>.tif   processed fluorescence
//!     BF/<identifier>.tif      projected phase
//!     merge/<identifier>.tif   composite
//! ```

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Subdirectory for processed fluorescence planes.
pub const FLUORESCENCE_DIR: &str = "Green";
/// Subdirectory for projected phase planes.
pub const PHASE_DIR: &str = "BF";
/// Subdirectory for composites.
pub const COMPOSITE_DIR: &str = "merge";
/// Suffix appended to the run label to name the output root.
pub const OUTPUT_SUFFIX: &str = "_output";
/// Extension of every output file.
pub const OUTPUT_EXTENSION: &str = "tif";

/// Output tree of one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Layout rooted at `<destination>/<run_label>_output`.
    #[must_use]
    pub fn new(destination: &Path, run_label: &str) -> Self {
        Self {
            root: destination.join(format!("{run_label}{OUTPUT_SUFFIX}")),
        }
    }

    /// The output root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and its three subdirectories. Existing directories
    /// are left as they are.
    ///
    /// # Errors
    ///
    /// Returns the I/O error of the first directory that cannot be
    /// created.
    pub fn create(&self) -> io::Result<()> {
        for dir in [FLUORESCENCE_DIR, PHASE_DIR, COMPOSITE_DIR] {
            std::fs::create_dir_all(self.root.join(dir))?;
        }
        Ok(())
    }

    /// Output paths for the image named `identifier`.
    #[must_use]
    pub fn paths_for(&self, identifier: &str) -> OutputPaths {
        let file = format!("{identifier}.{OUTPUT_EXTENSION}");
        OutputPaths {
            fluorescence: self.root.join(FLUORESCENCE_DIR).join(&file),
            phase: self.root.join(PHASE_DIR).join(&file),
            composite: self.root.join(COMPOSITE_DIR).join(file),
        }
    }
}

/// The three output files of one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    /// Processed fluorescence plane.
    pub fluorescence: PathBuf,
    /// Projected phase plane.
    pub phase: PathBuf,
    /// Composite.
    pub composite: PathBuf,
}

impl OutputPaths {
    /// All three paths.
    #[must_use]
    pub fn all(&self) -> [&Path; 3] {
        [&self.fluorescence, &self.phase, &self.composite]
    }

    /// Whether every output file already exists.
    #[must_use]
    pub fn all_exist(&self) -> bool {
        self.all().iter().all(|path| path.is_file())
    }
}
