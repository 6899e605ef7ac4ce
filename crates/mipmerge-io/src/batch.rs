//! Batch runner: every acquisition in a source directory, one at a time.
//!
//! A failing image is logged and recorded; its siblings still run.
//! Configuration problems stop the batch before any image is touched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mipmerge_pipeline::ProcessingParams;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ConfigError, ImageError};
use crate::layout::{OutputLayout, OutputPaths};
use crate::reader::AcquisitionReader;
use crate::writer::write_record;

/// What to do when an image's outputs already exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Replace existing outputs.
    #[default]
    Overwrite,
    /// Leave an image alone when all three of its outputs exist, unless an
    /// earlier image in the same run wrote them.
    Skip,
}

/// Everything a batch run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Directory scanned (non-recursively) for acquisitions.
    pub source_dir: PathBuf,
    /// Existing directory that receives `<run_label>_output`.
    pub destination_dir: PathBuf,
    /// Names the output root, typically the acquisition date.
    pub run_label: String,
    /// Shared by every image.
    #[serde(default)]
    pub params: ProcessingParams,
    /// Existing-output handling.
    #[serde(default)]
    pub overwrite: OverwritePolicy,
}

impl BatchConfig {
    /// Config with default parameters and overwrite policy.
    #[must_use]
    pub fn new(
        source_dir: impl Into<PathBuf>,
        destination_dir: impl Into<PathBuf>,
        run_label: impl Into<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            destination_dir: destination_dir.into(),
            run_label: run_label.into(),
            params: ProcessingParams::default(),
            overwrite: OverwritePolicy::default(),
        }
    }

    /// Check directories, label and parameters without touching disk.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source_dir.is_dir() {
            return Err(ConfigError::MissingSource(self.source_dir.clone()));
        }
        if !self.destination_dir.is_dir() {
            return Err(ConfigError::MissingDestination(
                self.destination_dir.clone(),
            ));
        }
        validate_label(&self.run_label)?;
        self.params.validate()?;
        Ok(())
    }
}

fn validate_label(label: &str) -> Result<(), ConfigError> {
    let reason = if label.trim().is_empty() {
        "label is empty"
    } else if label.contains(['/', '\\']) {
        "label contains a path separator"
    } else if label == "." || label == ".." {
        "label is a relative directory name"
    } else if label.contains('\0') {
        "label contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidLabel {
        label: label.to_owned(),
        reason,
    })
}

/// Shared flag that stops a batch between images.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not yet raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the batch to stop before its next image.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// An image whose three outputs were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedImage {
    /// Source file.
    pub source: PathBuf,
    /// Output name.
    pub identifier: String,
    /// Where the outputs went.
    pub outputs: OutputPaths,
}

/// An image that failed.
#[derive(Debug)]
pub struct ImageFailure {
    /// Source file.
    pub source: PathBuf,
    /// What went wrong.
    pub error: ImageError,
}

impl Serialize for ImageFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ImageFailure", 2)?;
        state.serialize_field("source", &self.source)?;
        state.serialize_field("error", &self.error.to_string())?;
        state.end()
    }
}

/// Outcome of a batch run.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    /// The `<label>_output` directory.
    pub output_root: PathBuf,
    /// Images written, in processing order.
    pub processed: Vec<ProcessedImage>,
    /// Images left alone under [`OverwritePolicy::Skip`].
    pub skipped: Vec<PathBuf>,
    /// Images that failed.
    pub failures: Vec<ImageFailure>,
    /// Whether the batch stopped early on a [`CancelFlag`].
    pub cancelled: bool,
}

impl BatchReport {
    fn new(output_root: &Path) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            processed: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    /// No image failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} processed, {} skipped, {} failed",
            self.processed.len(),
            self.skipped.len(),
            self.failures.len(),
        );
        if self.cancelled {
            line.push_str(" (cancelled)");
        }
        line
    }
}

/// Files in `dir` that `reader` accepts, sorted by path.
///
/// # Errors
///
/// Returns the I/O error if the directory cannot be listed.
pub fn discover_sources(
    dir: &Path,
    reader: &dyn AcquisitionReader,
) -> std::io::Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && reader.accepts(&path) {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

/// Process every acquisition under `config.source_dir`.
///
/// # Pipeline steps
///
/// 1. Validate the configuration
/// 2. Discover sources
/// 3. Create the output layout
/// 4. Per image, unless cancelled: skip, or read, process and write
///
/// # Errors
///
/// Returns [`ConfigError`] if the batch cannot start. Per-image problems
/// never surface here; they are in [`BatchReport::failures`].
pub fn run_batch(
    config: &BatchConfig,
    reader: &dyn AcquisitionReader,
    cancel: &CancelFlag,
) -> Result<BatchReport, ConfigError> {
    // 1. Validate.
    config.validate()?;

    // 2. Discover.
    let sources =
        discover_sources(&config.source_dir, reader).map_err(|source| ConfigError::ListSource {
            path: config.source_dir.clone(),
            source,
        })?;

    // 3. Layout.
    let layout = OutputLayout::new(&config.destination_dir, &config.run_label);
    layout
        .create()
        .map_err(|source| ConfigError::CreateOutput {
            path: layout.root().to_path_buf(),
            source,
        })?;
    log::info!(
        "processing {} acquisitions from {} into {}",
        sources.len(),
        config.source_dir.display(),
        layout.root().display(),
    );

    // 4. Images.
    let mut report = BatchReport::new(layout.root());
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();
    let total = sources.len();
    for (index, source) in sources.into_iter().enumerate() {
        if cancel.is_cancelled() {
            log::warn!(
                "batch cancelled, {} of {total} acquisitions not processed",
                total - index
            );
            report.cancelled = true;
            break;
        }

        let identifier = mipmerge_pipeline::base_identifier(&source_name(&source));
        let previous = claimed.insert(identifier.clone(), source.clone());
        if let Some(previous) = &previous {
            log::warn!(
                "{} and {} both write outputs named {identifier}; the later one wins",
                previous.display(),
                source.display(),
            );
        }

        // Outputs claimed earlier in this run are replaced even under Skip.
        let outputs = layout.paths_for(&identifier);
        if config.overwrite == OverwritePolicy::Skip
            && previous.is_none()
            && outputs.all_exist()
        {
            log::warn!("skipping {}: outputs already exist", source.display());
            report.skipped.push(source);
            continue;
        }

        match process_one(&source, &outputs, reader, &config.params) {
            Ok(()) => {
                log::info!(
                    "[{}/{total}] {} -> {identifier}",
                    index + 1,
                    source.display()
                );
                report.processed.push(ProcessedImage {
                    source,
                    identifier,
                    outputs,
                });
            }
            Err(error) => {
                log::error!("{}: {error}", source.display());
                report.failures.push(ImageFailure { source, error });
            }
        }
    }

    log::info!("batch finished: {}", report.summary());
    Ok(report)
}

/// Read, process and write one image. The record is dropped on return.
fn process_one(
    source: &Path,
    outputs: &OutputPaths,
    reader: &dyn AcquisitionReader,
    params: &ProcessingParams,
) -> Result<(), ImageError> {
    let image = reader.read(source).map_err(|e| ImageError::FileOpen {
        path: source.to_path_buf(),
        source: e,
    })?;
    let record = mipmerge_pipeline::process(image, &source_name(source), params)?;
    write_record(&record, outputs)
}

fn source_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.to_string_lossy().into_owned(),
        |name| name.to_string_lossy().into_owned(),
    )
}
