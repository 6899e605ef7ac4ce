//! Error types for batch configuration, reading and writing.

use std::io;
use std::path::PathBuf;

use mipmerge_pipeline::PipelineError;
use mipmerge_tiff::TiffCodecError;

/// A batch cannot start. Raised before any image is processed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The source directory is missing or not a directory.
    #[error("source directory {} does not exist or is not a directory", .0.display())]
    MissingSource(PathBuf),

    /// The destination directory is missing or not a directory.
    #[error("destination directory {} does not exist or is not a directory", .0.display())]
    MissingDestination(PathBuf),

    /// The run label cannot name an output directory.
    #[error("invalid run label {label:?}: {reason}")]
    InvalidLabel {
        /// The rejected label.
        label: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Processing parameters are out of range.
    #[error(transparent)]
    InvalidParams(#[from] PipelineError),

    /// The output directories could not be created.
    #[error("failed to create output directory {}: {source}", path.display())]
    CreateOutput {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The source directory could not be listed.
    #[error("failed to list {}: {source}", path.display())]
    ListSource {
        /// Directory that could not be listed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// An acquisition could not be read.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not a decodable acquisition.
    #[error(transparent)]
    Decode(#[from] TiffCodecError),
}

/// An output file could not be written.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The file could not be written or renamed into place.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The output could not be encoded.
    #[error(transparent)]
    Encode(#[from] TiffCodecError),
}

/// One image failed. Recorded in the batch report; siblings continue.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The source file could not be opened or decoded.
    #[error("failed to open {}: {source}", path.display())]
    FileOpen {
        /// Source file.
        path: PathBuf,
        /// What went wrong.
        source: ReadError,
    },

    /// The acquisition was rejected by the pipeline.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// An output file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Output file.
        path: PathBuf,
        /// What went wrong.
        source: WriteError,
    },
}
