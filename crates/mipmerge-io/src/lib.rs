//! mipmerge-io: Filesystem glue for mipmerge.
//!
//! Finds acquisitions in a source directory, reads them through an
//! [`AcquisitionReader`], runs the pipeline and writes each image's three
//! outputs atomically under `<label>_output/{Green,BF,merge}`.

pub mod batch;
pub mod error;
pub mod layout;
pub mod reader;
pub mod writer;

pub use batch::{
    BatchConfig, BatchReport, CancelFlag, ImageFailure, OverwritePolicy, ProcessedImage,
    discover_sources, run_batch,
};
pub use error::{ConfigError, ImageError, ReadError, WriteError};
pub use layout::{OutputLayout, OutputPaths};
pub use reader::{AcquisitionReader, TiffHyperstackReader};
pub use writer::write_record;
